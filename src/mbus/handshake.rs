//! # Handshake State Machine
//!
//! The meter only answers data requests after a fixed five step initialization
//! sequence. Each step sends one request; an acknowledgment (`E5` or any valid
//! frame) marks the step as acknowledged and the next trigger sends the
//! following step. Once step 5 is acknowledged the machine stays in the steady
//! state and every trigger sends a poll request. The frame count bit is
//! applied to every other poll, but the request control byte `0x53` already
//! carries `0x10`, so every poll goes out as `53 .. 42 16`.
//!
//! A step that was not acknowledged is sent again on the next trigger.
//!
//! ## Usage
//!
//! ```rust
//! use mbus_heatmeter::mbus::handshake::{Handshake, InitState};
//!
//! let mut handshake = Handshake::new();
//! let request = handshake.next_request().unwrap();
//! assert_eq!(request.state, InitState::Step1);
//! assert_eq!(request.bytes.len(), 14);
//!
//! handshake.acknowledge();
//! assert_eq!(handshake.next_request().unwrap().state, InitState::Step2);
//! ```

use crate::constants::{MBUS_BITS_PER_CHARACTER, MBUS_CONTROL_MASK_FCB_TOGGLE};
use crate::mbus::frame::{pack_frame, refresh_checksum};
use bytes::BytesMut;
use std::fmt;
use std::time::Duration;

/// Control field of the requests (SND_UD)
const REQUEST_CONTROL: u8 = 0x53;

/// Control field of the third initialization step
const REQUEST_CONTROL_STEP3: u8 = 0x73;

/// Address the meter answers on during the handshake (network layer)
const REQUEST_ADDRESS: u8 = 0xFE;

/// CI field of the requests (data send)
const REQUEST_CONTROL_INFORMATION: u8 = 0x51;

const STEP1_DATA: [u8; 5] = [0x0F, 0x00, 0x00, 0x04, 0x5C];
const STEP2_DATA: [u8; 6] = [0x0F, 0x00, 0x00, 0x00, 0x59, 0x2D];
const STEP3_DATA: [u8; 5] = [0x0F, 0x00, 0x00, 0x00, 0x5D];
const STEP4_PREFIX: [u8; 14] = [
    0x0F, 0x00, 0x00, 0x06, 0x5C, 0x09, 0x02, 0x00, 0x00, 0x8F, 0xAD, 0xCE, 0xE5, 0xC7,
];
const STEP4_DATA_LENGTH: usize = 112;
const STEP5_DATA: [u8; 6] = [0x0F, 0x00, 0x00, 0x00, 0x59, 0x0C];
const POLL_DATA: [u8; 14] = [
    0x0F, 0x00, 0x00, 0x01, 0x59, 0x02, 0x03, 0x04, 0x06, 0x05, 0x07, 0x08, 0x09, 0x0B,
];

/// Position of the control byte inside a long frame
const CONTROL_OFFSET: usize = 4;

/// Initialization progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitState {
    Idle,
    Step1,
    Step2,
    Step3,
    Step4,
    Step5,
    /// Initialization done, polling
    Steady,
}

impl InitState {
    /// Step number, 0 for idle and 0xFF for the steady state.
    pub fn number(&self) -> u8 {
        match self {
            InitState::Idle => 0,
            InitState::Step1 => 1,
            InitState::Step2 => 2,
            InitState::Step3 => 3,
            InitState::Step4 => 4,
            InitState::Step5 => 5,
            InitState::Steady => 0xFF,
        }
    }

    fn following(&self) -> InitState {
        match self {
            InitState::Idle | InitState::Step1 => InitState::Step2,
            InitState::Step2 => InitState::Step3,
            InitState::Step3 => InitState::Step4,
            InitState::Step4 => InitState::Step5,
            InitState::Step5 | InitState::Steady => InitState::Steady,
        }
    }
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitState::Idle => write!(f, "idle"),
            InitState::Steady => write!(f, "steady"),
            step => write!(f, "step {}", step.number()),
        }
    }
}

/// A request ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Step this request belongs to, `Steady` for polls
    pub state: InitState,
    pub bytes: BytesMut,
}

/// Builds the fixed request of an initialization step.
///
/// Returns `None` for `Idle` and `Steady`, which have no init request.
pub fn init_request(state: InitState) -> Option<BytesMut> {
    let frame = match state {
        InitState::Step1 => request_frame(REQUEST_CONTROL, &STEP1_DATA),
        InitState::Step2 => request_frame(REQUEST_CONTROL, &STEP2_DATA),
        InitState::Step3 => request_frame(REQUEST_CONTROL_STEP3, &STEP3_DATA),
        InitState::Step4 => {
            let mut data = [0u8; STEP4_DATA_LENGTH];
            data[..STEP4_PREFIX.len()].copy_from_slice(&STEP4_PREFIX);
            request_frame(REQUEST_CONTROL, &data)
        }
        InitState::Step5 => request_frame(REQUEST_CONTROL, &STEP5_DATA),
        InitState::Idle | InitState::Steady => return None,
    };
    Some(frame)
}

fn request_frame(control: u8, data: &[u8]) -> BytesMut {
    pack_frame(control, REQUEST_ADDRESS, REQUEST_CONTROL_INFORMATION, data)
}

/// Builds the steady state poll request, setting the FCB bit when `fcb` is on.
///
/// `0x10` is already part of the request control byte, so both variants are
/// the same frame: control `0x53`, checksum `0x42`.
pub fn poll_request(fcb: bool) -> BytesMut {
    let mut frame = request_frame(REQUEST_CONTROL, &POLL_DATA);
    if fcb {
        frame[CONTROL_OFFSET] |= MBUS_CONTROL_MASK_FCB_TOGGLE;
        refresh_checksum(&mut frame);
    }
    frame
}

/// Time the line is busy sending `frame_len` characters at `baudrate`.
///
/// Whole milliseconds, rounded down.
pub fn silence_offset(frame_len: usize, baudrate: u32) -> Duration {
    let millis = (frame_len as u64 * MBUS_BITS_PER_CHARACTER * 1000)
        .checked_div(u64::from(baudrate))
        .unwrap_or_default();
    Duration::from_millis(millis)
}

/// Initialization and polling state.
#[derive(Debug, Clone)]
pub struct Handshake {
    state: InitState,
    acknowledged: bool,
    fcb: bool,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Handshake {
            state: InitState::Idle,
            acknowledged: false,
            fcb: false,
        }
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == InitState::Steady
    }

    /// True once the current step was acknowledged.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Whether the FCB bit is applied to the next poll request.
    pub fn fcb(&self) -> bool {
        self.fcb
    }

    /// Compact form of the state: step number, 0x10 added once acknowledged.
    pub fn code(&self) -> u8 {
        match self.state {
            InitState::Steady => 0xFF,
            state if self.acknowledged => state.number() | 0x10,
            state => state.number(),
        }
    }

    /// Records an acknowledgment of the current step.
    ///
    /// Any acknowledgment counts; it is not matched against the step that is
    /// outstanding. Ignored once initialization is complete.
    pub fn acknowledge(&mut self) {
        if !self.is_complete() {
            self.acknowledged = true;
        }
    }

    /// Advances on a trigger and returns the request to transmit.
    ///
    /// `None` means the acknowledged step 5 was turned into the steady state and
    /// nothing is sent on this trigger.
    pub fn next_request(&mut self) -> Option<Request> {
        let target = match (self.state, self.acknowledged) {
            (InitState::Steady, _) => {
                let bytes = poll_request(self.fcb);
                self.fcb = !self.fcb;
                return Some(Request {
                    state: InitState::Steady,
                    bytes,
                });
            }
            (InitState::Step5, true) => {
                self.state = InitState::Steady;
                self.acknowledged = false;
                return None;
            }
            (InitState::Idle, _) => InitState::Step1,
            (state, true) => state.following(),
            (state, false) => state,
        };

        self.state = target;
        self.acknowledged = false;
        init_request(target).map(|bytes| Request {
            state: target,
            bytes,
        })
    }

    /// Starts the initialization over.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
