//! # Frame Synchronizer
//!
//! Turns the raw byte stream coming from the meter into candidate long frames.
//!
//! Outside a frame every byte is dropped except the `E5` acknowledgment and the
//! `68` start marker. Once a start marker is seen, bytes are accumulated until the
//! buffer holds `L + 6` bytes, where `L` is the first length field.

use crate::constants::{
    MBUS_FRAME_ACK, MBUS_FRAME_HEADER_LENGTH, MBUS_FRAME_LONG_START, MBUS_FRAME_MAX_LENGTH,
    MBUS_FRAME_OVERHEAD,
};
use bytes::{BufMut, BytesMut};

/// Receiver state of the half-duplex link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    /// Nothing expected.
    Idle,
    /// A request went out and its reply has not started yet.
    AwaitingReply,
    /// A start marker was seen and a frame is being accumulated.
    InFrame,
}

/// Outcome of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedResult {
    /// Byte dropped outside a frame.
    Idle,
    /// Single character acknowledgment received.
    Acknowledged,
    /// Byte appended to the current candidate.
    Accumulating,
    /// The candidate is complete.
    FrameReady(Vec<u8>),
    /// The candidate hit the buffer capacity without completing and was dropped.
    FrameTooLong(usize),
}

/// Accumulates candidate frames from a byte stream.
#[derive(Debug)]
pub struct FrameSynchronizer {
    buffer: BytesMut,
    state: RxState,
    capacity: usize,
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        Self::with_capacity(MBUS_FRAME_MAX_LENGTH)
    }

    /// Creates a synchronizer whose candidate never grows beyond `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MBUS_FRAME_OVERHEAD);
        FrameSynchronizer {
            buffer: BytesMut::with_capacity(capacity),
            state: RxState::Idle,
            capacity,
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    /// True while a reply is expected or being received.
    pub fn is_receiving(&self) -> bool {
        self.state != RxState::Idle
    }

    /// Bytes of the candidate accumulated so far.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Called after a request was transmitted.
    pub fn await_reply(&mut self) {
        self.buffer.clear();
        self.state = RxState::AwaitingReply;
    }

    /// Drops any partial frame and returns to idle.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = RxState::Idle;
    }

    pub fn feed(&mut self, byte: u8) -> FeedResult {
        if self.state != RxState::InFrame {
            if byte == MBUS_FRAME_ACK {
                self.reset();
                return FeedResult::Acknowledged;
            }
            if byte != MBUS_FRAME_LONG_START {
                return FeedResult::Idle;
            }
            self.buffer.clear();
            self.state = RxState::InFrame;
        }

        self.buffer.put_u8(byte);

        let len = self.buffer.len();
        if len > MBUS_FRAME_HEADER_LENGTH && len == self.buffer[1] as usize + MBUS_FRAME_OVERHEAD {
            let frame = self.buffer.split().to_vec();
            self.state = RxState::Idle;
            return FeedResult::FrameReady(frame);
        }

        if len >= self.capacity {
            self.reset();
            return FeedResult::FrameTooLong(len);
        }

        FeedResult::Accumulating
    }
}
