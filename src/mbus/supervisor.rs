//! # Link Supervisor
//!
//! Tracks line activity and decides when the receiver has waited too long for
//! a reply, and when an acknowledged initialization step should be followed up.
//!
//! Activity is the last received byte or the last transmission. A reply is
//! considered lost once the line was quiet for the receive timeout plus the
//! time the last request itself needed on the wire.

use crate::constants::{MBUS_INIT_STEP_GAP, MBUS_RX_TIMEOUT};
use crate::mbus::handshake::silence_offset;
use std::time::{Duration, Instant};

/// What the supervisor asks the tick to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
    /// The outstanding reply is lost: reset the receiver and publish "no data"
    pub timed_out: bool,
    /// Send the next request on this tick
    pub trigger: bool,
}

/// Activity and timeout bookkeeping of the half-duplex link.
#[derive(Debug, Clone)]
pub struct LinkSupervisor {
    last_activity: Option<Instant>,
    tx_offset: Duration,
    rx_timeout: Duration,
    init_gap: Duration,
    baudrate: u32,
}

impl LinkSupervisor {
    pub fn new(baudrate: u32) -> Self {
        Self::with_timing(baudrate, MBUS_RX_TIMEOUT, MBUS_INIT_STEP_GAP)
    }

    pub fn with_timing(baudrate: u32, rx_timeout: Duration, init_gap: Duration) -> Self {
        LinkSupervisor {
            last_activity: None,
            tx_offset: Duration::ZERO,
            rx_timeout,
            init_gap,
            baudrate,
        }
    }

    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    /// Wire time of the last transmitted request.
    pub fn tx_offset(&self) -> Duration {
        self.tx_offset
    }

    /// Silence after which an outstanding reply counts as lost.
    pub fn reply_deadline(&self) -> Duration {
        self.rx_timeout + self.tx_offset
    }

    fn quiet_for(&self, now: Instant) -> Option<Duration> {
        self.last_activity
            .map(|last| now.saturating_duration_since(last))
    }

    /// Evaluates the timers at the start of a tick.
    ///
    /// `receiving` is true while a reply is outstanding. During initialization a
    /// timeout schedules a resend, and an acknowledged step is followed up once
    /// the line was quiet for the init gap.
    pub fn check(
        &self,
        now: Instant,
        receiving: bool,
        init_complete: bool,
        acknowledged: bool,
    ) -> Verdict {
        let quiet = self.quiet_for(now);
        let mut verdict = Verdict::default();

        if receiving && quiet.map_or(true, |quiet| quiet >= self.reply_deadline()) {
            verdict.timed_out = true;
            verdict.trigger = !init_complete;
        }

        if !init_complete && acknowledged && quiet.map_or(true, |quiet| quiet >= self.init_gap) {
            verdict.trigger = true;
        }

        verdict
    }

    /// Bytes were available on this tick.
    pub fn on_receive(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    /// A request of `frame_len` bytes was written.
    pub fn on_transmit(&mut self, now: Instant, frame_len: usize) {
        self.last_activity = Some(now);
        self.tx_offset = silence_offset(frame_len, self.baudrate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_includes_offset() {
        let mut supervisor = LinkSupervisor::new(2400);
        let start = Instant::now();
        supervisor.on_transmit(start, 14);
        assert_eq!(supervisor.reply_deadline(), Duration::from_millis(564));
        assert!(!supervisor.check(start + Duration::from_millis(563), true, true, false).timed_out);
        assert!(supervisor.check(start + Duration::from_millis(564), true, true, false).timed_out);
    }

    #[test]
    fn test_no_timeout_when_not_receiving() {
        let mut supervisor = LinkSupervisor::new(2400);
        let start = Instant::now();
        supervisor.on_transmit(start, 14);
        let verdict = supervisor.check(start + Duration::from_secs(5), false, true, false);
        assert_eq!(verdict, Verdict::default());
    }

    #[test]
    fn test_init_gap_trigger() {
        let mut supervisor = LinkSupervisor::new(2400);
        let start = Instant::now();
        supervisor.on_receive(start);
        assert!(!supervisor.check(start + Duration::from_millis(19), false, false, true).trigger);
        assert!(supervisor.check(start + Duration::from_millis(20), false, false, true).trigger);
        assert!(!supervisor.check(start + Duration::from_millis(20), false, false, false).trigger);
    }

    #[test]
    fn test_timeout_during_init_triggers_resend() {
        let mut supervisor = LinkSupervisor::new(2400);
        let start = Instant::now();
        supervisor.on_transmit(start, 0);
        let verdict = supervisor.check(start + Duration::from_millis(501), true, false, false);
        assert!(verdict.timed_out);
        assert!(verdict.trigger);
    }
}
