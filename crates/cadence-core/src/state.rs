use crate::{
    envelope::{Event, Payload},
    history::{AVG_FREQ_HISTORY, RingBuffer},
};
use std::time::Duration;

/// Receive times at or below this are treated as "never received".
pub const RECV_EPSILON: Duration = Duration::from_micros(10);

/// Everything the [SubMaster](crate::SubMaster) knows about one service.
#[derive(Debug, Clone)]
pub struct ServiceState {
    /// A message arrived during the current tick.
    pub updated: bool,

    /// Monotonic time of the last receipt; zero if none yet.
    pub recv_time: Duration,

    /// Tick index of the last receipt.
    pub recv_frame: i64,

    /// Heard from recently enough. Always true for event-driven services
    /// and services exempt from the liveness check.
    pub alive: bool,

    /// Average arrival rate is acceptable, or the rate check does not
    /// apply.
    pub freq_ok: bool,

    /// Validity flag of the last message. Always true for services exempt
    /// from the validity check.
    pub valid: bool,

    /// Producer timestamp of the last message, in nanoseconds.
    pub log_mono_time: u64,

    /// Latest payload, or an empty placeholder before the first receipt.
    pub payload: Payload,

    /// The most recent inter-arrival intervals.
    pub history: RingBuffer<Duration, AVG_FREQ_HISTORY>,
}

impl ServiceState {
    pub(crate) fn new(payload: Payload) -> Self {
        Self {
            updated: false,
            recv_time: Duration::ZERO,
            recv_frame: 0,
            alive: false,
            freq_ok: false,
            valid: true,
            log_mono_time: 0,
            payload,
            history: RingBuffer::new(),
        }
    }

    /// Whether any message has been received.
    pub fn has_received(&self) -> bool {
        self.recv_time > RECV_EPSILON
    }

    /// Fold a received message into the state.
    pub(crate) fn record(&mut self, now: Duration, frame: i64, event: Event) {
        self.updated = true;
        self.history.push(now.saturating_sub(self.recv_time));
        self.recv_time = now;
        self.recv_frame = frame;
        self.log_mono_time = event.log_mono_time;
        self.valid = event.valid;
        self.payload = event.payload;
    }
}
