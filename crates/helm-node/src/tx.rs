use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxReason {
    Changed,
    Heartbeat,
}

/// Change-or-heartbeat transmission: send when the sample differs from the
/// previous one, or when `heartbeat` has passed since the last send.
/// Reliability comes only from re-sending current state; there are no acks.
#[derive(Debug, Clone)]
pub struct TxPolicy<T> {
    heartbeat: Duration,
    last_sample: Option<T>,
    last_send: Option<Instant>,
}

impl<T: PartialEq + Copy> TxPolicy<T> {
    pub fn new(heartbeat: Duration) -> Self {
        Self { heartbeat, last_sample: None, last_send: None }
    }

    /// Records `sample` and decides whether it goes out now. A `Some`
    /// result counts as sent.
    pub fn decide(&mut self, sample: T, now: Instant) -> Option<TxReason> {
        let changed = self.last_sample != Some(sample);
        self.last_sample = Some(sample);

        let reason = if changed {
            TxReason::Changed
        } else {
            match self.last_send {
                Some(t) if now.saturating_duration_since(t) < self.heartbeat => return None,
                _ => TxReason::Heartbeat,
            }
        };
        self.last_send = Some(now);
        Some(reason)
    }
}
