use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Edge reported by [`LinkTracker::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Established,
    /// Peer silent for longer than the timeout. Callers must drop any
    /// request or feedback flag that assumes a live peer.
    Lost,
}

/// Time-based peer liveness. No acknowledgements, no retries.
#[derive(Debug, Clone)]
pub struct LinkTracker {
    timeout: Duration,
    last_receipt: Option<Instant>,
    reported: ConnectionState,
}

impl LinkTracker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, last_receipt: None, reported: ConnectionState::Disconnected }
    }

    pub fn on_receipt(&mut self, at: Instant) {
        // receipts may be drained out of order with respect to `now`
        match self.last_receipt {
            Some(t) if t >= at => {}
            _ => self.last_receipt = Some(at),
        }
    }

    pub fn poll(&self, now: Instant) -> ConnectionState {
        match self.last_receipt {
            Some(t) if now.saturating_duration_since(t) <= self.timeout => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn is_connected(&self, now: Instant) -> bool {
        self.poll(now) == ConnectionState::Connected
    }

    /// Polls and reports a transition since the previous update, if any.
    pub fn update(&mut self, now: Instant) -> Option<LinkEvent> {
        let state = self.poll(now);
        if state == self.reported {
            return None;
        }
        self.reported = state;
        Some(match state {
            ConnectionState::Connected => LinkEvent::Established,
            ConnectionState::Disconnected => LinkEvent::Lost,
        })
    }

    pub fn last_receipt_age(&self, now: Instant) -> Option<Duration> {
        self.last_receipt.map(|t| now.saturating_duration_since(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(2000);

    #[test]
    fn never_heard_is_disconnected() {
        let t = LinkTracker::new(TIMEOUT);
        assert_eq!(t.poll(Instant::now()), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnects_only_after_timeout_is_exceeded() {
        let t0 = Instant::now();
        let mut t = LinkTracker::new(TIMEOUT);
        t.on_receipt(t0);
        assert_eq!(t.poll(t0 + Duration::from_millis(2000)), ConnectionState::Connected);
        assert_eq!(t.poll(t0 + Duration::from_millis(2001)), ConnectionState::Disconnected);
    }

    #[test]
    fn receipt_reconnects_immediately() {
        let t0 = Instant::now();
        let mut t = LinkTracker::new(TIMEOUT);
        t.on_receipt(t0);
        let late = t0 + Duration::from_secs(10);
        assert_eq!(t.poll(late), ConnectionState::Disconnected);
        t.on_receipt(late);
        assert_eq!(t.poll(late), ConnectionState::Connected);
    }

    #[test]
    fn follows_sequence_of_receipts() {
        let t0 = Instant::now();
        let ms = |n| t0 + Duration::from_millis(n);
        let mut t = LinkTracker::new(TIMEOUT);
        for at in [0, 500, 1900, 3500] {
            t.on_receipt(ms(at));
        }
        assert!(t.is_connected(ms(5500)));
        assert!(!t.is_connected(ms(5501)));
    }

    #[test]
    fn update_reports_edges_once() {
        let t0 = Instant::now();
        let mut t = LinkTracker::new(TIMEOUT);
        assert_eq!(t.update(t0), None);

        t.on_receipt(t0);
        assert_eq!(t.update(t0), Some(LinkEvent::Established));
        assert_eq!(t.update(t0 + Duration::from_millis(100)), None);

        let silent = t0 + Duration::from_millis(2001);
        assert_eq!(t.update(silent), Some(LinkEvent::Lost));
        assert_eq!(t.update(silent + Duration::from_secs(1)), None);
    }

    #[test]
    fn older_receipt_does_not_rewind() {
        let t0 = Instant::now();
        let mut t = LinkTracker::new(TIMEOUT);
        t.on_receipt(t0 + Duration::from_millis(1000));
        t.on_receipt(t0);
        assert_eq!(t.last_receipt_age(t0 + Duration::from_millis(1500)), Some(Duration::from_millis(500)));
    }
}
