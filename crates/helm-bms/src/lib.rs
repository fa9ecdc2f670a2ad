pub mod error;
pub mod exchange;
pub mod frame;

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

pub use error::BmsError;
pub use frame::BasicInfo;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BmsConfig {
    /// UART device of the battery pack. Without one the thruster runs
    /// against the simulated pack.
    pub serial_dev: Option<String>,
    pub baud: Option<u32>,

    pub poll_interval_ms: Option<u64>,
    pub response_timeout_ms: Option<u64>,

    /// Below this RSOC the battery is reported low.
    pub low_battery_pct: Option<u8>,
}

impl BmsConfig {
    pub fn baud(&self) -> u32 {
        self.baud.unwrap_or(9600)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(5000))
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms.unwrap_or(100))
    }

    pub fn low_battery_pct(&self) -> u8 {
        self.low_battery_pct.unwrap_or(20)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryState {
    /// Last successfully read RSOC; kept across failed polls.
    pub percent: Option<u8>,
    pub low: bool,
}

impl Default for BatteryState {
    // unknown counts as low until a read proves otherwise
    fn default() -> Self {
        Self { percent: None, low: true }
    }
}

#[derive(Debug)]
pub struct BatteryMonitor {
    poll_interval: Duration,
    response_timeout: Duration,
    low_threshold: u8,
    state: BatteryState,
    last_poll: Option<Instant>,
    consecutive_failures: u32,
}

impl BatteryMonitor {
    pub fn new(cfg: &BmsConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            response_timeout: cfg.response_timeout(),
            low_threshold: cfg.low_battery_pct(),
            state: BatteryState::default(),
            last_poll: None,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> BatteryState {
        self.state
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_poll {
            None => true,
            Some(t) => now.saturating_duration_since(t) >= self.poll_interval,
        }
    }

    /// Runs one bounded exchange and folds the outcome into the state.
    pub async fn poll<P>(&mut self, port: &mut P, now: Instant) -> BatteryState
    where
        P: AsyncRead + AsyncWrite + Unpin,
    {
        let reading = exchange::read_basic_info(port, self.response_timeout).await;
        self.record(reading.map(|info| info.rsoc), now)
    }

    pub fn record(&mut self, reading: Result<u8, BmsError>, now: Instant) -> BatteryState {
        self.last_poll = Some(now);
        match reading {
            Ok(percent) => {
                let low = percent < self.low_threshold;
                if self.consecutive_failures > 0 {
                    info!("bms: read recovered after {} failures", self.consecutive_failures);
                }
                if low && !self.state.low {
                    warn!("bms: battery low ({}% < {}%)", percent, self.low_threshold);
                }
                self.consecutive_failures = 0;
                self.state = BatteryState { percent: Some(percent), low };
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!("bms: read failed ({} in a row), assuming low battery: {}", self.consecutive_failures, e);
                self.state.low = true;
            }
        }
        self.state
    }
}
