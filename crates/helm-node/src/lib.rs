pub mod controller;
pub mod doctor;
pub mod hal;
pub mod interlock;
pub mod led;
pub mod link;
pub mod liveness;
pub mod sim;
pub mod thruster;
pub mod tx;

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkConfig {
    /// Local UDP address of this unit.
    pub bind: Option<SocketAddr>,
    /// The one peer unit; datagrams from anywhere else are ignored.
    pub peer: Option<SocketAddr>,

    /// Re-send current state at least this often even when nothing changed.
    pub heartbeat_ms: Option<u64>,
    /// Peer presumed gone after this long without a valid datagram.
    pub timeout_ms: Option<u64>,
}

impl LinkConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.unwrap_or(500))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(2000))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControllerConfig {
    pub enable_pin: Option<u8>,
    pub led_red_pin: Option<u8>,
    pub led_green_pin: Option<u8>,

    /// Dial encoder resolution.
    pub dial_counts_per_rev: Option<u32>,

    pub blink_ms: Option<u64>,
    pub loop_ms: Option<u64>,
}

impl ControllerConfig {
    pub fn enable_pin(&self) -> u8 {
        self.enable_pin.unwrap_or(4)
    }

    pub fn led_red_pin(&self) -> u8 {
        self.led_red_pin.unwrap_or(25)
    }

    pub fn led_green_pin(&self) -> u8 {
        self.led_green_pin.unwrap_or(26)
    }

    pub fn dial_counts_per_rev(&self) -> u32 {
        self.dial_counts_per_rev.unwrap_or(1024)
    }

    pub fn blink(&self) -> Duration {
        Duration::from_millis(self.blink_ms.unwrap_or(250))
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_ms.unwrap_or(10))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThrusterConfig {
    pub relay_pin: Option<u8>,

    /// Max shortest-arc error, in degrees, at which thrust is allowed.
    pub tolerance_deg: Option<f32>,

    /// Absolute azimuth encoder resolution.
    pub encoder_counts_per_rev: Option<u32>,
    /// Stepper steps per azimuth revolution, microstepping and gearing included.
    pub steps_per_rev: Option<u32>,

    pub loop_ms: Option<u64>,
}

impl ThrusterConfig {
    pub fn relay_pin(&self) -> u8 {
        self.relay_pin.unwrap_or(27)
    }

    pub fn tolerance_deg(&self) -> f32 {
        self.tolerance_deg.unwrap_or(3.6)
    }

    pub fn encoder_counts_per_rev(&self) -> u32 {
        self.encoder_counts_per_rev.unwrap_or(16384)
    }

    pub fn steps_per_rev(&self) -> u32 {
        self.steps_per_rev.unwrap_or(3200)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_ms.unwrap_or(10))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimConfig {
    /// Chance that any datagram is lost in the in-process link.
    pub drop_probability: Option<f64>,

    pub battery_start_pct: Option<f32>,
    pub drain_pct_per_min: Option<f32>,
    /// Chance that the simulated pack ignores a request.
    pub bms_fault_probability: Option<f64>,

    pub slew_deg_per_s: Option<f32>,

    // scripted operator
    pub enable_after_s: Option<f32>,
    pub dial_step_deg: Option<f32>,
    pub dial_dwell_s: Option<f32>,
}

impl SimConfig {
    pub fn drop_probability(&self) -> f64 {
        self.drop_probability.unwrap_or(0.05)
    }

    pub fn battery_start_pct(&self) -> f32 {
        self.battery_start_pct.unwrap_or(60.0)
    }

    pub fn drain_pct_per_min(&self) -> f32 {
        self.drain_pct_per_min.unwrap_or(2.0)
    }

    pub fn bms_fault_probability(&self) -> f64 {
        self.bms_fault_probability.unwrap_or(0.0)
    }

    pub fn slew_deg_per_s(&self) -> f32 {
        self.slew_deg_per_s.unwrap_or(90.0)
    }

    pub fn enable_after(&self) -> Duration {
        Duration::from_secs_f32(self.enable_after_s.unwrap_or(1.0).max(0.0))
    }

    pub fn dial_step_deg(&self) -> f32 {
        self.dial_step_deg.unwrap_or(45.0)
    }

    pub fn dial_dwell(&self) -> Duration {
        Duration::from_secs_f32(self.dial_dwell_s.unwrap_or(4.0).max(0.1))
    }
}
