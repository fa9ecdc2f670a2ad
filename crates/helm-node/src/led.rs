use std::time::{Duration, Instant};

/// Controller status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    Off,
    Green,
    SolidRed,
    FlashingRed,
}

impl LedState {
    /// Priority: link lost, then low battery, then thrust active.
    pub fn select(connected: bool, low_battery: bool, thrust_active: bool) -> Self {
        if !connected {
            LedState::FlashingRed
        } else if low_battery {
            LedState::SolidRed
        } else if thrust_active {
            LedState::Green
        } else {
            LedState::Off
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedOutputs {
    pub red: bool,
    pub green: bool,
}

/// Turns the logical state into pin levels. Flashing red keeps toggling
/// every blink interval while the state stays the same.
#[derive(Debug, Clone)]
pub struct LedDriver {
    blink: Duration,
    state: Option<LedState>,
    red_on: bool,
    last_toggle: Option<Instant>,
}

impl LedDriver {
    pub fn new(blink: Duration) -> Self {
        Self { blink, state: None, red_on: false, last_toggle: None }
    }

    /// Returns new pin levels when something must be written.
    pub fn drive(&mut self, state: LedState, now: Instant) -> Option<LedOutputs> {
        if self.state != Some(state) {
            self.state = Some(state);
            self.last_toggle = Some(now);
            let out = match state {
                LedState::Off => LedOutputs { red: false, green: false },
                LedState::Green => LedOutputs { red: false, green: true },
                LedState::SolidRed | LedState::FlashingRed => LedOutputs { red: true, green: false },
            };
            self.red_on = out.red;
            return Some(out);
        }

        if state != LedState::FlashingRed {
            return None;
        }
        let due = match self.last_toggle {
            Some(t) => now.saturating_duration_since(t) >= self.blink,
            None => true,
        };
        if !due {
            return None;
        }
        self.red_on = !self.red_on;
        self.last_toggle = Some(now);
        Some(LedOutputs { red: self.red_on, green: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_priority() {
        for low in [false, true] {
            for active in [false, true] {
                assert_eq!(LedState::select(false, low, active), LedState::FlashingRed);
            }
        }
        assert_eq!(LedState::select(true, true, true), LedState::SolidRed);
        assert_eq!(LedState::select(true, true, false), LedState::SolidRed);
        assert_eq!(LedState::select(true, false, true), LedState::Green);
        assert_eq!(LedState::select(true, false, false), LedState::Off);
    }

    #[test]
    fn steady_states_write_once() {
        let t0 = Instant::now();
        let mut d = LedDriver::new(Duration::from_millis(250));
        assert_eq!(d.drive(LedState::Green, t0), Some(LedOutputs { red: false, green: true }));
        assert_eq!(d.drive(LedState::Green, t0 + Duration::from_secs(5)), None);
        assert_eq!(d.drive(LedState::SolidRed, t0 + Duration::from_secs(6)), Some(LedOutputs { red: true, green: false }));
        assert_eq!(d.drive(LedState::SolidRed, t0 + Duration::from_secs(9)), None);
    }

    #[test]
    fn flashing_red_toggles_while_state_is_unchanged() {
        let t0 = Instant::now();
        let ms = |n| t0 + Duration::from_millis(n);
        let mut d = LedDriver::new(Duration::from_millis(250));
        assert_eq!(d.drive(LedState::FlashingRed, t0).map(|o| o.red), Some(true));
        assert_eq!(d.drive(LedState::FlashingRed, ms(100)), None);
        assert_eq!(d.drive(LedState::FlashingRed, ms(250)).map(|o| o.red), Some(false));
        assert_eq!(d.drive(LedState::FlashingRed, ms(500)).map(|o| o.red), Some(true));
        assert_eq!(d.drive(LedState::FlashingRed, ms(760)).map(|o| o.red), Some(false));
    }
}
