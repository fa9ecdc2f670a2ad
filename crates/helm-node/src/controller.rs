use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::Result;
use helm_proto::{CommandMessage, StatusMessage, WireMessage};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::hal::{counts_to_degrees, take_inbound, DatagramSink, Gpio, InboundRx, PositionSensor};
use crate::led::{LedDriver, LedState};
use crate::liveness::{LinkEvent, LinkTracker};
use crate::tx::{TxPolicy, TxReason};
use crate::{ControllerConfig, LinkConfig};

/// Raw operator inputs. Change detection runs on counts, not degrees,
/// so float rounding cannot cause spurious sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OperatorSample {
    dial_counts: i32,
    enable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSnapshot {
    pub connected: bool,
    pub led: LedState,
    pub feedback: StatusMessage,
    pub command: CommandMessage,
    pub sent: Option<TxReason>,
}

pub struct ControllerNode<G, S, L> {
    enable_pin: u8,
    red_pin: u8,
    green_pin: u8,
    dial_cpr: u32,

    panel: G,
    dial: S,
    sink: L,
    inbound: InboundRx<StatusMessage>,

    tracker: LinkTracker,
    feedback: StatusMessage,
    tx: TxPolicy<OperatorSample>,
    led: LedDriver,
}

impl<G, S, L> ControllerNode<G, S, L>
where
    G: Gpio,
    S: PositionSensor,
    L: DatagramSink,
{
    pub fn new(
        cfg: &ControllerConfig,
        link: &LinkConfig,
        panel: G,
        dial: S,
        sink: L,
        inbound: InboundRx<StatusMessage>,
    ) -> Self {
        Self {
            enable_pin: cfg.enable_pin(),
            red_pin: cfg.led_red_pin(),
            green_pin: cfg.led_green_pin(),
            dial_cpr: cfg.dial_counts_per_rev(),
            panel,
            dial,
            sink,
            inbound,
            tracker: LinkTracker::new(link.timeout()),
            feedback: StatusMessage::default(),
            tx: TxPolicy::new(link.heartbeat()),
            led: LedDriver::new(cfg.blink()),
        }
    }

    /// One control cycle.
    pub fn step(&mut self, now: Instant) -> ControllerSnapshot {
        if let Some(rx) = take_inbound(&mut self.inbound) {
            self.tracker.on_receipt(rx.received_at);
            self.feedback = rx.msg;
        }

        match self.tracker.update(now) {
            Some(LinkEvent::Established) => info!("controller: thruster link established"),
            Some(LinkEvent::Lost) => {
                warn!(
                    "controller: thruster link lost after {:?} of silence, clearing feedback",
                    self.tracker.last_receipt_age(now).unwrap_or_default()
                );
                self.feedback = StatusMessage::default();
            }
            None => {}
        }
        let connected = self.tracker.is_connected(now);

        let sample = OperatorSample {
            dial_counts: self.dial.read_position_counts(),
            enable: self.panel.read_digital_input(self.enable_pin),
        };
        let command = CommandMessage {
            target_angle_degrees: counts_to_degrees(sample.dial_counts, self.dial_cpr),
            thrust_enabled_request: sample.enable,
        };
        let sent = self.tx.decide(sample, now);
        if let Some(reason) = sent {
            debug!("controller: tx {:?} ({:?})", command, reason);
            if let Err(e) = self.sink.send_datagram(&command.encode()) {
                warn!("controller: send failed: {:#}", e);
            }
        }

        let led = LedState::select(connected, self.feedback.low_battery_feedback, self.feedback.thrust_active_feedback);
        if let Some(out) = self.led.drive(led, now) {
            self.panel.set_digital_output(self.red_pin, out.red);
            self.panel.set_digital_output(self.green_pin, out.green);
        }

        ControllerSnapshot { connected, led, feedback: self.feedback, command, sent }
    }

    /// Tells the thruster to drop thrust and darkens the panel.
    pub fn shutdown(&mut self) {
        let last = CommandMessage {
            target_angle_degrees: counts_to_degrees(self.dial.read_position_counts(), self.dial_cpr),
            thrust_enabled_request: false,
        };
        if let Err(e) = self.sink.send_datagram(&last.encode()) {
            warn!("controller: final send failed: {:#}", e);
        }
        self.panel.set_digital_output(self.red_pin, false);
        self.panel.set_digital_output(self.green_pin, false);
        info!("controller: stopped");
    }
}

pub async fn run_controller<G, S, L, F>(
    mut node: ControllerNode<G, S, L>,
    period: Duration,
    shutdown: F,
) -> Result<()>
where
    G: Gpio,
    S: PositionSensor,
    L: DatagramSink,
    F: Future<Output = ()>,
{
    info!("controller: running, cycle {:?}", period);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut last_led = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        let snap = node.step(Instant::now());
        if last_led != Some(snap.led) {
            info!("controller: led {:?} (connected={}, feedback={:?})", snap.led, snap.connected, snap.feedback);
            last_led = Some(snap.led);
        }
    }

    node.shutdown();
    Ok(())
}
