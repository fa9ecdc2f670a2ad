use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::Result;
use helm_bms::{BatteryMonitor, BatteryState};
use helm_proto::{CommandMessage, StatusMessage, WireMessage};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::hal::{
    counts_to_degrees, degrees_to_steps, take_inbound, Actuator, DatagramSink, Gpio, InboundRx, PositionSensor,
};
use crate::interlock::{normalize_degrees, relay_enabled, InterlockInputs, OutputLatch};
use crate::liveness::{LinkEvent, LinkTracker};
use crate::tx::{TxPolicy, TxReason};
use crate::{LinkConfig, ThrusterConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrusterSnapshot {
    pub connected: bool,
    pub interlock: InterlockInputs,
    pub relay_enabled: bool,
    pub status: StatusMessage,
    pub sent: Option<TxReason>,
}

pub struct ThrusterNode<G, E, A, L> {
    relay_pin: u8,
    tolerance_deg: f32,
    encoder_cpr: u32,
    steps_per_rev: u32,

    gpio: G,
    encoder: E,
    actuator: A,
    sink: L,
    inbound: InboundRx<CommandMessage>,

    tracker: LinkTracker,
    command: CommandMessage,
    relay: OutputLatch,
    battery: BatteryState,
    tx: TxPolicy<StatusMessage>,
}

impl<G, E, A, L> ThrusterNode<G, E, A, L>
where
    G: Gpio,
    E: PositionSensor,
    A: Actuator,
    L: DatagramSink,
{
    pub fn new(
        cfg: &ThrusterConfig,
        link: &LinkConfig,
        gpio: G,
        encoder: E,
        actuator: A,
        sink: L,
        inbound: InboundRx<CommandMessage>,
    ) -> Self {
        Self {
            relay_pin: cfg.relay_pin(),
            tolerance_deg: cfg.tolerance_deg(),
            encoder_cpr: cfg.encoder_counts_per_rev(),
            steps_per_rev: cfg.steps_per_rev(),
            gpio,
            encoder,
            actuator,
            sink,
            inbound,
            tracker: LinkTracker::new(link.timeout()),
            command: CommandMessage::default(),
            relay: OutputLatch::default(),
            battery: BatteryState::default(),
            tx: TxPolicy::new(link.heartbeat()),
        }
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn on_battery(&mut self, state: BatteryState) {
        self.battery = state;
    }

    fn apply_command(&mut self, cmd: CommandMessage) {
        let target = normalize_degrees(cmd.target_angle_degrees);
        let steps = degrees_to_steps(target, self.steps_per_rev);
        if cmd != self.command {
            debug!("thruster: command target={:.1} request={}", target, cmd.thrust_enabled_request);
        }
        self.actuator.move_actuator_to(steps);
        self.command = cmd;
    }

    /// One control cycle. The interlock is re-evaluated every time, with
    /// or without a new command.
    pub fn step(&mut self, now: Instant) -> ThrusterSnapshot {
        if let Some(rx) = take_inbound(&mut self.inbound) {
            self.tracker.on_receipt(rx.received_at);
            self.apply_command(rx.msg);
        }

        match self.tracker.update(now) {
            Some(LinkEvent::Established) => info!("thruster: controller link established"),
            Some(LinkEvent::Lost) => {
                warn!(
                    "thruster: controller link lost after {:?} of silence, dropping thrust request",
                    self.tracker.last_receipt_age(now).unwrap_or_default()
                );
                self.command.thrust_enabled_request = false;
            }
            None => {}
        }

        let inputs = InterlockInputs {
            commanded_angle: self.command.target_angle_degrees,
            actual_angle: counts_to_degrees(self.encoder.read_position_counts(), self.encoder_cpr),
            thrust_request: self.command.thrust_enabled_request,
            connected: self.tracker.is_connected(now),
        };
        let enabled = relay_enabled(&inputs, self.tolerance_deg);
        if let Some(level) = self.relay.update(enabled) {
            info!(
                "thruster: relay {} (connected={}, request={}, target={:.1}, actual={:.1})",
                if level { "ON" } else { "OFF" },
                inputs.connected,
                inputs.thrust_request,
                normalize_degrees(inputs.commanded_angle),
                inputs.actual_angle,
            );
            self.gpio.set_digital_output(self.relay_pin, level);
        }

        let status = StatusMessage { thrust_active_feedback: enabled, low_battery_feedback: self.battery.low };
        let sent = self.tx.decide(status, now);
        if let Some(reason) = sent {
            debug!("thruster: tx {:?} ({:?})", status, reason);
            if let Err(e) = self.sink.send_datagram(&status.encode()) {
                warn!("thruster: send failed: {:#}", e);
            }
        }

        ThrusterSnapshot { connected: inputs.connected, interlock: inputs, relay_enabled: enabled, status, sent }
    }

    /// De-energizes the relay regardless of the latch.
    pub fn shutdown(&mut self) {
        self.relay.update(false);
        self.gpio.set_digital_output(self.relay_pin, false);
        info!("thruster: stopped, relay OFF");
    }
}

pub async fn run_thruster<G, E, A, L, P, F>(
    mut node: ThrusterNode<G, E, A, L>,
    mut monitor: BatteryMonitor,
    mut bms_port: P,
    period: Duration,
    shutdown: F,
) -> Result<()>
where
    G: Gpio,
    E: PositionSensor,
    A: Actuator,
    L: DatagramSink,
    P: AsyncRead + AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    info!("thruster: running, cycle {:?}", period);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        if monitor.is_due(now) {
            let battery = monitor.poll(&mut bms_port, now).await;
            debug!("thruster: battery {:?}", battery);
            node.on_battery(battery);
        }
        node.step(Instant::now());
    }

    node.shutdown();
    Ok(())
}
