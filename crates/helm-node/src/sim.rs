//! Stand-ins for the hardware collaborators, used by `helm sim` and when a
//! node runs on a bench host without its peripherals.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use helm_bms::frame::{self, BasicInfo};
use helm_proto::WireMessage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hal::{deliver, Actuator, DatagramSink, Gpio, InboundTx, PositionSensor};
use crate::SimConfig;

const PINS: usize = 64;

/// Clamps a configured probability into `[0, 1]`; NaN counts as never.
fn probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

#[derive(Debug)]
struct StepperState {
    position_steps: f64,
    target_steps: i64,
    slew_steps_per_s: f64,
    last_update: Instant,
}

/// Stepper with an absolute encoder on the same shaft. Clones share one
/// motor, so one handle can be the actuator and another the sensor.
#[derive(Debug, Clone)]
pub struct SimStepper {
    inner: Arc<Mutex<StepperState>>,
    steps_per_rev: u32,
    encoder_cpr: u32,
}

impl SimStepper {
    pub fn new(steps_per_rev: u32, encoder_cpr: u32, slew_deg_per_s: f32) -> Self {
        let state = StepperState {
            position_steps: 0.0,
            target_steps: 0,
            slew_steps_per_s: slew_deg_per_s as f64 / 360.0 * steps_per_rev as f64,
            last_update: Instant::now(),
        };
        Self { inner: Arc::new(Mutex::new(state)), steps_per_rev, encoder_cpr }
    }

    fn advance(st: &mut StepperState, now: Instant) {
        let dt = now.saturating_duration_since(st.last_update).as_secs_f64();
        st.last_update = now;
        let error = st.target_steps as f64 - st.position_steps;
        let max = st.slew_steps_per_s * dt;
        st.position_steps += error.clamp(-max, max);
    }

    pub fn position_steps(&self) -> f64 {
        let mut st = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Self::advance(&mut st, Instant::now());
        st.position_steps
    }
}

impl Actuator for SimStepper {
    fn move_actuator_to(&mut self, target_steps: i64) {
        let mut st = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Self::advance(&mut st, Instant::now());
        st.target_steps = target_steps;
    }
}

impl PositionSensor for SimStepper {
    fn read_position_counts(&mut self) -> i32 {
        let steps = self.position_steps();
        let counts = steps / self.steps_per_rev.max(1) as f64 * self.encoder_cpr as f64;
        counts.round() as i64 as i32
    }
}

/// Pin bank. Outputs are logged on change; inputs can be forced by a script.
#[derive(Debug, Clone)]
pub struct SimGpio {
    name: &'static str,
    pins: Arc<Mutex<[bool; PINS]>>,
}

impl SimGpio {
    pub fn new(name: &'static str) -> Self {
        Self { name, pins: Arc::new(Mutex::new([false; PINS])) }
    }

    pub fn level(&self, pin: u8) -> bool {
        let pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        pins.get(pin as usize).copied().unwrap_or(false)
    }

    pub fn force_input(&self, pin: u8, level: bool) {
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(p) = pins.get_mut(pin as usize) {
            *p = level;
        }
    }
}

impl Gpio for SimGpio {
    fn set_digital_output(&mut self, pin: u8, level: bool) {
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        match pins.get_mut(pin as usize) {
            Some(p) if *p != level => {
                *p = level;
                debug!("{}: pin {} -> {}", self.name, pin, level);
            }
            Some(_) => {}
            None => warn!("{}: no pin {}", self.name, pin),
        }
    }

    fn read_digital_input(&mut self, pin: u8) -> bool {
        self.level(pin)
    }
}

/// Operator at the controller: flips the enable switch after a delay and
/// turns the dial one step every dwell period.
#[derive(Debug, Clone)]
pub struct ScriptedOperator {
    start: Instant,
    enable_pin: u8,
    enable_after: Duration,
    step_deg: f32,
    dwell: Duration,
    counts_per_rev: u32,
    panel: SimGpio,
}

impl ScriptedOperator {
    pub fn new(cfg: &SimConfig, enable_pin: u8, counts_per_rev: u32, panel: SimGpio) -> Self {
        Self {
            start: Instant::now(),
            enable_pin,
            enable_after: cfg.enable_after(),
            step_deg: cfg.dial_step_deg(),
            dwell: cfg.dial_dwell(),
            counts_per_rev,
            panel,
        }
    }

    pub fn dial_degrees_at(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.start);
        let steps = (elapsed.as_secs_f64() / self.dwell.as_secs_f64()).floor() as f32;
        steps * self.step_deg
    }

    fn update_switch(&self, now: Instant) {
        let on = now.saturating_duration_since(self.start) >= self.enable_after;
        self.panel.force_input(self.enable_pin, on);
    }
}

impl PositionSensor for ScriptedOperator {
    fn read_position_counts(&mut self) -> i32 {
        let now = Instant::now();
        self.update_switch(now);
        let counts = self.dial_degrees_at(now) as f64 / 360.0 * self.counts_per_rev as f64;
        counts.round() as i64 as i32
    }
}

#[derive(Debug)]
struct Pack {
    start: Instant,
    start_pct: f32,
    drain_per_min: f32,
}

impl Pack {
    fn rsoc(&self) -> u8 {
        let minutes = self.start.elapsed().as_secs_f32() / 60.0;
        (self.start_pct - self.drain_per_min * minutes).clamp(0.0, 100.0).round() as u8
    }

    fn basic_info_payload(&self) -> Vec<u8> {
        let rsoc = self.rsoc();
        let mut p = vec![0u8; 23];
        // 13S pack, roughly linear between 39 V and 54.6 V
        let centivolts = (3900.0 + 15.6 * rsoc as f32).round() as u16;
        p[0..2].copy_from_slice(&centivolts.to_be_bytes());
        p[2..4].copy_from_slice(&(-1200i16).to_be_bytes());
        p[BasicInfo::RSOC_OFFSET] = rsoc;
        p
    }
}

/// Battery pack answering basic info requests on the returned UART end.
pub fn spawn_sim_bms(cfg: &SimConfig) -> (DuplexStream, JoinHandle<Result<()>>) {
    let (host, dev) = tokio::io::duplex(256);
    let pack = Pack { start: Instant::now(), start_pct: cfg.battery_start_pct(), drain_per_min: cfg.drain_pct_per_min() };
    let fault_p = probability(cfg.bms_fault_probability());
    (host, tokio::spawn(serve_pack(dev, pack, fault_p)))
}

async fn serve_pack(mut dev: DuplexStream, pack: Pack, fault_p: f64) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    let mut req = [0u8; frame::REQUEST_LEN];
    loop {
        if dev.read_exact(&mut req).await.is_err() {
            // host end dropped
            return Ok(());
        }
        let reply = match frame::decode_request(&req) {
            Ok(frame::CMD_BASIC_INFO) => {
                if rng.gen_bool(fault_p) {
                    debug!("sim bms: ignoring request");
                    continue;
                }
                frame::encode_response(frame::CMD_BASIC_INFO, frame::STATUS_OK, &pack.basic_info_payload())
            }
            Ok(other) => frame::encode_response(other, 0x80, &[]),
            Err(e) => {
                warn!("sim bms: bad request: {}", e);
                continue;
            }
        };
        dev.write_all(&reply).await.context("sim bms write")?;
    }
}

/// Sending half of the in-process link; drops datagrams at random.
pub struct LossyLink {
    tx: mpsc::UnboundedSender<Bytes>,
    drop_probability: f64,
    rng: StdRng,
    dropped: u64,
}

impl LossyLink {
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Drop for LossyLink {
    fn drop(&mut self) {
        info!("sim link: closed, {} datagrams dropped", self.dropped());
    }
}

impl DatagramSink for LossyLink {
    fn send_datagram(&mut self, bytes: &[u8]) -> Result<()> {
        if self.rng.gen_bool(self.drop_probability) {
            self.dropped += 1;
            return Ok(());
        }
        self.tx
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| anyhow::anyhow!("peer receive context gone"))
    }
}

pub fn lossy_link(drop_probability: f64) -> (LossyLink, mpsc::UnboundedReceiver<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let link = LossyLink { tx, drop_probability: probability(drop_probability), rng: StdRng::from_entropy(), dropped: 0 };
    (link, rx)
}

/// Receive context for the in-process link.
pub fn spawn_lossy_receiver<M>(mut rx: mpsc::UnboundedReceiver<Bytes>, tx: InboundTx<M>) -> JoinHandle<()>
where
    M: WireMessage + Send + Sync + 'static,
{
    tokio::spawn(async move {
        while let Some(datagram) = rx.recv().await {
            if let Err(e) = deliver::<M>(&datagram, Instant::now(), &tx) {
                warn!("sim link: dropped datagram: {}", e);
            }
        }
        info!("sim link: sender closed");
    })
}
