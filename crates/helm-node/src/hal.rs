//! Narrow primitives the node loops drive. Real drivers (encoder SPI,
//! stepper pulses, GPIO, radio) live behind these.

use std::time::Instant;

use anyhow::Result;
use helm_proto::{TransportError, WireMessage};
use tokio::sync::watch;
use tracing::debug;

pub trait PositionSensor {
    fn read_position_counts(&mut self) -> i32;
}

pub trait Actuator {
    /// Starts moving toward an absolute step position; tracking and the
    /// acceleration profile are the driver's business.
    fn move_actuator_to(&mut self, target_steps: i64);
}

pub trait Gpio {
    fn set_digital_output(&mut self, pin: u8, level: bool);
    fn read_digital_input(&mut self, pin: u8) -> bool;
}

/// Outgoing half of the datagram link to the single peer.
pub trait DatagramSink {
    fn send_datagram(&mut self, bytes: &[u8]) -> Result<()>;
}

/// A complete decoded datagram and when it arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inbound<M> {
    pub msg: M,
    pub received_at: Instant,
}

pub type InboundTx<M> = watch::Sender<Option<Inbound<M>>>;
pub type InboundRx<M> = watch::Receiver<Option<Inbound<M>>>;

pub fn inbound_channel<M>() -> (InboundTx<M>, InboundRx<M>) {
    watch::channel(None)
}

/// Receive handler: decode a raw datagram and swap the whole record in.
/// Undecodable datagrams are dropped and leave liveness untouched.
pub fn deliver<M: WireMessage>(bytes: &[u8], at: Instant, tx: &InboundTx<M>) -> Result<(), TransportError> {
    let msg = M::decode(bytes)?;
    tx.send_replace(Some(Inbound { msg, received_at: at }));
    Ok(())
}

/// Loop side: take the latest record if one arrived since the last call.
pub fn take_inbound<M: Copy>(rx: &mut InboundRx<M>) -> Option<Inbound<M>> {
    match rx.has_changed() {
        Ok(true) => *rx.borrow_and_update(),
        Ok(false) => None,
        Err(_) => {
            debug!("inbound channel closed");
            None
        }
    }
}

pub fn counts_to_degrees(counts: i32, counts_per_rev: u32) -> f32 {
    let cpr = counts_per_rev.max(1) as i64;
    (counts as i64).rem_euclid(cpr) as f32 * 360.0 / cpr as f32
}

pub fn degrees_to_steps(angle: f32, steps_per_rev: u32) -> i64 {
    (angle as f64 / 360.0 * steps_per_rev as f64).round() as i64
}
