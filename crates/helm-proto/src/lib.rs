pub mod wire;

pub use wire::{CommandMessage, StatusMessage, TransportError, WireMessage};
