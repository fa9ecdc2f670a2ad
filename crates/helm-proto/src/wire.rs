use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Datagram payload exchanged between the two nodes.
///
/// Layouts are fixed-width with no length prefix or version tag, so both
/// ends must agree on `SIZE` exactly.
pub trait WireMessage: Sized + Copy + PartialEq + std::fmt::Debug {
    const SIZE: usize;

    fn encode(&self) -> Bytes;
    fn decode(buf: &[u8]) -> Result<Self, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("datagram size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("command angle is not a finite number")]
    NonFiniteAngle,
}

/// Controller -> Thruster.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandMessage {
    /// Unbounded, interpreted modulo 360.
    pub target_angle_degrees: f32,
    pub thrust_enabled_request: bool,
}

/// Thruster -> Controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusMessage {
    pub thrust_active_feedback: bool,
    pub low_battery_feedback: bool,
}

fn check_size(buf: &[u8], expected: usize) -> Result<(), TransportError> {
    if buf.len() != expected {
        return Err(TransportError::SizeMismatch { expected, actual: buf.len() });
    }
    Ok(())
}

// f32 LE angle, then one flag byte
impl WireMessage for CommandMessage {
    const SIZE: usize = 5;

    fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(Self::SIZE);
        out.put_f32_le(self.target_angle_degrees);
        out.put_u8(self.thrust_enabled_request as u8);
        out.freeze()
    }

    fn decode(mut buf: &[u8]) -> Result<Self, TransportError> {
        check_size(buf, Self::SIZE)?;
        let target_angle_degrees = buf.get_f32_le();
        if !target_angle_degrees.is_finite() {
            return Err(TransportError::NonFiniteAngle);
        }
        let thrust_enabled_request = buf.get_u8() != 0;
        Ok(Self { target_angle_degrees, thrust_enabled_request })
    }
}

impl WireMessage for StatusMessage {
    const SIZE: usize = 2;

    fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(Self::SIZE);
        out.put_u8(self.thrust_active_feedback as u8);
        out.put_u8(self.low_battery_feedback as u8);
        out.freeze()
    }

    fn decode(mut buf: &[u8]) -> Result<Self, TransportError> {
        check_size(buf, Self::SIZE)?;
        Ok(Self {
            thrust_active_feedback: buf.get_u8() != 0,
            low_battery_feedback: buf.get_u8() != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_layout_is_little_endian_angle_then_flag() {
        let cmd = CommandMessage { target_angle_degrees: 90.0, thrust_enabled_request: true };
        let bytes = cmd.encode();
        assert_eq!(bytes.len(), CommandMessage::SIZE);
        assert_eq!(&bytes[..4], &90.0f32.to_le_bytes());
        assert_eq!(bytes[4], 1);
        assert_eq!(CommandMessage::decode(&bytes).unwrap(), cmd);
    }

    #[test]
    fn status_layout_is_two_flag_bytes() {
        let st = StatusMessage { thrust_active_feedback: false, low_battery_feedback: true };
        assert_eq!(&st.encode()[..], &[0, 1]);
        assert_eq!(StatusMessage::decode(&[1, 0]).unwrap().thrust_active_feedback, true);
    }

    #[test]
    fn any_nonzero_flag_byte_reads_as_true() {
        let mut raw = 12.5f32.to_le_bytes().to_vec();
        raw.push(0x7f);
        assert!(CommandMessage::decode(&raw).unwrap().thrust_enabled_request);
    }

    #[test]
    fn wrong_length_is_size_mismatch() {
        assert_eq!(
            CommandMessage::decode(&[0u8; 8]),
            Err(TransportError::SizeMismatch { expected: 5, actual: 8 })
        );
        assert_eq!(
            StatusMessage::decode(&[1]),
            Err(TransportError::SizeMismatch { expected: 2, actual: 1 })
        );
    }

    #[test]
    fn nan_angle_is_rejected() {
        let mut raw = f32::NAN.to_le_bytes().to_vec();
        raw.push(1);
        assert_eq!(CommandMessage::decode(&raw), Err(TransportError::NonFiniteAngle));
    }
}
