use thiserror::Error;

#[derive(Debug, Error)]
pub enum BmsError {
    #[error("no complete response within the response window")]
    Timeout,
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("response echoes command {got:#04x}, expected {expected:#04x}")]
    CommandMismatch { expected: u8, got: u8 },
    #[error("device reported status {0:#04x}")]
    DeviceError(u8),
    #[error("declared payload length {declared} but frame carries {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: computed {computed:#06x}, frame has {received:#06x}")]
    ChecksumMismatch { computed: u16, received: u16 },
    #[error("payload of {len} bytes too short, need {needed}")]
    PayloadTooShort { needed: usize, len: usize },
    #[error("uart i/o: {0}")]
    Io(#[from] std::io::Error),
}
