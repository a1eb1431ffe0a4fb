//! Protocol errors

use thiserror::Error;

/// Errors that can occur during link testing
///
/// Ordinary protocol irregularities (bad CRC, desync, duplicates, failed
/// rate switches) are not errors; they are counted or skipped.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Handshake failed: no HELLO_ACK at any of {0:?}")]
    HandshakeFailed(Vec<u32>),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Malformed {frame} payload: expected at least {expected} bytes, got {actual}")]
    MalformedPayload {
        frame: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(e.description),
            _ => ProtocolError::SerialError(e.to_string()),
        }
    }
}
