//! Wire Protocol
//!
//! Implements the framed link-test protocol shared by both endpoints.
//!
//! Frame layout (all multi-byte integers little-endian):
//! - 2 bytes: magic marker `0x55 0xAA`
//! - 1 byte: protocol version
//! - 1 byte: frame type
//! - 4 bytes: sequence number
//! - 2 bytes: payload length
//! - N bytes: payload
//! - 2 bytes: CRC16-CCITT of version, type, sequence, length and payload

mod checksum;
mod error;
mod frame;
mod parser;
pub mod serial;
pub mod stats;
mod transport;

pub use checksum::crc16_ccitt;
pub use error::ProtocolError;
pub use frame::{baud_payload, read_baud_payload, Frame, FrameType};
pub use parser::{DecodedFrame, StreamParser};
pub use serial::{list_ports, PortInfo, PortKind, SerialTransport};
pub use stats::{loss_pct, SequenceStats, StatsCounters, StatsReport};
pub use transport::Transport;

/// Frame start marker
pub const MAGIC: [u8; 2] = [0x55, 0xAA];

/// The only protocol version this implementation speaks
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header size: magic, version, type, sequence, length
pub const HEADER_SIZE: usize = 2 + 1 + 1 + 4 + 2;

/// Trailing CRC field size
pub const CRC_SIZE: usize = 2;

/// Largest payload the length field can declare
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Maximum number of bytes requested from the transport per read
pub const READ_CHUNK_SIZE: usize = 4096;
