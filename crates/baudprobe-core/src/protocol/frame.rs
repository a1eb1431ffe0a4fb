//! Frame encoding
//!
//! Encoding is a pure function of the frame fields. Decoding lives in the
//! stream parser, which has to cope with partial and corrupted input.

use byteorder::{ByteOrder, LittleEndian};

use super::checksum::crc16_ccitt_parts;
use super::{ProtocolError, StatsReport, CRC_SIZE, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};

/// Frame type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Test traffic carrying a sequence number
    Data = 0x01,
    /// Link probe / liveness ping
    Hello = 0x02,
    /// Reply to HELLO, payload is the responder's baud (u32)
    HelloAck = 0x03,
    /// Request to move both ends to a new baud (u32)
    SetBaud = 0x10,
    /// Acknowledges SETBAUD, echoing the requested baud (u32)
    SetBaudAck = 0x11,
    /// Request a statistics snapshot
    StatsReq = 0x20,
    /// Statistics snapshot, see [`StatsReport`](super::StatsReport)
    StatsRsp = 0x21,
}

impl FrameType {
    /// Map a wire code to a known frame type
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(FrameType::Data),
            0x02 => Some(FrameType::Hello),
            0x03 => Some(FrameType::HelloAck),
            0x10 => Some(FrameType::SetBaud),
            0x11 => Some(FrameType::SetBaudAck),
            0x20 => Some(FrameType::StatsReq),
            0x21 => Some(FrameType::StatsRsp),
            _ => None,
        }
    }

    /// Wire code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Name used in logs and errors
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Hello => "HELLO",
            FrameType::HelloAck => "HELLO_ACK",
            FrameType::SetBaud => "SETBAUD",
            FrameType::SetBaudAck => "SETBAUD_ACK",
            FrameType::StatsReq => "STATS_REQ",
            FrameType::StatsRsp => "STATS_RSP",
        }
    }
}

/// A protocol frame ready for transmission
///
/// Only constructible through checked constructors, so the payload always
/// fits the 16-bit length field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    frame_type: FrameType,
    sequence: u32,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a frame, rejecting payloads the length field cannot describe
    pub fn new(
        frame_type: FrameType,
        sequence: u32,
        payload: Vec<u8>,
    ) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            frame_type,
            sequence,
            payload,
        })
    }

    /// DATA frame carrying test traffic
    pub fn data(sequence: u32, payload: Vec<u8>) -> Result<Self, ProtocolError> {
        Self::new(FrameType::Data, sequence, payload)
    }

    /// HELLO probe
    pub fn hello() -> Self {
        Self {
            frame_type: FrameType::Hello,
            sequence: 0,
            payload: b"HELLO".to_vec(),
        }
    }

    /// HELLO_ACK carrying the responder's current baud
    pub fn hello_ack(baud: u32) -> Self {
        Self::control(FrameType::HelloAck, baud_payload(baud).to_vec())
    }

    /// SETBAUD requesting `baud`
    pub fn set_baud(baud: u32) -> Self {
        Self::control(FrameType::SetBaud, baud_payload(baud).to_vec())
    }

    /// SETBAUD_ACK echoing `baud`
    pub fn set_baud_ack(baud: u32) -> Self {
        Self::control(FrameType::SetBaudAck, baud_payload(baud).to_vec())
    }

    /// STATS_REQ
    pub fn stats_req() -> Self {
        Self::control(FrameType::StatsReq, Vec::new())
    }

    /// STATS_RSP carrying `report`
    pub fn stats_rsp(report: &StatsReport) -> Self {
        Self::control(FrameType::StatsRsp, report.to_payload())
    }

    fn control(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self {
            frame_type,
            sequence: 0,
            payload,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Sequence number (only meaningful for DATA)
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// CRC over version, type, sequence, length and payload
    pub fn crc(&self) -> u16 {
        frame_crc(
            PROTOCOL_VERSION,
            self.frame_type.code(),
            self.sequence,
            &self.payload,
        )
    }

    /// Encode the frame to raw bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&header_body(
            PROTOCOL_VERSION,
            self.frame_type.code(),
            self.sequence,
            payload_len(&self.payload),
        ));
        bytes.extend_from_slice(&self.payload);

        let mut crc_bytes = [0u8; CRC_SIZE];
        LittleEndian::write_u16(&mut crc_bytes, self.crc());
        bytes.extend_from_slice(&crc_bytes);

        bytes
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CRC_SIZE
    }
}

/// The CRC-covered header fields: version, type, sequence, length
fn header_body(version: u8, frame_type: u8, sequence: u32, length: u16) -> [u8; 8] {
    let mut body = [0u8; 8];
    body[0] = version;
    body[1] = frame_type;
    LittleEndian::write_u32(&mut body[2..6], sequence);
    LittleEndian::write_u16(&mut body[6..8], length);
    body
}

/// Length field value. Callers guarantee the payload fits, see [`Frame::new`].
fn payload_len(payload: &[u8]) -> u16 {
    debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);
    payload.len() as u16
}

/// Compute the frame CRC from its fields. Magic is not covered.
pub(crate) fn frame_crc(version: u8, frame_type: u8, sequence: u32, payload: &[u8]) -> u16 {
    let body = header_body(version, frame_type, sequence, payload_len(payload));
    crc16_ccitt_parts(&[&body, payload])
}

/// Encode a baud rate as a control payload
pub fn baud_payload(baud: u32) -> [u8; 4] {
    let mut bytes = [0u8; 4];
    LittleEndian::write_u32(&mut bytes, baud);
    bytes
}

/// Decode the baud rate carried in the first four payload bytes
pub fn read_baud_payload(frame: FrameType, payload: &[u8]) -> Result<u32, ProtocolError> {
    if payload.len() < 4 {
        return Err(ProtocolError::MalformedPayload {
            frame: frame.name(),
            expected: 4,
            actual: payload.len(),
        });
    }
    Ok(LittleEndian::read_u32(&payload[..4]))
}
