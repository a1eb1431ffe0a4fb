//! Resynchronizing stream parser
//!
//! Accumulates bytes from the transport and extracts frames one at a time.
//! Malformed input never produces an error: truncated frames wait for more
//! bytes, noise is skipped, and structurally complete frames with a bad CRC
//! are returned flagged so the caller can count them.

use byteorder::{ByteOrder, LittleEndian};

use super::frame::frame_crc;
use super::{FrameType, CRC_SIZE, HEADER_SIZE, MAGIC, PROTOCOL_VERSION};

/// A frame extracted from the byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Raw type code (may be unknown to this implementation)
    pub frame_type: u8,
    /// Sequence number
    pub sequence: u32,
    /// Payload bytes
    pub payload: Vec<u8>,
    /// Whether the received CRC matched the recomputed one
    pub crc_valid: bool,
}

impl DecodedFrame {
    /// Known frame type, if the code is recognized
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }

    /// True for a CRC-valid frame of type `ty`
    pub fn is(&self, ty: FrameType) -> bool {
        self.crc_valid && self.frame_type == ty.code()
    }
}

/// Incremental frame extractor owning its byte buffer
#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
}

impl StreamParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the transport
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Extract the next frame, or `None` if more bytes are needed
    pub fn try_take_frame(&mut self) -> Option<DecodedFrame> {
        loop {
            if self.buffer.len() < MAGIC.len() {
                return None;
            }

            match find_magic(&self.buffer) {
                None => {
                    // A trailing first marker byte may still start a frame.
                    let keep = usize::from(self.buffer.last() == Some(&MAGIC[0]));
                    let cut = self.buffer.len() - keep;
                    self.buffer.drain(..cut);
                    return None;
                }
                Some(0) => {}
                Some(offset) => {
                    self.buffer.drain(..offset);
                }
            }

            if self.buffer.len() < HEADER_SIZE {
                return None;
            }

            let version = self.buffer[2];
            if version != PROTOCOL_VERSION {
                // Skip only the marker: a real frame may start inside this header.
                self.buffer.drain(..MAGIC.len());
                continue;
            }

            let frame_type = self.buffer[3];
            let sequence = LittleEndian::read_u32(&self.buffer[4..8]);
            let length = LittleEndian::read_u16(&self.buffer[8..10]) as usize;
            let total = HEADER_SIZE + length + CRC_SIZE;
            if self.buffer.len() < total {
                return None;
            }

            let payload = self.buffer[HEADER_SIZE..HEADER_SIZE + length].to_vec();
            let received_crc = LittleEndian::read_u16(&self.buffer[HEADER_SIZE + length..total]);
            let expected_crc = frame_crc(version, frame_type, sequence, &payload);
            self.buffer.drain(..total);

            return Some(DecodedFrame {
                frame_type,
                sequence,
                payload,
                crc_valid: received_crc == expected_crc,
            });
        }
    }

    /// Extract every complete frame currently buffered
    pub fn drain_frames(&mut self) -> Vec<DecodedFrame> {
        std::iter::from_fn(|| self.try_take_frame()).collect()
    }
}

fn find_magic(buf: &[u8]) -> Option<usize> {
    buf.windows(MAGIC.len()).position(|w| w == MAGIC)
}
