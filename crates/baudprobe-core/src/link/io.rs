use std::time::{Duration, Instant};

use crate::protocol::{
    DecodedFrame, Frame, FrameType, ProtocolError, StreamParser, Transport, READ_CHUNK_SIZE,
};

/// A transport paired with the parser decoding its input
///
/// The single owner of both: the endpoint's control loop.
pub struct LinkIo<T: Transport> {
    transport: T,
    parser: StreamParser,
}

impl<T: Transport> LinkIo<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            parser: StreamParser::new(),
        }
    }

    /// Baud the transport is configured for
    pub fn baud(&self) -> u32 {
        self.transport.baud_rate()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Encode and write a frame
    pub fn send(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        tracing::trace!(
            frame = frame.frame_type().name(),
            seq = frame.sequence(),
            len = frame.payload().len(),
            "tx"
        );
        self.transport.send_frame(frame)
    }

    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.transport.flush()
    }

    /// Switch baud. Bytes buffered at the old rate, in the transport and in
    /// the parser, are discarded.
    pub fn retune(&mut self, baud: u32) -> Result<(), ProtocolError> {
        self.parser.clear();
        self.transport.set_baud_rate(baud)
    }

    /// Drop any partially parsed input
    pub fn reset_parser(&mut self) {
        self.parser.clear();
    }

    /// One bounded read into the parser; returns the number of bytes read
    pub fn fill(&mut self, timeout: Duration) -> Result<usize, ProtocolError> {
        let data = self.transport.read(READ_CHUNK_SIZE, timeout)?;
        self.parser.feed(&data);
        Ok(data.len())
    }

    /// Next buffered frame, if complete
    pub fn next_frame(&mut self) -> Option<DecodedFrame> {
        self.parser.try_take_frame()
    }

    /// Wait up to `timeout` for a CRC-valid frame of type `want`, returning
    /// its payload. Other frames are discarded. Transport errors count as a
    /// tick without data.
    pub fn wait_for(
        &mut self,
        want: FrameType,
        timeout: Duration,
        read_timeout: Duration,
    ) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(frame) = self.parser.try_take_frame() {
                if frame.is(want) {
                    return Some(frame.payload);
                }
                tracing::trace!(
                    frame_type = frame.frame_type,
                    crc_valid = frame.crc_valid,
                    "discarding frame while waiting for {}",
                    want.name()
                );
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let tick = read_timeout.min(deadline - now);
            if let Err(e) = self.fill(tick) {
                tracing::debug!("read failed while waiting for {}: {}", want.name(), e);
                std::thread::sleep(tick);
            }
        }
    }
}
