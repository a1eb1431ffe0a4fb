use std::time::Duration;

use super::{Frame, ProtocolError};

/// Byte transport between the two endpoints (serial port or simulated link)
///
/// Every call returns within a bounded time: `read` gives up after its
/// timeout with an empty buffer instead of blocking.
pub trait Transport {
    /// Baud rate currently configured
    fn baud_rate(&self) -> u32;

    /// Reconfigure the baud rate, discarding buffered input and output
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), ProtocolError>;

    /// Read up to `max_bytes`, waiting at most `timeout` for the first byte
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, ProtocolError>;

    /// Write all bytes
    fn write_all(&mut self, data: &[u8]) -> Result<(), ProtocolError>;

    /// Wait until written bytes have left the local buffers
    fn flush(&mut self) -> Result<(), ProtocolError>;

    /// Encode and write a frame
    fn send_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        self.write_all(&frame.to_bytes())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), ProtocolError> {
        (**self).set_baud_rate(baud)
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
        (**self).read(max_bytes, timeout)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        (**self).write_all(data)
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        (**self).flush()
    }
}
