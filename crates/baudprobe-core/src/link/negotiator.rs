//! Baud discovery
//!
//! The master actively probes each candidate baud with HELLO frames; the
//! slave passively listens at each candidate for a bounded dwell and answers
//! the first valid HELLO it sees.

use std::time::{Duration, Instant};

use super::LinkIo;
use crate::config::Timing;
use crate::protocol::{read_baud_payload, Frame, FrameType, ProtocolError, Transport};

/// Master side: lock onto the slave, returning the baud it confirmed
///
/// Exhausting every candidate without a HELLO_ACK is fatal.
pub fn master_handshake<T: Transport>(
    io: &mut LinkIo<T>,
    candidates: &[u32],
    timing: &Timing,
) -> Result<u32, ProtocolError> {
    let hello = Frame::hello();

    for &baud in candidates {
        if let Err(e) = io.retune(baud) {
            tracing::warn!(baud, "cannot configure baud: {}", e);
            continue;
        }
        tracing::info!(baud, "trying HELLO");

        let dwell_end = Instant::now() + timing.hello_dwell();
        while Instant::now() < dwell_end {
            if let Err(e) = io.send(&hello) {
                tracing::debug!(baud, "HELLO write failed: {}", e);
            }
            std::thread::sleep(timing.hello_interval());

            let Some(payload) =
                io.wait_for(FrameType::HelloAck, timing.hello_ack_wait(), timing.master_read())
            else {
                continue;
            };
            match read_baud_payload(FrameType::HelloAck, &payload) {
                Ok(confirmed) => {
                    tracing::info!(baud = confirmed, "locked with slave");
                    return Ok(confirmed);
                }
                Err(e) => tracing::debug!("ignoring HELLO_ACK: {}", e),
            }
        }
    }

    Err(ProtocolError::HandshakeFailed(candidates.to_vec()))
}

/// Slave side: cycles through the candidate bauds until a HELLO arrives
///
/// Scanning is driven one bounded tick at a time so the caller's loop keeps
/// control; it never gives up on its own.
#[derive(Debug, Clone)]
pub struct SlaveScanner {
    candidates: Vec<u32>,
    dwell: Duration,
    next: usize,
    dwell_end: Option<Instant>,
}

impl SlaveScanner {
    pub fn new(candidates: Vec<u32>, dwell: Duration) -> Self {
        Self {
            candidates,
            dwell,
            next: 0,
            dwell_end: None,
        }
    }

    /// Start over from the first candidate on the next tick
    pub fn restart(&mut self) {
        self.next = 0;
        self.dwell_end = None;
    }

    /// Listen for one read period. Once a valid HELLO is seen it is answered
    /// with HELLO_ACK and the locked baud is returned; frames after it stay
    /// buffered for the locked loop.
    pub fn tick<T: Transport>(
        &mut self,
        io: &mut LinkIo<T>,
        read_timeout: Duration,
    ) -> Result<Option<u32>, ProtocolError> {
        if self.candidates.is_empty() {
            return Err(ProtocolError::InvalidConfig("baud list is empty".into()));
        }

        let now = Instant::now();
        if self.dwell_end.map_or(true, |end| now >= end) {
            let baud = self.candidates[self.next];
            self.next = (self.next + 1) % self.candidates.len();
            self.dwell_end = Some(now + self.dwell);
            tracing::debug!(baud, "scanning");
            io.retune(baud)?;
        }

        io.fill(read_timeout)?;
        while let Some(frame) = io.next_frame() {
            if !frame.is(FrameType::Hello) {
                continue;
            }
            let baud = io.baud();
            if let Err(e) = io.send(&Frame::hello_ack(baud)) {
                tracing::warn!("HELLO_ACK write failed: {}", e);
            }
            tracing::info!(baud, "locked");
            return Ok(Some(baud));
        }
        Ok(None)
    }
}
