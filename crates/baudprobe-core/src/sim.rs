//! Simulated link
//!
//! An in-memory cable between two [`SimPort`] endpoints. Bytes are only
//! understood by the receiver if both ends use the same baud at the time they
//! are read; otherwise they arrive as line noise. Optional fault injection
//! models a link that degrades above a given baud.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::protocol::{ProtocolError, Transport};

/// Fault injection settings, applied by the sending end
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimFaults {
    /// Probability that a whole write is lost
    pub drop_rate: f64,
    /// Probability that any single byte is corrupted
    pub corrupt_rate: f64,
    /// Faults only apply above this baud
    pub clean_up_to: u32,
    /// Seed for the fault generator
    pub seed: u64,
}

impl Default for SimFaults {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            corrupt_rate: 0.0,
            clean_up_to: u32::MAX,
            seed: 0,
        }
    }
}

/// Bytes written in one call, tagged with the sender's baud
struct Chunk {
    baud: u32,
    data: Vec<u8>,
}

#[derive(Default)]
struct Wire {
    /// Inbound queue of each side
    inbound: [VecDeque<Chunk>; 2],
}

#[derive(Default)]
struct Shared {
    wire: Mutex<Wire>,
    ready: Condvar,
}

impl Shared {
    fn wire(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Constructor for connected [`SimPort`] pairs
pub struct SimLink;

impl SimLink {
    /// Two fault-free endpoints starting at `baud`
    pub fn pair(baud: u32) -> (SimPort, SimPort) {
        Self::pair_with_faults(baud, SimFaults::default())
    }

    /// Two endpoints sharing the same fault settings
    pub fn pair_with_faults(baud: u32, faults: SimFaults) -> (SimPort, SimPort) {
        let shared = Arc::new(Shared::default());
        let port = |side: usize| SimPort {
            shared: Arc::clone(&shared),
            side,
            baud,
            faults,
            rng: StdRng::seed_from_u64(faults.seed.wrapping_add(side as u64)),
            tx_bytes: 0,
        };
        (port(0), port(1))
    }
}

/// One end of a [`SimLink`]
pub struct SimPort {
    shared: Arc<Shared>,
    side: usize,
    baud: u32,
    faults: SimFaults,
    rng: StdRng,
    tx_bytes: u64,
}

impl SimPort {
    /// Bytes written so far, before fault injection
    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes
    }

    fn faulty(&self) -> bool {
        self.baud > self.faults.clean_up_to
    }

    fn noise(&mut self, len: usize) -> Vec<u8> {
        // A receiver at the wrong rate sees fewer, meaningless characters.
        (0..len.div_ceil(2)).map(|_| self.rng.gen()).collect()
    }
}

impl Transport for SimPort {
    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), ProtocolError> {
        self.shared.wire().inbound[self.side].clear();
        self.baud = baud;
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
        let side = self.side;
        let mut chunks = Vec::new();
        {
            let wire = self.shared.wire();
            let (mut wire, _) = self
                .shared
                .ready
                .wait_timeout_while(wire, timeout, |w| w.inbound[side].is_empty())
                .unwrap_or_else(PoisonError::into_inner);

            let mut taken = 0;
            while taken < max_bytes {
                let Some(mut chunk) = wire.inbound[side].pop_front() else {
                    break;
                };
                let room = max_bytes - taken;
                if chunk.data.len() > room {
                    let rest = chunk.data.split_off(room);
                    wire.inbound[side].push_front(Chunk {
                        baud: chunk.baud,
                        data: rest,
                    });
                }
                taken += chunk.data.len();
                chunks.push(chunk);
            }
        }

        let mut out = Vec::new();
        for chunk in chunks {
            if chunk.baud == self.baud {
                out.extend_from_slice(&chunk.data);
            } else {
                let noise = self.noise(chunk.data.len());
                out.extend_from_slice(&noise);
            }
        }
        Ok(out)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.tx_bytes += data.len() as u64;

        let mut data = data.to_vec();
        if self.faulty() {
            if self.rng.gen_bool(self.faults.drop_rate.clamp(0.0, 1.0)) {
                return Ok(());
            }
            let corrupt_rate = self.faults.corrupt_rate.clamp(0.0, 1.0);
            for byte in data.iter_mut() {
                if self.rng.gen_bool(corrupt_rate) {
                    *byte ^= self.rng.gen_range(1..=255u8);
                }
            }
        }

        let peer = 1 - self.side;
        self.shared.wire().inbound[peer].push_back(Chunk {
            baud: self.baud,
            data,
        });
        self.shared.ready.notify_all();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }
}
