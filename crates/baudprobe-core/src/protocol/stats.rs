//! Sequence and loss statistics
//!
//! Tracks DATA frame arrival against the expected sequence number and keeps
//! two counter sets: a window that is reset by every statistics request and a
//! total that lives as long as the locked session.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::{FrameType, ProtocolError};

/// Size of the STATS_RSP payload
pub const STATS_PAYLOAD_SIZE: usize = 48;

/// Loss percentage: `(missed + bad) * 100 / (ok + missed + bad)`, 0 when nothing was seen
pub fn loss_pct(ok: u64, missed: u64, bad: u64) -> f64 {
    let denom = ok + missed + bad;
    if denom == 0 {
        0.0
    } else {
        (missed + bad) as f64 * 100.0 / denom as f64
    }
}

/// Frame counters for one accounting period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsCounters {
    /// CRC-valid DATA frames received
    pub ok: u64,
    /// Sequence numbers skipped
    pub missed: u64,
    /// Frames failing CRC validation
    pub bad: u64,
    /// DATA frames arriving behind the expected sequence
    pub dup: u64,
    /// Payload bytes of CRC-valid DATA frames
    pub bytes: u64,
}

impl StatsCounters {
    /// Loss percentage of these counters
    pub fn loss_pct(&self) -> f64 {
        loss_pct(self.ok, self.missed, self.bad)
    }
}

/// Per-session sequence tracker
#[derive(Debug, Clone, Default)]
pub struct SequenceStats {
    expected: Option<u32>,
    window: StatsCounters,
    total: StatsCounters,
}

impl SequenceStats {
    /// Fresh tracker with no sequence baseline
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number expected, once a baseline exists
    pub fn expected_sequence(&self) -> Option<u32> {
        self.expected
    }

    /// Counters since the last statistics request
    pub fn window(&self) -> &StatsCounters {
        &self.window
    }

    /// Counters since the session locked
    pub fn total(&self) -> &StatsCounters {
        &self.total
    }

    /// Account a CRC-valid DATA frame
    pub fn on_data(&mut self, sequence: u32, payload_len: usize) {
        let mut missed = 0u64;
        let mut dup = 0u64;

        match self.expected {
            None => self.expected = Some(sequence.wrapping_add(1)),
            Some(expected) if sequence == expected => {
                self.expected = Some(sequence.wrapping_add(1));
            }
            Some(expected) if sequence > expected => {
                missed = u64::from(sequence - expected);
                self.expected = Some(sequence.wrapping_add(1));
            }
            Some(_) => dup = 1,
        }

        for counters in [&mut self.window, &mut self.total] {
            counters.ok += 1;
            counters.missed += missed;
            counters.dup += dup;
            counters.bytes += payload_len as u64;
        }
    }

    /// Account a frame that failed CRC validation
    pub fn on_bad(&mut self) {
        self.window.bad += 1;
        self.total.bad += 1;
    }

    /// Snapshot both counter sets and zero the window
    pub fn snapshot_and_reset_window(&mut self) -> StatsReport {
        let report = StatsReport::new(self.window, self.total);
        self.window = StatsCounters::default();
        report
    }

    /// Forget the baseline and all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Decoded statistics snapshot as carried by STATS_RSP
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Window counters
    pub window: StatsCounters,
    /// Window loss percentage
    pub window_loss: f32,
    /// Session counters; `bytes` is not transmitted and decodes as 0
    pub total: StatsCounters,
    /// Session loss percentage
    pub total_loss: f32,
}

impl StatsReport {
    /// Build a report, computing both loss percentages
    pub fn new(window: StatsCounters, total: StatsCounters) -> Self {
        Self {
            window_loss: window.loss_pct() as f32,
            window,
            total_loss: total.loss_pct() as f32,
            total,
        }
    }

    /// Encode as a STATS_RSP payload
    pub fn to_payload(&self) -> Vec<u8> {
        let w = &self.window;
        let t = &self.total;
        let words = [w.ok, w.missed, w.bad, w.dup, w.bytes];
        let totals = [t.ok, t.missed, t.bad, t.dup, 0];

        let mut buf = [0u8; STATS_PAYLOAD_SIZE];
        for (i, v) in words.iter().enumerate() {
            LittleEndian::write_u32(&mut buf[i * 4..], saturate(*v));
        }
        LittleEndian::write_f32(&mut buf[20..24], self.window_loss);
        for (i, v) in totals.iter().enumerate() {
            LittleEndian::write_u32(&mut buf[24 + i * 4..], saturate(*v));
        }
        LittleEndian::write_f32(&mut buf[44..48], self.total_loss);
        buf.to_vec()
    }

    /// Decode a STATS_RSP payload
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < STATS_PAYLOAD_SIZE {
            return Err(ProtocolError::MalformedPayload {
                frame: FrameType::StatsRsp.name(),
                expected: STATS_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }
        let word = |i: usize| u64::from(LittleEndian::read_u32(&payload[i * 4..]));

        Ok(Self {
            window: StatsCounters {
                ok: word(0),
                missed: word(1),
                bad: word(2),
                dup: word(3),
                bytes: word(4),
            },
            window_loss: LittleEndian::read_f32(&payload[20..24]),
            total: StatsCounters {
                ok: word(6),
                missed: word(7),
                bad: word(8),
                dup: word(9),
                bytes: 0,
            },
            total_loss: LittleEndian::read_f32(&payload[44..48]),
        })
    }
}

fn saturate(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}
