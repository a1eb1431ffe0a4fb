//! Master orchestrator
//!
//! Drives a full test: handshake, then for every candidate baud a rate
//! switch, a paced burst of DATA frames and a statistics request. The last
//! candidate in list order whose loss is within the threshold wins.

use chrono::Utc;
use std::time::Instant;

use crate::config::MasterConfig;
use crate::link::{master_handshake, request_switch, LinkIo, SwitchFailure};
use crate::protocol::{Frame, FrameType, ProtocolError, StatsReport, Transport};
use crate::report::{BaudCandidateResult, CandidateOutcome, CandidateReport, TestReport};

/// Test driver owning one transport
pub struct MasterOrchestrator<T: Transport> {
    io: LinkIo<T>,
    config: MasterConfig,
    /// Shared by every candidate of the run
    sequence: u32,
}

impl<T: Transport> MasterOrchestrator<T> {
    /// Create an orchestrator, validating the configuration
    pub fn new(transport: T, config: MasterConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        Ok(Self {
            io: LinkIo::new(transport),
            config,
            sequence: 0,
        })
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Sequence number the next DATA frame will carry
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    pub fn into_transport(self) -> T {
        self.io.into_inner()
    }

    /// Lock onto the slave. Fatal if no candidate answers.
    pub fn handshake(&mut self) -> Result<u32, ProtocolError> {
        master_handshake(&mut self.io, &self.config.baud_list, &self.config.timing)
    }

    /// Move both ends to `baud`
    pub fn switch_to(&mut self, baud: u32) -> Result<(), SwitchFailure> {
        request_switch(&mut self.io, baud, &self.config.timing)
    }

    /// Send the DATA burst at the current baud and collect the slave's statistics
    pub fn measure(&mut self) -> CandidateOutcome {
        let timing = self.config.timing.clone();
        let payload: Vec<u8> = (0..self.config.payload_bytes)
            .map(|i| (i & 0xFF) as u8)
            .collect();

        let batches = timing.batches;
        let per_batch = self.config.num_packets / batches;
        let remainder = self.config.num_packets % batches;
        let mut tx_frames = 0u32;

        for batch in 0..batches {
            let count = per_batch + u32::from(batch < remainder);
            for _ in 0..count {
                let sequence = self.sequence;
                self.sequence = self.sequence.wrapping_add(1);
                let sent = Frame::data(sequence, payload.clone())
                    .and_then(|frame| self.io.send(&frame));
                match sent {
                    Ok(()) => tx_frames += 1,
                    Err(e) => tracing::warn!(seq = sequence, "DATA write failed: {}", e),
                }
            }
            std::thread::sleep(timing.batch_pause());
        }
        std::thread::sleep(timing.drain());

        if let Err(e) = self.io.send(&Frame::stats_req()) {
            tracing::warn!("STATS_REQ write failed: {}", e);
        }
        let stats = self
            .io
            .wait_for(FrameType::StatsRsp, timing.stats_wait(), timing.master_read())
            .and_then(|payload| match StatsReport::from_payload(&payload) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    tracing::warn!("ignoring STATS_RSP: {}", e);
                    None
                }
            });

        match stats {
            Some(stats) => CandidateOutcome::Measured { tx_frames, stats },
            None => CandidateOutcome::StatsTimeout { tx_frames },
        }
    }

    /// Switch to and measure one candidate
    pub fn test_candidate(&mut self, baud: u32) -> CandidateReport {
        tracing::info!(baud, "=== testing ===");
        let started = Instant::now();

        let outcome = match self.switch_to(baud) {
            Err(failure) => {
                tracing::warn!(baud, "switch failed: {}", failure);
                CandidateOutcome::SwitchFailed {
                    reason: failure.to_string(),
                }
            }
            Ok(()) => self.measure(),
        };

        match &outcome {
            CandidateOutcome::Measured { tx_frames, stats } => tracing::info!(
                baud,
                tx_frames,
                rx_ok = stats.total.ok,
                missed = stats.total.missed,
                bad = stats.total.bad,
                dup = stats.total.dup,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "loss_rate={:.3}%",
                stats.total_loss
            ),
            CandidateOutcome::StatsTimeout { tx_frames } => tracing::warn!(
                baud,
                tx_frames,
                "stats timeout, counting as 100% loss"
            ),
            CandidateOutcome::SwitchFailed { .. } => {}
        }

        CandidateReport { baud, outcome }
    }

    /// Run the whole test
    pub fn run(&mut self) -> Result<TestReport, ProtocolError> {
        let started_at = Utc::now();
        let locked_baud = self.handshake()?;

        let threshold = self.config.loss_threshold;
        let mut candidates = Vec::with_capacity(self.config.baud_list.len());
        let mut best = None;

        for baud in self.config.baud_list.clone() {
            let report = self.test_candidate(baud);
            if let Some(loss_pct) = report.outcome.loss_pct() {
                // Later qualifying candidates replace earlier ones.
                if loss_pct <= threshold {
                    best = Some(BaudCandidateResult { baud, loss_pct });
                }
            }
            candidates.push(report);
        }

        let report = TestReport {
            started_at,
            finished_at: Utc::now(),
            locked_baud,
            threshold,
            candidates,
            best,
        };
        tracing::info!("{}", report.summary());
        Ok(report)
    }
}
