//! Test results
//!
//! What the master learned about each candidate, and the final verdict.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::StatsReport;

/// A candidate that met the loss threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BaudCandidateResult {
    pub baud: u32,
    pub loss_pct: f64,
}

/// What happened when a candidate was tested
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
    /// The rate switch did not complete; nothing was measured
    SwitchFailed { reason: String },
    /// DATA was sent but no STATS_RSP came back; counted as 100% loss
    StatsTimeout { tx_frames: u32 },
    /// The slave reported statistics
    Measured { tx_frames: u32, stats: StatsReport },
}

impl CandidateOutcome {
    /// Loss used to judge the candidate, `None` if it was never tested
    pub fn loss_pct(&self) -> Option<f64> {
        match self {
            CandidateOutcome::SwitchFailed { .. } => None,
            CandidateOutcome::StatsTimeout { .. } => Some(100.0),
            CandidateOutcome::Measured { stats, .. } => Some(f64::from(stats.total_loss)),
        }
    }
}

/// Per-candidate entry of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateReport {
    pub baud: u32,
    #[serde(flatten)]
    pub outcome: CandidateOutcome,
}

/// Outcome of a full master run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Baud confirmed by the handshake
    pub locked_baud: u32,
    /// Loss threshold in percent
    pub threshold: f64,
    pub candidates: Vec<CandidateReport>,
    /// Last candidate, in list order, that met the threshold
    pub best: Option<BaudCandidateResult>,
}

impl TestReport {
    /// One line verdict
    pub fn summary(&self) -> String {
        match &self.best {
            Some(best) => format!(
                "Max stable baud = {}  (loss≈{:.3}%, threshold={}%)",
                best.baud, best.loss_pct, self.threshold
            ),
            None => "No baud met the threshold. Try a lower baud list or check wiring and termination."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StatsCounters;

    fn report(best: Option<BaudCandidateResult>) -> TestReport {
        TestReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            locked_baud: 115_200,
            threshold: 0.1,
            candidates: vec![],
            best,
        }
    }

    #[test]
    fn test_outcome_loss() {
        let stats = StatsReport::new(
            StatsCounters::default(),
            StatsCounters {
                ok: 3,
                missed: 1,
                ..Default::default()
            },
        );
        assert_eq!(
            CandidateOutcome::SwitchFailed {
                reason: "no SETBAUD_ACK".into()
            }
            .loss_pct(),
            None
        );
        assert_eq!(
            CandidateOutcome::StatsTimeout { tx_frames: 10 }.loss_pct(),
            Some(100.0)
        );
        assert_eq!(
            CandidateOutcome::Measured {
                tx_frames: 4,
                stats
            }
            .loss_pct(),
            Some(25.0)
        );
    }

    #[test]
    fn test_summary() {
        let found = report(Some(BaudCandidateResult {
            baud: 921_600,
            loss_pct: 0.0,
        }));
        assert!(found.summary().contains("921600"));
        assert!(report(None).summary().starts_with("No baud"));
    }

    #[test]
    fn test_json_shape() {
        let mut r = report(None);
        r.candidates.push(CandidateReport {
            baud: 230_400,
            outcome: CandidateOutcome::StatsTimeout { tx_frames: 500 },
        });
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["candidates"][0]["baud"], 230_400);
        assert_eq!(json["candidates"][0]["outcome"], "stats_timeout");
        assert_eq!(json["candidates"][0]["tx_frames"], 500);
        assert!(json["best"].is_null());
    }
}
