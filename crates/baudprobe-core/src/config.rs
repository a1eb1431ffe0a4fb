//! Endpoint configuration
//!
//! Both endpoints load defaults, optionally overlay a JSON file, and then
//! apply command line overrides before calling `validate()`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::protocol::{ProtocolError, MAX_PAYLOAD_SIZE};

/// Fixed protocol intervals, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Master transport read poll
    pub master_read_ms: u64,
    /// Slave transport read poll
    pub slave_read_ms: u64,
    /// How long the master probes each baud during the handshake
    pub hello_dwell_ms: u64,
    /// Pause between HELLO transmissions during the handshake
    pub hello_interval_ms: u64,
    /// Wait for HELLO_ACK after each handshake HELLO
    pub hello_ack_wait_ms: u64,
    /// Wait for SETBAUD_ACK
    pub setbaud_ack_wait_ms: u64,
    /// Settling pause before reconfiguring the transport
    pub settle_ms: u64,
    /// Wait for HELLO_ACK confirming the new baud
    pub confirm_wait_ms: u64,
    /// Number of DATA batches per candidate
    pub batches: u32,
    /// Pause after each DATA batch
    pub batch_pause_ms: u64,
    /// Pause after the last batch before requesting statistics
    pub drain_ms: u64,
    /// Wait for STATS_RSP
    pub stats_wait_ms: u64,
    /// Interval of the slave's periodic statistics log line
    pub report_interval_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            master_read_ms: 20,
            slave_read_ms: 50,
            hello_dwell_ms: 600,
            hello_interval_ms: 10,
            hello_ack_wait_ms: 50,
            setbaud_ack_wait_ms: 500,
            settle_ms: 20,
            confirm_wait_ms: 400,
            batches: 5,
            batch_pause_ms: 200,
            drain_ms: 300,
            stats_wait_ms: 500,
            report_interval_ms: 1000,
        }
    }
}

impl Timing {
    /// Short intervals for in-memory links, where bytes arrive instantly
    pub fn fast() -> Self {
        Self {
            master_read_ms: 2,
            slave_read_ms: 2,
            hello_dwell_ms: 300,
            hello_interval_ms: 2,
            hello_ack_wait_ms: 10,
            setbaud_ack_wait_ms: 200,
            settle_ms: 5,
            confirm_wait_ms: 200,
            batches: 5,
            batch_pause_ms: 5,
            drain_ms: 30,
            stats_wait_ms: 300,
            report_interval_ms: 1000,
        }
    }

    pub fn master_read(&self) -> Duration {
        Duration::from_millis(self.master_read_ms)
    }

    pub fn slave_read(&self) -> Duration {
        Duration::from_millis(self.slave_read_ms)
    }

    pub fn hello_dwell(&self) -> Duration {
        Duration::from_millis(self.hello_dwell_ms)
    }

    pub fn hello_interval(&self) -> Duration {
        Duration::from_millis(self.hello_interval_ms)
    }

    pub fn hello_ack_wait(&self) -> Duration {
        Duration::from_millis(self.hello_ack_wait_ms)
    }

    pub fn setbaud_ack_wait(&self) -> Duration {
        Duration::from_millis(self.setbaud_ack_wait_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn confirm_wait(&self) -> Duration {
        Duration::from_millis(self.confirm_wait_ms)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn stats_wait(&self) -> Duration {
        Duration::from_millis(self.stats_wait_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}

/// Master (test driver) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Serial port name
    pub port: String,
    /// Candidate bauds, tried in order
    pub baud_list: Vec<u32>,
    /// DATA payload size in bytes
    pub payload_bytes: usize,
    /// DATA frames sent per candidate
    pub num_packets: u32,
    /// Maximum acceptable loss percentage
    pub loss_threshold: f64,
    /// Protocol intervals
    pub timing: Timing,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_list: vec![1_500_000, 2_000_000],
            payload_bytes: 240,
            num_packets: 500,
            loss_threshold: 0.1,
            timing: Timing::default(),
        }
    }
}

impl MasterConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Reject configurations the orchestrator cannot run
    pub fn validate(&self) -> Result<(), ProtocolError> {
        validate_bauds(&self.baud_list)?;
        validate_timing(&self.timing)?;
        if self.payload_bytes > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::InvalidConfig(format!(
                "payload_bytes {} exceeds {}",
                self.payload_bytes, MAX_PAYLOAD_SIZE
            )));
        }
        if self.num_packets == 0 {
            return Err(ProtocolError::InvalidConfig(
                "num_packets must be positive".into(),
            ));
        }
        if self.num_packets < self.timing.batches {
            return Err(ProtocolError::InvalidConfig(format!(
                "num_packets {} is smaller than the batch count {}",
                self.num_packets, self.timing.batches
            )));
        }
        if !self.loss_threshold.is_finite() || self.loss_threshold < 0.0 {
            return Err(ProtocolError::InvalidConfig(format!(
                "loss_threshold {} must be a non-negative percentage",
                self.loss_threshold
            )));
        }
        Ok(())
    }
}

/// Slave (responder) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaveConfig {
    /// Serial port name
    pub port: String,
    /// Bauds scanned while looking for the master
    pub baud_list: Vec<u32>,
    /// Time spent listening at each baud while scanning
    pub scan_dwell_ms: u64,
    /// Silence after which a locked session is dropped
    pub idle_timeout_ms: u64,
    /// Protocol intervals
    pub timing: Timing,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyTHS0".to_string(),
            baud_list: vec![
                115_200, 230_400, 460_800, 921_600, 1_500_000, 2_000_000, 3_000_000, 4_000_000,
            ],
            scan_dwell_ms: 200,
            idle_timeout_ms: 3000,
            timing: Timing::default(),
        }
    }
}

impl SlaveConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn scan_dwell(&self) -> Duration {
        Duration::from_millis(self.scan_dwell_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Reject configurations the responder cannot run
    pub fn validate(&self) -> Result<(), ProtocolError> {
        validate_bauds(&self.baud_list)?;
        validate_timing(&self.timing)?;
        if self.scan_dwell_ms == 0 {
            return Err(ProtocolError::InvalidConfig(
                "scan_dwell_ms must be positive".into(),
            ));
        }
        if self.idle_timeout_ms == 0 {
            return Err(ProtocolError::InvalidConfig(
                "idle_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn validate_bauds(bauds: &[u32]) -> Result<(), ProtocolError> {
    if bauds.is_empty() {
        return Err(ProtocolError::InvalidConfig("baud list is empty".into()));
    }
    if bauds.contains(&0) {
        return Err(ProtocolError::InvalidConfig(
            "baud list contains 0".into(),
        ));
    }
    Ok(())
}

fn validate_timing(timing: &Timing) -> Result<(), ProtocolError> {
    if timing.batches == 0 {
        return Err(ProtocolError::InvalidConfig("batches must be positive".into()));
    }
    Ok(())
}

/// Parse a comma separated baud list, ignoring empty items
pub fn parse_baud_list(text: &str) -> Result<Vec<u32>, ProtocolError> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<u32>().map_err(|_| {
                ProtocolError::InvalidConfig(format!("invalid baud rate '{}'", item))
            })
        })
        .collect()
}
