//! # baudprobe Core Library
//!
//! Finds the highest stable baud rate of a point-to-point serial link.
//!
//! Two cooperating endpoints run the same framed protocol: a master that
//! drives the test and a slave that counts what arrives. This library
//! provides:
//! - Frame encoding with CRC16-CCITT and a resynchronizing stream parser
//! - Sequence based loss accounting
//! - Baud negotiation and in-band rate switching
//! - The master orchestrator and slave responder
//! - Serial port and in-memory simulated transports
//!
//! ## Example
//!
//! ```rust,ignore
//! use baudprobe_core::{config::MasterConfig, master::MasterOrchestrator, protocol::SerialTransport};
//!
//! let config = MasterConfig::default();
//! let port = SerialTransport::open(&config.port, config.baud_list[0])?;
//! let report = MasterOrchestrator::new(port, config)?.run()?;
//! println!("{}", report.summary());
//! ```

pub mod config;
pub mod link;
pub mod master;
pub mod protocol;
pub mod report;
pub mod sim;
pub mod slave;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{parse_baud_list, MasterConfig, SlaveConfig, Timing};
    pub use crate::link::{LinkSession, LinkState, SwitchFailure};
    pub use crate::master::MasterOrchestrator;
    pub use crate::protocol::{
        Frame, FrameType, ProtocolError, SerialTransport, StatsReport, StreamParser, Transport,
    };
    pub use crate::report::{BaudCandidateResult, CandidateOutcome, TestReport};
    pub use crate::sim::{SimFaults, SimLink};
    pub use crate::slave::SlaveResponder;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
