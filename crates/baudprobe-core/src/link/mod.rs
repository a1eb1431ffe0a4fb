//! Link management
//!
//! Session state, frame I/O over a transport, baud negotiation and the
//! rate switch sub-protocol.

mod io;
pub mod negotiator;
pub mod rate_switch;
mod session;

pub use io::LinkIo;
pub use negotiator::{master_handshake, SlaveScanner};
pub use rate_switch::{apply_switch, request_switch, SwitchFailure};
pub use session::{LinkSession, LinkState};
