//! Rate switch sub-protocol
//!
//! 1. master sends SETBAUD(B) at the current baud
//! 2. slave answers SETBAUD_ACK(B) at the current baud, then flushes,
//!    settles and reconfigures to B
//! 3. master checks the echoed baud, settles, reconfigures to B
//! 4. master confirms with HELLO / HELLO_ACK at B
//!
//! Neither side can observe the other's reconfiguration; the fixed settle
//! pauses and the confirming exchange are the only synchronization.

use thiserror::Error;

use super::LinkIo;
use crate::config::Timing;
use crate::protocol::{read_baud_payload, Frame, FrameType, ProtocolError, Transport};

/// Why a rate switch did not complete. Never fatal: the candidate is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchFailure {
    #[error("no SETBAUD_ACK")]
    Timeout,

    #[error("SETBAUD_ACK payload too short")]
    Malformed,

    #[error("SETBAUD_ACK for {acknowledged}, requested {requested}")]
    Mismatch { requested: u32, acknowledged: u32 },

    #[error("no HELLO_ACK at the new baud")]
    NoConfirmation,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Master side: move both ends to `baud`
pub fn request_switch<T: Transport>(
    io: &mut LinkIo<T>,
    baud: u32,
    timing: &Timing,
) -> Result<(), SwitchFailure> {
    let transport_err = |e: ProtocolError| SwitchFailure::Transport(e.to_string());

    io.send(&Frame::set_baud(baud)).map_err(transport_err)?;
    let payload = io
        .wait_for(
            FrameType::SetBaudAck,
            timing.setbaud_ack_wait(),
            timing.master_read(),
        )
        .ok_or(SwitchFailure::Timeout)?;
    let acknowledged = read_baud_payload(FrameType::SetBaudAck, &payload)
        .map_err(|_| SwitchFailure::Malformed)?;
    if acknowledged != baud {
        return Err(SwitchFailure::Mismatch {
            requested: baud,
            acknowledged,
        });
    }

    if let Err(e) = io.flush() {
        tracing::debug!("flush before switch failed: {}", e);
    }
    std::thread::sleep(timing.settle());
    io.retune(baud).map_err(transport_err)?;

    io.send(&Frame::hello()).map_err(transport_err)?;
    io.wait_for(
        FrameType::HelloAck,
        timing.confirm_wait(),
        timing.master_read(),
    )
    .filter(|payload| payload.len() >= 4)
    .ok_or(SwitchFailure::NoConfirmation)?;

    tracing::debug!(baud, "switch confirmed");
    Ok(())
}

/// Slave side: acknowledge at the old baud, then move to `baud`
///
/// The acknowledgement is best effort; the switch happens regardless.
pub fn apply_switch<T: Transport>(
    io: &mut LinkIo<T>,
    baud: u32,
    timing: &Timing,
) -> Result<(), ProtocolError> {
    let from = io.baud();
    if let Err(e) = io.send(&Frame::set_baud_ack(baud)) {
        tracing::warn!("SETBAUD_ACK write failed: {}", e);
    }
    if let Err(e) = io.flush() {
        tracing::warn!("flush before switch failed: {}", e);
    }
    std::thread::sleep(timing.settle());
    io.retune(baud)?;

    tracing::info!(from, to = baud, "switched baud");
    Ok(())
}
