use std::time::{Duration, Instant};

use crate::protocol::SequenceStats;

/// Link state of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Searching for the peer across the candidate bauds
    Scanning,
    /// Peer confirmed at `current_baud`
    Locked,
}

/// Everything an endpoint knows about the current lock
///
/// Owned by the endpoint's control loop. Dropping the lock discards the
/// whole session, including the sequence baseline and all counters.
#[derive(Debug, Clone)]
pub struct LinkSession {
    state: LinkState,
    current_baud: Option<u32>,
    stats: SequenceStats,
    last_rx: Instant,
}

impl Default for LinkSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkSession {
    /// A scanning session with no history
    pub fn new() -> Self {
        Self {
            state: LinkState::Scanning,
            current_baud: None,
            stats: SequenceStats::new(),
            last_rx: Instant::now(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == LinkState::Locked
    }

    /// Baud of the current lock
    pub fn current_baud(&self) -> Option<u32> {
        self.current_baud
    }

    pub fn stats(&self) -> &SequenceStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SequenceStats {
        &mut self.stats
    }

    /// Enter `Locked` at `baud`
    pub fn lock(&mut self, baud: u32, now: Instant) {
        self.state = LinkState::Locked;
        self.current_baud = Some(baud);
        self.last_rx = now;
    }

    /// Record a baud change while locked
    pub fn set_baud(&mut self, baud: u32) {
        self.current_baud = Some(baud);
    }

    /// Record that a frame (valid or not) was received
    pub fn touch(&mut self, now: Instant) {
        self.last_rx = now;
    }

    /// Time since the last received frame
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_rx)
    }

    /// Locked and silent for longer than `idle_timeout`
    pub fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        self.is_locked() && self.silence(now) > idle_timeout
    }

    /// Drop the lock and everything learned during it
    pub fn revert_to_scanning(&mut self) {
        *self = Self::new();
    }
}
