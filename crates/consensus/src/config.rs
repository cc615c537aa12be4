//! Consensus configuration.

use std::time::Duration;

/// Tuning knobs shared by every consensus instance on a replica.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Number of Byzantine faults tolerated (`f`).
    pub max_faulty: usize,
    /// Period of the dispatcher alarm that flushes buffered messages.
    pub resolve_interval: Duration,
}

impl ConsensusConfig {
    /// Votes required at each quorum check, counting votes received from
    /// peers only; a replica's own vote never enters its own log. The
    /// classical paper bound is `2f + 1` counting the replica itself; the
    /// received-vote count here is `2f`.
    pub fn quorum(&self) -> usize {
        2 * self.max_faulty
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_faulty: 1,
            resolve_interval: Duration::from_secs(1),
        }
    }
}
