use bincode::{Decode, Encode};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// GossipTerm versions the facts a member publishes about itself.
///
/// The epoch is fixed when a node process starts (wall-clock milliseconds),
/// the heartbeat is bumped whenever the node publishes a new fact about
/// itself. Terms compare lexicographically, so facts from a restarted node
/// always dominate facts from its previous incarnation.
#[derive(
    Clone, Copy, Debug, Default, Decode, Deserialize, Encode, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct GossipTerm {
    epoch: u64,
    heartbeat: u64,
}

impl GossipTerm {
    pub fn new(epoch: u64, heartbeat: u64) -> Self {
        Self { epoch, heartbeat }
    }

    /// A fresh term for a process starting now
    pub fn starting_now() -> Self {
        // epoch time in milliseconds here from `chrono` is an i64
        let epoch = Utc::now().timestamp_millis().max(0) as u64;
        Self::new(epoch, 0)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn heartbeat(&self) -> u64 {
        self.heartbeat
    }

    /// Bump the heartbeat and return the new term
    pub fn increment(&mut self) -> GossipTerm {
        self.heartbeat += 1;
        *self
    }

    /// True if a fact carrying `self` may replace state stored at `stored`
    pub fn supersedes_or_equals(&self, stored: &GossipTerm) -> bool {
        self >= stored
    }
}

impl std::fmt::Display for GossipTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.epoch, self.heartbeat)
    }
}
