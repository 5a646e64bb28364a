use std::time::Instant;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::{GossipTerm, MemberId};

/// Member status in the failure detection lifecycle
#[derive(Clone, Copy, Debug, Decode, Deserialize, Encode, Serialize, PartialEq, Eq, Hash)]
pub enum MembershipStatus {
    Alive,
    Suspect,
    Dead,
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipStatus::Alive => write!(f, "alive"),
            MembershipStatus::Suspect => write!(f, "suspect"),
            MembershipStatus::Dead => write!(f, "dead"),
        }
    }
}

/// Local record of one peer. Only [`super::MembershipList`] mutates it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    id: MemberId,
    status: MembershipStatus,
    term: GossipTerm,
    suspicion_deadline: Option<Instant>,
}

impl Member {
    pub(crate) fn new(id: MemberId, term: GossipTerm) -> Self {
        Self {
            id,
            status: MembershipStatus::Alive,
            term,
            suspicion_deadline: None,
        }
    }

    pub fn id(&self) -> &MemberId {
        &self.id
    }

    /// The gossip address of the member; ids are addresses
    pub fn address(&self) -> &str {
        self.id.as_str()
    }

    pub fn status(&self) -> MembershipStatus {
        self.status
    }

    pub fn term(&self) -> GossipTerm {
        self.term
    }

    pub fn suspicion_deadline(&self) -> Option<Instant> {
        self.suspicion_deadline
    }

    pub fn is_suspect(&self) -> bool {
        self.status == MembershipStatus::Suspect
    }

    /// True once a suspect member outlived its suspicion deadline
    pub fn suspicion_expired(&self, now: Instant) -> bool {
        match (self.status, self.suspicion_deadline) {
            (MembershipStatus::Suspect, Some(deadline)) => now >= deadline,
            _ => false,
        }
    }

    pub(crate) fn set_alive(&mut self, term: GossipTerm) {
        self.status = MembershipStatus::Alive;
        self.term = term;
        self.suspicion_deadline = None;
    }

    pub(crate) fn set_suspect(&mut self, term: GossipTerm, deadline: Instant) {
        self.status = MembershipStatus::Suspect;
        self.term = term;
        self.suspicion_deadline = Some(deadline);
    }

    pub(crate) fn set_term(&mut self, term: GossipTerm) {
        self.term = term;
    }

    pub fn record(&self) -> MemberRecord {
        MemberRecord {
            id: self.id.clone(),
            status: self.status,
            term: self.term,
        }
    }
}

/// Serializable view of a member, exchanged in SYNC responses and served by
/// the status API.
#[derive(Clone, Debug, Decode, Deserialize, Encode, Serialize, PartialEq, Eq)]
pub struct MemberRecord {
    pub id: MemberId,
    pub status: MembershipStatus,
    pub term: GossipTerm,
}
