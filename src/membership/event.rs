use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::{GossipTerm, MemberId};

#[derive(Clone, Copy, Debug, Decode, Deserialize, Encode, Serialize, PartialEq, Eq, Hash)]
pub enum MembershipEventType {
    Join,
    Alive,
    Suspect,
    Confirm,
    Leave,
}

impl std::fmt::Display for MembershipEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipEventType::Join => write!(f, "JOIN"),
            MembershipEventType::Alive => write!(f, "ALIVE"),
            MembershipEventType::Suspect => write!(f, "SUSPECT"),
            MembershipEventType::Confirm => write!(f, "CONFIRM"),
            MembershipEventType::Leave => write!(f, "LEAVE"),
        }
    }
}

/// A fact about one member, piggybacked on outgoing messages until it has
/// spread far enough. Delivery is best-effort.
#[derive(Clone, Debug, Decode, Deserialize, Encode, Serialize, PartialEq, Eq)]
pub struct MembershipEvent {
    pub member_id: MemberId,
    pub event_type: MembershipEventType,
    pub term: GossipTerm,
}

impl MembershipEvent {
    pub fn new(member_id: MemberId, event_type: MembershipEventType, term: GossipTerm) -> Self {
        Self {
            member_id,
            event_type,
            term,
        }
    }
}

impl std::fmt::Display for MembershipEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}, {})", self.event_type, self.member_id, self.term)
    }
}
