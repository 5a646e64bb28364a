//! Gossip Message Protocol
//!
//! Defines the request/response messages exchanged between members. Every
//! message carries piggybacked membership facts except the SYNC response,
//! which carries the full membership snapshot instead.
//!
//! - INTERNAL cluster communication (UDP gossip): bincode, compact binary
//! - EXTERNAL API communication (HTTP): serde_json, see [`crate::api`]
//!
use bincode::{Decode, Encode};

use crate::error::Result;
use crate::membership::{MemberId, MemberRecord, MembershipEvent};

#[derive(Debug, Clone, Decode, Encode, PartialEq, Eq)]
pub enum GossipRequest {
    /// Direct probe; also used to announce a JOIN to contact points
    Ping { events: Vec<MembershipEvent> },

    /// Ask a relay to probe `target` on the sender's behalf
    PingReq {
        target: MemberId,
        events: Vec<MembershipEvent>,
    },

    /// Ask for the full membership state of the receiver
    SyncRequest { events: Vec<MembershipEvent> },
}

impl GossipRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            GossipRequest::Ping { .. } => "PING",
            GossipRequest::PingReq { .. } => "PING-REQ",
            GossipRequest::SyncRequest { .. } => "SYNC",
        }
    }
}

#[derive(Debug, Clone, Decode, Encode, PartialEq, Eq)]
pub enum GossipResponse {
    /// Positive answer to PING and PING-REQ
    Ack { events: Vec<MembershipEvent> },

    /// Explicit negative answer, e.g. a relay could not reach its target
    Nack { reason: String },

    /// Answer to SYNC: every member the responder knows, itself included
    Sync { members: Vec<MemberRecord> },
}

impl GossipResponse {
    pub fn events(&self) -> &[MembershipEvent] {
        match self {
            GossipResponse::Ack { events } => events,
            _ => &[],
        }
    }
}

/// A request received from the network, handed to
/// [`crate::gossip::Gossip::on_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub from: MemberId,
    pub request_id: u64,
    pub request: GossipRequest,
}

#[derive(Debug, Clone, Decode, Encode, PartialEq, Eq)]
pub enum PacketBody {
    Request(GossipRequest),
    Response(GossipResponse),
}

/// GossipPacket wraps messages for network transmission
#[derive(Debug, Clone, Decode, Encode, PartialEq, Eq)]
pub struct GossipPacket {
    // correlates a response with its request
    pub request_id: u64,
    pub sender: MemberId,
    pub body: PacketBody,
}

impl GossipPacket {
    pub fn request(request_id: u64, sender: MemberId, request: GossipRequest) -> Self {
        Self {
            request_id,
            sender,
            body: PacketBody::Request(request),
        }
    }

    pub fn response(request_id: u64, sender: MemberId, response: GossipResponse) -> Self {
        Self {
            request_id,
            sender,
            body: PacketBody::Response(response),
        }
    }

    /// Serialize for INTERNAL cluster communication (UDP gossip)
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let config = bincode::config::standard().with_big_endian();
        Ok(bincode::encode_to_vec(self, config)?)
    }

    /// Deserialize from INTERNAL cluster communication (UDP gossip)
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let config = bincode::config::standard().with_big_endian();
        let (result, _) = bincode::decode_from_slice(data, config)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::{GossipTerm, MembershipEventType, MembershipStatus};

    #[test]
    fn test_ping_req_serialization() {
        let events = vec![MembershipEvent::new(
            MemberId::from("10.0.0.3:8512"),
            MembershipEventType::Suspect,
            GossipTerm::new(17, 4),
        )];
        let packet = GossipPacket::request(
            42,
            MemberId::from("10.0.0.1:8512"),
            GossipRequest::PingReq {
                target: MemberId::from("10.0.0.2:8512"),
                events: events.clone(),
            },
        );

        let serialized = packet.serialize().expect("Failed to serialize packet");
        let deserialized =
            GossipPacket::deserialize(&serialized).expect("Failed to deserialize packet");

        assert_eq!(deserialized.request_id, 42);
        match deserialized.body {
            PacketBody::Request(GossipRequest::PingReq { target, events: received }) => {
                assert_eq!(target.as_str(), "10.0.0.2:8512");
                assert_eq!(received, events);
            }
            other => panic!("Wrong message type after deserialization: {:?}", other),
        }
    }

    #[test]
    fn test_sync_response_serialization() {
        let packet = GossipPacket::response(
            7,
            MemberId::from("10.0.0.2:8512"),
            GossipResponse::Sync {
                members: vec![MemberRecord {
                    id: MemberId::from("10.0.0.2:8512"),
                    status: MembershipStatus::Alive,
                    term: GossipTerm::new(3, 1),
                }],
            },
        );

        let serialized = packet.serialize().expect("Failed to serialize");
        let deserialized = GossipPacket::deserialize(&serialized).expect("Failed to deserialize");
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(GossipPacket::deserialize(&[0xff, 0x01]).is_err());
    }
}
