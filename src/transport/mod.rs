//! Network transport for gossip packets
pub mod udp;

pub use udp::{TransportStats, UdpEventSender, UdpTransport};
