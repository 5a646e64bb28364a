use std::net::SocketAddr;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Unique identifier of a cluster member: the `host:port` address its
/// gossip transport listens on.
#[derive(
    Clone, Debug, Default, Decode, Deserialize, Encode, Serialize, PartialEq, PartialOrd, Ord, Eq, Hash,
)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self(format!("{}:{}", host, port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the id to a socket address for the transport
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.0.parse()?)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        MemberId::new(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        MemberId::new(id)
    }
}

impl From<SocketAddr> for MemberId {
    fn from(addr: SocketAddr) -> Self {
        MemberId::new(addr.to_string())
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
