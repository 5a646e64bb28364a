//! murmur application settings
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;
use crate::membership::MemberId;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 8510;
pub const DEFAULT_PORT_HTTP: &str = "8510";
pub const STANDARD_PORT_UDP: u16 = 8512;
pub const DEFAULT_PORT_UDP: &str = "8512";

/// Timing and sizing knobs of the membership protocol.
///
/// Values are read-only once a node is running; call [`GossipSettings::validate`]
/// before handing them to [`crate::gossip::Gossip`].
#[derive(Clone, Debug)]
pub struct GossipSettings {
    // Interval between two probes of the failure detector
    pub probe_interval: Duration,
    // Time to wait for a direct ACK before probing indirectly
    pub probe_timeout: Duration,
    // Number of relays asked to probe a silent member on our behalf
    pub probe_indirect_nodes: usize,
    // Time to wait for any relayed ACK
    pub probe_indirect_timeout: Duration,
    // A fact is piggybacked retransmission_multiplier * ceil(log10(n + 1)) times
    pub retransmission_multiplier: u32,
    // Suspicion lasts suspicion_multiplier * ceil(log10(n + 1)) probe intervals
    pub suspicion_multiplier: u32,
    // Time to wait for the full-state SYNC response while joining
    pub sync_timeout: Duration,
    // Time to wait for the first JOIN response
    pub join_timeout: Duration,
    // Delay before a failed join attempt is retried
    pub join_interval: Duration,
    // Upper bound of facts attached to one outgoing message
    pub max_membership_events_per_message: usize,
    // Upper bound of facts waiting for dissemination
    pub dissemination_buffer_capacity: usize,
}

impl Default for GossipSettings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(1000),
            probe_timeout: Duration::from_millis(500),
            probe_indirect_nodes: 3,
            probe_indirect_timeout: Duration::from_millis(1000),
            retransmission_multiplier: 3,
            suspicion_multiplier: 5,
            sync_timeout: Duration::from_millis(3000),
            join_timeout: Duration::from_millis(1000),
            join_interval: Duration::from_millis(1000),
            max_membership_events_per_message: 32,
            dissemination_buffer_capacity: 256,
        }
    }
}

impl GossipSettings {
    pub fn validate(&self) -> Result<()> {
        if self.probe_interval.is_zero() {
            return Err(config_error!("probe interval must be greater than zero"));
        }
        if self.probe_timeout.is_zero() || self.probe_indirect_timeout.is_zero() {
            return Err(config_error!("probe timeouts must be greater than zero"));
        }
        if self.join_timeout.is_zero() || self.sync_timeout.is_zero() {
            return Err(config_error!("join and sync timeouts must be greater than zero"));
        }
        if self.suspicion_multiplier == 0 {
            return Err(config_error!("suspicion multiplier must be at least 1"));
        }
        if self.retransmission_multiplier == 0 {
            return Err(config_error!("retransmission multiplier must be at least 1"));
        }
        if self.max_membership_events_per_message == 0 {
            return Err(config_error!(
                "at least one membership event must fit into a message"
            ));
        }
        if self.dissemination_buffer_capacity < self.max_membership_events_per_message {
            return Err(config_error!(
                "dissemination buffer ({}) is smaller than one message ({})",
                self.dissemination_buffer_capacity,
                self.max_membership_events_per_message
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // Address other members use to reach this node
    pub advertise_address: String,

    // HTTP status API listen port
    pub listen_port_http: u16,

    // UDP listen port for gossip
    pub listen_port_udp: u16,

    // Known members contacted while joining
    pub contact_points: Vec<String>,

    // Interval at which the cooperative scheduler steps the protocol
    pub tick_interval: Duration,

    pub gossip: GossipSettings,
}

impl Settings {
    /// The member id of this node: its advertised gossip address.
    pub fn member_id(&self) -> MemberId {
        MemberId::from_host_port(&self.advertise_address, self.listen_port_udp)
    }

    pub fn udp_listen_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.listen_address, self.listen_port_udp).parse()?)
    }

    pub fn http_listen_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.listen_address, self.listen_port_http).parse()?)
    }

    /// Contact points other than this node itself
    pub fn contact_points(&self) -> Vec<MemberId> {
        let self_id = self.member_id();
        self.contact_points
            .iter()
            .map(|c| MemberId::from(c.as_str()))
            .filter(|c| *c != self_id)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(config_error!("tick interval must be greater than zero"));
        }
        self.udp_listen_addr()?;
        self.http_listen_addr()?;
        self.gossip.validate()
    }
}
