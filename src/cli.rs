//! CLI for this application
//!
use std::time::Duration;

use crate::settings;

pub use settings::{APP_NAME, APP_VERSION};

#[derive(Clone, Debug, clap::Parser)]
#[command(name = "murmur", version, about = "Gossip-based cluster membership node")]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("MURMUR_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // Address announced to other members
    #[clap(
        long,
        default_value = "127.0.0.1",
        env("MURMUR_ADVERTISE_ADDRESS"),
        help = "IP Address or hostname other members use to reach this node"
    )]
    pub advertise_address: String,

    // HTTP API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("MURMUR_HTTP_LISTEN_PORT"),
        help = "Port to bind the HTTP status API to"
    )]
    pub listen_port_http: u16,

    // UDP listen port for gossip
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_UDP,
        env("MURMUR_UDP_LISTEN_PORT"),
        help = "Port to bind the gossip UDP socket to"
    )]
    pub listen_port_udp: u16,

    // Cluster contact points
    #[clap(
        long,
        value_delimiter = ',',
        env("MURMUR_CONTACT_POINTS"),
        help = "Gossip addresses of known members (e.g., 10.0.0.1:8512,10.0.0.2:8512). If empty, this node starts a new cluster."
    )]
    pub contact_points: Vec<String>,

    #[clap(
        long,
        default_value = "10",
        env("MURMUR_TICK_INTERVAL_MS"),
        help = "Interval in milliseconds between two protocol steps"
    )]
    pub tick_interval_ms: u64,

    #[clap(long, default_value = "1000", env("MURMUR_PROBE_INTERVAL_MS"))]
    pub probe_interval_ms: u64,

    #[clap(long, default_value = "500", env("MURMUR_PROBE_TIMEOUT_MS"))]
    pub probe_timeout_ms: u64,

    #[clap(
        long,
        default_value = "3",
        env("MURMUR_PROBE_INDIRECT_NODES"),
        help = "Number of members asked to probe a silent member on our behalf"
    )]
    pub probe_indirect_nodes: usize,

    #[clap(long, default_value = "1000", env("MURMUR_PROBE_INDIRECT_TIMEOUT_MS"))]
    pub probe_indirect_timeout_ms: u64,

    #[clap(long, default_value = "3", env("MURMUR_RETRANSMISSION_MULTIPLIER"))]
    pub retransmission_multiplier: u32,

    #[clap(long, default_value = "5", env("MURMUR_SUSPICION_MULTIPLIER"))]
    pub suspicion_multiplier: u32,

    #[clap(long, default_value = "3000", env("MURMUR_SYNC_TIMEOUT_MS"))]
    pub sync_timeout_ms: u64,

    #[clap(long, default_value = "1000", env("MURMUR_JOIN_TIMEOUT_MS"))]
    pub join_timeout_ms: u64,

    #[clap(
        long,
        default_value = "1000",
        env("MURMUR_JOIN_INTERVAL_MS"),
        help = "Delay in milliseconds before retrying a failed join"
    )]
    pub join_interval_ms: u64,

    #[clap(long, default_value = "32", env("MURMUR_MAX_EVENTS_PER_MESSAGE"))]
    pub max_membership_events_per_message: usize,

    #[clap(long, default_value = "256", env("MURMUR_DISSEMINATION_CAPACITY"))]
    pub dissemination_buffer_capacity: usize,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            listen_address: self.listen_address,
            advertise_address: self.advertise_address,
            listen_port_http: self.listen_port_http,
            listen_port_udp: self.listen_port_udp,
            contact_points: self.contact_points,
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            gossip: settings::GossipSettings {
                probe_interval: Duration::from_millis(self.probe_interval_ms),
                probe_timeout: Duration::from_millis(self.probe_timeout_ms),
                probe_indirect_nodes: self.probe_indirect_nodes,
                probe_indirect_timeout: Duration::from_millis(self.probe_indirect_timeout_ms),
                retransmission_multiplier: self.retransmission_multiplier,
                suspicion_multiplier: self.suspicion_multiplier,
                sync_timeout: Duration::from_millis(self.sync_timeout_ms),
                join_timeout: Duration::from_millis(self.join_timeout_ms),
                join_interval: Duration::from_millis(self.join_interval_ms),
                max_membership_events_per_message: self.max_membership_events_per_message,
                dissemination_buffer_capacity: self.dissemination_buffer_capacity,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_defaults_match_gossip_defaults() {
        let cli = Cli::parse_from(["murmur"]);
        let settings = cli.into_settings();
        let defaults = settings::GossipSettings::default();

        assert!(settings.contact_points.is_empty());
        assert_eq!(settings.gossip.probe_interval, defaults.probe_interval);
        assert_eq!(settings.gossip.join_timeout, defaults.join_timeout);
        assert_eq!(
            settings.gossip.suspicion_multiplier,
            defaults.suspicion_multiplier
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_contact_points_are_comma_separated() {
        let cli = Cli::parse_from([
            "murmur",
            "--contact-points",
            "10.0.0.2:8512,10.0.0.3:8512",
            "--join-interval-ms",
            "250",
        ]);
        let settings = cli.into_settings();
        assert_eq!(settings.contact_points.len(), 2);
        assert_eq!(settings.gossip.join_interval, Duration::from_millis(250));
    }
}
