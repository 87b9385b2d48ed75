//! CLI for this application
//!
use std::net::SocketAddr;

use crate::settings;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Debug, clap::Parser)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("USHER_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // HTTP API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("USHER_HTTP_LISTEN_PORT"),
        help = "Port to bind the Usher HTTP API server to"
    )]
    pub listen_port: u16,

    // UDP listen port for heartbeats
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_UDP,
        env("USHER_UDP_LISTEN_PORT"),
        help = "Port to bind the Usher UDP heartbeat bus to"
    )]
    pub listen_port_udp: u16,

    // Seconds between heartbeat announcements
    #[clap(
        long,
        default_value = "5",
        env("USHER_HEARTBEAT_INTERVAL_SECONDS"),
        help = "Seconds between heartbeat announcements while seeking"
    )]
    pub heartbeat_interval_seconds: u64,

    // Resource count for semaphores created through the API
    #[clap(
        long,
        default_value = "1",
        env("USHER_DEFAULT_RESOURCES"),
        help = "Resource count for semaphores created without an explicit count"
    )]
    pub default_resources: u32,

    // Re-rank immediately when a semaphore is resized
    #[clap(
        long,
        env("USHER_REEVALUATE_ON_RESIZE"),
        help = "Re-rank seeking semaphores immediately when their resource count changes"
    )]
    pub reevaluate_on_resize: bool,

    // How heartbeats leave this process
    #[clap(
        long,
        default_value = "udp",
        env("USHER_RUN_MODE"),
        help = "run-mode: 'udp' or 'memory'"
    )]
    pub run_mode: settings::RunMode,

    // Cluster configuration information: peer heartbeat addresses
    #[clap(
        long,
        env("USHER_TOPOLOGY"),
        value_delimiter = ',',
        help = "Peer UDP addresses (e.g., 10.0.0.2:8462,10.0.0.3:8462). If empty, this peer runs alone."
    )]
    pub topology: Vec<SocketAddr>,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            listen_address: self.listen_address,
            listen_port: self.listen_port,
            listen_port_udp: self.listen_port_udp,
            heartbeat_interval_secs: self.heartbeat_interval_seconds,
            default_resources: self.default_resources,
            reevaluate_on_resize: self.reevaluate_on_resize,
            run_mode: self.run_mode,
            topology: self.topology.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["usher"]);
        let settings = cli.into_settings();
        assert_eq!(settings.listen_port, settings::STANDARD_PORT_HTTP);
        assert_eq!(settings.listen_port_udp, settings::STANDARD_PORT_UDP);
        assert_eq!(settings.heartbeat_interval_secs, 5);
        assert_eq!(settings.default_resources, 1);
        assert!(!settings.reevaluate_on_resize);
        assert!(settings.topology.is_empty());
    }

    #[test]
    fn test_topology_parses_comma_separated_addresses() {
        let cli = Cli::parse_from([
            "usher",
            "--topology",
            "10.0.0.2:8462,10.0.0.3:8462",
            "--run-mode",
            "udp",
        ]);
        let settings = cli.into_settings();
        assert_eq!(settings.topology.len(), 2);
        assert!(settings.topology.contains(&"10.0.0.2:8462".parse().unwrap()));
    }
}
