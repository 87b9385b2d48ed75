//! Usher application settings
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::config_error;
use crate::error::Result;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 8460;
pub const DEFAULT_PORT_HTTP: &str = "8460";
pub const STANDARD_PORT_UDP: u16 = 8462;
pub const DEFAULT_PORT_UDP: &str = "8462";

pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5;

// A peer is written off after this many missed heartbeats.
pub const STALENESS_MULTIPLIER: u32 = 3;

/// Tunables for one semaphore instance.
#[derive(Clone, Debug)]
pub struct SemaphoreSettings {
    /// How often a seeking peer announces itself.
    pub heartbeat_interval: Duration,

    /// How long a silent peer stays in view before being written off.
    pub staleness_window: Duration,

    /// Re-rank a seeking instance immediately when its resource count
    /// changes, instead of waiting for the next inbound heartbeat.
    pub reevaluate_on_resize: bool,
}

impl Default for SemaphoreSettings {
    fn default() -> Self {
        Self::with_heartbeat_interval(Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS))
    }
}

impl SemaphoreSettings {
    /// Settings with the staleness window derived from the interval, so a
    /// peer is written off after [`STALENESS_MULTIPLIER`] missed heartbeats.
    pub fn with_heartbeat_interval(interval: Duration) -> Self {
        Self {
            heartbeat_interval: interval,
            staleness_window: interval * STALENESS_MULTIPLIER,
            reevaluate_on_resize: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(config_error!("heartbeat interval must be non-zero"));
        }
        if self.staleness_window < self.heartbeat_interval {
            return Err(config_error!(
                "staleness window ({:?}) must cover at least one heartbeat interval ({:?})",
                self.staleness_window,
                self.heartbeat_interval
            ));
        }
        Ok(())
    }
}

/// How heartbeats leave this process.
#[derive(Clone, Debug)]
pub enum RunMode {
    /// Datagrams to a static peer topology.
    Udp,
    /// In-process only; peers are other semaphores in this process.
    Memory,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Udp => write!(f, "udp"),
            RunMode::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "udp" => Ok(RunMode::Udp),
            "memory" => Ok(RunMode::Memory),
            _ => Err(format!("Invalid run-mode: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // HTTP API listen port
    pub listen_port: u16,

    // UDP listen port for heartbeats
    pub listen_port_udp: u16,

    // Seconds between heartbeat announcements
    pub heartbeat_interval_secs: u64,

    // Resource count for semaphores created through the API
    pub default_resources: u32,

    // Re-rank immediately when a semaphore is resized
    pub reevaluate_on_resize: bool,

    // How heartbeats leave this process
    pub run_mode: RunMode,

    // Cluster configuration information: peer heartbeat addresses
    pub topology: HashSet<SocketAddr>,
}

impl Settings {
    pub fn semaphore_settings(&self) -> SemaphoreSettings {
        SemaphoreSettings {
            reevaluate_on_resize: self.reevaluate_on_resize,
            ..SemaphoreSettings::with_heartbeat_interval(Duration::from_secs(
                self.heartbeat_interval_secs,
            ))
        }
    }

    pub fn udp_bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .listen_address
            .parse()
            .map_err(|_| config_error!("Invalid listen address: {}", self.listen_address))?;
        Ok(SocketAddr::from((ip, self.listen_port_udp)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_resources < 1 {
            return Err(config_error!("default resource count must be at least 1"));
        }
        if self.heartbeat_interval_secs < 1 {
            return Err(config_error!(
                "heartbeat interval must be at least one second"
            ));
        }
        self.udp_bind_addr()?;
        Ok(())
    }
}
