//! TOML configuration plus CLI overrides, in the style of the reference
//! `game/runner` config: a serde-derived struct with `Default`, loaded from
//! disk and then selectively overridden by command-line flags.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_auth_bind() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_world_bind() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

/// One listener's worth of configuration: bind address, port and role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenerConfig {
    pub name: String,
    #[serde(default = "default_auth_bind")]
    pub bind: IpAddr,
    pub port: u16,
    pub role: Role,
    /// Number of accepted-but-not-yet-handshaked connections allowed in
    /// flight at once.
    #[serde(default = "default_concurrent_acceptors")]
    pub concurrent_acceptors: usize,
}

fn default_concurrent_acceptors() -> usize {
    10
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Auth,
    World,
}

impl Role {
    /// The `connection_type` discriminant carried in `ServerHello`.
    pub fn connection_type(self) -> u8 {
        match self {
            Role::Auth => 3,
            Role::World => 11,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_limit() -> u32 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    600
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            limit: default_limit(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub auth_version: u32,
    pub realm_id: u32,
    pub realm_group_id: u32,
    #[serde(default = "default_listeners")]
    pub listeners: Vec<ListenerConfig>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "default_persistence_interval_secs")]
    pub persistence_interval_secs: u64,
}

fn default_persistence_interval_secs() -> u64 {
    30
}

fn default_listeners() -> Vec<ListenerConfig> {
    vec![
        ListenerConfig {
            name: "auth".to_string(),
            bind: default_auth_bind(),
            port: 6600,
            role: Role::Auth,
            concurrent_acceptors: default_concurrent_acceptors(),
        },
        ListenerConfig {
            name: "world".to_string(),
            bind: default_world_bind(),
            port: 23115,
            role: Role::World,
            concurrent_acceptors: default_concurrent_acceptors(),
        },
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auth_version: 0x0000_3EAA,
            realm_id: 1,
            realm_group_id: 1,
            listeners: default_listeners(),
            rate_limit: RateLimitConfig::default(),
            persistence_interval_secs: default_persistence_interval_secs(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: ServerConfig = toml::from_str(&text)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("ServerConfig always serializes")
    }
}

/// Command-line overrides layered on top of the file-based config, in the
/// style of the reference `gen_keys` binary's `clap` usage.
#[derive(Debug, Parser)]
#[command(name = "realm-server", about = "Wire-protocol core connection server")]
pub struct Cli {
    /// Path to a TOML config file. If omitted, built-in defaults are used.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Override the auth listener's port.
    #[arg(long)]
    pub auth_port: Option<u16>,

    /// Override the world listener's port.
    #[arg(long)]
    pub world_port: Option<u16>,
}

impl Cli {
    pub fn apply_overrides(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(port) = self.auth_port {
            if let Some(listener) = config.listeners.iter_mut().find(|l| l.role == Role::Auth) {
                listener.port = port;
            }
        }
        if let Some(port) = self.world_port {
            if let Some(listener) = config.listeners.iter_mut().find(|l| l.role == Role::World) {
                listener.port = port;
            }
        }
        config
    }
}
