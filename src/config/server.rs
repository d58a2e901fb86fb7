//! Server configuration types
//!
//! Defines the main configuration structures for the proxy.

use super::TcpConfig;
use crate::helper::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Proxy server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Static name overrides consulted before system DNS
    #[serde(default)]
    pub hosts: HashMap<String, Vec<IpAddr>>,
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_handshake_timeout() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_SECS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_allow_ipv6() -> bool {
    true
}

/// SOCKS5 listener configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Bound on each handshake read, in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Destination dial timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Maximum concurrent sessions (0 = unlimited)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Dial IPv6 destinations
    #[serde(default = "default_allow_ipv6")]
    pub allow_ipv6: bool,

    /// Relay engine configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Socket options
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: default_bind_addr(),
            handshake_timeout: default_handshake_timeout(),
            connect_timeout: default_connect_timeout(),
            max_connections: default_max_connections(),
            allow_ipv6: default_allow_ipv6(),
            relay: RelayConfig::default(),
            tcp: TcpConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Handshake read bound
    pub fn handshake_timeout(&self) -> Duration {
        duration_from_secs(self.handshake_timeout)
    }

    /// Destination dial bound
    pub fn connect_timeout(&self) -> Duration {
        duration_from_secs(self.connect_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", self.bind_addr));
        }
        if self.handshake_timeout == 0 {
            return Err("handshake_timeout must be greater than 0".to_string());
        }
        if self.connect_timeout == 0 {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        self.relay.validate()
    }
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_drain_timeout() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_SECS
}

/// Relay engine configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Fixed transfer chunk per direction, in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Seconds the remaining direction may go without moving bytes after the first one stops (0 = unbounded)
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: u64,

    /// Seconds without data before a direction is aborted (0 = disabled)
    #[serde(default)]
    pub idle_timeout: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            buffer_size: default_buffer_size(),
            drain_timeout: default_drain_timeout(),
            idle_timeout: 0,
        }
    }
}

impl RelayConfig {
    /// Drain bound, if any
    pub fn drain_timeout(&self) -> Option<Duration> {
        opt_duration_from_secs(self.drain_timeout)
    }

    /// Idle bound, if any
    pub fn idle_timeout(&self) -> Option<Duration> {
        opt_duration_from_secs(self.idle_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_size == 0 {
            return Err("relay buffer_size must be greater than 0".to_string());
        }
        Ok(())
    }
}
