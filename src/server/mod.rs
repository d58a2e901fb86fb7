//! Server module for Fwdsocks
//!
//! This module contains the listener and the per-connection supervisor.

#[allow(clippy::module_inception)]
mod server;

pub use server::Server;

use crate::config::Config;
use crate::socks::{HostsResolver, StaticResolver, SystemResolver};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Run the proxy with the given configuration until shutdown
pub async fn run_server(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let hosts = StaticResolver::from(config.hosts);
    if !hosts.is_empty() {
        info!("Loaded {} static host override(s)", hosts.len());
    }
    let resolver = Arc::new(HostsResolver::new(hosts, Arc::new(SystemResolver)));

    Server::new(config.server, resolver).run(shutdown_rx).await
}
