//! # Fwdsocks - SOCKS5 Forward Proxy
//!
//! Fwdsocks is a SOCKS5 (RFC 1928) proxy endpoint. It accepts TCP clients,
//! performs the method negotiation and connection request handshake, dials
//! the requested destination and relays bytes in both directions until either
//! side closes.
//!
//! ## Features
//!
//! - **No-Auth CONNECT**: the "no authentication required" method and the CONNECT command
//! - **Exact Wire Codec**: IPv4, IPv6 and domain addresses, strict framing, RFC reply codes
//! - **Half-Close Aware Relay**: each direction drains independently with a bounded drain time
//! - **Pluggable Resolution**: system DNS with optional static host overrides
//! - **Isolated Sessions**: one task per client, capped by a connection limit
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fwdsocks::config::load_config;
//! use fwdsocks::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Listener -> Server -> Session (codec + resolver) -> relay
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod helper;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{FrameError, ReplyCode, SessionError};
pub use server::{run_server, Server};

/// Version of the Fwdsocks library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
