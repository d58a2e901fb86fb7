//! Test utilities for Fwdsocks
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use fwdsocks::config::ServerConfig;
use fwdsocks::socks::{Resolver, StaticResolver};
use fwdsocks::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Start an echo server that writes back everything it reads
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// A port nothing is listening on
pub async fn unused_port() -> u16 {
    let (_listener, addr) = create_test_listener().await;
    addr.port()
}

/// Running proxy under test
pub struct TestProxy {
    /// Listen address
    pub addr: SocketAddr,
    /// Sending on this stops the proxy
    pub shutdown_tx: broadcast::Sender<bool>,
    /// Supervisor task
    pub handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl TestProxy {
    /// Open a client connection to the proxy
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }
}

/// Test configuration builder
pub struct TestConfigBuilder {
    config: ServerConfig,
    resolver: StaticResolver,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            config: ServerConfig {
                bind_addr: "127.0.0.1:0".to_string(),
                handshake_timeout: 2,
                connect_timeout: 2,
                ..Default::default()
            },
            resolver: StaticResolver::new(),
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a static host entry
    pub fn host(mut self, name: &str, addr: SocketAddr) -> Self {
        self.resolver.insert(name, vec![addr.ip()]);
        self
    }

    /// Set the handshake timeout in seconds
    pub fn handshake_timeout(mut self, secs: u64) -> Self {
        self.config.handshake_timeout = secs;
        self
    }

    /// Allow or refuse IPv6 destinations
    pub fn allow_ipv6(mut self, allow: bool) -> Self {
        self.config.allow_ipv6 = allow;
        self
    }

    /// Set the session cap
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Build the configuration
    pub fn build(self) -> (ServerConfig, StaticResolver) {
        (self.config, self.resolver)
    }

    /// Bind and start the proxy
    pub async fn spawn(self) -> TestProxy {
        let (config, resolver) = self.build();
        let resolver: Arc<dyn Resolver> = Arc::new(resolver);
        let server = Server::new(config, resolver);
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });
        TestProxy {
            addr,
            shutdown_tx,
            handle,
        }
    }
}

/// SOCKS5 handshake frames
pub mod socks5_mock {
    use fwdsocks::socks::*;
    use std::net::SocketAddr;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a password auth method selection request
    pub fn create_auth_request_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Create a command request to an IP endpoint
    pub fn create_command_ip(cmd: u8, addr: SocketAddr) -> Vec<u8> {
        let mut frame = vec![SOCKS5_VERSION, cmd, SOCKS5_RESERVED];
        match addr {
            SocketAddr::V4(v4) => {
                frame.push(SOCKS5_ADDR_TYPE_IPV4);
                frame.extend_from_slice(&v4.ip().octets());
            }
            SocketAddr::V6(v6) => {
                frame.push(SOCKS5_ADDR_TYPE_IPV6);
                frame.extend_from_slice(&v6.ip().octets());
            }
        }
        frame.extend_from_slice(&addr.port().to_be_bytes());
        frame
    }

    /// Create a connect command to an IP endpoint
    pub fn create_connect_ip(addr: SocketAddr) -> Vec<u8> {
        create_command_ip(SOCKS5_CMD_TCP_CONNECT, addr)
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }
}
