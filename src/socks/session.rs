//! SOCKS5 session state machine
//!
//! A [`Session`] owns one client connection and drives it through
//!
//! ```text
//! Negotiating -> AwaitingRequest -> Dialing -> Relaying -> Closed
//! ```
//!
//! Any state may jump straight to `Closed`; no state is ever revisited.
//! At most one connection reply is written per session, and the relay phase
//! is entered only after a `Succeeded` reply to a CONNECT.

use super::codec;
use super::relay::{relay, RelayStats};
use super::resolver::Resolver;
use super::types::{Command, ConnectionReply, ConnectionRequest, Method, TargetAddr};
use crate::config::ServerConfig;
use crate::error::{FrameError, ResolveError, SessionError};
use crate::transport::SocketOpts;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

/// Position of a session in the handshake/relay lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Waiting for the method negotiation request
    Negotiating,
    /// Method accepted, waiting for the connection request
    AwaitingRequest,
    /// Resolving and connecting to the destination
    Dialing,
    /// Bytes flowing between client and destination
    Relaying,
    /// Both sockets released
    Closed,
}

/// Summary of a session that reached the relay phase
#[derive(Debug)]
pub struct SessionReport {
    /// Session id assigned by the supervisor
    pub id: u64,
    /// Destination requested by the client
    pub target: TargetAddr,
    /// Local endpoint of the outbound connection
    pub bound: SocketAddr,
    /// Relay outcome
    pub stats: RelayStats,
}

/// Pick the method to answer a negotiation with.
///
/// Only "no authentication required" is supported; further methods plug in here.
pub fn select_method(offered: &[Method]) -> Option<Method> {
    offered.iter().copied().find(|m| *m == Method::NoAuth)
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, FrameError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(SessionError::from),
        Err(_) => Err(SessionError::HandshakeTimeout),
    }
}

/// One client connection and, once dialed, its destination connection
pub struct Session<S> {
    id: u64,
    client: Option<S>,
    target: Option<TcpStream>,
    state: SessionState,
    reply_sent: bool,
    config: Arc<ServerConfig>,
    resolver: Arc<dyn Resolver>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a session for a freshly accepted client stream
    pub fn new(id: u64, client: S, config: Arc<ServerConfig>, resolver: Arc<dyn Resolver>) -> Self {
        Session {
            id,
            client: Some(client),
            target: None,
            state: SessionState::Negotiating,
            reply_sent: false,
            config,
            resolver,
        }
    }

    /// Session id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the handshake and relay to completion, closing both sockets.
    pub async fn run(mut self) -> Result<SessionReport, SessionError> {
        let result = self.drive().await;
        self.close().await;
        result
    }

    async fn drive(&mut self) -> Result<SessionReport, SessionError> {
        self.negotiate().await?;
        let request = self.read_request().await?;
        let bound = self.dial(&request.target).await?;

        self.transition(SessionState::Relaying);
        let client = self.client.take().ok_or(SessionError::Closed)?;
        let target = self.target.take().ok_or(SessionError::Closed)?;

        info!("SOCKS5 tunnel established to {} via {}", request.target, bound);
        let stats = relay(client, target, &self.config.relay).await;

        Ok(SessionReport {
            id: self.id,
            target: request.target,
            bound,
            stats,
        })
    }

    /// Release both sockets. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.shutdown().await {
                trace!("Client shutdown: {}", e);
            }
        }
        if let Some(mut target) = self.target.take() {
            if let Err(e) = target.shutdown().await {
                trace!("Target shutdown: {}", e);
            }
        }
        if self.state != SessionState::Closed {
            self.transition(SessionState::Closed);
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            next > self.state,
            "session state must advance: {:?} -> {:?}",
            self.state,
            next
        );
        trace!("Session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    fn client_mut(&mut self) -> Result<&mut S, SessionError> {
        self.client.as_mut().ok_or(SessionError::Closed)
    }

    async fn negotiate(&mut self) -> Result<Method, SessionError> {
        let limit = self.config.handshake_timeout();
        let request = bounded(limit, codec::read_negotiation_request(self.client_mut()?)).await?;

        let Some(method) = select_method(&request.methods) else {
            let frame = codec::encode_negotiation_reply(Method::NoAcceptable);
            if let Err(e) = bounded(limit, codec::write_frame(self.client_mut()?, &frame)).await {
                trace!("Failed to send no-acceptable-methods reply: {}", e);
            }
            return Err(SessionError::NoAcceptableMethod);
        };

        self.transition(SessionState::AwaitingRequest);
        let frame = codec::encode_negotiation_reply(method);
        bounded(limit, codec::write_frame(self.client_mut()?, &frame)).await?;
        debug!("Negotiated method {:?}", method);
        Ok(method)
    }

    async fn read_request(&mut self) -> Result<ConnectionRequest, SessionError> {
        let limit = self.config.handshake_timeout();
        let request =
            match bounded(limit, codec::read_connection_request(self.client_mut()?)).await {
                Ok(request) => request,
                Err(e) => return Err(self.fail(e).await),
            };

        debug!("SOCKS5 {} request to {}", request.command, request.target);
        match request.command {
            Command::Connect => Ok(request),
            Command::Bind | Command::UdpAssociate => {
                Err(self.fail(SessionError::CommandNotSupported(request.command)).await)
            }
        }
    }

    /// Resolve and connect, then send the one reply that describes the outcome.
    async fn dial(&mut self, target: &TargetAddr) -> Result<SocketAddr, SessionError> {
        self.transition(SessionState::Dialing);
        let limit = self.config.connect_timeout();

        let resolved = tokio::time::timeout(limit, self.resolve(target)).await;
        let addr = match resolved {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => return Err(self.fail(e).await),
            Err(_) => return Err(self.fail(SessionError::DialTimeout(target.clone())).await),
        };

        debug!("Connecting to target: {}", addr);
        let connected = tokio::time::timeout(limit, TcpStream::connect(addr)).await;
        let stream = match connected {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                let err = SessionError::Dial {
                    target: target.clone(),
                    source,
                };
                return Err(self.fail(err).await);
            }
            Err(_) => return Err(self.fail(SessionError::DialTimeout(target.clone())).await),
        };

        SocketOpts::from_tcp_config(&self.config.tcp).hint(&stream);
        let bound = stream
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
        self.target = Some(stream);

        self.send_reply(ConnectionReply::success(bound)).await?;
        Ok(bound)
    }

    /// Literal addresses pass through; names go to the resolver and the first
    /// usable entry, in resolver order, wins.
    async fn resolve(&self, target: &TargetAddr) -> Result<SocketAddr, SessionError> {
        let allow_ipv6 = self.config.allow_ipv6;
        match target {
            TargetAddr::Ip(addr) if addr.is_ipv6() && !allow_ipv6 => {
                Err(SessionError::AddressTypeNotSupported(target.clone()))
            }
            TargetAddr::Ip(addr) => Ok(*addr),
            TargetAddr::Domain(name, port) => {
                let addrs = self.resolver.resolve(name).await?;
                addrs
                    .into_iter()
                    .find(|ip| allow_ipv6 || ip.is_ipv4())
                    .map(|ip| SocketAddr::new(ip, *port))
                    .ok_or_else(|| ResolveError::NoAddresses(name.clone()).into())
            }
        }
    }

    async fn send_reply(&mut self, reply: ConnectionReply) -> Result<(), SessionError> {
        debug_assert!(!self.reply_sent, "connection reply already sent");
        if self.reply_sent {
            return Ok(());
        }
        self.reply_sent = true;

        let limit = self.config.handshake_timeout();
        let frame = codec::encode_connection_reply(&reply);
        bounded(limit, codec::write_frame(self.client_mut()?, &frame)).await
    }

    /// Send the failure reply `err` maps to, if any, and hand `err` back.
    async fn fail(&mut self, err: SessionError) -> SessionError {
        if let Some(code) = err.reply_code() {
            if let Err(e) = self.send_reply(ConnectionReply::failure(code)).await {
                debug!("Failed to send {} reply: {}", code, e);
            }
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplyCode;
    use crate::socks::resolver::StaticResolver;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    fn test_config() -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            handshake_timeout: 1,
            connect_timeout: 2,
            ..Default::default()
        })
    }

    fn test_resolver() -> Arc<dyn Resolver> {
        Arc::new(
            StaticResolver::new()
                .with_entry("echo.test", vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
                .with_entry("v6only.test", vec!["::1".parse().unwrap()]),
        )
    }

    fn failure_reply(code: ReplyCode) -> Vec<u8> {
        codec::encode_connection_reply(&ConnectionReply::failure(code)).to_vec()
    }

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut r, mut w) = stream.split();
                    let _ = tokio::io::copy(&mut r, &mut w).await;
                });
            }
        });
        addr
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_select_method() {
        assert_eq!(
            select_method(&[Method::UserPass, Method::NoAuth]),
            Some(Method::NoAuth)
        );
        assert_eq!(select_method(&[Method::UserPass]), None);
        assert_eq!(select_method(&[Method::Other(0x80), Method::Gssapi]), None);
    }

    #[test]
    fn test_session_state_order() {
        assert!(SessionState::Negotiating < SessionState::AwaitingRequest);
        assert!(SessionState::AwaitingRequest < SessionState::Dialing);
        assert!(SessionState::Dialing < SessionState::Relaying);
        assert!(SessionState::Relaying < SessionState::Closed);
    }

    #[tokio::test]
    async fn test_negotiate_accepts_no_auth() {
        let mock = Builder::new()
            .read(&[0x05, 0x02, 0x02, 0x00])
            .write(&[0x05, 0x00])
            .build();
        let mut session = Session::new(1, mock, test_config(), test_resolver());

        let method = session.negotiate().await.unwrap();
        assert_eq!(method, Method::NoAuth);
        assert_eq!(session.state(), SessionState::AwaitingRequest);
    }

    #[tokio::test]
    async fn test_negotiate_rejects_without_no_auth() {
        let mock = Builder::new()
            .read(&[0x05, 0x01, 0x02])
            .write(&[0x05, 0xFF])
            .build();
        let mut session = Session::new(1, mock, test_config(), test_resolver());

        let result = session.negotiate().await;
        assert!(matches!(result, Err(SessionError::NoAcceptableMethod)));
        assert_eq!(session.state(), SessionState::Negotiating);

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_run_wrong_version_closes_without_reply() {
        let mock = Builder::new().read(&[0x04, 0x01]).build();
        let session = Session::new(1, mock, test_config(), test_resolver());

        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::Frame(FrameError::UnsupportedVersion(4)))
        ));
    }

    #[tokio::test]
    async fn test_run_bind_is_rejected_without_dial() {
        let mock = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .read(&[0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
            .write(&failure_reply(ReplyCode::CommandNotSupported))
            .build();
        let session = Session::new(1, mock, test_config(), test_resolver());

        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::CommandNotSupported(Command::Bind))
        ));
    }

    #[tokio::test]
    async fn test_run_udp_associate_is_rejected() {
        let mock = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .read(&[0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .write(&failure_reply(ReplyCode::CommandNotSupported))
            .build();
        let session = Session::new(1, mock, test_config(), test_resolver());

        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::CommandNotSupported(Command::UdpAssociate))
        ));
    }

    #[tokio::test]
    async fn test_run_unknown_command_gets_command_not_supported() {
        let mock = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .read(&[0x05, 0x09, 0x00, 0x01])
            .write(&failure_reply(ReplyCode::CommandNotSupported))
            .build();
        let session = Session::new(1, mock, test_config(), test_resolver());

        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::Frame(FrameError::UnsupportedCommand(0x09)))
        ));
    }

    #[tokio::test]
    async fn test_run_unknown_address_type_gets_reply() {
        let mock = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .read(&[0x05, 0x01, 0x00, 0x02])
            .write(&failure_reply(ReplyCode::AddressTypeNotSupported))
            .build();
        let session = Session::new(1, mock, test_config(), test_resolver());

        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::Frame(FrameError::UnsupportedAddressType(0x02)))
        ));
    }

    #[tokio::test]
    async fn test_run_truncated_request_closes_without_reply() {
        let mock = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .read(&[0x05, 0x01, 0x00, 0x01, 127, 0])
            .build();
        let session = Session::new(1, mock, test_config(), test_resolver());

        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::Frame(FrameError::Truncated))
        ));
    }

    #[tokio::test]
    async fn test_run_ipv6_disabled_gets_address_type_not_supported() {
        let config = Arc::new(ServerConfig {
            allow_ipv6: false,
            ..Default::default()
        });
        let mut request = vec![0x05, 0x01, 0x00, 0x04];
        request.extend_from_slice(&std::net::Ipv6Addr::LOCALHOST.octets());
        request.extend_from_slice(&[0x00, 0x50]);

        let mock = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .read(&request)
            .write(&failure_reply(ReplyCode::AddressTypeNotSupported))
            .build();
        let session = Session::new(1, mock, config, test_resolver());

        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::AddressTypeNotSupported(_))
        ));
    }

    #[tokio::test]
    async fn test_run_unresolvable_domain_gets_host_unreachable() {
        let mut request = vec![0x05, 0x01, 0x00, 0x03, 12];
        request.extend_from_slice(b"missing.test");
        request.extend_from_slice(&[0x00, 0x50]);

        let mock = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .read(&request)
            .write(&failure_reply(ReplyCode::HostUnreachable))
            .build();
        let session = Session::new(1, mock, test_config(), test_resolver());

        let result = session.run().await;
        assert!(matches!(result, Err(SessionError::Resolve(_))));
    }

    #[tokio::test]
    async fn test_run_ipv6_only_name_with_ipv6_disabled() {
        let config = Arc::new(ServerConfig {
            allow_ipv6: false,
            ..Default::default()
        });
        let mut request = vec![0x05, 0x01, 0x00, 0x03, 11];
        request.extend_from_slice(b"v6only.test");
        request.extend_from_slice(&[0x00, 0x50]);

        let mock = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .read(&request)
            .write(&failure_reply(ReplyCode::HostUnreachable))
            .build();
        let session = Session::new(1, mock, config, test_resolver());

        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::Resolve(ResolveError::NoAddresses(_)))
        ));
    }

    #[tokio::test]
    async fn test_run_connection_refused_reply() {
        let port = closed_port().await;
        let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
        request.extend_from_slice(&port.to_be_bytes());

        let mock = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .read(&request)
            .write(&failure_reply(ReplyCode::ConnectionRefused))
            .build();
        let session = Session::new(1, mock, test_config(), test_resolver());

        let result = session.run().await;
        assert!(matches!(result, Err(SessionError::Dial { .. })));
    }

    #[tokio::test]
    async fn test_handshake_timeout_on_silent_client() {
        let (_peer, server) = duplex(64);
        let session = Session::new(1, server, test_config(), test_resolver());

        let result = tokio::time::timeout(Duration::from_secs(3), session.run())
            .await
            .unwrap();
        assert!(matches!(result, Err(SessionError::HandshakeTimeout)));
    }

    #[tokio::test]
    async fn test_run_connect_and_relay_through_domain() {
        let echo = echo_server().await;
        let (mut client, server) = duplex(4096);
        let session = Session::new(7, server, test_config(), test_resolver());
        let handle = tokio::spawn(session.run());

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);

        let mut request = vec![0x05, 0x01, 0x00, 0x03, 9];
        request.extend_from_slice(b"echo.test");
        request.extend_from_slice(&echo.port().to_be_bytes());
        client.write_all(&request).await.unwrap();

        let reply = codec::read_connection_reply(&mut client).await.unwrap();
        assert_eq!(reply.code, ReplyCode::Succeeded);
        assert!(reply.bound.ip().is_loopback());
        assert_ne!(reply.bound.port(), 0);

        client.write_all(b"ping through proxy").await.unwrap();
        let mut echoed = [0u8; 18];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"ping through proxy");

        client.shutdown().await.unwrap();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let report = tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.id, 7);
        assert_eq!(report.target, TargetAddr::domain("echo.test".to_string(), echo.port()));
        assert_eq!(report.bound, reply.bound);
        assert_eq!(report.stats.upstream_bytes, 18);
        assert_eq!(report.stats.downstream_bytes, 18);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_peer, server) = duplex(64);
        let mut session = Session::new(1, server, test_config(), test_resolver());

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
    }
}
