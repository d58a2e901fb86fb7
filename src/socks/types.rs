//! SOCKS5 type definitions
//!
//! Closed enums for every protocol constant family and the decoded frames.

use super::consts::*;
use crate::error::{FrameError, ReplyCode};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Authentication method offered in a negotiation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// No authentication required
    NoAuth,
    /// GSSAPI
    Gssapi,
    /// Username/password
    UserPass,
    /// IANA-assigned or private method this server does not know
    Other(u8),
    /// No acceptable methods (reply only)
    NoAcceptable,
}

impl From<u8> for Method {
    fn from(byte: u8) -> Self {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Method::NoAuth,
            SOCKS5_AUTH_METHOD_GSSAPI => Method::Gssapi,
            SOCKS5_AUTH_METHOD_PASSWORD => Method::UserPass,
            SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE => Method::NoAcceptable,
            other => Method::Other(other),
        }
    }
}

impl From<Method> for u8 {
    fn from(method: Method) -> Self {
        match method {
            Method::NoAuth => SOCKS5_AUTH_METHOD_NONE,
            Method::Gssapi => SOCKS5_AUTH_METHOD_GSSAPI,
            Method::UserPass => SOCKS5_AUTH_METHOD_PASSWORD,
            Method::NoAcceptable => SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE,
            Method::Other(byte) => byte,
        }
    }
}

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - wait for incoming connection (not implemented)
    Bind,
    /// UDP ASSOCIATE - establish UDP relay (not implemented)
    UdpAssociate,
}

impl TryFrom<u8> for Command {
    type Error = FrameError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Ok(Command::Connect),
            SOCKS5_CMD_TCP_BIND => Ok(Command::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Ok(Command::UdpAssociate),
            other => Err(FrameError::UnsupportedCommand(other)),
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        match command {
            Command::Connect => SOCKS5_CMD_TCP_CONNECT,
            Command::Bind => SOCKS5_CMD_TCP_BIND,
            Command::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Address family tag (`ATYP`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrType {
    /// 4-byte IPv4 address
    Ipv4,
    /// Length-prefixed domain name
    Domain,
    /// 16-byte IPv6 address
    Ipv6,
}

impl TryFrom<u8> for AddrType {
    type Error = FrameError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            SOCKS5_ADDR_TYPE_IPV4 => Ok(AddrType::Ipv4),
            SOCKS5_ADDR_TYPE_DOMAIN => Ok(AddrType::Domain),
            SOCKS5_ADDR_TYPE_IPV6 => Ok(AddrType::Ipv6),
            other => Err(FrameError::UnsupportedAddressType(other)),
        }
    }
}

impl From<AddrType> for u8 {
    fn from(addr_type: AddrType) -> Self {
        match addr_type {
            AddrType::Ipv4 => SOCKS5_ADDR_TYPE_IPV4,
            AddrType::Domain => SOCKS5_ADDR_TYPE_DOMAIN,
            AddrType::Ipv6 => SOCKS5_ADDR_TYPE_IPV6,
        }
    }
}

/// Target address for SOCKS5 requests
///
/// Represents the destination address in a SOCKS5 request.
/// Can be an IP address (v4 or v6) or a domain name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Create a new TargetAddr from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a new TargetAddr from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a new TargetAddr from a domain name and port
    pub fn domain(domain: String, port: u16) -> Self {
        TargetAddr::Domain(domain, port)
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Get the address family tag
    pub fn addr_type(&self) -> AddrType {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => AddrType::Ipv4,
            TargetAddr::Ip(SocketAddr::V6(_)) => AddrType::Ipv6,
            TargetAddr::Domain(_, _) => AddrType::Domain,
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

/// `[VER][NMETHODS][METHODS...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationRequest {
    /// Methods in the order the client listed them
    pub methods: Vec<Method>,
}

impl NegotiationRequest {
    /// True if the client offered `method`
    pub fn offers(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }
}

/// `[VER][CMD][RSV][ATYP][DST.ADDR][DST.PORT]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Requested command
    pub command: Command,
    /// Requested destination
    pub target: TargetAddr,
}

/// `[VER][REP][RSV][ATYP][BND.ADDR][BND.PORT]`
///
/// The bound address is always an IP endpoint: the proxy reports the local
/// end of its outbound dial, or `0.0.0.0:0` when no dial took place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionReply {
    /// Outcome
    pub code: ReplyCode,
    /// Bound address and port
    pub bound: SocketAddr,
}

impl ConnectionReply {
    /// Successful reply carrying the local endpoint of the outbound connection
    pub fn success(bound: SocketAddr) -> Self {
        ConnectionReply {
            code: ReplyCode::Succeeded,
            bound,
        }
    }

    /// Failure reply with an all-zero IPv4 bound address
    pub fn failure(code: ReplyCode) -> Self {
        ConnectionReply {
            code,
            bound: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        }
    }
}
