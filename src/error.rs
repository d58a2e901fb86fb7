//! Error types for Fwdsocks
//!
//! This module defines the typed errors of the SOCKS5 core and the reply
//! codes they map onto. Application-level code (configuration, supervisor,
//! binary) wraps these in `anyhow`.

use crate::socks::{Command, TargetAddr};
use std::fmt;
use std::io;
use thiserror::Error;

/// Malformed, truncated or unsupported wire data
#[derive(Error, Debug)]
pub enum FrameError {
    /// The stream ended before the frame was complete
    #[error("Truncated frame")]
    Truncated,

    /// Version byte was not 0x05
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Negotiation request declared zero methods
    #[error("No authentication methods offered")]
    NoMethods,

    /// Command byte outside CONNECT / BIND / UDP ASSOCIATE
    #[error("Command not supported: {0}")]
    UnsupportedCommand(u8),

    /// Address type byte outside IPv4 / domain / IPv6
    #[error("Address type not supported: {0}")]
    UnsupportedAddressType(u8),

    /// Domain name was empty or not valid UTF-8
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Reply code byte outside the RFC 1928 table
    #[error("Invalid reply code: {0}")]
    InvalidReplyCode(u8),

    /// Any other transport failure while reading or writing a frame
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => FrameError::Truncated,
            _ => FrameError::Io(err),
        }
    }
}

/// Destination name lookup failures
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The underlying lookup failed
    #[error("Failed to resolve {name}: {source}")]
    Lookup {
        /// Name being resolved
        name: String,
        /// Lookup error
        #[source]
        source: io::Error,
    },

    /// The lookup succeeded but produced no usable address
    #[error("No addresses found for {0}")]
    NoAddresses(String),
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReplyCode::Succeeded),
            0x01 => Ok(ReplyCode::GeneralFailure),
            0x02 => Ok(ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::CommandNotSupported),
            0x08 => Ok(ReplyCode::AddressTypeNotSupported),
            _ => Err(FrameError::InvalidReplyCode(value)),
        }
    }
}

impl From<&io::Error> for ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                ReplyCode::ConnectionRefused
            }
            io::ErrorKind::NetworkUnreachable | io::ErrorKind::NetworkDown => {
                ReplyCode::NetworkUnreachable
            }
            io::ErrorKind::HostUnreachable
            | io::ErrorKind::TimedOut
            | io::ErrorKind::AddrNotAvailable => ReplyCode::HostUnreachable,
            io::ErrorKind::PermissionDenied => ReplyCode::ConnectionNotAllowed,
            _ => ReplyCode::GeneralFailure,
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReplyCode::Succeeded => "succeeded",
            ReplyCode::GeneralFailure => "general SOCKS server failure",
            ReplyCode::ConnectionNotAllowed => "connection not allowed by ruleset",
            ReplyCode::NetworkUnreachable => "network unreachable",
            ReplyCode::HostUnreachable => "host unreachable",
            ReplyCode::ConnectionRefused => "connection refused",
            ReplyCode::TtlExpired => "TTL expired",
            ReplyCode::CommandNotSupported => "command not supported",
            ReplyCode::AddressTypeNotSupported => "address type not supported",
        };
        f.write_str(text)
    }
}

/// Why a session ended before reaching the relay phase
#[derive(Error, Debug)]
pub enum SessionError {
    /// Malformed or truncated handshake frame
    #[error("Handshake frame error: {0}")]
    Frame(#[from] FrameError),

    /// Client offered no method this server accepts
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// BIND or UDP ASSOCIATE was requested
    #[error("Command not supported: {0}")]
    CommandNotSupported(Command),

    /// Destination address family is disabled
    #[error("Address type not supported for {0}")]
    AddressTypeNotSupported(TargetAddr),

    /// Destination name could not be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Dialing the destination failed
    #[error("Failed to connect to {target}: {source}")]
    Dial {
        /// Destination that was dialed
        target: TargetAddr,
        /// Dial error
        #[source]
        source: io::Error,
    },

    /// Dialing the destination did not complete in time
    #[error("Connection timeout to {0}")]
    DialTimeout(TargetAddr),

    /// Client did not complete a handshake read in time
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// Session was already closed
    #[error("Session closed")]
    Closed,
}

impl SessionError {
    /// Reply code the client receives for this failure, if any reply is sent.
    ///
    /// `None` means the session closes abruptly: the failure predates any
    /// meaningful reply.
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            SessionError::Frame(FrameError::UnsupportedCommand(_)) => {
                Some(ReplyCode::CommandNotSupported)
            }
            SessionError::Frame(FrameError::UnsupportedAddressType(_)) => {
                Some(ReplyCode::AddressTypeNotSupported)
            }
            SessionError::Frame(_) => None,
            SessionError::NoAcceptableMethod => None,
            SessionError::CommandNotSupported(_) => Some(ReplyCode::CommandNotSupported),
            SessionError::AddressTypeNotSupported(_) => Some(ReplyCode::AddressTypeNotSupported),
            SessionError::Resolve(_) => Some(ReplyCode::HostUnreachable),
            SessionError::Dial { source, .. } => Some(ReplyCode::from(source)),
            SessionError::DialTimeout(_) => Some(ReplyCode::HostUnreachable),
            SessionError::HandshakeTimeout | SessionError::Closed => None,
        }
    }

    /// True for failures caused by a misbehaving client rather than the destination.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SessionError::Frame(_) | SessionError::NoAcceptableMethod
        )
    }
}

/// Which way bytes were flowing when a relay direction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to destination
    Upstream,
    /// Destination to client
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => write!(f, "client->target"),
            Direction::Downstream => write!(f, "target->client"),
        }
    }
}

/// Mid-stream I/O failure on one relay direction
#[derive(Error, Debug)]
#[error("Relay {direction} failed: {source}")]
pub struct RelayError {
    /// Direction that failed
    pub direction: Direction,
    /// Underlying I/O error
    #[source]
    pub source: io::Error,
}
