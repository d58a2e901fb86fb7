//! SOCKS5 wire codec
//!
//! Encodes and decodes the four RFC 1928 frames. Decoders read exactly the
//! bytes a frame declares and fail with [`FrameError::Truncated`] when the
//! stream ends early; they never read past the frame. Encoders are pure.

use super::consts::*;
use super::types::{
    AddrType, Command, ConnectionReply, ConnectionRequest, Method, NegotiationRequest, TargetAddr,
};
use crate::error::{FrameError, ReplyCode};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

fn check_version(version: u8) -> Result<(), FrameError> {
    if version != SOCKS5_VERSION {
        return Err(FrameError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Read a method negotiation request
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
pub async fn read_negotiation_request<S>(stream: &mut S) -> Result<NegotiationRequest, FrameError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    check_version(header[0])?;

    let count = header[1] as usize;
    if count == 0 {
        return Err(FrameError::NoMethods);
    }

    let mut raw = vec![0u8; count];
    stream.read_exact(&mut raw).await?;
    let methods = raw.into_iter().map(Method::from).collect();

    trace!("Negotiation request methods: {:?}", methods);
    Ok(NegotiationRequest { methods })
}

/// Encode a method selection reply: `[0x05, METHOD]`
pub fn encode_negotiation_reply(method: Method) -> Bytes {
    Bytes::copy_from_slice(&[SOCKS5_VERSION, u8::from(method)])
}

/// Read a method selection reply (client side)
pub async fn read_negotiation_reply<S>(stream: &mut S) -> Result<Method, FrameError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;
    check_version(buf[0])?;
    Ok(Method::from(buf[1]))
}

/// Read a connection request
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// An unknown `CMD` or `ATYP` is reported as its own [`FrameError`] variant
/// so the caller can answer with the matching reply code.
pub async fn read_connection_request<S>(stream: &mut S) -> Result<ConnectionRequest, FrameError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    check_version(header[0])?;

    let command = Command::try_from(header[1])?;
    if header[2] != SOCKS5_RESERVED {
        trace!("Ignoring non-zero reserved byte: {:#04x}", header[2]);
    }
    let addr_type = AddrType::try_from(header[3])?;

    let target = read_address(stream, addr_type).await?;
    Ok(ConnectionRequest { command, target })
}

async fn read_port<S>(stream: &mut S) -> Result<u16, FrameError>
where
    S: AsyncRead + Unpin,
{
    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    Ok(u16::from_be_bytes(port))
}

async fn read_address<S>(stream: &mut S, addr_type: AddrType) -> Result<TargetAddr, FrameError>
where
    S: AsyncRead + Unpin,
{
    match addr_type {
        AddrType::Ipv4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;
            Ok(TargetAddr::ipv4(Ipv4Addr::from(addr), port))
        }
        AddrType::Domain => {
            let len = stream.read_u8().await? as usize;
            if len == 0 {
                return Err(FrameError::InvalidDomain("empty domain".to_string()));
            }

            let mut domain = vec![0u8; len];
            stream.read_exact(&mut domain).await?;
            let domain = String::from_utf8(domain).map_err(|e| {
                FrameError::InvalidDomain(String::from_utf8_lossy(e.as_bytes()).into_owned())
            })?;

            let port = read_port(stream).await?;
            Ok(TargetAddr::domain(domain, port))
        }
        AddrType::Ipv6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;
            Ok(TargetAddr::ipv6(Ipv6Addr::from(addr), port))
        }
    }
}

/// Encode a connection request (client side)
///
/// Fails with [`FrameError::InvalidDomain`] for a domain that does not fit
/// the one-byte length prefix.
pub fn encode_connection_request(request: &ConnectionRequest) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::with_capacity(4 + 1 + MAX_DOMAIN_LEN + 2);
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(u8::from(request.command));
    buf.put_u8(SOCKS5_RESERVED);
    buf.put_u8(u8::from(request.target.addr_type()));

    match &request.target {
        TargetAddr::Ip(SocketAddr::V4(addr)) => {
            buf.put_slice(&addr.ip().octets());
            buf.put_u16(addr.port());
        }
        TargetAddr::Ip(SocketAddr::V6(addr)) => {
            buf.put_slice(&addr.ip().octets());
            buf.put_u16(addr.port());
        }
        TargetAddr::Domain(domain, port) => {
            if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
                return Err(FrameError::InvalidDomain(domain.clone()));
            }
            buf.put_u8(domain.len() as u8);
            buf.put_slice(domain.as_bytes());
            buf.put_u16(*port);
        }
    }

    Ok(buf.freeze())
}

/// Encode a connection reply
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn encode_connection_reply(reply: &ConnectionReply) -> Bytes {
    let mut buf = BytesMut::with_capacity(IPV6_REPLY_LEN);
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(u8::from(reply.code));
    buf.put_u8(SOCKS5_RESERVED);

    match reply.bound {
        SocketAddr::V4(addr) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
            buf.put_slice(&addr.ip().octets());
            buf.put_u16(addr.port());
        }
        SocketAddr::V6(addr) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV6);
            buf.put_slice(&addr.ip().octets());
            buf.put_u16(addr.port());
        }
    }

    buf.freeze()
}

/// Read a connection reply (client side)
///
/// Replies carry IP bound addresses only; a domain `ATYP` is rejected.
pub async fn read_connection_reply<S>(stream: &mut S) -> Result<ConnectionReply, FrameError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    check_version(header[0])?;

    let code = ReplyCode::try_from(header[1])?;
    let ip = match AddrType::try_from(header[3])? {
        AddrType::Ipv4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            IpAddr::V4(Ipv4Addr::from(addr))
        }
        AddrType::Ipv6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            IpAddr::V6(Ipv6Addr::from(addr))
        }
        AddrType::Domain => return Err(FrameError::UnsupportedAddressType(header[3])),
    };
    let bound = SocketAddr::new(ip, read_port(stream).await?);

    Ok(ConnectionReply { code, bound })
}

/// Write an encoded frame and flush it
pub async fn write_frame<S>(stream: &mut S, frame: &[u8]) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(frame).await?;
    stream.flush().await?;
    Ok(())
}
