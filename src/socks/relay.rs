//! Full-duplex relay between a client and its destination
//!
//! Each direction is an independent copy loop with its own fixed-size chunk
//! buffer. A direction that hits end-of-stream or an error half-closes its
//! destination write side and stops; the other direction keeps flowing until
//! it ends on its own or moves no bytes for a whole drain timeout period.
//! Both streams are dropped, and therefore closed, when [`relay`] returns.

use crate::config::RelayConfig;
use crate::error::{Direction, RelayError};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Byte counts and outcome of one relay
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Bytes copied client -> destination
    pub upstream_bytes: u64,
    /// Bytes copied destination -> client
    pub downstream_bytes: u64,
    /// First I/O error either direction hit
    pub error: Option<RelayError>,
    /// The second direction was cut off after stalling for the drain timeout
    pub drain_timed_out: bool,
}

impl RelayStats {
    /// Both directions reached end-of-stream without error
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && !self.drain_timed_out
    }
}

/// Relay bytes between `client` and `target` until both directions stop.
///
/// Never fails as a whole: the first direction error is reported in
/// [`RelayStats::error`] for diagnostics.
pub async fn relay<A, B>(client: A, target: B, config: &RelayConfig) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = tokio::io::split(target);

    let upstream_bytes = AtomicU64::new(0);
    let downstream_bytes = AtomicU64::new(0);
    let idle_timeout = config.idle_timeout();

    let mut stats = RelayStats::default();

    {
        let upstream = copy_half(
            &mut client_read,
            &mut target_write,
            config.buffer_size,
            idle_timeout,
            &upstream_bytes,
        );
        let downstream = copy_half(
            &mut target_read,
            &mut client_write,
            config.buffer_size,
            idle_timeout,
            &downstream_bytes,
        );
        tokio::pin!(upstream);
        tokio::pin!(downstream);

        let (first, result) = tokio::select! {
            result = &mut upstream => (Direction::Upstream, result),
            result = &mut downstream => (Direction::Downstream, result),
        };
        debug!("Relay {} finished first", first);
        record(&mut stats, first, result);

        let remaining = match first {
            Direction::Upstream => Direction::Downstream,
            Direction::Downstream => Direction::Upstream,
        };
        let drain = async {
            match remaining {
                Direction::Upstream => upstream.as_mut().await,
                Direction::Downstream => downstream.as_mut().await,
            }
        };
        tokio::pin!(drain);

        match config.drain_timeout() {
            Some(limit) => {
                let moved = match remaining {
                    Direction::Upstream => &upstream_bytes,
                    Direction::Downstream => &downstream_bytes,
                };
                let mut seen = moved.load(Ordering::Relaxed);
                loop {
                    tokio::select! {
                        result = &mut drain => {
                            record(&mut stats, remaining, result);
                            break;
                        }
                        _ = tokio::time::sleep(limit) => {
                            let now = moved.load(Ordering::Relaxed);
                            if now == seen {
                                warn!("Relay {} stalled for {:?} while draining", remaining, limit);
                                stats.drain_timed_out = true;
                                break;
                            }
                            seen = now;
                        }
                    }
                }
            }
            None => {
                let result = drain.await;
                record(&mut stats, remaining, result);
            }
        }
    }

    stats.upstream_bytes = upstream_bytes.load(Ordering::Relaxed);
    stats.downstream_bytes = downstream_bytes.load(Ordering::Relaxed);
    stats
}

fn record(stats: &mut RelayStats, direction: Direction, result: io::Result<()>) {
    match result {
        Ok(()) => trace!("Relay {} reached end of stream", direction),
        Err(source) => {
            debug!("Relay {} error: {}", direction, source);
            if stats.error.is_none() {
                stats.error = Some(RelayError { direction, source });
            }
        }
    }
}

/// Copy one direction, then half-close the writer whatever the outcome.
async fn copy_half<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    idle_timeout: Option<Duration>,
    transferred: &AtomicU64,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = pump(reader, writer, buffer_size, idle_timeout, transferred).await;
    if let Err(e) = writer.shutdown().await {
        trace!("Half-close failed: {}", e);
    }
    result
}

async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    idle_timeout: Option<Duration>,
    transferred: &AtomicU64,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, reader.read(&mut buf))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "relay idle timeout"))??,
            None => reader.read(&mut buf).await?,
        };
        if n == 0 {
            return Ok(());
        }

        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        transferred.fetch_add(n as u64, Ordering::Relaxed);
    }
}
