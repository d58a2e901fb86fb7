//! Helper utilities for Fwdsocks
//!
//! Shared defaults and small conversions used throughout the application.

use std::time::Duration;

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Default relay chunk size per direction
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Default bound on each handshake read, in seconds
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default time the remaining relay direction may stall after a half-close
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Default cap on concurrent sessions
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Parse duration from seconds
pub fn duration_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Parse duration from seconds, treating zero as "no limit"
pub fn opt_duration_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_BUFFER_SIZE, 8192);
        assert_eq!(DEFAULT_CONNECT_TIMEOUT_SECS, 10);
        assert_eq!(DEFAULT_HANDSHAKE_TIMEOUT_SECS, 10);
        assert_eq!(DEFAULT_BIND_ADDR, "0.0.0.0:8080");
    }

    #[test]
    fn test_duration_from_secs() {
        assert_eq!(duration_from_secs(5), Duration::from_secs(5));
        assert_eq!(duration_from_secs(0), Duration::from_secs(0));
        assert_eq!(duration_from_secs(3600), Duration::from_secs(3600));
    }

    #[test]
    fn test_opt_duration_from_secs() {
        assert_eq!(opt_duration_from_secs(0), None);
        assert_eq!(opt_duration_from_secs(30), Some(Duration::from_secs(30)));
    }
}
