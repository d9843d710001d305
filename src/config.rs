//! Immutable run configuration.
//!
//! Loading these values from a TOML file or CLI flags is an external
//! collaborator's job (out of scope for this crate, same as the REPL and
//! GUI). This module only defines the validated shape the core expects to
//! receive them in.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Run configuration shared by the client coordinator and the server
/// dispatch loop. Constructed and validated by the caller; the core treats
/// it as read-only for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Network address of the subnet, e.g. `192.168.1.0`.
    pub network: Ipv4Addr,
    /// CIDR prefix length, e.g. `24`.
    pub prefix_len: u8,
    /// UDP port both client and server bind and exchange frames on.
    pub udp_port: u16,
    /// Local address to bind the UDP socket to.
    pub bind_address: IpAddr,
    /// Overall deadline for a multi-peer client operation.
    pub timeout: Duration,
    /// Delay before a scheduled CAPTURE's `sync` timestamp, used by callers
    /// that compute `now + capture_delay` rather than an absolute time.
    pub capture_delay: Duration,
    /// Default image count for a CAPTURE issued with no explicit count.
    pub capture_count: u32,
    /// Whether captures use the camera's video port by default.
    pub use_video_port: bool,
    /// Maximum allowed timestamp deviation between peers before `status()`
    /// flags a discrepancy.
    pub time_delta: Duration,
    /// Directory downloaded images are written into (used by the
    /// out-of-scope CLI/REPL, not by the core itself, but validated here
    /// since it travels with the rest of the run configuration).
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("prefix_len must be 0-32, got {0}")]
    InvalidPrefixLen(u8),
    #[error("udp_port must be nonzero")]
    ZeroPort,
    #[error("capture_count must be at least 1")]
    ZeroCaptureCount,
    #[error("timeout must be nonzero")]
    ZeroTimeout,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix_len > 32 {
            return Err(ConfigError::InvalidPrefixLen(self.prefix_len));
        }
        if self.udp_port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.capture_count == 0 {
            return Err(ConfigError::ZeroCaptureCount);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: Ipv4Addr::new(192, 168, 1, 0),
            prefix_len: 24,
            udp_port: crate::DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            timeout: crate::DEFAULT_TIMEOUT,
            capture_delay: Duration::from_millis(250),
            capture_count: 1,
            use_video_port: false,
            time_delta: Duration::from_millis(250),
            output_dir: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut cfg = Config::default();
        cfg.udp_port = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroPort)));
    }

    #[test]
    fn oversized_prefix_is_rejected() {
        let mut cfg = Config::default();
        cfg.prefix_len = 33;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPrefixLen(33))));
    }
}
