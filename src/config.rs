use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::input::DEFAULT_HOLD_TIMEOUT;
use crate::provider::ProviderKind;

pub const DEFAULT_PORT: u16 = 6485;
pub const DEFAULT_QUALITY: u8 = 50;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub provider: ProviderKind,
    /// Auto-release deadline for held keys and buttons
    pub hold_timeout: Duration,
    /// Delay between acknowledging a shutdown and stopping the server
    pub shutdown_grace: Duration,
    /// JPEG quality used when a capture does not name one
    pub default_quality: u8,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            provider: ProviderKind::Xdotool,
            hold_timeout: DEFAULT_HOLD_TIMEOUT,
            shutdown_grace: Duration::from_millis(500),
            default_quality: DEFAULT_QUALITY,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from `REMOTE_DESK_*` environment variables; unset or unparsable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind: env::var("REMOTE_DESK_BIND")
                .ok()
                .and_then(|b| b.parse().ok())
                .unwrap_or(defaults.bind),
            port: env::var("REMOTE_DESK_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            provider: env::var("REMOTE_DESK_PROVIDER")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.provider),
            hold_timeout: env::var("REMOTE_DESK_HOLD_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.hold_timeout),
            shutdown_grace: env::var("REMOTE_DESK_SHUTDOWN_GRACE_MS")
                .ok()
                .and_then(|t| t.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
            default_quality: env::var("REMOTE_DESK_DEFAULT_QUALITY")
                .ok()
                .and_then(|q| q.parse().ok())
                .filter(|q: &u8| (1..=100).contains(q))
                .unwrap_or(defaults.default_quality),
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}
