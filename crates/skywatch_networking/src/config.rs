//! # Configuration
//!
//! TOML-backed settings for both sides of the sync, loaded once at startup.
//!
//! ```toml
//! [server]
//! sample_period_ms = 3000
//! bind_address = "0.0.0.0:7788"
//! subscription_timeout_ms = 15000
//!
//! [spectator]
//! server_address = "127.0.0.1:7788"
//! interpolated_axes = "planar"
//! resubscribe_interval_ms = 5000
//! ```
//!
//! Every field has a default, so an empty file is a valid config.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skywatch_core::AxisMask;

use crate::error::{SyncError, SyncResult};
use crate::{
    DEFAULT_PORT, DEFAULT_RESUBSCRIBE_INTERVAL_MS, DEFAULT_SAMPLE_PERIOD_MS,
    DEFAULT_SUBSCRIPTION_TIMEOUT_MS,
};

/// Complete sync configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Authoritative side.
    pub server: ServerConfig,
    /// Observer side.
    pub spectator: SpectatorConfig,
}

impl SyncConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConfigParse`] if the text is not valid TOML for
    /// this layout, or [`SyncError::InvalidConfig`] if a value is out of range.
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`SyncConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] naming the first zero period,
    /// capacity, timeout or interval.
    pub fn validate(&self) -> SyncResult<()> {
        self.server.validate()?;
        self.spectator.validate()?;
        if self.spectator.resubscribe_interval_ms >= self.server.subscription_timeout_ms {
            return Err(SyncError::InvalidConfig(
                "spectator.resubscribe_interval_ms must be shorter than server.subscription_timeout_ms"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Authoritative-side settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Sampling period `P` in milliseconds.
    pub sample_period_ms: u64,
    /// UDP address to accept subscriptions on.
    pub bind_address: SocketAddr,
    /// Queue depth for each in-process observer.
    pub observer_queue_capacity: usize,
    /// Maximum number of registered observers.
    pub max_observers: usize,
    /// How long a remote subscription lasts without a renewing `Subscribe`.
    pub subscription_timeout_ms: u64,
}

impl ServerConfig {
    /// The sampling period as a [`Duration`].
    #[must_use]
    pub const fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    /// The subscription lease as a [`Duration`].
    #[must_use]
    pub const fn subscription_timeout(&self) -> Duration {
        Duration::from_millis(self.subscription_timeout_ms)
    }

    fn validate(&self) -> SyncResult<()> {
        if self.sample_period_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "server.sample_period_ms must be greater than zero".into(),
            ));
        }
        if self.observer_queue_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "server.observer_queue_capacity must be greater than zero".into(),
            ));
        }
        if self.max_observers == 0 {
            return Err(SyncError::InvalidConfig(
                "server.max_observers must be greater than zero".into(),
            ));
        }
        if self.subscription_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "server.subscription_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: DEFAULT_SAMPLE_PERIOD_MS,
            bind_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            observer_queue_capacity: 4,
            max_observers: 256,
            subscription_timeout_ms: DEFAULT_SUBSCRIPTION_TIMEOUT_MS,
        }
    }
}

/// Observer-side settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectatorConfig {
    /// Where to send subscriptions.
    pub server_address: SocketAddr,
    /// Local UDP address to receive snapshots on.
    pub bind_address: SocketAddr,
    /// Axes the interpolator blends.
    pub interpolated_axes: AxisMask,
    /// How often a receiving spectator renews its subscription.
    pub resubscribe_interval_ms: u64,
}

impl SpectatorConfig {
    /// The renewal interval as a [`Duration`].
    #[must_use]
    pub const fn resubscribe_interval(&self) -> Duration {
        Duration::from_millis(self.resubscribe_interval_ms)
    }

    fn validate(&self) -> SyncResult<()> {
        if self.resubscribe_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "spectator.resubscribe_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SpectatorConfig {
    fn default() -> Self {
        Self {
            server_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            bind_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            interpolated_axes: AxisMask::ALL,
            resubscribe_interval_ms: DEFAULT_RESUBSCRIBE_INTERVAL_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SyncConfig::from_toml_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.server.sample_period(), Duration::from_millis(3000));
        assert_eq!(config.spectator.interpolated_axes, AxisMask::ALL);
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            [server]
            sample_period_ms = 500
            bind_address = "127.0.0.1:9000"
            observer_queue_capacity = 2
            max_observers = 8

            [spectator]
            server_address = "10.0.0.5:9000"
            bind_address = "0.0.0.0:9001"
            interpolated_axes = "planar"
        "#;
        let config = SyncConfig::from_toml_str(text).unwrap();
        assert_eq!(config.server.sample_period_ms, 500);
        assert_eq!(config.server.bind_address, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.server.max_observers, 8);
        assert_eq!(config.spectator.interpolated_axes, AxisMask::PLANAR);
    }

    #[test]
    fn test_axis_letters() {
        let text = r#"
            [spectator]
            interpolated_axes = "x"
        "#;
        let config = SyncConfig::from_toml_str(text).unwrap();
        assert_eq!(
            config.spectator.interpolated_axes,
            AxisMask { x: true, y: false, z: false }
        );
    }

    #[test]
    fn test_lease_settings() {
        let text = r"
            [server]
            subscription_timeout_ms = 9000

            [spectator]
            resubscribe_interval_ms = 2000
        ";
        let config = SyncConfig::from_toml_str(text).unwrap();
        assert_eq!(config.server.subscription_timeout(), Duration::from_secs(9));
        assert_eq!(config.spectator.resubscribe_interval(), Duration::from_secs(2));

        let err = SyncConfig::from_toml_str("[spectator]\nresubscribe_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
        let err = SyncConfig::from_toml_str("[server]\nsubscription_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn test_renewal_must_beat_lease() {
        let text = r"
            [server]
            subscription_timeout_ms = 4000

            [spectator]
            resubscribe_interval_ms = 4000
        ";
        let err = SyncConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_period_rejected() {
        let err = SyncConfig::from_toml_str("[server]\nsample_period_ms = 0\n").unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_axis_preset_rejected() {
        let err = SyncConfig::from_toml_str("[spectator]\ninterpolated_axes = \"sideways\"\n")
            .unwrap_err();
        assert!(matches!(err, SyncError::ConfigParse(_)));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = SyncConfig::default();
        config.spectator.interpolated_axes = AxisMask { x: true, y: false, z: true };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(SyncConfig::from_toml_str(&text).unwrap(), config);
    }
}
