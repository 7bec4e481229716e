//! Application configuration
//!
//! Loaded from a TOML file; every section falls back to defaults when absent.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::protocol::{BandwidthTier, Volume};

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "MULTIVIEW_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub coordinator: CoordinatorConfig,
    pub quality: QualityConfig,
    pub ui: UiConfig,
    pub simulation: SimulationConfig,
}

/// Shutdown bounds and event pumping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Interval between shutdown confirmation checks
    pub shutdown_poll_interval_ms: u64,
    /// Maximum confirmation checks before forcing
    pub shutdown_max_iterations: u32,
    /// Wall-time bound for the whole stop phase
    pub shutdown_timeout_ms: u64,
    /// How often the event pump drains engine events
    pub event_pump_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            shutdown_poll_interval_ms: DEFAULT_SHUTDOWN_POLL_MS,
            shutdown_max_iterations: DEFAULT_SHUTDOWN_MAX_ITERATIONS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            event_pump_interval_ms: DEFAULT_EVENT_PUMP_MS,
        }
    }
}

impl CoordinatorConfig {
    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn event_pump_interval(&self) -> Duration {
        Duration::from_millis(self.event_pump_interval_ms)
    }
}

/// Bandwidth ceilings and volume levels for the two tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Ceiling for the focused stream in bits per second
    pub focused_bandwidth_bps: u64,
    /// Ceiling for background tiles in bits per second
    pub background_bandwidth_bps: u64,
    /// Volume of the focused stream (0.0 - 1.0)
    pub full_volume: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            focused_bandwidth_bps: DEFAULT_FOCUSED_BANDWIDTH_BPS,
            background_bandwidth_bps: DEFAULT_BACKGROUND_BANDWIDTH_BPS,
            full_volume: 1.0,
        }
    }
}

impl QualityConfig {
    /// Bandwidth ceiling for a tier
    pub fn ceiling(&self, tier: BandwidthTier) -> u64 {
        match tier {
            BandwidthTier::Focused => self.focused_bandwidth_bps,
            BandwidthTier::Background => self.background_bandwidth_bps,
        }
    }

    /// Engine volume level for a routing choice
    pub fn level(&self, volume: Volume) -> f32 {
        match volume {
            Volume::Muted => 0.0,
            Volume::Full => self.full_volume,
        }
    }
}

/// Control API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Timing of the simulated engine used by the bundled binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Base buffering time before an open completes
    pub open_delay_ms: u64,
    /// Extra buffering time per session index, so streams become ready out of order
    pub open_jitter_ms: u64,
    /// Time until an asynchronous stop is confirmed
    pub stop_delay_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            open_delay_ms: 300,
            open_jitter_ms: 150,
            stop_delay_ms: 50,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Load from `MULTIVIEW_CONFIG` or the platform config dir, falling back to defaults
    pub fn load_or_default() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .or_else(Self::default_path);

        match path {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            _ => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Platform-specific config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "multiview")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject configurations the coordinator cannot honor
    pub fn validate(&self) -> Result<()> {
        let c = &self.coordinator;
        if c.shutdown_poll_interval_ms == 0 {
            return Err(Error::Config("shutdown_poll_interval_ms must be positive".into()));
        }
        if c.shutdown_max_iterations == 0 {
            return Err(Error::Config("shutdown_max_iterations must be positive".into()));
        }
        if c.shutdown_timeout_ms < c.shutdown_poll_interval_ms {
            return Err(Error::Config(
                "shutdown_timeout_ms must be at least one poll interval".into(),
            ));
        }
        if c.event_pump_interval_ms == 0 {
            return Err(Error::Config("event_pump_interval_ms must be positive".into()));
        }

        let q = &self.quality;
        if q.background_bandwidth_bps == 0 || q.focused_bandwidth_bps < q.background_bandwidth_bps {
            return Err(Error::Config(format!(
                "focused bandwidth ({}) must be at least background bandwidth ({}) and both positive",
                q.focused_bandwidth_bps, q.background_bandwidth_bps
            )));
        }
        if !(0.0..=1.0).contains(&q.full_volume) || q.full_volume == 0.0 {
            return Err(Error::Config(format!(
                "full_volume must be in (0.0, 1.0], got {}",
                q.full_volume
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quality.ceiling(BandwidthTier::Focused), DEFAULT_FOCUSED_BANDWIDTH_BPS);
        assert_eq!(config.quality.level(Volume::Muted), 0.0);
        assert_eq!(config.quality.level(Volume::Full), 1.0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let text = r#"
            [coordinator]
            shutdown_timeout_ms = 500

            [quality]
            background_bandwidth_bps = 250000
        "#;
        let config: AppConfig = toml::from_str(text).unwrap();

        assert_eq!(config.coordinator.shutdown_timeout_ms, 500);
        assert_eq!(config.coordinator.shutdown_poll_interval_ms, DEFAULT_SHUTDOWN_POLL_MS);
        assert_eq!(config.quality.background_bandwidth_bps, 250_000);
        assert_eq!(config.quality.focused_bandwidth_bps, DEFAULT_FOCUSED_BANDWIDTH_BPS);
        assert_eq!(config.ui, UiConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("multiview-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let mut config = AppConfig::default();
        config.ui.http_port = 9191;
        config.coordinator.shutdown_max_iterations = 7;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.quality.focused_bandwidth_bps = 10;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.coordinator.shutdown_max_iterations = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.coordinator.shutdown_timeout_ms = 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.quality.full_volume = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = std::env::temp_dir().join(format!("multiview-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.toml");
        std::fs::write(&path, "[coordinator\nshutdown_timeout_ms = ").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(Error::Config(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
