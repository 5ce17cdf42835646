//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - PollingConfig: How often the sampling loop runs.
//!     - SensorConfig: ADC address (hardware) and the mock centre sample.
//!     - IndicatorConfig: GPIO pin driven by the threshold controller.
//!     - StorageConfig: Where the non-volatile store lives and how big it is.
//!     - HistoryConfig / ServerConfig / ClockConfig / LoggingConfig.
//!
//! every section has defaults, so a partial file only overrides what it names.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HostConfig {
    pub polling: PollingConfig,
    pub sensor: SensorConfig,
    pub indicator: IndicatorConfig,
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub server: ServerConfig,
    pub clock: ClockConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorConfig {
    /// I2C address of the external 12-bit ADC (hardware builds only)
    pub i2c_address: String,
    /// raw sample the mock HAL sweeps around
    pub mock_raw_sample: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndicatorConfig {
    pub gpio_pin: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub namespace: String,
    /// maximum number of keys the store accepts before reporting it is full
    pub max_entries: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub window: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClockConfig {
    pub utc_offset_hours: i32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_seconds: 2 }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self { i2c_address: "0x4D".to_string(), mock_raw_sample: 1450 }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self { gpio_pin: 4 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data").join("temp_mem.json"),
            namespace: "temp_mem".to_string(),
            max_entries: 512,
            timeout_ms: 500,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { window: 10 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { utc_offset_hours: 1 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: HostConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("host.toml"),
            PathBuf::from("..").join("config").join("host.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        info!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("[CONFIG] Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        warn!("[CONFIG] No config file found - using defaults");
        Self::default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_seconds.max(1))
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.timeout_ms.max(1))
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        info!("┌─────────────────────────────────────────┐");
        info!("│           HOST CONFIGURATION            │");
        info!("├─────────────────────────────────────────┤");
        info!("│ Poll Interval: {}s", self.polling.interval_seconds);
        info!("│ Indicator GPIO: {}", self.indicator.gpio_pin);
        info!("│ Store: {} ({} entries max)", self.storage.path.display(), self.storage.max_entries);
        info!("│ History Window: {}", self.history.window);
        info!("│ Listening: {}", self.server.bind);
        info!("│ Log Level: {}", self.logging.level);
        info!("└─────────────────────────────────────────┘");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device() {
        let config = HostConfig::default();
        assert_eq!(config.polling.interval_seconds, 2);
        assert_eq!(config.indicator.gpio_pin, 4);
        assert_eq!(config.history.window, 10);
        assert_eq!(config.storage.namespace, "temp_mem");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: HostConfig = toml::from_str(
            r#"
[polling]
interval_seconds = 5

[storage]
max_entries = 32
"#,
        )
        .unwrap();

        assert_eq!(config.polling.interval_seconds, 5);
        assert_eq!(config.storage.max_entries, 32);
        assert_eq!(config.storage.timeout_ms, 500);
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let mut config = HostConfig::default();
        config.polling.interval_seconds = 0;
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
