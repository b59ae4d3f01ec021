use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub system: SystemConfig,
    pub display: DisplayConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MonitorSource {
    #[default]
    System,
    Replay,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub source: MonitorSource,
    pub poll_interval_ms: u64,
    /// Replay script, required when `source = "replay"`.
    pub replay: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            source: MonitorSource::System,
            poll_interval_ms: 1000,
            replay: None,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Knobs for path attributes the kernel does not expose.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SystemConfig {
    pub metered_interfaces: Vec<String>,
    pub constrained_interfaces: Vec<String>,
    pub low_data_mode: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub tick_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { tick_ms: 250 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "monitor.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.display.tick_ms == 0 {
            return Err(ConfigError::Invalid(
                "display.tick_ms must be greater than zero".to_string(),
            ));
        }
        if self.monitor.source == MonitorSource::Replay && self.monitor.replay.is_none() {
            return Err(ConfigError::Invalid(
                "monitor.replay is required when source = \"replay\"".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
