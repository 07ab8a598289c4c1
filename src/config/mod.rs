use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::serial::{Parity, SerialConfig};

/// Environment variable naming an optional JSON settings file
pub const CONFIG_PATH_ENV: &str = "SCALE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    Parse(#[from] anyhow::Error),

    #[error("Invalid scale configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Scale connection settings, fixed once the connection is constructed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleSettings {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default = "default_bytesize")]
    pub bytesize: u8,
    #[serde(default = "default_stopbits")]
    pub stopbits: u8,
    #[serde(default = "default_parity")]
    pub parity: String, // "N" | "E" | "O" | "M" | "S"
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_true")]
    pub enable_poll: bool,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> String {
    "COM3".to_string()
}

fn default_baudrate() -> u32 {
    2400
}

fn default_bytesize() -> u8 {
    8
}

fn default_stopbits() -> u8 {
    1
}

fn default_parity() -> String {
    "N".to_string()
}

fn default_reconnect_ms() -> u64 {
    3000
}

fn default_poll_ms() -> u64 {
    1000
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_open_timeout_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ScaleSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            baudrate: default_baudrate(),
            bytesize: default_bytesize(),
            stopbits: default_stopbits(),
            parity: default_parity(),
            reconnect_ms: default_reconnect_ms(),
            poll_ms: default_poll_ms(),
            enable_poll: true,
            read_timeout_ms: default_read_timeout_ms(),
            open_timeout_ms: default_open_timeout_ms(),
            auto_start: true,
            log_level: default_log_level(),
        }
    }
}

impl ScaleSettings {
    /// Defaults, then the JSON file named by `SCALE_CONFIG` (if set), then `SCALE_*` variables
    pub fn load() -> Result<Self> {
        let mut settings = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings to run with after `load()`: on failure the defaults, never auto-started,
    /// together with the error so it can be reported once logging is up
    pub fn or_fallback(loaded: Result<Self>) -> (Self, Option<ConfigError>) {
        match loaded {
            Ok(settings) => (settings, None),
            Err(e) => (
                Self {
                    auto_start: false,
                    ..Self::default()
                },
                Some(e),
            ),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Override fields from `SCALE_*` style keys resolved through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("SCALE_PORT") {
            self.port = port;
        }
        if let Some(parity) = lookup("SCALE_PARITY") {
            self.parity = parity;
        }
        if let Some(level) = lookup("SCALE_LOG_LEVEL") {
            self.log_level = level;
        }
        override_parsed(&lookup, "SCALE_BAUDRATE", &mut self.baudrate)?;
        override_parsed(&lookup, "SCALE_BYTESIZE", &mut self.bytesize)?;
        override_parsed(&lookup, "SCALE_STOPBITS", &mut self.stopbits)?;
        override_parsed(&lookup, "SCALE_RECONNECT_MS", &mut self.reconnect_ms)?;
        override_parsed(&lookup, "SCALE_POLL_MS", &mut self.poll_ms)?;
        override_parsed(&lookup, "SCALE_READ_TIMEOUT_MS", &mut self.read_timeout_ms)?;
        override_parsed(&lookup, "SCALE_OPEN_TIMEOUT_MS", &mut self.open_timeout_ms)?;
        override_flag(&lookup, "SCALE_ENABLE_POLL", &mut self.enable_poll)?;
        override_flag(&lookup, "SCALE_AUTO_START", &mut self.auto_start)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::Invalid("port must not be empty".to_string()));
        }
        if self.baudrate == 0 {
            return Err(ConfigError::Invalid("baudrate must be positive".to_string()));
        }
        if !(5..=8).contains(&self.bytesize) {
            return Err(ConfigError::Invalid(format!("bytesize {} outside 5-8", self.bytesize)));
        }
        if !(1..=2).contains(&self.stopbits) {
            return Err(ConfigError::Invalid(format!("stopbits {} outside 1-2", self.stopbits)));
        }
        for (name, value) in [
            ("reconnect_ms", self.reconnect_ms),
            ("poll_ms", self.poll_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("open_timeout_ms", self.open_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        self.parity_setting()?;
        Ok(())
    }

    pub fn parity_setting(&self) -> Result<Parity> {
        Parity::from_str(&self.parity).map_err(ConfigError::Invalid)
    }

    /// The configured line settings, probed first
    pub fn base_config(&self) -> Result<SerialConfig> {
        Ok(SerialConfig::new(
            self.port.clone(),
            self.baudrate,
            self.bytesize,
            self.stopbits,
            self.parity_setting()?,
        ))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        log::LevelFilter::from_str(&self.log_level).unwrap_or(log::LevelFilter::Info)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}='{}': {}", key, raw, e))?;
    }
    Ok(())
}

fn override_flag<F>(lookup: &F, key: &str, target: &mut bool) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => return Err(anyhow!("{}='{}': expected a boolean", key, raw).into()),
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_indicator_factory_settings() {
        let settings = ScaleSettings::default();
        assert!(settings.validate().is_ok());
        let base = settings.base_config().unwrap();
        assert_eq!(base, SerialConfig::new("COM3", 2400, 8, 1, Parity::None));
        assert_eq!(settings.reconnect_interval(), Duration::from_millis(3000));
        assert!(settings.enable_poll);
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = ScaleSettings::default();
        settings
            .apply_overrides(lookup_from(&[
                ("SCALE_PORT", "/dev/ttyS1"),
                ("SCALE_BAUDRATE", "9600"),
                ("SCALE_PARITY", "even"),
                ("SCALE_ENABLE_POLL", "off"),
            ]))
            .unwrap();
        assert_eq!(settings.port, "/dev/ttyS1");
        assert_eq!(settings.baudrate, 9600);
        assert_eq!(settings.parity_setting().unwrap(), Parity::Even);
        assert!(!settings.enable_poll);
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut settings = ScaleSettings::default();
        let err = settings
            .apply_overrides(lookup_from(&[("SCALE_BAUDRATE", "fast")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_ranges() {
        let settings = ScaleSettings { bytesize: 9, ..ScaleSettings::default() };
        assert!(settings.validate().is_err());
        let settings = ScaleSettings { stopbits: 0, ..ScaleSettings::default() };
        assert!(settings.validate().is_err());
        let settings = ScaleSettings { parity: "Q".to_string(), ..ScaleSettings::default() };
        assert!(settings.validate().is_err());
        let settings = ScaleSettings { reconnect_ms: 0, ..ScaleSettings::default() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejected_settings_fall_back_without_auto_start() {
        let bad = ScaleSettings { bytesize: 12, ..ScaleSettings::default() };
        let (settings, error) = ScaleSettings::or_fallback(bad.validate().map(|_| bad.clone()));
        assert!(matches!(error, Some(ConfigError::Invalid(_))));
        assert!(!settings.auto_start);
        assert_eq!(settings.port, "COM3");

        let good = ScaleSettings { port: "COM9".to_string(), ..ScaleSettings::default() };
        let (settings, error) = ScaleSettings::or_fallback(Ok(good.clone()));
        assert!(error.is_none());
        assert_eq!(settings, good);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: ScaleSettings = serde_json::from_str(r#"{"port": "COM7", "poll_ms": 250}"#).unwrap();
        assert_eq!(settings.port, "COM7");
        assert_eq!(settings.poll_ms, 250);
        assert_eq!(settings.baudrate, 2400);
        assert!(settings.auto_start);
    }
}
