use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serial::SerialConfig;

/// Stability token reported by the indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stability {
    #[serde(rename = "ST")]
    Stable,
    #[serde(rename = "US")]
    Unstable,
}

impl Stability {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "ST" => Some(Stability::Stable),
            "US" => Some(Stability::Unstable),
            _ => None,
        }
    }
}

/// Net or gross weighing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeighMode {
    #[serde(rename = "NT")]
    Net,
    #[serde(rename = "GS")]
    Gross,
}

impl WeighMode {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "NT" => Some(WeighMode::Net),
            "GS" => Some(WeighMode::Gross),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    Kg,
    G,
    Lb,
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WeightUnit::Kg => "kg",
            WeightUnit::G => "g",
            WeightUnit::Lb => "lb",
        })
    }
}

/// One accepted weight reading. Replaced as a whole, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleReading {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default = "reading_kind")]
    pub kind: String,
    /// Packet count at the time the line arrived
    #[serde(rename = "packet")]
    pub sequence: u64,
    pub stability: Option<Stability>,
    pub mode: Option<WeighMode>,
    pub stable: bool,
    #[serde(rename = "weight")]
    pub weight_value: f64,
    pub unit: WeightUnit,
    #[serde(rename = "raw")]
    pub raw_line: String,
}

fn reading_kind() -> String {
    "weight".to_string()
}

impl ScaleReading {
    pub fn from_parsed(parsed: super::ParsedLine, sequence: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: reading_kind(),
            sequence,
            stability: parsed.stability,
            mode: parsed.mode,
            stable: parsed.stable,
            weight_value: parsed.value,
            unit: parsed.unit,
            raw_line: parsed.raw,
        }
    }
}

/// Point-in-time view of a scale connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(rename = "port")]
    pub configured_port: String,
    #[serde(rename = "baudrate")]
    pub configured_baudrate: u32,
    pub active_config: Option<SerialConfig>,
    pub packet_count: u64,
    pub last_reading: Option<ScaleReading>,
}

/// Lifecycle position of the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerState {
    Idle,
    Probing,
    Connected,
}

/// Short liveness summary of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleHealth {
    pub healthy: bool,
    pub connected: bool,
    pub port: String,
    pub packet_count: u64,
    pub last_reading_available: bool,
}

impl From<&ConnectionStatus> for ScaleHealth {
    fn from(status: &ConnectionStatus) -> Self {
        Self {
            healthy: status.connected,
            connected: status.connected,
            port: status.configured_port.clone(),
            packet_count: status.packet_count,
            last_reading_available: status.last_reading.is_some(),
        }
    }
}
