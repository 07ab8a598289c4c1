pub mod candidates;
pub mod interface;
pub mod lines;

pub use candidates::build_candidates;
pub use interface::{list_available_ports, NativeLink, PortOpener, ScaleLink, SystemPorts};
pub use lines::LineAssembler;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Parity setting of a serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
    #[serde(rename = "N")]
    None,
    #[serde(rename = "E")]
    Even,
    #[serde(rename = "O")]
    Odd,
    #[serde(rename = "M")]
    Mark,
    #[serde(rename = "S")]
    Space,
}

impl Parity {
    pub fn as_letter(&self) -> &'static str {
        match self {
            Parity::None => "N",
            Parity::Even => "E",
            Parity::Odd => "O",
            Parity::Mark => "M",
            Parity::Space => "S",
        }
    }
}

impl Default for Parity {
    fn default() -> Self {
        Parity::None
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_letter())
    }
}

impl FromStr for Parity {
    type Err = String;

    /// Accepts the single-letter form used by indicator manuals ("N", "E", ...)
    /// as well as the spelled-out names, case-insensitively.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" | "NONE" => Ok(Parity::None),
            "E" | "EVEN" => Ok(Parity::Even),
            "O" | "ODD" => Ok(Parity::Odd),
            "M" | "MARK" => Ok(Parity::Mark),
            "S" | "SPACE" => Ok(Parity::Space),
            other => Err(format!("unknown parity '{}'", other)),
        }
    }
}

/// One complete set of serial line parameters.
/// Compared by value; two configs with the same line settings on the same port are the same probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
    pub bytesize: u8,
    pub stopbits: u8,
    pub parity: Parity,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>, baudrate: u32, bytesize: u8, stopbits: u8, parity: Parity) -> Self {
        Self {
            port: port.into(),
            baudrate,
            bytesize,
            stopbits,
            parity,
        }
    }

    /// Line settings without the port, used to deduplicate probe candidates
    pub fn line_key(&self) -> (u32, u8, Parity, u8) {
        (self.baudrate, self.bytesize, self.parity, self.stopbits)
    }
}

impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} {}{}{}",
            self.port, self.baudrate, self.bytesize, self.parity, self.stopbits
        )
    }
}

/// A serial device visible to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailablePort {
    pub port: String,
    pub description: String,
    pub hwid: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Communication timeout")]
    Timeout,

    #[error("Device not connected")]
    NotConnected,

    #[error("Parity {0} is not supported by the serial backend")]
    UnsupportedParity(Parity),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
