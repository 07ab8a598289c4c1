pub mod manager;
pub mod models;
pub mod parser;
pub mod poller;
pub mod status;

pub use manager::ScaleConnection;
pub use models::*;
pub use parser::{parse_scale_line, ParsedLine};
pub use status::StatusStore;

#[derive(Debug, thiserror::Error)]
pub enum ScaleError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("No Tokio runtime available to run the connection task")]
    NoRuntime,

    #[error("Serial communication error: {0}")]
    SerialError(#[from] crate::serial::SerialError),
}

pub type Result<T> = std::result::Result<T, ScaleError>;
