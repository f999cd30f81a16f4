//! Error type for the fallible boundaries of the engine: device calls and
//! configuration / state files. Numeric transforms never fail; they clamp.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanoscopeError {
    #[error("device error: {0}")]
    Device(String),
    #[error("no device connected")]
    DeviceDisconnected,
    #[error("command queue closed")]
    QueueClosed,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, PanoscopeError>;
