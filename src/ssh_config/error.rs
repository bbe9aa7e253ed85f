use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ProxyJump for {host} ({file}:{line}) is not supported, use a gateway host instead")]
    ProxyJumpUnsupported {
        host: String,
        file: PathBuf,
        line: usize,
    },

    #[error("Invalid value '{value}' for {key} at {file}:{line}")]
    InvalidValue {
        key: String,
        value: String,
        file: PathBuf,
        line: usize,
    },

    #[error("Missing value for {key} at {file}:{line}")]
    MissingValue {
        key: String,
        file: PathBuf,
        line: usize,
    },

    #[error("Invalid host pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
