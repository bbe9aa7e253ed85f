use thiserror::Error;

use crate::host::HostError;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Invalid YAML format: {reason}")]
    InvalidYaml { reason: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Host {host} uses unknown gateway {gateway}")]
    UnknownGateway { host: String, gateway: String },

    #[error("Host {host} cannot use local host {gateway} as a gateway")]
    LocalGateway { host: String, gateway: String },

    #[error("Circular gateway dependency: {cycle:?}")]
    CircularGateway { cycle: Vec<String> },

    #[error("Local host {host} does not take connection parameters")]
    InvalidLocalHost { host: String },

    #[error("Unknown host: {host}")]
    UnknownHost { host: String },

    #[error("Unknown group: {group}")]
    UnknownGroup { group: String },

    #[error("Group {group} must contain exactly one host, found {count}")]
    NotSingleHost { group: String, count: usize },

    #[error(transparent)]
    Host(#[from] HostError),
}
