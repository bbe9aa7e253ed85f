use thiserror::Error;

use crate::host::HostError;
use crate::ssh_config::ConfigError;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Host {host} is unreachable: {reason}")]
    Unreachable { host: String, reason: String },

    #[error("Authentication failed for {user}@{host}")]
    AuthenticationFailed { host: String, user: String },

    #[error("Host key for {host} does not match known_hosts line {line}")]
    HostKeyMismatch { host: String, line: usize },

    #[error("Host key for {host} is not in known_hosts and the policy rejects unknown keys")]
    UnknownHostKey { host: String },

    #[error("Connecting to {host} timed out after {timeout_secs}s")]
    Timeout { host: String, timeout_secs: u64 },

    #[error("Proxy command `{command}` failed: {reason}")]
    ProxyCommand { command: String, reason: String },

    #[error("SSH channel closed before the command finished")]
    ChannelClosed,

    #[error("File operation on {path} failed: {reason}")]
    RemoteIo { path: String, reason: String },

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Keys(#[from] russh_keys::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Host(#[from] HostError),
}
