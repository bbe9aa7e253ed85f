//! Host descriptors for local and SSH targets
//!
//! A [`Host`] only describes how to reach a machine. Opening a session is the
//! job of [`crate::connection`].

pub mod error;
pub mod gateway;
mod ssh;

pub use error::HostError;
pub use gateway::{proxy_command, GatewayChain, MAX_GATEWAY_DEPTH};
pub use ssh::{HostKeyPolicy, SshHost, DEFAULT_SSH_PORT};

use std::fmt;
use std::hash::{Hash, Hasher};

/// Address reported by the local host
pub const LOCALHOST_ADDR: &str = "localhost";

/// Machine a connection can be opened against
#[derive(Debug, Clone)]
pub enum Host {
    Local(LocalHost),
    Ssh(SshHost),
}

/// The controller itself, reached through OS subprocesses
#[derive(Debug, Clone, Default)]
pub struct LocalHost {
    pub use_sudo: bool,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }
}

impl Host {
    pub fn local() -> Self {
        Host::Local(LocalHost::default())
    }

    pub fn addr(&self) -> &str {
        match self {
            Host::Local(_) => LOCALHOST_ADDR,
            Host::Ssh(ssh) => ssh.addr(),
        }
    }

    pub fn use_sudo(&self) -> bool {
        match self {
            Host::Local(local) => local.use_sudo,
            Host::Ssh(ssh) => ssh.use_sudo,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Host::Local(_))
    }

    pub fn as_ssh(&self) -> Option<&SshHost> {
        match self {
            Host::Ssh(ssh) => Some(ssh),
            Host::Local(_) => None,
        }
    }
}

impl From<LocalHost> for Host {
    fn from(host: LocalHost) -> Self {
        Host::Local(host)
    }
}

impl From<SshHost> for Host {
    fn from(host: SshHost) -> Self {
        Host::Ssh(host)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "🖥 {}", self.addr())
    }
}

// Hosts are identified by address, matching how facts are keyed.
impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}
