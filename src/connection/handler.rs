//! russh client handler enforcing the host-key policy

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use std::path::PathBuf;
use tracing::{info, warn};

use super::error::ConnectionError;
use crate::host::HostKeyPolicy;

/// Where a server key stands relative to known_hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownHostStatus {
    Match,
    Unknown,
    Changed { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecision {
    Accept,
    Learn,
    AcceptWithWarning,
    RejectUnknown,
    RejectChanged { line: usize },
}

/// A changed key is rejected under every policy
pub fn decide(policy: HostKeyPolicy, status: KnownHostStatus) -> KeyDecision {
    match (status, policy) {
        (KnownHostStatus::Match, _) => KeyDecision::Accept,
        (KnownHostStatus::Changed { line }, _) => KeyDecision::RejectChanged { line },
        (KnownHostStatus::Unknown, HostKeyPolicy::AcceptNew) => KeyDecision::Learn,
        (KnownHostStatus::Unknown, HostKeyPolicy::RejectUnknown) => KeyDecision::RejectUnknown,
        (KnownHostStatus::Unknown, HostKeyPolicy::WarnOnly) => KeyDecision::AcceptWithWarning,
    }
}

pub struct ClientHandler {
    hostname: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Option<PathBuf>,
}

impl ClientHandler {
    pub fn new(
        hostname: impl Into<String>,
        port: u16,
        policy: HostKeyPolicy,
        known_hosts: Option<PathBuf>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            policy,
            known_hosts,
        }
    }

    fn lookup(&self, key: &PublicKey) -> Result<KnownHostStatus, ConnectionError> {
        let Some(path) = &self.known_hosts else {
            return Ok(KnownHostStatus::Unknown);
        };

        match russh_keys::check_known_hosts_path(&self.hostname, self.port, key, path) {
            Ok(true) => Ok(KnownHostStatus::Match),
            Ok(false) => Ok(KnownHostStatus::Unknown),
            Err(russh_keys::Error::KeyChanged { line }) => Ok(KnownHostStatus::Changed { line }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = ConnectionError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let status = self.lookup(server_public_key)?;

        match decide(self.policy, status) {
            KeyDecision::Accept => Ok(true),
            KeyDecision::Learn => {
                if let Some(path) = &self.known_hosts {
                    russh_keys::learn_known_hosts_path(
                        &self.hostname,
                        self.port,
                        server_public_key,
                        path,
                    )?;
                    info!("Added host key for {} to {}", self.hostname, path.display());
                }
                Ok(true)
            }
            KeyDecision::AcceptWithWarning => {
                warn!(
                    "Unknown host key for {}:{}, continuing without recording it",
                    self.hostname, self.port
                );
                Ok(true)
            }
            KeyDecision::RejectUnknown => Err(ConnectionError::UnknownHostKey {
                host: self.hostname.clone(),
            }),
            KeyDecision::RejectChanged { line } => Err(ConnectionError::HostKeyMismatch {
                host: self.hostname.clone(),
                line,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_key_always_rejected() {
        for policy in [
            HostKeyPolicy::AcceptNew,
            HostKeyPolicy::RejectUnknown,
            HostKeyPolicy::WarnOnly,
        ] {
            assert_eq!(
                decide(policy, KnownHostStatus::Changed { line: 4 }),
                KeyDecision::RejectChanged { line: 4 }
            );
        }
    }

    #[test]
    fn test_unknown_key_follows_policy() {
        assert_eq!(
            decide(HostKeyPolicy::AcceptNew, KnownHostStatus::Unknown),
            KeyDecision::Learn
        );
        assert_eq!(
            decide(HostKeyPolicy::RejectUnknown, KnownHostStatus::Unknown),
            KeyDecision::RejectUnknown
        );
        assert_eq!(
            decide(HostKeyPolicy::WarnOnly, KnownHostStatus::Unknown),
            KeyDecision::AcceptWithWarning
        );
    }

    #[test]
    fn test_known_key_accepted() {
        assert_eq!(
            decide(HostKeyPolicy::RejectUnknown, KnownHostStatus::Match),
            KeyDecision::Accept
        );
    }
}
