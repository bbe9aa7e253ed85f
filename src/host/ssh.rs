use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::error::HostError;
use super::gateway::GatewayChain;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// What to do with a server key that is missing from known_hosts
///
/// A key that is present but different is always rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Record the key in known_hosts and continue
    #[default]
    AcceptNew,
    /// Refuse to connect
    RejectUnknown,
    /// Log a warning and continue without recording the key
    WarnOnly,
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    /// Accepts both policy names and OpenSSH `StrictHostKeyChecking` values.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accept-new" => Ok(HostKeyPolicy::AcceptNew),
            "reject-unknown" | "yes" | "ask" => Ok(HostKeyPolicy::RejectUnknown),
            "warn-only" | "no" | "off" => Ok(HostKeyPolicy::WarnOnly),
            _ => Err(format!("Unsupported host key policy: {s}")),
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostKeyPolicy::AcceptNew => "accept-new",
            HostKeyPolicy::RejectUnknown => "reject-unknown",
            HostKeyPolicy::WarnOnly => "warn-only",
        };
        f.write_str(name)
    }
}

/// Remote host reached over SSH
///
/// Every `Option` field left unset falls back to the matching ssh_config
/// directive, then to the built-in default.
#[derive(Debug, Clone)]
pub struct SshHost {
    addr: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Option<Duration>,
    pub host_key_policy: Option<HostKeyPolicy>,
    pub use_sudo: bool,
    gateway: Option<Arc<SshHost>>,
}

impl SshHost {
    pub fn new(addr: impl Into<String>) -> Result<Self, HostError> {
        let addr = addr.into();
        validate_addr(&addr)?;

        Ok(Self {
            addr,
            port: None,
            user: None,
            password: None,
            identity_file: None,
            connect_timeout: None,
            host_key_policy: None,
            use_sudo: false,
            gateway: None,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn gateway(&self) -> Option<&SshHost> {
        self.gateway.as_deref()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = Some(policy);
        self
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    /// Route this host through `gateway`, validating the resulting chain
    pub fn with_gateway(self, gateway: impl Into<Arc<SshHost>>) -> Result<Self, HostError> {
        let host = Self {
            gateway: Some(gateway.into()),
            ..self
        };
        GatewayChain::of(&host)?;
        Ok(host)
    }

    /// `user@addr:port` using only explicit values, for identification
    pub fn endpoint(&self) -> String {
        let port = self.port.unwrap_or(DEFAULT_SSH_PORT);
        match &self.user {
            Some(user) => format!("{user}@{}:{port}", self.addr),
            None => format!("{}:{port}", self.addr),
        }
    }
}

fn validate_addr(addr: &str) -> Result<(), HostError> {
    if addr.is_empty() {
        return Err(HostError::EmptyAddress);
    }
    if addr.contains('@') {
        return Err(HostError::AddressContainsUser {
            addr: addr.to_string(),
        });
    }
    // Bare IPv6 literals legitimately contain colons
    if addr.contains(':') && addr.parse::<Ipv6Addr>().is_err() {
        return Err(HostError::AddressContainsPort {
            addr: addr.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validation() {
        assert!(SshHost::new("1.2.3.4").is_ok());
        assert!(SshHost::new("abc.example").is_ok());
        assert!(SshHost::new("::1").is_ok());

        assert!(matches!(
            SshHost::new("root@1.2.3.4"),
            Err(HostError::AddressContainsUser { .. })
        ));
        assert!(matches!(
            SshHost::new("1.2.3.4:22"),
            Err(HostError::AddressContainsPort { .. })
        ));
        assert!(matches!(SshHost::new(""), Err(HostError::EmptyAddress)));
    }

    #[test]
    fn test_host_key_policy_parsing() {
        assert_eq!(
            "accept-new".parse::<HostKeyPolicy>().unwrap(),
            HostKeyPolicy::AcceptNew
        );
        assert_eq!(
            "yes".parse::<HostKeyPolicy>().unwrap(),
            HostKeyPolicy::RejectUnknown
        );
        assert_eq!(
            "no".parse::<HostKeyPolicy>().unwrap(),
            HostKeyPolicy::WarnOnly
        );
        assert!("maybe".parse::<HostKeyPolicy>().is_err());
        assert_eq!(HostKeyPolicy::default(), HostKeyPolicy::AcceptNew);
    }

    #[test]
    fn test_endpoint() {
        let host = SshHost::new("example.com")
            .unwrap()
            .with_user("deploy")
            .with_port(2222);
        assert_eq!(host.endpoint(), "deploy@example.com:2222");
        assert_eq!(SshHost::new("example.com").unwrap().endpoint(), "example.com:22");
    }
}
