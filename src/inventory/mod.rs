//! YAML host inventory
//!
//! ```yaml
//! hosts:
//!   bastion:
//!     address: bastion.example.com
//!     user: jump
//!   web-1:
//!     address: 10.0.0.11
//!     gateway: bastion
//!     sudo: true
//!   controller:
//!     local: true
//! groups:
//!   web: [web-1]
//! ```

pub mod error;

pub use error::InventoryError;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::host::{Host, HostKeyPolicy, LocalHost, SshHost};

/// One host entry as written in the inventory file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSpec {
    #[serde(default)]
    pub local: bool,
    /// Defaults to the entry name
    pub address: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
    /// Seconds
    pub connect_timeout: Option<u64>,
    pub host_key_policy: Option<HostKeyPolicy>,
    #[serde(default)]
    pub sudo: bool,
    /// Name of another inventory entry to jump through
    pub gateway: Option<String>,
}

impl HostSpec {
    fn has_ssh_parameters(&self) -> bool {
        self.address.is_some()
            || self.user.is_some()
            || self.port.is_some()
            || self.password.is_some()
            || self.identity_file.is_some()
            || self.connect_timeout.is_some()
            || self.host_key_policy.is_some()
            || self.gateway.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InventoryFile {
    #[serde(default)]
    pub hosts: BTreeMap<String, HostSpec>,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    hosts: BTreeMap<String, Host>,
    groups: BTreeMap<String, Vec<String>>,
}

impl Inventory {
    pub async fn load(path: &Path) -> Result<Self, InventoryError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| InventoryError::FileNotFound {
                path: path.display().to_string(),
            })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, InventoryError> {
        let file: InventoryFile =
            serde_yaml::from_str(content).map_err(|e| InventoryError::InvalidYaml {
                reason: e.to_string(),
            })?;
        Self::from_file(file)
    }

    pub fn from_file(file: InventoryFile) -> Result<Self, InventoryError> {
        for (group, members) in &file.groups {
            if let Some(missing) = members.iter().find(|m| !file.hosts.contains_key(*m)) {
                return Err(InventoryError::UnknownHost {
                    host: format!("{missing} (group {group})"),
                });
            }
        }

        let mut resolver = Resolver {
            specs: &file.hosts,
            resolved: HashMap::new(),
            stack: Vec::new(),
        };

        let mut hosts = BTreeMap::new();
        for (name, spec) in &file.hosts {
            let host = if spec.local {
                if spec.has_ssh_parameters() {
                    return Err(InventoryError::InvalidLocalHost { host: name.clone() });
                }
                Host::Local(LocalHost::new().with_sudo(spec.sudo))
            } else {
                Host::Ssh(resolver.resolve(name)?.as_ref().clone())
            };
            hosts.insert(name.clone(), host);
        }

        Ok(Self {
            hosts,
            groups: file.groups,
        })
    }

    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    pub fn hosts(&self) -> impl Iterator<Item = (&str, &Host)> {
        self.hosts.iter().map(|(name, host)| (name.as_str(), host))
    }

    pub fn group(&self, group: &str) -> Result<Vec<&Host>, InventoryError> {
        let members = self
            .groups
            .get(group)
            .ok_or_else(|| InventoryError::UnknownGroup {
                group: group.to_string(),
            })?;

        members
            .iter()
            .map(|name| {
                self.hosts.get(name).ok_or_else(|| InventoryError::UnknownHost {
                    host: name.clone(),
                })
            })
            .collect()
    }

    /// The only host of `group`
    pub fn single(&self, group: &str) -> Result<&Host, InventoryError> {
        let hosts = self.group(group)?;
        match hosts.as_slice() {
            [host] => Ok(host),
            _ => Err(InventoryError::NotSingleHost {
                group: group.to_string(),
                count: hosts.len(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Depth-first construction of SSH hosts and their gateway chains
struct Resolver<'a> {
    specs: &'a BTreeMap<String, HostSpec>,
    resolved: HashMap<String, Arc<SshHost>>,
    stack: Vec<String>,
}

impl Resolver<'_> {
    fn resolve(&mut self, name: &str) -> Result<Arc<SshHost>, InventoryError> {
        if let Some(host) = self.resolved.get(name) {
            return Ok(host.clone());
        }

        if self.stack.iter().any(|n| n == name) {
            let mut cycle = self.stack.clone();
            cycle.push(name.to_string());
            return Err(InventoryError::CircularGateway { cycle });
        }

        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| InventoryError::UnknownHost {
                host: name.to_string(),
            })?;

        self.stack.push(name.to_string());
        let host = self.build(name, spec);
        self.stack.pop();

        let host = Arc::new(host?);
        self.resolved.insert(name.to_string(), host.clone());
        Ok(host)
    }

    fn build(&mut self, name: &str, spec: &HostSpec) -> Result<SshHost, InventoryError> {
        let address = spec.address.clone().unwrap_or_else(|| name.to_string());
        let mut host = SshHost::new(address)?.with_sudo(spec.sudo);

        if let Some(user) = &spec.user {
            host = host.with_user(user);
        }
        if let Some(port) = spec.port {
            host = host.with_port(port);
        }
        if let Some(password) = &spec.password {
            host = host.with_password(password);
        }
        if let Some(identity) = &spec.identity_file {
            host = host.with_identity_file(identity);
        }
        if let Some(secs) = spec.connect_timeout {
            host = host.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(policy) = spec.host_key_policy {
            host = host.with_host_key_policy(policy);
        }

        if let Some(gateway) = &spec.gateway {
            match self.specs.get(gateway) {
                None => {
                    return Err(InventoryError::UnknownGateway {
                        host: name.to_string(),
                        gateway: gateway.clone(),
                    })
                }
                Some(gateway_spec) if gateway_spec.local => {
                    return Err(InventoryError::LocalGateway {
                        host: name.to_string(),
                        gateway: gateway.clone(),
                    })
                }
                Some(_) => {}
            }
            host = host.with_gateway(self.resolve(gateway)?)?;
        }

        Ok(host)
    }
}
