//! Layered resolution of SSH connection profiles

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::ConfigError;
use super::parser::SshConfigFile;
use crate::host::{HostKeyPolicy, SshHost, DEFAULT_SSH_PORT};
use crate::settings::ConnectSettings;

/// Directives the resolver understands; everything else is ignored
const RECOGNIZED: &[&str] = &[
    "hostname",
    "port",
    "user",
    "identityfile",
    "compression",
    "proxycommand",
    "connecttimeout",
    "stricthostkeychecking",
    "proxyjump",
];

/// Ordered chain of ssh_config files
#[derive(Debug, Clone, Default)]
pub struct SshConfigChain {
    files: Vec<SshConfigFile>,
}

#[derive(Debug, Clone)]
struct FoundValue {
    value: String,
    file: PathBuf,
    line: usize,
}

impl SshConfigChain {
    /// Load every readable file of `paths`, skipping the rest with a warning
    pub fn load(paths: &[PathBuf]) -> Self {
        let mut files = Vec::new();

        for path in paths {
            let expanded = expand_tilde(path);
            let content = match std::fs::read_to_string(&expanded) {
                Ok(content) => content,
                Err(e) => {
                    warn!("ssh config at {} skipped: {}", expanded.display(), e);
                    continue;
                }
            };

            match SshConfigFile::parse(&expanded, &content) {
                Ok(file) => files.push(file),
                Err(e) => warn!("ssh config at {} skipped: {}", expanded.display(), e),
            }
        }

        Self { files }
    }

    pub fn from_files(files: Vec<SshConfigFile>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[SshConfigFile] {
        &self.files
    }

    /// First value of each recognized key for `alias` across the chain
    fn lookup(&self, alias: &str) -> HashMap<String, FoundValue> {
        let mut found: HashMap<String, FoundValue> = HashMap::new();

        for file in &self.files {
            for directive in file.matching(alias) {
                if !RECOGNIZED.contains(&directive.key.as_str()) {
                    continue;
                }
                found
                    .entry(directive.key.clone())
                    .or_insert_with(|| FoundValue {
                        value: directive.value.clone(),
                        file: file.path().to_path_buf(),
                        line: directive.line,
                    });
            }
        }

        found
    }

    /// Every `IdentityFile` for `alias`, in chain order
    fn identity_files(&self, alias: &str) -> Vec<PathBuf> {
        self.files
            .iter()
            .flat_map(|file| file.matching(alias))
            .filter(|directive| directive.key == "identityfile")
            .map(|directive| expand_tilde(Path::new(&directive.value)))
            .collect()
    }

    /// Resolve `host` into a full connection profile
    ///
    /// Explicit host parameters win over config files, config files win over
    /// built-in defaults.
    pub fn resolve(
        &self,
        host: &SshHost,
        settings: &ConnectSettings,
    ) -> Result<ResolvedProfile, ConfigError> {
        let alias = host.addr();
        let found = self.lookup(alias);

        let jump = found
            .get("proxyjump")
            .filter(|v| !v.value.eq_ignore_ascii_case("none"));
        if let Some(jump) = jump {
            return Err(ConfigError::ProxyJumpUnsupported {
                host: alias.to_string(),
                file: jump.file.clone(),
                line: jump.line,
            });
        }

        let hostname = match found.get("hostname") {
            Some(v) => expand_hostname(&v.value, alias),
            None => alias.to_string(),
        };

        let port = match host.port {
            Some(port) => port,
            None => match found.get("port") {
                Some(v) => parse_value::<u16>("Port", v)?,
                None => DEFAULT_SSH_PORT,
            },
        };

        let user = host
            .user
            .clone()
            .or_else(|| found.get("user").map(|v| v.value.clone()))
            .unwrap_or_else(current_user);

        let identity_files = match &host.identity_file {
            Some(path) => vec![expand_tilde(path)],
            None => self.identity_files(alias),
        };

        let compression = match found.get("compression") {
            Some(v) => parse_yes_no("Compression", v)?,
            None => false,
        };

        let connect_timeout = match host.connect_timeout {
            Some(timeout) => timeout,
            None => match found.get("connecttimeout") {
                Some(v) => Duration::from_secs(parse_value::<u64>("ConnectTimeout", v)?),
                None => settings.default_connect_timeout,
            },
        };

        let host_key_policy = match host.host_key_policy {
            Some(policy) => policy,
            None => match found.get("stricthostkeychecking") {
                Some(v) => v.value.parse::<HostKeyPolicy>().map_err(|_| invalid("StrictHostKeyChecking", v))?,
                None => HostKeyPolicy::default(),
            },
        };

        let proxy_command = found
            .get("proxycommand")
            .map(|v| v.value.clone())
            .filter(|command| !command.eq_ignore_ascii_case("none"))
            .map(|command| expand_proxy_command(&command, &hostname, port, &user));

        debug!(
            "Resolved {} -> {}@{}:{} (policy {})",
            alias, user, hostname, port, host_key_policy
        );

        Ok(ResolvedProfile {
            alias: alias.to_string(),
            hostname,
            port,
            user,
            password: host.password.clone(),
            identity_files,
            compression,
            proxy_command,
            connect_timeout,
            host_key_policy,
        })
    }
}

/// Fully resolved SSH connection parameters for one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub alias: String,
    pub hostname: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub identity_files: Vec<PathBuf>,
    pub compression: bool,
    pub proxy_command: Option<String>,
    pub connect_timeout: Duration,
    pub host_key_policy: HostKeyPolicy,
}

fn parse_value<T: std::str::FromStr>(key: &str, found: &FoundValue) -> Result<T, ConfigError> {
    found.value.parse::<T>().map_err(|_| invalid(key, found))
}

fn parse_yes_no(key: &str, found: &FoundValue) -> Result<bool, ConfigError> {
    match found.value.to_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(invalid(key, found)),
    }
}

fn invalid(key: &str, found: &FoundValue) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: found.value.clone(),
        file: found.file.clone(),
        line: found.line,
    }
}

fn expand_hostname(value: &str, alias: &str) -> String {
    value.replace("%%", "\u{0}").replace("%h", alias).replace('\u{0}', "%")
}

fn expand_proxy_command(command: &str, hostname: &str, port: u16, user: &str) -> String {
    command
        .replace("%%", "\u{0}")
        .replace("%h", hostname)
        .replace("%p", &port.to_string())
        .replace("%r", user)
        .replace('\u{0}', "%")
}

pub(crate) fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}
