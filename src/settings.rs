//! Connection-wide settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the project-local ssh_config path
pub const PROJECT_SSH_CONFIG_ENV: &str = "RUSTLE_SSH_CONFIG";

const PROJECT_SSH_CONFIG: &str = "ssh_config";
const SYSTEM_SSH_CONFIG: &str = "/etc/ssh/ssh_config";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectSettings {
    /// ssh_config files consulted in order, first value per key wins
    pub config_chain: Vec<PathBuf>,
    pub known_hosts: Option<PathBuf>,
    #[serde(with = "serde_duration")]
    pub default_connect_timeout: Duration,
    #[serde(with = "serde_duration")]
    pub default_command_timeout: Duration,
    /// Directory for transfer temp files; defaults to the destination's directory
    pub scratch_dir: Option<String>,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            config_chain: default_config_chain(),
            known_hosts: dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts")),
            default_connect_timeout: Duration::from_secs(10),
            default_command_timeout: Duration::from_secs(60),
            scratch_dir: None,
        }
    }
}

impl ConnectSettings {
    /// Settings that read no ssh_config files at all
    pub fn without_ssh_config() -> Self {
        Self {
            config_chain: Vec::new(),
            ..Self::default()
        }
    }

    pub fn with_config_chain(mut self, chain: Vec<PathBuf>) -> Self {
        self.config_chain = chain;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<String>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

/// Project-local, then system, then user configuration
pub fn default_config_chain() -> Vec<PathBuf> {
    let project = std::env::var_os(PROJECT_SSH_CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(PROJECT_SSH_CONFIG));

    let mut chain = vec![project, PathBuf::from(SYSTEM_SSH_CONFIG)];
    if let Some(home) = dirs::home_dir() {
        chain.push(home.join(".ssh").join("config"));
    }
    chain
}

mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chain_order() {
        let chain = default_config_chain();
        assert!(chain.len() >= 2);
        assert_eq!(chain[1], PathBuf::from("/etc/ssh/ssh_config"));
    }

    #[test]
    fn test_settings_serialization() {
        let settings = ConnectSettings::without_ssh_config().with_scratch_dir("/var/tmp");
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"default_command_timeout\":60"));

        let parsed: ConnectSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.default_connect_timeout, Duration::from_secs(10));
        assert_eq!(parsed.scratch_dir.as_deref(), Some("/var/tmp"));
        assert!(parsed.config_chain.is_empty());
    }
}
