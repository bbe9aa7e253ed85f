use std::collections::HashMap;
use std::time::Duration;

/// Parameters of a single `run` invocation
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Overrides the host's sudo flag when set
    pub use_sudo: Option<bool>,
    pub env: HashMap<String, String>,
    /// Suppress live echo; the result still carries the full output
    pub hide: bool,
    /// Degrade failures to a diagnostic instead of an error
    pub warn: bool,
    pub cwd: Option<String>,
    /// Bound on the wait for completion; `None` uses the connection default
    pub timeout: Option<Duration>,
    /// Echo `$ <command>` before running
    pub show_command: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_sudo: None,
            env: HashMap::new(),
            hide: true,
            warn: false,
            cwd: None,
            timeout: None,
            show_command: false,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hidden, non-fatal run used for probing remote state
    pub fn probe() -> Self {
        Self {
            hide: true,
            warn: true,
            ..Self::default()
        }
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = Some(use_sudo);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_hide(mut self, hide: bool) -> Self {
        self.hide = hide;
        self
    }

    pub fn with_warn(mut self, warn: bool) -> Self {
        self.warn = warn;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_show_command(mut self, show_command: bool) -> Self {
        self.show_command = show_command;
        self
    }

    pub(crate) fn effective_sudo(&self, host_default: bool) -> bool {
        self.use_sudo.unwrap_or(host_default)
    }

    pub(crate) fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_hide_and_raise() {
        let options = RunOptions::default();
        assert!(options.hide);
        assert!(!options.warn);
        assert!(options.env.is_empty());
        assert_eq!(options.effective_timeout(Duration::from_secs(60)), Duration::from_secs(60));
    }

    #[test]
    fn test_sudo_override() {
        assert!(RunOptions::new().effective_sudo(true));
        assert!(!RunOptions::new().with_sudo(false).effective_sudo(true));
        assert!(RunOptions::new().with_sudo(true).effective_sudo(false));
    }
}
