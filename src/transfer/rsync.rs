//! Directory-granularity sync through the external `rsync` tool

use tracing::{debug, info};

use super::error::TransferError;
use crate::connection::Connection;
use crate::execution::{shell_quote, CommandResult, RunOptions};
use crate::host::{proxy_command, HostKeyPolicy, SshHost, DEFAULT_SSH_PORT};

/// Bulk copy of a controller directory to an SSH host
///
/// rsync runs on the controller and dials the target itself, so a gateway
/// is expressed as a synthesized `ssh -W` proxy command, which limits it to
/// a single hop.
#[derive(Debug, Clone, Default)]
pub struct RsyncTransfer {
    pub excludes: Vec<String>,
    pub delete: bool,
    /// Extra raw options appended to the rsync invocation
    pub rsync_opts: Option<String>,
}

impl RsyncTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    pub fn with_delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn with_rsync_opts(mut self, opts: impl Into<String>) -> Self {
        self.rsync_opts = Some(opts.into());
        self
    }

    /// Assemble the full rsync command line
    pub fn build_command(
        &self,
        src_dir: &str,
        dst: &SshHost,
        dst_dir: &str,
    ) -> Result<String, TransferError> {
        let mut parts = vec!["rsync".to_string(), "-pthrvz".to_string()];

        if self.delete {
            parts.push("--delete".to_string());
        }
        for pattern in &self.excludes {
            parts.push(format!("--exclude {}", shell_quote(pattern)));
        }

        parts.push(format!("--rsh={}", shell_quote(&rsh_command(dst)?)));

        if dst.use_sudo {
            parts.push("--rsync-path=\"sudo -n rsync\"".to_string());
        }
        if let Some(opts) = &self.rsync_opts {
            parts.push(opts.clone());
        }

        let target = match &dst.user {
            Some(user) => format!("{user}@{}:{dst_dir}", dst.addr()),
            None => format!("{}:{dst_dir}", dst.addr()),
        };
        parts.push(shell_quote(src_dir));
        parts.push(shell_quote(&target));

        Ok(parts.join(" "))
    }

    /// Run the sync from `controller`, which must be the local connection
    pub async fn sync(
        &self,
        controller: &dyn Connection,
        src_dir: &str,
        dst: &SshHost,
        dst_dir: &str,
    ) -> Result<CommandResult, TransferError> {
        if which::which("rsync").is_err() {
            return Err(TransferError::SyncToolMissing);
        }

        let command = self.build_command(src_dir, dst, dst_dir)?;
        debug!("Syncing with: {}", command);

        let result = controller
            .run(&command, &RunOptions::default().with_sudo(false).with_warn(true))
            .await?;
        if !result.ok() {
            return Err(TransferError::SyncFailed {
                src: src_dir.to_string(),
                dst: format!("{}:{}", dst.addr(), dst_dir),
                return_code: result.return_code,
            });
        }

        info!("Synced {} to {}:{}", src_dir, dst.addr(), dst_dir);
        Ok(result)
    }
}

/// The `ssh` transport line handed to `--rsh`
fn rsh_command(dst: &SshHost) -> Result<String, TransferError> {
    let mut rsh = String::from("ssh");

    if let Some(port) = dst.port.filter(|port| *port != DEFAULT_SSH_PORT) {
        rsh.push_str(&format!(" -p {port}"));
    }
    if let Some(identity) = &dst.identity_file {
        rsh.push_str(&format!(" -i {}", shell_quote(&identity.to_string_lossy())));
    }
    match dst.host_key_policy {
        Some(HostKeyPolicy::WarnOnly) => rsh.push_str(" -o StrictHostKeyChecking=no"),
        Some(HostKeyPolicy::RejectUnknown) => rsh.push_str(" -o StrictHostKeyChecking=yes"),
        _ => {}
    }
    if let Some(proxy) = proxy_command(dst)? {
        rsh.push_str(&format!(" -o {}", shell_quote(&format!("ProxyCommand={proxy}"))));
    }

    Ok(rsh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostError;

    #[test]
    fn test_plain_sync_command() {
        let host = SshHost::new("web.example").unwrap().with_user("deploy");
        let command = RsyncTransfer::new()
            .build_command("./dist/", &host, "/srv/app")
            .unwrap();
        assert_eq!(
            command,
            "rsync -pthrvz --rsh=ssh ./dist/ deploy@web.example:/srv/app"
        );
    }

    #[test]
    fn test_sync_options() {
        let host = SshHost::new("web.example")
            .unwrap()
            .with_port(2222)
            .with_sudo(true)
            .with_host_key_policy(HostKeyPolicy::WarnOnly);
        let command = RsyncTransfer::new()
            .with_delete(true)
            .with_exclude("*.log")
            .build_command("dist", &host, "/srv/app")
            .unwrap();

        assert!(command.contains("--delete"));
        assert!(command.contains("--exclude '*.log'"));
        assert!(command.contains("--rsh='ssh -p 2222 -o StrictHostKeyChecking=no'"));
        assert!(command.contains("--rsync-path=\"sudo -n rsync\""));
        assert!(command.ends_with("dist web.example:/srv/app"));
    }

    #[test]
    fn test_single_gateway_becomes_proxy_command() {
        let bastion = SshHost::new("bastion.example").unwrap().with_user("jump");
        let host = SshHost::new("10.0.0.5").unwrap().with_gateway(bastion).unwrap();
        let command = RsyncTransfer::new()
            .build_command("dist", &host, "/srv")
            .unwrap();

        assert!(command.contains("ProxyCommand=ssh -W %h:%p jump@bastion.example"));
    }

    #[test]
    fn test_nested_gateway_is_rejected() {
        let outer = SshHost::new("outer.example").unwrap();
        let inner = SshHost::new("inner.example").unwrap().with_gateway(outer).unwrap();
        let host = SshHost::new("target.example").unwrap().with_gateway(inner).unwrap();

        assert!(matches!(
            RsyncTransfer::new().build_command("dist", &host, "/srv"),
            Err(TransferError::Host(HostError::NestedGateway { .. }))
        ));
    }
}
