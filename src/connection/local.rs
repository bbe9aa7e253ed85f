//! Connection to the controller itself

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use super::error::ConnectionError;
use super::io::CountingReader;
use super::{shell, Connection, FileStat};
use crate::execution::{
    build_command, shell_quote, Completion, CommandError, OutputStream, ResultPromise, RunOptions,
};
use crate::host::{Host, LocalHost};
use crate::settings::ConnectSettings;

const READ_BUFFER_SIZE: usize = 8192;

pub struct LocalConnection {
    host: Host,
    command_timeout: Duration,
}

impl LocalConnection {
    pub fn new(host: LocalHost, settings: &ConnectSettings) -> Self {
        Self {
            host: Host::Local(host),
            command_timeout: settings.default_command_timeout,
        }
    }

    fn sudo(&self) -> bool {
        self.host.use_sudo()
    }

    fn shell(command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }

    /// Spawn an elevated command and return its stdout
    fn spawn_reader(&self, command: &str) -> Result<OutputStream, ConnectionError> {
        let command = build_command(command, None, true);
        let mut child = Self::shell(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
        Ok(Box::new(stdout))
    }

    async fn write_elevated(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, ConnectionError> {
        let command = build_command(&format!("cat > {}", shell_quote(path)), None, true);
        let mut child = Self::shell(&command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("stdin not captured"))?;
        let mut counted = CountingReader::new(source);
        let copied = tokio::io::copy(&mut counted, &mut stdin).await;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(ConnectionError::RemoteIo {
                path: path.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        copied?;
        Ok(counted.count())
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn host(&self) -> &Host {
        &self.host
    }

    async fn run_promise(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> Result<ResultPromise, CommandError> {
        let sudo = options.effective_sudo(self.sudo());
        let full = build_command(command, options.cwd.as_deref(), sudo);
        debug!("Running locally: {}", full);

        let mut child = Self::shell(&full)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: full.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

        Ok(ResultPromise::new(
            full,
            Box::new(stdout),
            Box::new(stderr),
            Completion::Process(child),
            options.effective_timeout(self.command_timeout),
        ))
    }

    async fn file_stat(&self, path: &str) -> Result<Option<FileStat>, ConnectionError> {
        if self.sudo() {
            return shell::stat(self, path, true).await;
        }

        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;

            Ok(Some(FileStat {
                mode: metadata.mode(),
                size: metadata.size(),
                uid: metadata.uid(),
                gid: metadata.gid(),
                atime: metadata.atime(),
            }))
        }

        #[cfg(not(unix))]
        {
            let kind = if metadata.is_dir() { 0o040000 } else { 0o100000 };
            Ok(Some(FileStat {
                mode: kind | 0o644,
                size: metadata.len(),
                uid: 0,
                gid: 0,
                atime: 0,
            }))
        }
    }

    async fn file_read(&self, path: &str) -> Result<OutputStream, ConnectionError> {
        if self.sudo() {
            return self.spawn_reader(&format!("cat -- {}", shell_quote(path)));
        }
        Ok(Box::new(File::open(path).await?))
    }

    async fn file_write(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, ConnectionError> {
        if self.sudo() {
            return self.write_elevated(path, source).await;
        }

        let mut file = File::create(path).await?;
        let written = tokio::io::copy(source, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    async fn file_checksum(&self, path: &str) -> Result<Option<String>, ConnectionError> {
        if self.sudo() {
            return shell::checksum(self, path, true).await;
        }

        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut hasher = Sha256::new();
        let mut buffer = vec![0; READ_BUFFER_SIZE];
        loop {
            let bytes_read = file.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(Some(format!("{:x}", hasher.finalize())))
    }

    async fn create_dir_all(&self, path: &str) -> Result<(), ConnectionError> {
        if self.sudo() {
            return shell::create_dir_all(self, path, true).await;
        }
        Ok(tokio::fs::create_dir_all(path).await?)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ConnectionError> {
        if self.sudo() {
            return shell::rename(self, from, to, true).await;
        }
        Ok(tokio::fs::rename(from, to).await?)
    }

    async fn remove_file(&self, path: &str) -> Result<(), ConnectionError> {
        if self.sudo() {
            return shell::remove_file(self, path, true).await;
        }
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn restore_ownership(&self, path: &str) -> Result<(), ConnectionError> {
        if !self.sudo() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            let uid = nix::unistd::getuid().as_raw();
            let gid = nix::unistd::getgid().as_raw();
            shell::chown(self, path, uid, gid).await?;
        }

        #[cfg(not(unix))]
        tracing::warn!("Ownership of {} left unchanged on this platform", path);

        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        Ok(())
    }
}
