//! Open sessions against hosts
//!
//! A [`Connection`] is bound to exactly one [`Host`]. Local connections run
//! OS subprocesses, SSH connections authenticate lazily on first use and are
//! released by [`Connection::close`] (or on drop), gateways last.

pub mod channel;
pub mod error;
pub mod handler;
pub mod io;
pub mod local;
pub mod shell;
pub mod ssh;

pub use error::ConnectionError;
pub use local::LocalConnection;
pub use ssh::{Route, SshConnection};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::execution::{CommandError, CommandResult, OutputStream, ResultPromise, RunOptions};
use crate::host::Host;
use crate::settings::ConnectSettings;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;

/// Subset of `stat(2)` exposed by every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileStat {
    pub mode: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    pub fn accessed(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.atime, 0)
    }
}

/// Command execution and file I/O against one host
///
/// File operations elevate with sudo whenever the host is configured to.
#[async_trait]
pub trait Connection: Send + Sync {
    fn host(&self) -> &Host;

    /// Start `command` and return a handle to it without waiting
    async fn run_promise(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> Result<ResultPromise, CommandError>;

    /// Run `command` to completion
    ///
    /// With `options.warn` unset a non-zero exit or any stderr output is an
    /// error, raised after the captured output has been printed.
    async fn run(&self, command: &str, options: &RunOptions) -> Result<CommandResult, CommandError> {
        let promise = self.run_promise(command, options).await?;
        let result = promise.get_result(options.hide, options.show_command).await?;
        result.check(options.warn, options.hide)
    }

    /// `None` when the path does not exist
    async fn file_stat(&self, path: &str) -> Result<Option<FileStat>, ConnectionError>;

    async fn file_read(&self, path: &str) -> Result<OutputStream, ConnectionError>;

    /// Write everything `source` yields to `path`, returning the byte count
    async fn file_write(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, ConnectionError>;

    /// Hex SHA-256 of the file, `None` when it does not exist
    async fn file_checksum(&self, path: &str) -> Result<Option<String>, ConnectionError>;

    async fn create_dir_all(&self, path: &str) -> Result<(), ConnectionError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), ConnectionError>;

    /// Missing files are not an error
    async fn remove_file(&self, path: &str) -> Result<(), ConnectionError>;

    /// Hand `path` back to the non-elevated user after a sudo write
    async fn restore_ownership(&self, path: &str) -> Result<(), ConnectionError>;

    async fn close(&self) -> Result<(), ConnectionError>;
}

impl Host {
    /// Build a connection for this host
    ///
    /// SSH settings are resolved here, so configuration errors surface
    /// before any network activity. The session itself opens on first use.
    pub fn connect(&self, settings: &ConnectSettings) -> Result<Box<dyn Connection>, ConnectionError> {
        match self {
            Host::Local(local) => Ok(Box::new(LocalConnection::new(local.clone(), settings))),
            Host::Ssh(ssh) => Ok(Box::new(SshConnection::new(ssh.clone(), settings)?)),
        }
    }
}
