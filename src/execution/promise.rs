//! In-flight command handles

use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::sync::watch;
use tracing::debug;

use super::error::CommandError;
use super::result::CommandResult;
use super::tee::{read_all, TeeWorker};
use crate::connection::ConnectionError;

/// Raw byte stream of a running command or an opened file
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Exit status source of a running command
pub enum Completion {
    Process(Child),
    /// Published once by the channel pump; `-1` when the remote sent none
    Channel(watch::Receiver<Option<i32>>),
}

/// Single-use handle to a running command
///
/// The raw streams can be taken and consumed directly, or the whole command
/// can be materialized with [`ResultPromise::get_result`].
pub struct ResultPromise {
    command: String,
    stdout: Option<OutputStream>,
    stderr: Option<OutputStream>,
    completion: Completion,
    timeout: Duration,
}

impl ResultPromise {
    pub fn new(
        command: impl Into<String>,
        stdout: OutputStream,
        stderr: OutputStream,
        completion: Completion,
        timeout: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            stdout: Some(stdout),
            stderr: Some(stderr),
            completion,
            timeout,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn take_stdout(&mut self) -> Option<OutputStream> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<OutputStream> {
        self.stderr.take()
    }

    pub fn is_done(&mut self) -> bool {
        match &mut self.completion {
            Completion::Process(child) => matches!(child.try_wait(), Ok(Some(_))),
            Completion::Channel(status) => status.borrow().is_some(),
        }
    }

    /// Wait for the exit status, bounded by the promise timeout
    ///
    /// The remote side is not signalled when the timeout expires.
    pub async fn wait(&mut self) -> Result<i32, CommandError> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.exit_status()).await {
            Ok(status) => status,
            Err(_) => Err(self.timeout_error()),
        }
    }

    /// Collect the full output and exit status
    ///
    /// Visible commands get one tee task per stream, joined before the exit
    /// status is fetched. Hidden commands are drained in place.
    pub async fn get_result(
        mut self,
        hide: bool,
        show_command: bool,
    ) -> Result<CommandResult, CommandError> {
        if show_command {
            println!("$ {}", self.command);
        }

        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.collect(hide)).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }

    async fn collect(&mut self, hide: bool) -> Result<CommandResult, CommandError> {
        let stdout = self.stdout.take();
        let stderr = self.stderr.take();

        let (out, err) = if hide {
            let (out, err) = tokio::join!(read_all(stdout), read_all(stderr));
            (out?, err?)
        } else {
            let out_worker = stdout.map(|s| TeeWorker::spawn(s, tokio::io::stdout()));
            let err_worker = stderr.map(|s| TeeWorker::spawn(s, tokio::io::stderr()));
            (join_worker(out_worker).await?, join_worker(err_worker).await?)
        };

        let return_code = self.exit_status().await?;
        debug!("`{}` exited with {}", self.command, return_code);

        Ok(CommandResult::new(self.command.clone(), return_code, &out, &err))
    }

    async fn exit_status(&mut self) -> Result<i32, CommandError> {
        match &mut self.completion {
            Completion::Process(child) => {
                let status = child.wait().await?;
                // Killed by a signal
                Ok(status.code().unwrap_or(-1))
            }
            Completion::Channel(status) => {
                let code = *status
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| ConnectionError::ChannelClosed)?;
                Ok(code.unwrap_or(-1))
            }
        }
    }

    fn timeout_error(&self) -> CommandError {
        CommandError::Timeout {
            command: self.command.clone(),
            timeout_secs: self.timeout.as_secs(),
        }
    }
}

async fn join_worker(worker: Option<TeeWorker>) -> std::io::Result<Vec<u8>> {
    match worker {
        Some(worker) => worker.join().await,
        None => Ok(Vec::new()),
    }
}
