//! Cheap yes/no probes of host state
//!
//! Paths go through `$(echo ...)` so `~` and variables expand on the host.

use crate::connection::Connection;
use crate::execution::{CommandError, RunOptions};

pub async fn is_file(c: &dyn Connection, path: &str) -> Result<bool, CommandError> {
    probe(c, &format!("test -e \"$(echo {path})\"")).await
}

pub async fn is_directory(c: &dyn Connection, path: &str) -> Result<bool, CommandError> {
    probe(c, &format!("test -d \"$(echo {path})\"")).await
}

/// Whether `command` is on the host's `$PATH`
pub async fn is_cmd_exist(c: &dyn Connection, command: &str) -> Result<bool, CommandError> {
    probe(c, &format!("which {command}")).await
}

async fn probe(c: &dyn Connection, command: &str) -> Result<bool, CommandError> {
    Ok(c.run(command, &RunOptions::probe()).await?.ok())
}
