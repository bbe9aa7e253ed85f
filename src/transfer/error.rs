use thiserror::Error;

use crate::connection::ConnectionError;
use crate::execution::CommandError;
use crate::host::HostError;
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Short write to {path}: expected {expected} bytes, wrote {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("Source {path} not found on {host}")]
    SourceNotFound { host: String, path: String },

    #[error("Source {path} on {host} is a directory, use a bulk sync instead")]
    SourceIsDirectory { host: String, path: String },

    #[error("Destination {path} has no file name")]
    InvalidDestination { path: String },

    #[error("rsync is not installed on the controller")]
    SyncToolMissing,

    #[error("Sync of {src} to {dst} failed with exit code {return_code}")]
    SyncFailed {
        src: String,
        dst: String,
        return_code: i32,
    },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Host(#[from] HostError),
}
