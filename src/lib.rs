//! Rustle Connect - host connection and remote execution engine
//!
//! This crate provides the connection layer used by rustle to run commands
//! against local and SSH hosts, stream their output, move files atomically
//! between hosts and memoize expensive remote probes.

pub mod connection;
pub mod error;
pub mod execution;
pub mod facts;
pub mod host;
pub mod inventory;
pub mod settings;
pub mod ssh_config;
pub mod step;
pub mod template;
pub mod transfer;

pub use connection::{Connection, FileStat, LocalConnection, SshConnection};
pub use error::{Error, Result};
pub use execution::{CommandResult, ResultPromise, RunOptions};
pub use facts::{FactCache, FactKey};
pub use host::{Host, HostKeyPolicy, LocalHost, SshHost};
pub use inventory::Inventory;
pub use settings::ConnectSettings;
pub use transfer::{FileTransfer, TransferOutcome};
