use thiserror::Error;

use crate::connection::ConnectionError;
use crate::execution::CommandError;
use crate::facts::CacheError;
use crate::host::HostError;
use crate::inventory::InventoryError;
use crate::ssh_config::ConfigError;
use crate::template::TemplateError;
use crate::transfer::TransferError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Step {step} cannot run on {host}: {}", errors.join("; "))]
    Validation {
        step: String,
        host: String,
        errors: Vec<String>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
