//! OpenSSH-style client configuration
//!
//! Files are consulted in chain order and the first value found for a key
//! wins. Explicit [`SshHost`](crate::host::SshHost) parameters always take
//! precedence over anything read from disk.

pub mod error;
pub mod parser;
pub mod resolver;

pub use error::ConfigError;
pub use parser::{Directive, SshConfigFile};
pub use resolver::{ResolvedProfile, SshConfigChain};

use crate::host::SshHost;
use crate::settings::ConnectSettings;

/// Load the configured chain and resolve `host` against it
pub fn resolve(host: &SshHost, settings: &ConnectSettings) -> Result<ResolvedProfile, ConfigError> {
    SshConfigChain::load(&settings.config_chain).resolve(host, settings)
}
