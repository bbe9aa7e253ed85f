//! Command execution primitives shared by every connection backend

pub mod command;
pub mod error;
pub mod options;
pub mod promise;
pub mod result;
pub mod tee;

pub use command::{build_command, shell_quote};
pub use error::CommandError;
pub use options::RunOptions;
pub use promise::{Completion, OutputStream, ResultPromise};
pub use result::CommandResult;
