//! Memoized probing of host state
//!
//! Validators answer "can this step run here?" and record their answer in a
//! [`FactCache`] keyed by validator type, host address and fact id, so the
//! same remote probe is never issued twice in one run.

pub mod cache;
pub mod probes;
pub mod validators;

pub use cache::{CacheError, FactCache, FactKey};
pub use probes::{is_cmd_exist, is_directory, is_file};
pub use validators::{CommandRequired, Inline, IsDirectory, IsFile, Local, Not, Or, Template, Validator};
