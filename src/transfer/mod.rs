//! File transfer between connections

pub mod engine;
pub mod error;
pub mod rsync;

pub use engine::{FileTransfer, TransferOutcome, TRANSFER_CHUNK_SIZE};
pub use error::TransferError;
pub use rsync::RsyncTransfer;
