//! Block-I/O error type (§7).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("block {0} out of range")]
    BlockOutOfRange(u32),

    #[error("block device I/O error")]
    IoError,
}
