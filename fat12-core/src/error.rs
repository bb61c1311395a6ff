//! Error types for FAT12 image operations.

use std::fmt;

use thiserror::Error;

/// Which resource ran out while planning an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// Fewer free clusters than the payload needs.
    Clusters { needed: usize, free: usize },
    /// Every directory slot holds an active entry.
    DirectorySlots,
}

impl fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exhaustion::Clusters { needed, free } => {
                write!(f, "{} clusters needed, {} free", needed, free)
            }
            Exhaustion::DirectorySlots => write!(f, "directory is full"),
        }
    }
}

/// Errors that can occur while reading or mutating an image.
#[derive(Error, Debug)]
pub enum Fat12Error {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Disk full: {0}")]
    Exhausted(Exhaustion),

    #[error("File exists: {0}")]
    AlreadyExists(String),

    #[error("Corrupt cluster chain for {name} at cluster {cluster}")]
    CorruptChain { name: String, cluster: u16 },

    #[error("Invalid 8.3 name: {0}")]
    InvalidName(String),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Image too small: {actual} bytes, layout needs {expected}")]
    ImageTooSmall { expected: u64, actual: u64 },

    #[error("Write of {len} bytes at {offset:#x} runs past the end of the image")]
    OutsideImage { offset: u64, len: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for FAT12 operations.
pub type Fat12Result<T> = Result<T, Fat12Error>;
