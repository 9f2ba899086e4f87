use std::io;

use thiserror::Error;

/// Errors that can occur during image and file operations
#[derive(Error, Debug)]
pub enum MfsError {
    #[error("Disk image is not open")]
    ImageNotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {name}")]
    FileNotFound { name: String },

    #[error("File already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Could not find a free directory entry")]
    DirectoryFull,

    #[error("Can not find free inode")]
    NoFreeInode,

    #[error("Can not find a free block")]
    NoFreeBlock,

    #[error("Not enough free disk space: need {needed} bytes, {available} available")]
    InsufficientSpace { needed: u64, available: u64 },

    #[error("File is too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Filename is too long: {len} bytes (limit {limit})")]
    NameTooLong { len: usize, limit: usize },

    #[error("File {name} is labeled READ ONLY")]
    ReadOnlyViolation { name: String },

    #[error("Blocks of {name} were reused after it was deleted")]
    BlocksReclaimed { name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),
}

impl MfsError {
    pub(crate) fn not_found(name: &str) -> Self {
        MfsError::FileNotFound {
            name: name.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MfsError>;
