use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{} is not under the cache root", .0.display())]
    NotUnderCacheRoot(PathBuf),

    #[error("{} is not under the bulk storage root", .0.display())]
    NotUnderBulkRoot(PathBuf),

    #[error("Size mismatch after transfer to {}: expected {expected} bytes, found {actual}", path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error(
        "Bulk copy {} differs from cache copy {} ({bulk_size} vs {cache_size} bytes), leaving both in place",
        bulk.display(),
        cache.display()
    )]
    DivergentCopy {
        cache: PathBuf,
        bulk: PathBuf,
        cache_size: u64,
        bulk_size: u64,
    },

    #[error("Another instance holds the lock at {}", .0.display())]
    LockHeld(PathBuf),

    #[error("Transfer failed: {0}")]
    Transfer(String),
}

pub type Result<T> = std::result::Result<T, Error>;
