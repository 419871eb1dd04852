//! Error taxonomy shared by every layer of the page store.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A single tagged error carrying kind + message.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying filesystem failure; surfaced, never retried by the core.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Checksum mismatch, unknown page kind, or a truncated frame.
    #[error("corruption: {0}")]
    Corrupt(String),

    /// Illegal argument or programmer error (bad revision, negative key,
    /// unbalanced prepare/finish).
    #[error("usage error: {0}")]
    Usage(String),

    /// Gating failure from the resource manager's read/write permits.
    #[error("concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    /// A blocking acquire was interrupted.
    #[error("interrupted while waiting: {0}")]
    Threaded(String),

    /// Recovery found a stale commit marker that could not be resolved
    /// automatically under the resource's configured recovery policy.
    #[error("commit interrupted: {0}")]
    CommitInterrupted(String),
}

/// Concurrency-specific failures.
#[derive(Debug, Error)]
pub enum ConcurrencyError {
    /// A semaphore acquisition timed out.
    #[error("no permit available within {0:?}")]
    NoPermit(std::time::Duration),

    /// The resource (or a transaction on it) is already closed.
    #[error("already closed")]
    AlreadyClosed,
}

impl StorageError {
    /// Shorthand for constructing a [`StorageError::Corrupt`] from `&str`.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        StorageError::Corrupt(msg.into())
    }

    /// Shorthand for constructing a [`StorageError::Usage`] from `&str`.
    pub fn usage(msg: impl Into<String>) -> Self {
        StorageError::Usage(msg.into())
    }
}
