//! Error types for the patch engine

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for patch engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for patch engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A delta violated a structural invariant (negative lengths, truncated
    /// streams, output overrun)
    #[error("Corrupt delta: {0}")]
    CorruptDelta(String),

    /// The delta header carries a signature no block codec is registered for
    #[error("Unsupported delta codec: {0}")]
    UnsupportedCodec(String),

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Declared size does not match the bytes actually readable
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Declared size
        expected: u64,
        /// Bytes actually available
        actual: u64,
    },

    /// The patch database for the archive could not be opened
    #[error("Patch store unavailable at {}: {reason}", path.display())]
    PatchStoreUnavailable {
        /// Location of the store
        path: PathBuf,
        /// Why it could not be opened
        reason: String,
    },

    /// Patch store contents are structurally invalid
    #[error("Corrupt patch store: {0}")]
    CorruptStore(String),

    /// The same key was added twice while building a store
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Hash table has no free bucket left
    #[error("Patch store full: capacity {capacity}")]
    StoreFull {
        /// Table capacity
        capacity: usize,
    },

    /// Entry not present in the archive
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Entry name is empty or otherwise unusable as a key
    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),

    /// Malformed input outside of deltas and stores (rename lists, options)
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Reconciliation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a new CorruptDelta error
    pub fn corrupt_delta<S: Into<String>>(msg: S) -> Self {
        Error::CorruptDelta(msg.into())
    }

    /// Create a new CorruptStore error
    pub fn corrupt_store<S: Into<String>>(msg: S) -> Self {
        Error::CorruptStore(msg.into())
    }

    /// Create a new Compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Error::Compression(msg.into())
    }

    /// Create a new InvalidFormat error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Error::InvalidFormat(msg.into())
    }

    /// Create a new PatchStoreUnavailable error
    pub fn store_unavailable<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Error::PatchStoreUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates corrupted input data
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CorruptDelta(_)
                | Error::UnsupportedCodec(_)
                | Error::CorruptStore(_)
                | Error::Compression(_)
        )
    }

    /// Check if this error aborts a whole reconciliation run rather than a
    /// single entry
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Error::PatchStoreUnavailable { .. } | Error::Cancelled | Error::ThreadPool(_)
        )
    }
}
