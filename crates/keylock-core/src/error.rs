use std::path::PathBuf;

use thiserror::Error;

/// Every way a keylock operation can fail. All variants are terminal for the
/// current operation; none are retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    /// An explicit key load found nothing on disk.
    #[error("no key found at {}; run `keylock encrypt` first", .path.display())]
    KeyNotFound { path: PathBuf },
    /// The key file exists but does not hold a valid key record.
    #[error("key file {} is corrupt: {reason}", .path.display())]
    KeyCorrupt { path: PathBuf, reason: String },
    /// The protected file is missing.
    #[error("file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },
    /// Malformed envelope, or the cipher rejected the ciphertext.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },
    /// The stored key's validation token differs from the one in the metadata.
    #[error(
        "key mismatch: {} was last encrypted by {operator} at {timestamp} with a different key",
        .path.display()
    )]
    BindingMismatch {
        path: PathBuf,
        operator: String,
        timestamp: String,
    },
    #[error("no binding metadata at {}; cannot verify the key", .path.display())]
    BindingMissing { path: PathBuf },
    #[error("binding metadata {} is corrupt: {reason}", .path.display())]
    BindingCorrupt { path: PathBuf, reason: String },
    /// No operator identity could be resolved.
    #[error("operator identity unavailable: {reason}")]
    IdentityUnavailable { reason: String },
    #[error("{} is already encrypted", .path.display())]
    AlreadyEncrypted { path: PathBuf },
    /// Underlying filesystem failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

pub type Result<T> = std::result::Result<T, LockError>;

impl LockError {
    pub fn storage<E: ToString>(err: E) -> Self {
        LockError::Storage {
            reason: err.to_string(),
        }
    }
}
