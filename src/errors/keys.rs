//! Encrypted key material errors.

use std::path::PathBuf;

/// Errors that can occur while loading or writing the key store
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("Key file not found at {path}")]
    Missing { path: PathBuf },

    #[error("Failed to read key file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write key file {path}: {source}")]
    Unwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Decryption produced an invalid key list: {reason}")]
    DecryptFailed { reason: String },

    #[error("Key at index {index} is not a valid private key: {reason}")]
    MalformedKey { index: usize, reason: String },
}
