//! Error types for the core domain.

use crate::hash::HashType;
use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("hash '{0}' has wrong length for hash type '{1}'")]
    BadHashLength(String, HashType),

    #[error("invalid {1} hash '{0}'")]
    BadHashEncoding(String, &'static str),

    #[error("bad hash type: {0}")]
    BadHashType(String),

    #[error("unknown hash format '{0}', expected 'base16', 'base32', 'base64', or 'sri'")]
    UnknownHashFormat(String),

    #[error("unknown hash type '{0}', expected 'md5', 'sha1', 'sha256', or 'sha512'")]
    UnknownHashType(String),

    #[error("cannot calculate fingerprint of path '{0}' because its NAR size is not known")]
    FingerprintUnavailable(String),

    #[error("invalid store path: {0}")]
    InvalidStorePath(String),

    #[error("invalid content address: {0}")]
    InvalidContentAddress(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
