//! Core value types and algorithms for the larder package store.
//!
//! This crate defines the content-addressed path metadata model:
//! - Multi-algorithm digests and their textual encodings
//! - Store path identifiers
//! - Content addresses and their reference closures
//! - Valid-path metadata, the canonical fingerprint, and the detached
//!   signing protocol
//!
//! It is a synchronous value library: no threads, no I/O beyond the file
//! hashing helpers, no global state beyond the [`Hash::dummy`] placeholder.

pub mod content_address;
pub mod error;
pub mod hash;
pub mod path_info;
pub mod signature;
pub mod store;
pub mod store_path;

pub use content_address::{
    ContentAddress, ContentAddressMethod, ContentAddressWithReferences, FileIngestionMethod,
    FixedOutputInfo, StoreReferences, TextInfo,
};
pub use error::{Error, Result};
pub use hash::{
    Hash, HashFormat, HashSink, HashType, MAX_HASH_SIZE, compress_hash, hash_file, hash_path,
};
pub use path_info::{MAX_SIGS, UnkeyedValidPathInfo, ValidPathInfo};
pub use signature::{Signer, TrustedKeys};
pub use store::{Store, StoreDir};
pub use store_path::{StorePath, StorePathDigest};
