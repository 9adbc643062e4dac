//! Detached ed25519 signing for larder path metadata.
//!
//! This crate provides:
//! - Ed25519 key generation and the `keyname:base64` key formats
//! - Fingerprint signing, producing opaque signature tokens
//! - Keyring verification of signature tokens
//!
//! It implements the signature traits consumed by `larder-core`.

pub mod error;
pub mod key;
pub mod signer;

pub use error::{SignerError, SignerResult};
pub use key::{KeyPair, PublicKey, SecretKey};
pub use signer::{Keyring, PathInfoSigner, Signature};
