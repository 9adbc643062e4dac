//! Ed25519 key material and its textual interchange formats.
//!
//! Keys travel as `keyname:base64(payload)` strings. A secret key's payload
//! is the 64-byte keypair encoding (secret half followed by public half); a
//! public key's payload is the 32-byte public key alone. Parsing a secret
//! key checks that the embedded public half actually belongs to the secret
//! half, so a spliced key string is rejected rather than silently re-derived.

use crate::error::{SignerError, SignerResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH, SigningKey, VerifyingKey};
use std::fmt;

// Split `keyname:base64(payload)` and decode the payload into its expected
// fixed width.
fn decode_key<const N: usize>(s: &str) -> SignerResult<(&str, [u8; N])> {
    let Some((name, payload)) = s.split_once(':') else {
        return Err(SignerError::KeyParsing(format!(
            "key '{s}' lacks a 'keyname:' prefix"
        )));
    };
    if name.is_empty() {
        return Err(SignerError::KeyParsing("empty key name".to_string()));
    }
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| SignerError::KeyParsing(format!("undecodable key payload: {e}")))?;
    let raw = <[u8; N]>::try_from(bytes).map_err(|bytes: Vec<u8>| {
        SignerError::KeyParsing(format!(
            "key payload is {} bytes, expected {N}",
            bytes.len()
        ))
    })?;
    Ok((name, raw))
}

/// A secret (private) signing key.
pub struct SecretKey {
    inner: SigningKey,
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::generate(&mut rand_core::OsRng),
        }
    }

    /// Parse from `keyname:base64(secret || public)` form.
    pub fn parse(s: &str) -> SignerResult<(String, Self)> {
        let (name, raw) = decode_key::<KEYPAIR_LENGTH>(s)?;
        let inner = SigningKey::from_keypair_bytes(&raw).map_err(|_| {
            SignerError::KeyParsing(
                "secret and public key halves do not match".to_string(),
            )
        })?;
        Ok((name.to_string(), Self { inner }))
    }

    /// Render as `keyname:base64(secret || public)`.
    pub fn to_key_string(&self, key_name: &str) -> String {
        format!("{key_name}:{}", BASE64.encode(self.inner.to_keypair_bytes()))
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.inner
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret material.
        f.write_str("SecretKey(..)")
    }
}

/// A public verification key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Parse from `keyname:base64(public)` form.
    pub fn parse(s: &str) -> SignerResult<(String, Self)> {
        let (name, raw) = decode_key::<PUBLIC_KEY_LENGTH>(s)?;
        let inner = VerifyingKey::from_bytes(&raw).map_err(|e| {
            SignerError::KeyParsing(format!("not a valid ed25519 public key: {e}"))
        })?;
        Ok((name.to_string(), Self { inner }))
    }

    /// Render as `keyname:base64(public)`.
    pub fn to_key_string(&self, key_name: &str) -> String {
        format!("{key_name}:{}", BASE64.encode(self.inner.as_bytes()))
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.inner
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", BASE64.encode(self.inner.as_bytes()))
    }
}

/// A secret key bound to the name verifiers will know it by.
pub struct KeyPair {
    name: String,
    secret: SecretKey,
}

impl KeyPair {
    /// Generate a key pair with a fresh random key.
    pub fn generate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: SecretKey::generate(),
        }
    }

    /// Parse from a secret key string, taking the name from the prefix.
    pub fn parse_secret(s: &str) -> SignerResult<Self> {
        let (name, secret) = SecretKey::parse(s)?;
        Ok(Self { name, secret })
    }

    /// The key name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The secret key.
    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// The public key.
    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// The secret key string.
    pub fn to_secret_string(&self) -> String {
        self.secret.to_key_string(&self.name)
    }

    /// The public key string, for distribution to verifiers.
    pub fn to_public_string(&self) -> String {
        self.public_key().to_key_string(&self.name)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("name", &self.name)
            .field("public", &self.public_key())
            .finish()
    }
}
