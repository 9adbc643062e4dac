//! Detached signing of path fingerprints and keyring verification.

use crate::error::{SignerError, SignerResult};
use crate::key::{KeyPair, PublicKey};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier as _;
use larder_core::signature::TrustedKeys;
use std::collections::BTreeMap;
use std::fmt;

/// A parsed signature token (`keyname:base64(signature)`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Name of the signing key.
    pub key_name: String,
    /// Base64-encoded signature bytes.
    pub signature: String,
}

impl Signature {
    /// Parse from `keyname:base64` form.
    pub fn parse(s: &str) -> SignerResult<Self> {
        let (key_name, signature) = s
            .split_once(':')
            .ok_or_else(|| SignerError::InvalidSignature(format!("missing ':' in '{s}'")))?;
        Ok(Self {
            key_name: key_name.to_string(),
            signature: signature.to_string(),
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key_name, self.signature)
    }
}

/// Signs path fingerprints with a named ed25519 key.
pub struct PathInfoSigner {
    keypair: KeyPair,
}

impl PathInfoSigner {
    /// Create from a key pair.
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Generate a signer with a fresh random key.
    pub fn generate(key_name: impl Into<String>) -> Self {
        Self::new(KeyPair::generate(key_name))
    }

    /// Create from a secret key string.
    pub fn parse_secret(s: &str) -> SignerResult<Self> {
        Ok(Self::new(KeyPair::parse_secret(s)?))
    }

    /// The key name.
    pub fn key_name(&self) -> &str {
        self.keypair.name()
    }

    /// The public key.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// The public key string, for distribution to verifiers.
    pub fn public_key_string(&self) -> String {
        self.keypair.to_public_string()
    }
}

impl larder_core::Signer for PathInfoSigner {
    fn sign_detached(&self, fingerprint: &str) -> String {
        let sig = self
            .keypair
            .secret()
            .signing_key()
            .sign(fingerprint.as_bytes());
        Signature {
            key_name: self.keypair.name().to_string(),
            signature: BASE64.encode(sig.to_bytes()),
        }
        .to_string()
    }
}

/// Trusted public keys, indexed by key name.
#[derive(Debug, Default)]
pub struct Keyring {
    keys: BTreeMap<String, PublicKey>,
}

impl Keyring {
    /// An empty keyring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key under a name.
    pub fn insert(&mut self, name: impl Into<String>, key: PublicKey) {
        self.keys.insert(name.into(), key);
    }

    /// Add a key from its `keyname:base64` string.
    pub fn add_key_string(&mut self, s: &str) -> SignerResult<()> {
        let (name, key) = PublicKey::parse(s)?;
        self.keys.insert(name, key);
        Ok(())
    }

    /// Look up a key by name.
    pub fn get(&self, name: &str) -> Option<&PublicKey> {
        self.keys.get(name)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no keys are trusted.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl TrustedKeys for Keyring {
    fn verify_detached(&self, fingerprint: &str, sig: &str) -> bool {
        let Ok(sig) = Signature::parse(sig) else {
            return false;
        };
        let Some(key) = self.keys.get(&sig.key_name) else {
            return false;
        };
        let Ok(bytes) = BASE64.decode(&sig.signature) else {
            return false;
        };
        let Ok(raw) = <[u8; 64]>::try_from(bytes) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&raw);
        key.verifying_key()
            .verify(fingerprint.as_bytes(), &sig)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::hash::{Hash, HashType};
    use larder_core::store::StoreDir;
    use larder_core::store_path::StorePath;
    use larder_core::{
        ContentAddressWithReferences, FixedOutputInfo, FileIngestionMethod, MAX_SIGS,
        StoreReferences, ValidPathInfo,
    };

    fn sample_info() -> ValidPathInfo {
        let path =
            StorePath::from_basename(&format!("{}-pkg", "a".repeat(32))).unwrap();
        let mut vpi = ValidPathInfo::new(path, Hash::compute(HashType::Sha256, "archive"));
        vpi.info.nar_size = 2048;
        vpi
    }

    #[test]
    fn test_sign_and_verify() {
        let store = StoreDir::default();
        let signer = PathInfoSigner::generate("test-cache-1");
        let mut vpi = sample_info();

        vpi.sign(&store, &signer).unwrap();
        assert_eq!(vpi.info.sigs.len(), 1);

        let token = vpi.info.sigs.iter().next().unwrap().clone();
        assert!(token.starts_with("test-cache-1:"));

        let mut keyring = Keyring::new();
        keyring.add_key_string(&signer.public_key_string()).unwrap();

        assert!(vpi.check_signature(&store, &keyring, &token).unwrap());
        assert_eq!(vpi.check_signatures(&store, &keyring).unwrap(), 1);
    }

    #[test]
    fn test_signing_is_idempotent() {
        // Ed25519 signatures are deterministic, so re-signing with the same
        // key cannot grow the signature set.
        let store = StoreDir::default();
        let signer = PathInfoSigner::generate("test-cache-1");
        let mut vpi = sample_info();

        vpi.sign(&store, &signer).unwrap();
        vpi.sign(&store, &signer).unwrap();
        assert_eq!(vpi.info.sigs.len(), 1);

        // A second key accumulates alongside the first.
        let other = PathInfoSigner::generate("test-cache-2");
        vpi.sign(&store, &other).unwrap();
        assert_eq!(vpi.info.sigs.len(), 2);
    }

    #[test]
    fn test_unknown_signer_verifies_false() {
        let store = StoreDir::default();
        let signer = PathInfoSigner::generate("untrusted-1");
        let mut vpi = sample_info();
        vpi.sign(&store, &signer).unwrap();

        let token = vpi.info.sigs.iter().next().unwrap().clone();
        let keyring = Keyring::new();
        assert!(!vpi.check_signature(&store, &keyring, &token).unwrap());
        assert_eq!(vpi.check_signatures(&store, &keyring).unwrap(), 0);
    }

    #[test]
    fn test_wrong_key_verifies_false() {
        let store = StoreDir::default();
        let signer = PathInfoSigner::generate("cache-1");
        let imposter = PathInfoSigner::generate("cache-1");
        let mut vpi = sample_info();
        vpi.sign(&store, &signer).unwrap();

        // Same key name, different key material.
        let mut keyring = Keyring::new();
        keyring.add_key_string(&imposter.public_key_string()).unwrap();

        let token = vpi.info.sigs.iter().next().unwrap().clone();
        assert!(!vpi.check_signature(&store, &keyring, &token).unwrap());
    }

    #[test]
    fn test_tampered_fingerprint_verifies_false() {
        let store = StoreDir::default();
        let signer = PathInfoSigner::generate("cache-1");
        let mut vpi = sample_info();
        vpi.sign(&store, &signer).unwrap();

        let mut keyring = Keyring::new();
        keyring.add_key_string(&signer.public_key_string()).unwrap();

        // Grow the archive size after signing: the old token no longer
        // matches the fingerprint.
        vpi.info.nar_size += 1;
        assert_eq!(vpi.check_signatures(&store, &keyring).unwrap(), 0);
    }

    #[test]
    fn test_malformed_tokens_verify_false() {
        let store = StoreDir::default();
        let vpi = sample_info();
        let keyring = Keyring::new();

        for token in ["no separator", "key:@@not-base64@@", "key:c2hvcnQ="] {
            assert!(!vpi.check_signature(&store, &keyring, token).unwrap());
        }
    }

    #[test]
    fn test_content_addressed_path_needs_no_signatures() {
        let store = StoreDir::default();
        let ca = ContentAddressWithReferences::Fixed(FixedOutputInfo {
            method: FileIngestionMethod::Nar,
            hash: Hash::compute(HashType::Sha256, "contents"),
            references: StoreReferences::default(),
        });
        let vpi = ValidPathInfo::from_content_address(
            &store,
            "pkg",
            ca,
            Hash::compute(HashType::Sha256, "archive"),
        )
        .unwrap();

        let keyring = Keyring::new();
        assert_eq!(vpi.check_signatures(&store, &keyring).unwrap(), MAX_SIGS);
    }

    #[test]
    fn test_signature_token_roundtrip() {
        let sig = Signature::parse("cache.example.org-1:QUJDRA==").unwrap();
        assert_eq!(sig.key_name, "cache.example.org-1");
        assert_eq!(sig.signature, "QUJDRA==");
        assert_eq!(sig.to_string(), "cache.example.org-1:QUJDRA==");

        assert!(matches!(
            Signature::parse("no-separator").unwrap_err(),
            SignerError::InvalidSignature(_)
        ));
    }

    #[test]
    fn test_signer_roundtrip_through_secret_string() {
        let signer = PathInfoSigner::generate("cache-1");
        let restored =
            PathInfoSigner::parse_secret(&signer.keypair.to_secret_string()).unwrap();
        assert_eq!(restored.key_name(), "cache-1");
        assert_eq!(restored.public_key_string(), signer.public_key_string());
    }
}
