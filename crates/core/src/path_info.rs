//! Path metadata records and the fingerprint/signing protocol.

use crate::content_address::{
    ContentAddress, ContentAddressMethod, ContentAddressWithReferences, FixedOutputInfo,
    StoreReferences, TextInfo,
};
use crate::hash::{Hash, HashFormat};
use crate::signature::{Signer, TrustedKeys};
use crate::store::Store;
use crate::store_path::StorePath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// Signature-count sentinel for paths that verify themselves.
pub const MAX_SIGS: usize = usize::MAX;

/// Metadata about a valid store path, without the path itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnkeyedValidPathInfo {
    /// The store path of the recipe that (claims to have) produced this
    /// path. Metadata only.
    pub deriver: Option<StorePath>,
    /// SHA-256 digest of the path's canonical archive serialization.
    pub nar_hash: Hash,
    /// Store paths this path references, including itself if applicable.
    pub references: BTreeSet<StorePath>,
    /// Registration time in seconds since the epoch.
    pub registration_time: i64,
    /// Size of the canonical archive serialization; 0 means unknown.
    pub nar_size: u64,
    /// Whether this path is locally trusted (e.g. built here).
    pub ultimate: bool,
    /// Detached signature tokens over the fingerprint.
    pub sigs: BTreeSet<String>,
    /// Content address, if this path is content-addressed.
    pub ca: Option<ContentAddress>,
}

impl UnkeyedValidPathInfo {
    /// New metadata with only the archive hash known.
    pub fn new(nar_hash: Hash) -> Self {
        Self {
            deriver: None,
            nar_hash,
            references: BTreeSet::new(),
            registration_time: 0,
            nar_size: 0,
            ultimate: false,
            sigs: BTreeSet::new(),
            ca: None,
        }
    }
}

/// Metadata about a valid store path, keyed by the path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidPathInfo {
    pub path: StorePath,
    #[serde(flatten)]
    pub info: UnkeyedValidPathInfo,
}

impl ValidPathInfo {
    /// Pair an already-known path with fresh metadata.
    pub fn new(path: StorePath, nar_hash: Hash) -> Self {
        Self {
            path,
            info: UnkeyedValidPathInfo::new(nar_hash),
        }
    }

    /// Construct metadata for a content-addressed path, deriving the path
    /// from the content address via the store.
    pub fn from_content_address(
        store: &dyn Store,
        name: &str,
        ca: ContentAddressWithReferences,
        nar_hash: Hash,
    ) -> crate::Result<Self> {
        let path = store.make_fixed_output_path_from_ca(name, &ca)?;
        let mut info = UnkeyedValidPathInfo::new(nar_hash);
        match ca {
            ContentAddressWithReferences::Text(TextInfo { hash, references }) => {
                info.references = references;
                info.ca = Some(ContentAddress {
                    method: ContentAddressMethod::Text,
                    hash,
                });
            }
            ContentAddressWithReferences::Fixed(FixedOutputInfo {
                method,
                hash,
                references,
            }) => {
                info.references = references.others;
                if references.self_ref {
                    info.references.insert(path.clone());
                }
                info.ca = Some(ContentAddress {
                    method: ContentAddressMethod::File(method),
                    hash,
                });
            }
        }
        Ok(Self { path, info })
    }

    /// The canonical string signatures are computed over.
    ///
    /// Depends only on the path, the archive hash and size, and the
    /// reference set. Fails when the archive size is unknown.
    pub fn fingerprint(&self, store: &dyn Store) -> crate::Result<String> {
        if self.info.nar_size == 0 {
            return Err(crate::Error::FingerprintUnavailable(
                store.print_path(&self.path),
            ));
        }
        Ok(format!(
            "1;{};{};{};{}",
            store.print_path(&self.path),
            self.info.nar_hash.encode(HashFormat::Base32, true),
            self.info.nar_size,
            store.print_path_set(&self.info.references).join(",")
        ))
    }

    /// Sign the fingerprint, adding the resulting token to `sigs`.
    pub fn sign(&mut self, store: &dyn Store, key: &dyn Signer) -> crate::Result<()> {
        let fingerprint = self.fingerprint(store)?;
        self.info.sigs.insert(key.sign_detached(&fingerprint));
        Ok(())
    }

    /// Check a single signature token against the trusted keys.
    pub fn check_signature(
        &self,
        store: &dyn Store,
        keys: &dyn TrustedKeys,
        sig: &str,
    ) -> crate::Result<bool> {
        Ok(keys.verify_detached(&self.fingerprint(store)?, sig))
    }

    /// Count the signatures that verify against the trusted keys.
    ///
    /// Content-addressed paths are self-verifying and short-circuit to
    /// [`MAX_SIGS`].
    pub fn check_signatures(
        &self,
        store: &dyn Store,
        keys: &dyn TrustedKeys,
    ) -> crate::Result<usize> {
        if self.is_content_addressed(store)? {
            return Ok(MAX_SIGS);
        }
        let fingerprint = self.fingerprint(store)?;
        Ok(self
            .info
            .sigs
            .iter()
            .filter(|sig| keys.verify_detached(&fingerprint, sig))
            .count())
    }

    /// Reference basenames in set order.
    pub fn short_refs(&self) -> Vec<String> {
        self.info.references.iter().map(|r| r.basename()).collect()
    }

    /// Recover the content-address-with-references view from the stored
    /// content address and reference set.
    pub fn content_address_with_references(&self) -> Option<ContentAddressWithReferences> {
        let ca = self.info.ca.as_ref()?;
        Some(match ca.method {
            ContentAddressMethod::Text => {
                assert!(
                    !self.info.references.contains(&self.path),
                    "text path must not reference itself"
                );
                ContentAddressWithReferences::Text(TextInfo {
                    hash: ca.hash,
                    references: self.info.references.clone(),
                })
            }
            ContentAddressMethod::File(method) => {
                let mut others = self.info.references.clone();
                let self_ref = others.remove(&self.path);
                ContentAddressWithReferences::Fixed(FixedOutputInfo {
                    method,
                    hash: ca.hash,
                    references: StoreReferences { others, self_ref },
                })
            }
        })
    }

    /// True iff the path is derivable from its stated content-address data.
    ///
    /// A path that claims a content address the store does not re-derive to
    /// the same path gets a warning and verifies false.
    pub fn is_content_addressed(&self, store: &dyn Store) -> crate::Result<bool> {
        let Some(ca) = self.content_address_with_references() else {
            return Ok(false);
        };
        let ca_path = store.make_fixed_output_path_from_ca(self.path.name(), &ca)?;
        if ca_path != self.path {
            warn!(
                path = %store.print_path(&self.path),
                "path claims to be content-addressed but isn't"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_address::FileIngestionMethod;
    use crate::hash::HashType;
    use crate::store::StoreDir;

    fn sample_path(fill: char, name: &str) -> StorePath {
        let digest: String = std::iter::repeat_n(fill, 32).collect();
        StorePath::from_basename(&format!("{digest}-{name}")).unwrap()
    }

    fn sample_info() -> ValidPathInfo {
        let mut vpi = ValidPathInfo::new(
            sample_path('a', "pkg"),
            Hash::compute(HashType::Sha256, "archive bytes"),
        );
        vpi.info.nar_size = 4096;
        vpi.info.references =
            BTreeSet::from([sample_path('b', "dep1"), sample_path('c', "dep2")]);
        vpi
    }

    /// Accepts exactly one canned token, whatever the fingerprint.
    struct OneGoodKey;

    impl TrustedKeys for OneGoodKey {
        fn verify_detached(&self, _fingerprint: &str, sig: &str) -> bool {
            sig == "trusted:token"
        }
    }

    /// Rejects everything.
    struct NoKeys;

    impl TrustedKeys for NoKeys {
        fn verify_detached(&self, _fingerprint: &str, _sig: &str) -> bool {
            false
        }
    }

    struct StubSigner;

    impl Signer for StubSigner {
        fn sign_detached(&self, fingerprint: &str) -> String {
            format!("stub:{}", fingerprint.len())
        }
    }

    #[test]
    fn test_fingerprint_format() {
        let store = StoreDir::default();
        let vpi = sample_info();
        let fingerprint = vpi.fingerprint(&store).unwrap();
        assert_eq!(
            fingerprint,
            format!(
                "1;/larder/store/{}-pkg;{};4096;/larder/store/{}-dep1,/larder/store/{}-dep2",
                "a".repeat(32),
                vpi.info.nar_hash.encode(HashFormat::Base32, true),
                "b".repeat(32),
                "c".repeat(32),
            )
        );
    }

    #[test]
    fn test_fingerprint_ignores_unrelated_fields() {
        let store = StoreDir::default();
        let vpi = sample_info();
        let baseline = vpi.fingerprint(&store).unwrap();

        let mut changed = vpi.clone();
        changed.info.ultimate = true;
        changed.info.registration_time = 1234567890;
        changed.info.deriver = Some(sample_path('d', "pkg.recipe"));
        changed.info.sigs.insert("someone:something".to_string());
        assert_eq!(changed.fingerprint(&store).unwrap(), baseline);

        // The reference set is not unrelated.
        changed.info.references.insert(sample_path('f', "dep3"));
        assert_ne!(changed.fingerprint(&store).unwrap(), baseline);
    }

    #[test]
    fn test_fingerprint_requires_known_size() {
        let store = StoreDir::default();
        let mut vpi = sample_info();
        vpi.info.nar_size = 0;
        assert!(matches!(
            vpi.fingerprint(&store).unwrap_err(),
            crate::Error::FingerprintUnavailable(_)
        ));
    }

    #[test]
    fn test_sign_inserts_token_idempotently() {
        let store = StoreDir::default();
        let mut vpi = sample_info();
        vpi.sign(&store, &StubSigner).unwrap();
        vpi.sign(&store, &StubSigner).unwrap();
        assert_eq!(vpi.info.sigs.len(), 1);
        let token = vpi.info.sigs.iter().next().unwrap();
        assert!(token.starts_with("stub:"));
    }

    #[test]
    fn test_check_signature_and_count() {
        let store = StoreDir::default();
        let mut vpi = sample_info();
        vpi.info.sigs.insert("trusted:token".to_string());
        vpi.info.sigs.insert("rogue:token".to_string());

        assert!(vpi.check_signature(&store, &OneGoodKey, "trusted:token").unwrap());
        assert!(!vpi.check_signature(&store, &OneGoodKey, "rogue:token").unwrap());
        assert_eq!(vpi.check_signatures(&store, &OneGoodKey).unwrap(), 1);
        assert_eq!(vpi.check_signatures(&store, &NoKeys).unwrap(), 0);
    }

    #[test]
    fn test_content_addressed_paths_bypass_signature_count() {
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

        // No signatures, unknown size: the content address alone carries it.
        assert!(vpi.info.sigs.is_empty());
        assert_eq!(vpi.check_signatures(&store, &NoKeys).unwrap(), MAX_SIGS);
    }

    #[test]
    fn test_check_signatures_needs_size_for_plain_paths() {
        let store = StoreDir::default();
        let vpi = ValidPathInfo::new(
            sample_path('a', "pkg"),
            Hash::compute(HashType::Sha256, "archive"),
        );
        assert!(matches!(
            vpi.check_signatures(&store, &NoKeys).unwrap_err(),
            crate::Error::FingerprintUnavailable(_)
        ));
    }

    #[test]
    fn test_reconstruction_splits_self_reference() {
        let mut vpi = sample_info();
        let other = sample_path('b', "dep1");
        vpi.info.references = BTreeSet::from([other.clone(), vpi.path.clone()]);
        let content_hash = Hash::compute(HashType::Sha256, "contents");
        vpi.info.ca = Some(ContentAddress {
            method: ContentAddressMethod::File(FileIngestionMethod::Nar),
            hash: content_hash,
        });

        let ca = vpi.content_address_with_references().unwrap();
        assert_eq!(
            ca,
            ContentAddressWithReferences::Fixed(FixedOutputInfo {
                method: FileIngestionMethod::Nar,
                hash: content_hash,
                references: StoreReferences {
                    others: BTreeSet::from([other]),
                    self_ref: true,
                },
            })
        );
    }

    #[test]
    fn test_reconstruction_of_text_path() {
        let mut vpi = sample_info();
        let content_hash = Hash::compute(HashType::Sha256, "recipe");
        vpi.info.ca = Some(ContentAddress {
            method: ContentAddressMethod::Text,
            hash: content_hash,
        });

        let ca = vpi.content_address_with_references().unwrap();
        assert_eq!(
            ca,
            ContentAddressWithReferences::Text(TextInfo {
                hash: content_hash,
                references: vpi.info.references.clone(),
            })
        );
    }

    #[test]
    fn test_reconstruction_absent_without_ca() {
        let vpi = sample_info();
        assert!(vpi.content_address_with_references().is_none());

        let store = StoreDir::default();
        assert!(!vpi.is_content_addressed(&store).unwrap());
    }

    #[test]
    fn test_content_address_roundtrip() {
        let store = StoreDir::default();
        let nar_hash = Hash::compute(HashType::Sha256, "archive");

        let cases = [
            ContentAddressWithReferences::Text(TextInfo {
                hash: Hash::compute(HashType::Sha256, "recipe"),
                references: BTreeSet::from([sample_path('b', "dep1")]),
            }),
            ContentAddressWithReferences::Fixed(FixedOutputInfo {
                method: FileIngestionMethod::Nar,
                hash: Hash::compute(HashType::Sha256, "contents"),
                references: StoreReferences {
                    others: BTreeSet::from([sample_path('b', "dep1")]),
                    self_ref: true,
                },
            }),
            ContentAddressWithReferences::Fixed(FixedOutputInfo {
                method: FileIngestionMethod::Flat,
                hash: Hash::compute(HashType::Sha1, "blob"),
                references: StoreReferences::default(),
            }),
        ];

        for ca in cases {
            let vpi =
                ValidPathInfo::from_content_address(&store, "pkg", ca.clone(), nar_hash).unwrap();
            assert_eq!(vpi.content_address_with_references().unwrap(), ca);
            assert!(vpi.is_content_addressed(&store).unwrap());
        }
    }

    #[test]
    fn test_mismatched_content_address_is_detected() {
        let store = StoreDir::default();
        let ca = ContentAddressWithReferences::Fixed(FixedOutputInfo {
            method: FileIngestionMethod::Nar,
            hash: Hash::compute(HashType::Sha256, "contents"),
            references: StoreReferences::default(),
        });
        let mut vpi = ValidPathInfo::from_content_address(
            &store,
            "pkg",
            ca,
            Hash::compute(HashType::Sha256, "archive"),
        )
        .unwrap();

        // Swap in a path the content address does not derive to.
        vpi.path = sample_path('a', "pkg");
        assert!(!vpi.is_content_addressed(&store).unwrap());
        assert_eq!(vpi.check_signatures(&store, &NoKeys).unwrap_err().to_string(),
            crate::Error::FingerprintUnavailable(store.print_path(&vpi.path)).to_string());
    }

    #[test]
    fn test_short_refs() {
        let vpi = sample_info();
        assert_eq!(
            vpi.short_refs(),
            vec![
                format!("{}-dep1", "b".repeat(32)),
                format!("{}-dep2", "c".repeat(32)),
            ]
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut vpi = sample_info();
        vpi.info.ca = Some(ContentAddress {
            method: ContentAddressMethod::File(FileIngestionMethod::Nar),
            hash: Hash::compute(HashType::Sha256, "contents"),
        });
        vpi.info.sigs.insert("cache.example.org-1:c2ln".to_string());

        let json = serde_json::to_string(&vpi).unwrap();
        let back: ValidPathInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vpi);
    }
}
