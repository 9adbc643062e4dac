//! The store collaborator: path printing and fixed-output path derivation.

use crate::content_address::{ContentAddressWithReferences, FileIngestionMethod};
use crate::hash::{Hash, HashFormat, HashType, compress_hash};
use crate::store_path::{StorePath, StorePathDigest};
use std::collections::BTreeSet;

/// The narrow store interface the path metadata layer consumes.
pub trait Store {
    /// The store directory paths are printed under.
    fn store_dir(&self) -> &str;

    /// Render a store path as a printable string.
    fn print_path(&self, path: &StorePath) -> String {
        format!("{}/{}", self.store_dir(), path.basename())
    }

    /// Render a reference set in its (total, stable) set order.
    fn print_path_set(&self, paths: &BTreeSet<StorePath>) -> Vec<String> {
        paths.iter().map(|p| self.print_path(p)).collect()
    }

    /// Derive the store path a content address and its references pin down.
    fn make_fixed_output_path_from_ca(
        &self,
        name: &str,
        ca: &ContentAddressWithReferences,
    ) -> crate::Result<StorePath>;
}

/// A concrete store rooted at a directory.
///
/// Path identity is a path-type tag, the content hash, the store directory,
/// and the name, hashed together and XOR-folded to the store digest width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreDir {
    dir: String,
}

impl StoreDir {
    /// A store rooted at the given directory.
    pub fn new(dir: impl Into<String>) -> Self {
        Self { dir: dir.into() }
    }

    fn make_store_path(
        &self,
        path_type: &str,
        hash: &Hash,
        name: &str,
    ) -> crate::Result<StorePath> {
        let ident = format!(
            "{path_type}:{}:{}:{name}",
            hash.encode(HashFormat::Base16, true),
            self.dir
        );
        let digest = compress_hash(
            &Hash::compute(HashType::Sha256, &ident),
            StorePathDigest::BYTES,
        );
        StorePath::new(StorePathDigest::from_hash(&digest), name)
    }

    fn make_type(&self, prefix: &str, others: &BTreeSet<StorePath>, self_ref: bool) -> String {
        let mut path_type = String::from(prefix);
        for reference in others {
            path_type.push(':');
            path_type.push_str(&self.print_path(reference));
        }
        if self_ref {
            path_type.push_str(":self");
        }
        path_type
    }
}

impl Default for StoreDir {
    fn default() -> Self {
        Self::new(StorePath::STORE_DIR)
    }
}

impl Store for StoreDir {
    fn store_dir(&self) -> &str {
        &self.dir
    }

    fn make_fixed_output_path_from_ca(
        &self,
        name: &str,
        ca: &ContentAddressWithReferences,
    ) -> crate::Result<StorePath> {
        match ca {
            ContentAddressWithReferences::Text(info) => {
                if info.hash.hash_type() != HashType::Sha256 {
                    return Err(crate::Error::InvalidContentAddress(format!(
                        "text path '{name}' must use a SHA-256 content hash, not {}",
                        info.hash.hash_type()
                    )));
                }
                self.make_store_path(
                    &self.make_type("text", &info.references, false),
                    &info.hash,
                    name,
                )
            }
            ContentAddressWithReferences::Fixed(info) => {
                if info.method == FileIngestionMethod::Nar
                    && info.hash.hash_type() == HashType::Sha256
                {
                    self.make_store_path(
                        &self.make_type("source", &info.references.others, info.references.self_ref),
                        &info.hash,
                        name,
                    )
                } else {
                    if !info.references.is_empty() {
                        return Err(crate::Error::InvalidContentAddress(format!(
                            "fixed-output path '{name}' may only carry references when \
                             ingested as a SHA-256 archive"
                        )));
                    }
                    let ident = format!(
                        "fixed:out:{}{}:",
                        info.method.prefix(),
                        info.hash.encode(HashFormat::Base16, true)
                    );
                    self.make_store_path(
                        "output:out",
                        &Hash::compute(HashType::Sha256, &ident),
                        name,
                    )
                }
            }
        }
    }
}
