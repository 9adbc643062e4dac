//! Content addresses: how a path's identity derives from its contents.

use crate::hash::{Hash, HashFormat};
use crate::store_path::StorePath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// How file contents are ingested before hashing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileIngestionMethod {
    /// Hash the file bytes as-is.
    Flat,
    /// Hash the canonical archive serialization of the subtree.
    Nar,
    /// Hash the git tree-object serialization.
    Git,
}

impl FileIngestionMethod {
    /// The method marker used inside rendered content addresses and
    /// fixed-output path derivations.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Flat => "",
            Self::Nar => "r:",
            Self::Git => "git:",
        }
    }
}

/// How a content address was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentAddressMethod {
    /// Serialized-text ingestion (flat, for build recipes and the like).
    Text,
    /// File ingestion with the given method.
    File(FileIngestionMethod),
}

/// A content hash paired with the method that produced it.
///
/// Rendered as `text:<hash>` or `fixed:[r:|git:]<hash>` with a
/// type-prefixed base-32 hash body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentAddress {
    pub method: ContentAddressMethod,
    pub hash: Hash,
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hash = self.hash.encode(HashFormat::Base32, true);
        match self.method {
            ContentAddressMethod::Text => write!(f, "text:{hash}"),
            ContentAddressMethod::File(method) => {
                write!(f, "fixed:{}{}", method.prefix(), hash)
            }
        }
    }
}

impl FromStr for ContentAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        if let Some(rest) = s.strip_prefix("text:") {
            Ok(ContentAddress {
                method: ContentAddressMethod::Text,
                hash: Hash::parse_any_prefixed(rest)?,
            })
        } else if let Some(rest) = s.strip_prefix("fixed:") {
            let (method, rest) = if let Some(rest) = rest.strip_prefix("r:") {
                (FileIngestionMethod::Nar, rest)
            } else if let Some(rest) = rest.strip_prefix("git:") {
                (FileIngestionMethod::Git, rest)
            } else {
                (FileIngestionMethod::Flat, rest)
            };
            Ok(ContentAddress {
                method: ContentAddressMethod::File(method),
                hash: Hash::parse_any_prefixed(rest)?,
            })
        } else {
            Err(crate::Error::InvalidContentAddress(format!(
                "unknown content address scheme in '{s}'"
            )))
        }
    }
}

impl Serialize for ContentAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference set of a fixed-output path, with the self-reference split out
/// because the owning path is not known until it is derived.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreReferences {
    /// References to other store paths.
    pub others: BTreeSet<StorePath>,
    /// Whether the path references itself.
    pub self_ref: bool,
}

impl StoreReferences {
    /// True when there are no references at all.
    pub fn is_empty(&self) -> bool {
        !self.self_ref && self.others.is_empty()
    }
}

/// Content-address data for a serialized-text path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextInfo {
    pub hash: Hash,
    /// Text paths never reference themselves.
    pub references: BTreeSet<StorePath>,
}

/// Content-address data for a fixed-output path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedOutputInfo {
    pub method: FileIngestionMethod,
    pub hash: Hash,
    pub references: StoreReferences,
}

/// A content address together with the reference closure needed to derive
/// the store path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentAddressWithReferences {
    Text(TextInfo),
    Fixed(FixedOutputInfo),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashType;

    fn sample_hash() -> Hash {
        Hash::compute(HashType::Sha256, "sample")
    }

    #[test]
    fn test_render_and_parse_text() {
        let ca = ContentAddress {
            method: ContentAddressMethod::Text,
            hash: sample_hash(),
        };
        let rendered = ca.to_string();
        assert!(rendered.starts_with("text:sha256:"));
        assert_eq!(rendered.parse::<ContentAddress>().unwrap(), ca);
    }

    #[test]
    fn test_render_and_parse_fixed() {
        for (method, marker) in [
            (FileIngestionMethod::Flat, "fixed:sha256:"),
            (FileIngestionMethod::Nar, "fixed:r:sha256:"),
            (FileIngestionMethod::Git, "fixed:git:sha256:"),
        ] {
            let ca = ContentAddress {
                method: ContentAddressMethod::File(method),
                hash: sample_hash(),
            };
            let rendered = ca.to_string();
            assert!(rendered.starts_with(marker), "{rendered}");
            assert_eq!(rendered.parse::<ContentAddress>().unwrap(), ca);
        }
    }

    #[test]
    fn test_parse_unknown_scheme() {
        let err = "loose:sha256:abc".parse::<ContentAddress>().unwrap_err();
        assert!(matches!(err, crate::Error::InvalidContentAddress(_)));
    }

    #[test]
    fn test_parse_requires_hash_type_prefix() {
        let body = sample_hash().encode(HashFormat::Base32, false);
        let err = format!("text:{body}").parse::<ContentAddress>().unwrap_err();
        assert!(matches!(err, crate::Error::BadHashType(_)));
    }

    #[test]
    fn test_serde_uses_textual_form() {
        let ca = ContentAddress {
            method: ContentAddressMethod::File(FileIngestionMethod::Nar),
            hash: sample_hash(),
        };
        let json = serde_json::to_string(&ca).unwrap();
        let back: ContentAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ca);
    }

    #[test]
    fn test_store_references_is_empty() {
        let mut refs = StoreReferences::default();
        assert!(refs.is_empty());
        refs.self_ref = true;
        assert!(!refs.is_empty());
    }
}
