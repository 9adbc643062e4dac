//! Store path identifiers and parsing.

use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The digest portion of a store path: 20 hash bytes rendered as 32
/// base-32 characters.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePathDigest(String);

impl StorePathDigest {
    /// Digest width in raw bytes.
    pub const BYTES: usize = 20;

    /// Digest width in rendered characters.
    pub const CHARS: usize = 32;

    /// Create from a rendered string, validating length and alphabet.
    pub fn new(digest: impl Into<String>) -> crate::Result<Self> {
        let digest = digest.into();
        if digest.len() != Self::CHARS {
            return Err(crate::Error::InvalidStorePath(format!(
                "store path digest must be {} chars, got {}",
                Self::CHARS,
                digest.len()
            )));
        }
        for c in digest.bytes() {
            if !crate::hash::BASE32_CHARS.contains(&c) {
                return Err(crate::Error::InvalidStorePath(format!(
                    "invalid character in store path digest: {}",
                    c as char
                )));
            }
        }
        Ok(Self(digest))
    }

    /// Render a 20-byte hash as a store path digest.
    pub fn from_hash(hash: &Hash) -> Self {
        debug_assert_eq!(hash.size(), Self::BYTES);
        Self(hash.encode(crate::hash::HashFormat::Base32, false))
    }

    /// Get the digest string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StorePathDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePathDigest({self})")
    }
}

impl fmt::Display for StorePathDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A full store path (`/larder/store/<digest>-<name>`).
///
/// Ordered by `(digest, name)`, which coincides with the lexicographic
/// order of the rendered path.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath {
    digest: StorePathDigest,
    name: String,
}

impl StorePath {
    /// The standard store directory.
    pub const STORE_DIR: &'static str = "/larder/store";

    /// Parse a full store path string.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let prefix = format!("{}/", Self::STORE_DIR);
        let rest = path
            .strip_prefix(&prefix)
            .ok_or_else(|| crate::Error::InvalidStorePath(format!("must start with {prefix}")))?;
        Self::from_basename(rest)
    }

    /// Construct from a basename (`digest-name`) string.
    pub fn from_basename(basename: &str) -> crate::Result<Self> {
        if !basename.is_ascii() {
            return Err(crate::Error::InvalidStorePath(
                "store path contains non-ASCII characters".to_string(),
            ));
        }

        if basename.len() < StorePathDigest::CHARS + 2 {
            return Err(crate::Error::InvalidStorePath("path too short".to_string()));
        }

        let digest_part = &basename[..StorePathDigest::CHARS];
        if basename.as_bytes()[StorePathDigest::CHARS] != b'-' {
            return Err(crate::Error::InvalidStorePath(
                "expected '-' after digest".to_string(),
            ));
        }

        let name = &basename[StorePathDigest::CHARS + 1..];
        Self::new(StorePathDigest::new(digest_part)?, name)
    }

    /// Create from components, validating the name.
    pub fn new(digest: StorePathDigest, name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { digest, name })
    }

    /// Get the digest portion.
    pub fn digest(&self) -> &StorePathDigest {
        &self.digest
    }

    /// Get the name portion.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the basename (`digest-name`) without the store directory.
    pub fn basename(&self) -> String {
        format!("{}-{}", self.digest, self.name)
    }

    /// Get the full path string under the standard store directory.
    pub fn to_path_string(&self) -> String {
        format!("{}/{}-{}", Self::STORE_DIR, self.digest, self.name)
    }
}

fn validate_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidStorePath(
            "name cannot be empty".to_string(),
        ));
    }
    for c in name.chars() {
        if !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '+') {
            return Err(crate::Error::InvalidStorePath(format!(
                "invalid character in name: {c}"
            )));
        }
    }
    Ok(())
}

impl fmt::Debug for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePath({})", self.to_path_string())
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path_string())
    }
}

impl FromStr for StorePath {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for StorePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StorePath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
