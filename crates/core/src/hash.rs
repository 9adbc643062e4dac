//! Cryptographic hash types, textual encodings, and the streaming digest engine.
//!
//! A [`Hash`] carries its algorithm tag and up to 64 digest bytes. It renders
//! to and parses from four textual forms: lowercase hex, the store's base-32
//! alphabet, standard base-64, and SRI (`<type>-<base64>`).

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::cmp::Ordering;
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// Largest digest size we carry (SHA-512).
pub const MAX_HASH_SIZE: usize = 64;

/// Base-64 engine that accepts both padded and unpadded input.
const BASE64_RELAXED: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const BASE64_PADDED: GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// The base-32 alphabet used for store digests. The letters `e`, `o`, `u`,
/// and `t` are omitted to avoid accidental words.
pub const BASE32_CHARS: &[u8; 32] = b"0123456789abcdfghijklmnpqrsvwxyz";

/// Supported digest algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashType {
    /// All supported algorithms.
    pub const ALL: [HashType; 4] = [
        HashType::Md5,
        HashType::Sha1,
        HashType::Sha256,
        HashType::Sha512,
    ];

    /// Digest size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    /// The textual algorithm tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Parse an algorithm tag.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            _ => Err(crate::Error::UnknownHashType(s.to_string())),
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

/// Textual renderings of a hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFormat {
    Base16,
    Base32,
    Base64,
    Sri,
}

impl HashFormat {
    /// The textual format token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base16 => "base16",
            Self::Base32 => "base32",
            Self::Base64 => "base64",
            Self::Sri => "sri",
        }
    }

    /// Parse a format token.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "base16" => Ok(Self::Base16),
            "base32" => Ok(Self::Base32),
            "base64" => Ok(Self::Base64),
            "sri" => Ok(Self::Sri),
            _ => Err(crate::Error::UnknownHashFormat(s.to_string())),
        }
    }
}

impl fmt::Display for HashFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

/// A digest value tagged with its algorithm.
///
/// Only the first `size` bytes of the buffer are meaningful; the rest are
/// zero. Equality and ordering compare `(size, bytes[..size])` and ignore
/// the algorithm tag: fingerprints already render the tag, and compressed
/// digests of different provenance are interchangeable byte strings.
#[derive(Clone, Copy)]
pub struct Hash {
    hash_type: HashType,
    size: usize,
    bytes: [u8; MAX_HASH_SIZE],
}

impl Hash {
    /// The all-zero SHA-256 hash, used as a placeholder.
    pub const fn dummy() -> Self {
        Hash {
            hash_type: HashType::Sha256,
            size: 32,
            bytes: [0; MAX_HASH_SIZE],
        }
    }

    fn zeroed(hash_type: HashType) -> Self {
        Hash {
            hash_type,
            size: hash_type.size(),
            bytes: [0; MAX_HASH_SIZE],
        }
    }

    /// Create from raw digest bytes of the algorithm's natural size.
    pub fn from_slice(hash_type: HashType, bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() != hash_type.size() {
            return Err(crate::Error::BadHashLength(
                format!("{} raw bytes", bytes.len()),
                hash_type,
            ));
        }
        let mut hash = Hash::zeroed(hash_type);
        hash.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(hash)
    }

    /// One-shot digest of a byte string.
    pub fn compute(hash_type: HashType, data: impl AsRef<[u8]>) -> Self {
        let mut ctx = Context::new(hash_type);
        ctx.update(data.as_ref());
        ctx.finish(hash_type)
    }

    /// The algorithm tag.
    pub fn hash_type(&self) -> HashType {
        self.hash_type
    }

    /// Number of meaningful digest bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The meaningful digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.size]
    }

    /// Length of the base-16 rendering.
    pub fn base16_len(&self) -> usize {
        self.size * 2
    }

    /// Length of the base-32 rendering.
    pub fn base32_len(&self) -> usize {
        (self.size * 8 + 4) / 5
    }

    /// Length of the padded base-64 rendering.
    pub fn base64_len(&self) -> usize {
        ((4 * self.size / 3) + 3) & !3
    }

    /// Render in the given format, optionally prefixed with the algorithm
    /// tag. SRI always carries the tag.
    pub fn encode(&self, format: HashFormat, include_type: bool) -> String {
        let mut s = String::new();
        if format == HashFormat::Sri || include_type {
            s.push_str(self.hash_type.as_str());
            s.push(if format == HashFormat::Sri { '-' } else { ':' });
        }
        match format {
            HashFormat::Base16 => s.push_str(&encode_base16(self.as_bytes())),
            HashFormat::Base32 => s.push_str(&encode_base32(self.as_bytes())),
            HashFormat::Base64 | HashFormat::Sri => {
                s.push_str(&BASE64_PADDED.encode(self.as_bytes()));
            }
        }
        s
    }

    /// Unprefixed base-16 for MD5, unprefixed base-32 otherwise.
    ///
    /// Compatibility rendering kept for tools that predate typed hashes.
    pub fn to_base16_or_32(&self) -> String {
        match self.hash_type {
            HashType::Md5 => self.encode(HashFormat::Base16, false),
            _ => self.encode(HashFormat::Base32, false),
        }
    }

    /// Parse an SRI hash (`<type>-<base64>`). The type tag is mandatory.
    pub fn parse_sri(s: &str) -> crate::Result<Self> {
        let Some((prefix, rest)) = s.split_once('-') else {
            return Err(crate::Error::BadHashType(format!("hash '{s}' is not SRI")));
        };
        Self::from_body(rest, HashType::parse(prefix)?, true)
    }

    /// Parse a hash that carries an explicit `<type>:` or SRI `<type>-` prefix.
    pub fn parse_any_prefixed(s: &str) -> crate::Result<Self> {
        let (parsed, is_sri, rest) = split_prefix(s)?;
        let Some(hash_type) = parsed else {
            return Err(crate::Error::BadHashType(format!(
                "hash '{s}' does not include a hash type prefix"
            )));
        };
        Self::from_body(rest, hash_type, is_sri)
    }

    /// Parse a hash with an optional type prefix. If both the string and the
    /// caller supply a type they must agree.
    pub fn parse_any(s: &str, expected: Option<HashType>) -> crate::Result<Self> {
        let (parsed, is_sri, rest) = split_prefix(s)?;
        let hash_type = match (parsed, expected) {
            (Some(parsed), Some(expected)) if parsed != expected => {
                return Err(crate::Error::BadHashType(format!(
                    "hash '{s}' should have type '{expected}'"
                )));
            }
            (Some(parsed), _) => parsed,
            (None, Some(expected)) => expected,
            (None, None) => {
                return Err(crate::Error::BadHashType(format!(
                    "hash '{s}' does not include a type, nor is the type otherwise known from context"
                )));
            }
        };
        Self::from_body(rest, hash_type, is_sri)
    }

    /// Parse a bare hash body of known type. SRI is not accepted.
    pub fn parse_non_sri_unprefixed(s: &str, hash_type: HashType) -> crate::Result<Self> {
        Self::from_body(s, hash_type, false)
    }

    /// Parse a hash, mapping the empty string to the all-zero hash of the
    /// expected type. Emits a warning when it does.
    pub fn parse_allow_empty(s: &str, expected: Option<HashType>) -> crate::Result<Self> {
        if s.is_empty() {
            let Some(hash_type) = expected else {
                return Err(crate::Error::BadHashType(
                    "empty hash requires an explicit hash type".to_string(),
                ));
            };
            let hash = Hash::zeroed(hash_type);
            warn!(
                "found empty hash, assuming '{}'",
                hash.encode(HashFormat::Sri, true)
            );
            Ok(hash)
        } else {
            Self::parse_any(s, expected)
        }
    }

    /// Decode a hash body. The body length selects the encoding; SRI bodies
    /// are always base-64.
    fn from_body(body: &str, hash_type: HashType, is_sri: bool) -> crate::Result<Self> {
        let mut hash = Hash::zeroed(hash_type);

        if !is_sri && body.len() == hash.base16_len() {
            let raw = body.as_bytes();
            for i in 0..hash.size {
                let hi = hex_digit(raw[i * 2]);
                let lo = hex_digit(raw[i * 2 + 1]);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => hash.bytes[i] = hi << 4 | lo,
                    _ => {
                        return Err(crate::Error::BadHashEncoding(
                            body.to_string(),
                            "base-16",
                        ));
                    }
                }
            }
        } else if !is_sri && body.len() == hash.base32_len() {
            decode_base32(body, &mut hash.bytes[..hash.size])
                .ok_or_else(|| crate::Error::BadHashEncoding(body.to_string(), "base-32"))?;
        } else if is_sri || body.len() == hash.base64_len() {
            let encoding = if is_sri { "SRI" } else { "base-64" };
            let decoded = BASE64_RELAXED
                .decode(body)
                .map_err(|_| crate::Error::BadHashEncoding(body.to_string(), encoding))?;
            if decoded.len() != hash.size {
                return Err(crate::Error::BadHashEncoding(body.to_string(), encoding));
            }
            hash.bytes[..hash.size].copy_from_slice(&decoded);
        } else {
            return Err(crate::Error::BadHashLength(body.to_string(), hash_type));
        }

        Ok(hash)
    }
}

impl PartialEq for Hash {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Hash {}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size
            .cmp(&other.size)
            .then_with(|| self.as_bytes().cmp(other.as_bytes()))
    }
}

impl std::hash::Hash for Hash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.size.hash(state);
        self.as_bytes().hash(state);
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.encode(HashFormat::Base32, true))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode(HashFormat::Base32, true))
    }
}

impl FromStr for Hash {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse_any(s, None)
    }
}

impl Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// XOR-fold a hash down to `new_size` bytes, preserving the type tag.
///
/// Source byte `i` lands in destination byte `i % new_size`. Folding to the
/// hash's own size is the identity.
pub fn compress_hash(hash: &Hash, new_size: usize) -> Hash {
    debug_assert!(new_size >= 1 && new_size <= MAX_HASH_SIZE);
    let mut out = Hash {
        hash_type: hash.hash_type,
        size: new_size,
        bytes: [0; MAX_HASH_SIZE],
    };
    for (i, &b) in hash.as_bytes().iter().enumerate() {
        out.bytes[i % new_size] ^= b;
    }
    out
}

fn split_prefix(s: &str) -> crate::Result<(Option<HashType>, bool, &str)> {
    if let Some((prefix, rest)) = s.split_once(':') {
        Ok((Some(HashType::parse(prefix)?), false, rest))
    } else if let Some((prefix, rest)) = s.split_once('-') {
        Ok((Some(HashType::parse(prefix)?), true, rest))
    } else {
        Ok((None, false, s))
    }
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn encode_base16(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(HEX[(b >> 4) as usize] as char);
        s.push(HEX[(b & 0x0f) as usize] as char);
    }
    s
}

// The front of the rendered string corresponds to the high bits of the
// digest, so characters are emitted last-first.
fn encode_base32(bytes: &[u8]) -> String {
    let len = (bytes.len() * 8 + 4) / 5;
    let mut s = String::with_capacity(len);
    for n in (0..len).rev() {
        let b = n * 5;
        let i = b / 8;
        let j = b % 8;
        let lo = (bytes[i] as u16) >> j;
        let hi = if i + 1 < bytes.len() {
            (bytes[i + 1] as u16) << (8 - j)
        } else {
            0
        };
        s.push(BASE32_CHARS[((lo | hi) & 0x1f) as usize] as char);
    }
    s
}

// Inverse of `encode_base32`. Returns None on a character outside the
// alphabet or when the leading character carries bits beyond the digest
// length.
fn decode_base32(s: &str, out: &mut [u8]) -> Option<()> {
    for (n, &c) in s.as_bytes().iter().rev().enumerate() {
        let digit = BASE32_CHARS.iter().position(|&a| a == c)? as u16;
        let b = n * 5;
        let i = b / 8;
        let j = b % 8;
        out[i] |= (digit << j) as u8;
        let carry = digit >> (8 - j);
        if i + 1 < out.len() {
            out[i + 1] |= carry as u8;
        } else if carry != 0 {
            return None;
        }
    }
    Some(())
}

#[derive(Clone)]
enum Context {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Context {
    fn new(hash_type: HashType) -> Self {
        match hash_type {
            HashType::Md5 => Context::Md5(Md5::new()),
            HashType::Sha1 => Context::Sha1(Sha1::new()),
            HashType::Sha256 => Context::Sha256(Sha256::new()),
            HashType::Sha512 => Context::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Context::Md5(ctx) => ctx.update(data),
            Context::Sha1(ctx) => ctx.update(data),
            Context::Sha256(ctx) => ctx.update(data),
            Context::Sha512(ctx) => ctx.update(data),
        }
    }

    fn finish(self, hash_type: HashType) -> Hash {
        let mut hash = Hash::zeroed(hash_type);
        match self {
            Context::Md5(ctx) => hash.bytes[..16].copy_from_slice(&ctx.finalize()),
            Context::Sha1(ctx) => hash.bytes[..20].copy_from_slice(&ctx.finalize()),
            Context::Sha256(ctx) => hash.bytes[..32].copy_from_slice(&ctx.finalize()),
            Context::Sha512(ctx) => hash.bytes[..64].copy_from_slice(&ctx.finalize()),
        }
        hash
    }
}

/// A streaming hasher that counts the bytes fed into it.
///
/// Exclusively owned by one writer; [`HashSink::current`] may be called
/// mid-stream without disturbing further writes.
pub struct HashSink {
    hash_type: HashType,
    ctx: Context,
    bytes: u64,
}

impl HashSink {
    /// Construct a sink for the given algorithm.
    pub fn new(hash_type: HashType) -> Self {
        Self {
            hash_type,
            ctx: Context::new(hash_type),
            bytes: 0,
        }
    }

    /// Append bytes to the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.ctx.update(data);
        self.bytes += data.len() as u64;
    }

    /// Finalize, consuming the sink. Returns the digest and byte count.
    pub fn finish(self) -> (Hash, u64) {
        (self.ctx.finish(self.hash_type), self.bytes)
    }

    /// The digest as if finalized now. The sink remains usable; the probe
    /// finalizes a clone of the digest context.
    pub fn current(&self) -> (Hash, u64) {
        (self.ctx.clone().finish(self.hash_type), self.bytes)
    }
}

impl io::Write for HashSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hash the contents of a file.
pub fn hash_file(hash_type: HashType, path: &Path) -> crate::Result<Hash> {
    let mut file = std::fs::File::open(path)?;
    let mut sink = HashSink::new(hash_type);
    io::copy(&mut file, &mut sink)?;
    Ok(sink.finish().0)
}

/// Hash a filesystem subtree through its canonical archive serialization.
///
/// `dump` is the collaborator that writes the (filtered) serialization of
/// `path` into the sink. Returns the digest and the serialization's length.
pub fn hash_path<F>(hash_type: HashType, path: &Path, dump: F) -> crate::Result<(Hash, u64)>
where
    F: FnOnce(&Path, &mut HashSink) -> io::Result<()>,
{
    let mut sink = HashSink::new(hash_type);
    dump(path, &mut sink)?;
    Ok(sink.finish())
}
