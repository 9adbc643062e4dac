//! Traits at the seam to the detached-signature primitive.
//!
//! Signature tokens are opaque strings here; their internal structure is
//! the verifier's business.

/// Produces detached signature tokens over canonical fingerprint strings.
pub trait Signer {
    /// Sign a fingerprint, returning a signature token.
    fn sign_detached(&self, fingerprint: &str) -> String;
}

/// A set of trusted public keys able to check detached signature tokens.
pub trait TrustedKeys {
    /// True iff `sig` is a valid signature over `fingerprint` by one of the
    /// trusted keys. Unknown signers and malformed tokens verify false.
    fn verify_detached(&self, fingerprint: &str, sig: &str) -> bool;
}
