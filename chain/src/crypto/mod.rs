//! Cryptographic primitives for the chain.
//!
//! Thin wrappers over `ed25519-dalek` and `sha2` with the error posture
//! the chain needs: signing is fallible only through the registry layer,
//! and verification **never** panics. Any malformed key, signature, or
//! message resolves to `false`.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::types::{Hash256, OperatorKey, SECRET_KEY_LEN, SIGNATURE_LEN, Signature};

/// Merkle root construction over judgment leaf hashes.
pub mod merkle;

pub use merkle::merkle_root;

/// Generates a fresh Ed25519 keypair from the OS RNG.
///
/// Returns `(public, secret)`. The secret half is raw seed bytes; the
/// registry is the only component that should hold on to it.
pub fn keygen_ed25519() -> (OperatorKey, [u8; SECRET_KEY_LEN]) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public = OperatorKey(signing_key.verifying_key().to_bytes());
    (public, signing_key.to_bytes())
}

/// Derives the public key for a raw Ed25519 secret.
pub fn public_key_of(secret: &[u8; SECRET_KEY_LEN]) -> OperatorKey {
    let signing_key = SigningKey::from_bytes(secret);
    OperatorKey(signing_key.verifying_key().to_bytes())
}

/// Signs `msg` with a raw Ed25519 secret, producing a 64-byte detached
/// signature.
pub fn sign_ed25519(secret: &[u8; SECRET_KEY_LEN], msg: &[u8]) -> Signature {
    let signing_key = SigningKey::from_bytes(secret);
    Signature(signing_key.sign(msg).to_bytes().to_vec())
}

/// Verifies a detached Ed25519 signature.
///
/// Returns `false` on any malformed input: wrong key length, wrong
/// signature length, non-canonical key bytes. Never panics.
pub fn verify_ed25519(public: &[u8], msg: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; SIGNATURE_LEN]>::try_from(signature) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key.verify(msg, &sig).is_ok()
}

/// Computes the SHA-256 hash of `data`.
pub fn sha256(data: &[u8]) -> Hash256 {
    Hash256::compute(data)
}
