//! Ed25519 helpers for webhook interaction signing.
//!
//! Keys travel as hex strings. Private keys are accepted either as a 32-byte
//! seed or as a 64-byte secret key (seed followed by the public half); in the
//! 64-byte form only the seed portion is used. Signatures are emitted as
//! lowercase hex over the exact bytes `timestamp || body` with no separator.

use anyhow::{anyhow, bail, Context, Result};
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;

pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey};

pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Decode a private key from hex, accepting both seed and secret-key forms.
pub fn signing_key_from_hex(raw: &str) -> Result<SigningKey> {
    let decoded = hex::decode(raw.trim()).context("failed to decode ed25519 private key hex")?;
    let seed: [u8; 32] = match decoded.len() {
        32 => decoded
            .try_into()
            .map_err(|_| anyhow!("ed25519 seed must be exactly 32 bytes"))?,
        64 => decoded[..32]
            .try_into()
            .map_err(|_| anyhow!("ed25519 secret key must be exactly 64 bytes"))?,
        other => bail!("ed25519 private keys must be 32 or 64 bytes, got {other}"),
    };
    Ok(SigningKey::from_bytes(&seed))
}

pub fn verifying_key_from_hex(raw: &str) -> Result<VerifyingKey> {
    let decoded = hex::decode(raw.trim()).context("failed to decode ed25519 public key hex")?;
    let bytes: [u8; 32] = decoded
        .try_into()
        .map_err(|_| anyhow!("ed25519 public keys must be exactly 32 bytes"))?;
    VerifyingKey::from_bytes(&bytes).map_err(|err| anyhow!(err))
}

/// Derive the public half of a private key, as lowercase hex.
pub fn public_key_hex(private_hex: &str) -> Result<String> {
    let signing_key = signing_key_from_hex(private_hex)?;
    Ok(hex::encode(signing_key.verifying_key().to_bytes()))
}

/// The message a webhook signature covers: `timestamp || body`, no separator.
pub fn interaction_message(timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    message
}

/// Sign `timestamp || body` and return the signature as lowercase hex.
pub fn sign_interaction(private_hex: &str, timestamp: &str, body: &[u8]) -> Result<String> {
    let signing_key = signing_key_from_hex(private_hex)?;
    let signature = signing_key.sign(&interaction_message(timestamp, body));
    Ok(hex::encode(signature.to_bytes()))
}

/// Check a hex signature against a message. A malformed signature is simply
/// a failed verification; a malformed public key is an error.
pub fn verify_interaction(signature_hex: &str, message: &[u8], public_hex: &str) -> Result<bool> {
    let verifying_key = verifying_key_from_hex(public_hex)?;
    let Ok(decoded) = hex::decode(signature_hex.trim()) else {
        return Ok(false);
    };
    let Ok(bytes) = <[u8; 64]>::try_from(decoded) else {
        return Ok(false);
    };
    let signature = Signature::from_bytes(&bytes);
    Ok(verifying_key.verify(message, &signature).is_ok())
}
