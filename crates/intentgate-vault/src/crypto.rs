//! AES-256-GCM sealing of the vault document using the `ring` crate.
//!
//! The vault file is a single sealed blob:
//!
//! ```text
//! [12 bytes: random nonce][ciphertext + 16-byte GCM tag]
//! ```
//!
//! A fresh random nonce is drawn for every write.  With 96-bit random nonces
//! the collision probability stays negligible well past any realistic number
//! of vault writes under one key.

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag appended by `ring`.
pub const TAG_LEN: usize = 16;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A nonce sequence that yields exactly one nonce and then errors, so each
/// sealing key is used once.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

fn check_key_len(key: &[u8]) -> std::result::Result<(), String> {
    if key.len() == KEY_LEN {
        Ok(())
    } else {
        Err(format!("key must be {} bytes, got {}", KEY_LEN, key.len()))
    }
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` with `key` and return `nonce || ciphertext || tag`.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the key length is wrong or
/// `ring` reports a failure.
pub fn seal(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    check_key_len(key).map_err(|reason| VaultError::EncryptionFailed { reason })?;

    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce(Some(nonce_bytes)));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    let mut blob = Vec::with_capacity(NONCE_LEN_BYTES + in_out.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&in_out);

    tracing::trace!(
        plaintext_len = plaintext.len(),
        blob_len = blob.len(),
        "sealed vault data"
    );

    Ok(blob)
}

/// Decrypt a blob produced by [`seal`].
///
/// # Errors
///
/// Returns [`VaultError::DecryptionFailed`] if the blob is truncated, the key
/// is wrong, or the ciphertext has been tampered with.
pub fn open(blob: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    check_key_len(key).map_err(|reason| VaultError::DecryptionFailed { reason })?;

    if blob.len() < NONCE_LEN_BYTES + TAG_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: format!("blob too short ({} bytes)", blob.len()),
        });
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN_BYTES);
    let mut nonce = [0u8; NONCE_LEN_BYTES];
    nonce.copy_from_slice(nonce_bytes);

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::DecryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce(Some(nonce)));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed: wrong key or corrupted data".into(),
        })?;

    Ok(plaintext.to_vec())
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Generate a fresh 256-bit vault key.
pub fn generate_key() -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| VaultError::Internal("failed to generate random key".into()))?;
    Ok(key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = generate_key().unwrap();
        let blob = seal(b"{\"tools\":{}}", &key).unwrap();
        assert_eq!(open(&blob, &key).unwrap(), b"{\"tools\":{}}");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let key1 = generate_key().unwrap();
        let key2 = generate_key().unwrap();
        let blob = seal(b"secret data", &key1).unwrap();
        assert!(matches!(
            open(&blob, &key2),
            Err(VaultError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn open_tampered_blob_fails() {
        let key = generate_key().unwrap();
        let mut blob = seal(b"secret data", &key).unwrap();
        if let Some(byte) = blob.last_mut() {
            *byte ^= 0x01;
        }
        assert!(open(&blob, &key).is_err());
    }

    #[test]
    fn open_truncated_blob_fails() {
        let key = generate_key().unwrap();
        assert!(open(&[0u8; 10], &key).is_err());
    }

    #[test]
    fn nonce_differs_per_seal() {
        let key = generate_key().unwrap();
        let a = seal(b"same", &key).unwrap();
        let b = seal(b"same", &key).unwrap();
        assert_ne!(a[..NONCE_LEN_BYTES], b[..NONCE_LEN_BYTES]);
    }

    #[test]
    fn invalid_key_length_rejected() {
        assert!(seal(b"test", &[0u8; 16]).is_err());
    }
}
