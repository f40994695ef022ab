//! AES-256-GCM encryption for email addresses at rest, plus a keyed blind
//! index so encrypted addresses can still be looked up by exact match.
//!
//! Ciphertext is base64 `nonce || ciphertext || tag` with a random 12-byte
//! nonce.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::AuthError;

/// Nonce size for AES-256-GCM (12 bytes).
const NONCE_SIZE: usize = 12;
/// AES-256 key size (32 bytes).
const KEY_SIZE: usize = 32;
/// GCM tag size (16 bytes).
const TAG_SIZE: usize = 16;

/// Derive a 32-byte key from a passphrase using SHA-256.
fn derive_key(passphrase: &str) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    let result = hasher.finalize();
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&result);
    key
}

/// Canonical form used for both encryption and indexing.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Encrypt plaintext with AES-256-GCM.
pub fn encrypt(plaintext: &str, encryption_key: &str) -> Result<String, AuthError> {
    let key_bytes = derive_key(encryption_key);
    let cipher = Aes256Gcm::new_from_slice(&key_bytes)
        .map_err(|e| AuthError::Internal(format!("Key init failed: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| AuthError::Internal(format!("Encryption failed: {e}")))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
}

/// Decrypt base64-encoded `nonce || ciphertext || tag`.
pub fn decrypt(encrypted_b64: &str, encryption_key: &str) -> Result<String, AuthError> {
    let combined = base64::engine::general_purpose::STANDARD
        .decode(encrypted_b64)
        .map_err(|e| AuthError::Internal(format!("Base64 decode failed: {e}")))?;

    if combined.len() < NONCE_SIZE + TAG_SIZE {
        return Err(AuthError::Internal("Ciphertext too short".into()));
    }

    let key_bytes = derive_key(encryption_key);
    let cipher = Aes256Gcm::new_from_slice(&key_bytes)
        .map_err(|e| AuthError::Internal(format!("Key init failed: {e}")))?;

    let nonce = Nonce::from_slice(&combined[..NONCE_SIZE]);
    let plaintext = cipher
        .decrypt(nonce, &combined[NONCE_SIZE..])
        .map_err(|e| AuthError::Internal(format!("Decryption failed: {e}")))?;

    String::from_utf8(plaintext)
        .map_err(|e| AuthError::Internal(format!("UTF-8 decode failed: {e}")))
}

/// Keyed SHA-256 of the normalised email, hex encoded.
pub fn blind_index(email: &str, encryption_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(derive_key(encryption_key));
    hasher.update(b":email:");
    hasher.update(normalize_email(email).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of a token, the form in which tokens are persisted.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Constant-time byte comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = "test-encryption-key";
        let encrypted = encrypt("alice@example.com", key).unwrap();
        assert_ne!(encrypted, "alice@example.com");
        assert_eq!(decrypt(&encrypted, key).unwrap(), "alice@example.com");
    }

    #[test]
    fn wrong_key_fails() {
        let encrypted = encrypt("alice@example.com", "correct-key").unwrap();
        assert!(decrypt(&encrypted, "wrong-key").is_err());
    }

    #[test]
    fn encryption_is_randomised() {
        let key = "k";
        assert_ne!(encrypt("a@b.c", key).unwrap(), encrypt("a@b.c", key).unwrap());
    }

    #[test]
    fn blind_index_is_stable_and_case_insensitive() {
        let key = "k";
        assert_eq!(
            blind_index("Alice@Example.com ", key),
            blind_index("alice@example.com", key)
        );
        assert_ne!(
            blind_index("alice@example.com", key),
            blind_index("alice@example.com", "other")
        );
    }

    #[test]
    fn constant_time_eq_matches_plain_eq() {
        assert!(constant_time_eq(b"test", b"test"));
        assert!(!constant_time_eq(b"test", b"tent"));
        assert!(!constant_time_eq(b"test", b"test_longer"));
    }
}
