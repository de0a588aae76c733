//! Secret and token material: generation, hashing, comparison.
//!
//! Client secrets are bcrypt-hashed (they are verified rarely and must resist
//! offline cracking). Authorization codes and bearer tokens are SHA-256 hashed:
//! they are already high-entropy random values and lookups must be indexable.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::utils::password::BCRYPT_COST;

/// Number of random bytes in a generated client secret (256 bits).
pub const CLIENT_SECRET_BYTES: usize = 32;

/// Number of random bytes in an authorization code.
pub const AUTH_CODE_BYTES: usize = 32;

/// Generate a 256-bit client secret, base64url-encoded.
pub fn generate_client_secret() -> String {
    random_urlsafe(CLIENT_SECRET_BYTES)
}

/// Generate an opaque single-use authorization code.
pub fn generate_authorization_code() -> String {
    random_urlsafe(AUTH_CODE_BYTES)
}

fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Hash a client secret with bcrypt for storage.
pub fn hash_client_secret(secret: &str) -> Result<String, ApiError> {
    bcrypt::hash(secret, BCRYPT_COST)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("secret hashing failed: {}", e)))
}

/// Verify a client secret against a stored bcrypt hash.
pub fn verify_client_secret(secret: &str, hash: &str) -> bool {
    bcrypt::verify(secret, hash).unwrap_or(false)
}

/// SHA-256 hash of a token or code, base64url-encoded; the only form persisted.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Constant-time string comparison.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_are_unique_and_urlsafe() {
        let s1 = generate_client_secret();
        let s2 = generate_client_secret();
        assert_ne!(s1, s2);
        // 32 bytes => 43 unpadded base64 chars
        assert_eq!(s1.len(), 43);
        assert!(s1
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn secret_hash_roundtrip() {
        let secret = generate_client_secret();
        let hash = hash_client_secret(&secret).unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_client_secret(&secret, &hash));
        assert!(!verify_client_secret("not-the-secret", &hash));
    }

    #[test]
    fn verify_tolerates_malformed_hash() {
        assert!(!verify_client_secret("anything", "not-a-bcrypt-hash"));
    }

    #[test]
    fn token_hash_is_deterministic_base64url() {
        let token = generate_authorization_code();
        let h1 = hash_token(&token);
        let h2 = hash_token(&token);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 43);
        assert_ne!(h1, token);
    }

    #[test]
    fn constant_time_compare_behaviour() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
