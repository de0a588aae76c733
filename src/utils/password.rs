use crate::error::ApiError;

/// Bcrypt cost factor for user passwords and client secrets.
pub const BCRYPT_COST: u32 = 12;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password with bcrypt.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
}

/// Verify a password against a stored bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    bcrypt::verify(password, hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password verification failed: {}", e)))
}

/// Check password strength: at least 8 characters with a letter and a digit.
pub fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(ApiError::Validation(
            "password must contain at least one letter and one digit".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hash = hash_password("correct horse 1").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("correct horse 1", &hash).unwrap());
        assert!(!verify_password("wrong horse 1", &hash).unwrap());
    }

    #[test]
    fn same_password_different_salt() {
        let h1 = hash_password("hunter2hunter2").unwrap();
        let h2 = hash_password("hunter2hunter2").unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn strength_rejects_short() {
        assert!(validate_password_strength("a1").is_err());
    }

    #[test]
    fn strength_requires_letter_and_digit() {
        assert!(validate_password_strength("abcdefgh").is_err());
        assert!(validate_password_strength("12345678").is_err());
        assert!(validate_password_strength("abcd1234").is_ok());
    }
}
