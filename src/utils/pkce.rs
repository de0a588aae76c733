//! PKCE (RFC 7636) helpers for the authorization code flow.
//!
//! Only the `S256` challenge method is supported; `plain` is rejected at the
//! authorize endpoint before a code is ever minted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

/// Minimum length for code_verifier as per RFC 7636
pub const CODE_VERIFIER_MIN_LENGTH: usize = 43;

/// Maximum length for code_verifier as per RFC 7636
pub const CODE_VERIFIER_MAX_LENGTH: usize = 128;

/// The only supported PKCE method
pub const PKCE_METHOD_S256: &str = "S256";

/// Verify a code_verifier against the stored S256 code_challenge.
///
/// `code_challenge` must equal `BASE64URL(SHA256(code_verifier))` exactly.
pub fn verify_pkce(code_verifier: &str, code_challenge: &str) -> bool {
    let computed = compute_s256_challenge(code_verifier);
    constant_time_compare(&computed, code_challenge)
}

/// Compute `BASE64URL(SHA256(code_verifier))`.
pub fn compute_s256_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Validate code_verifier format according to RFC 7636: 43–128 characters from
/// the unreserved set `[A-Za-z0-9-._~]`.
pub fn validate_code_verifier(verifier: &str) -> bool {
    let len = verifier.len();
    if !(CODE_VERIFIER_MIN_LENGTH..=CODE_VERIFIER_MAX_LENGTH).contains(&len) {
        return false;
    }
    verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
}

/// Validate code_challenge format: a 43-character base64url string
/// (32 bytes of SHA-256 output, unpadded).
pub fn validate_code_challenge(challenge: &str) -> bool {
    challenge.len() == 43
        && challenge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn constant_time_compare(a: &str, b: &str) -> bool {
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
    use proptest::prelude::*;

    // Known test vector from RFC 7636 Appendix B
    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn rfc_vector_verifies() {
        assert!(verify_pkce(RFC_VERIFIER, RFC_CHALLENGE));
    }

    #[test]
    fn wrong_verifier_rejected() {
        let wrong = "wrong_verifier_that_is_long_enough_to_pass_length_check";
        assert!(!verify_pkce(wrong, RFC_CHALLENGE));
    }

    #[test]
    fn compute_s256_matches_rfc_vector() {
        assert_eq!(compute_s256_challenge(RFC_VERIFIER), RFC_CHALLENGE);
    }

    #[test]
    fn verifier_length_bounds() {
        assert!(!validate_code_verifier(&"a".repeat(42)));
        assert!(validate_code_verifier(&"a".repeat(43)));
        assert!(validate_code_verifier(&"a".repeat(128)));
        assert!(!validate_code_verifier(&"a".repeat(129)));
    }

    #[test]
    fn verifier_charset() {
        assert!(validate_code_verifier(
            "abcABC123-._~abcABC123-._~abcABC123-._~abcde"
        ));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789 abcdef"
        ));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789+abcdef"
        ));
    }

    #[test]
    fn challenge_format() {
        assert!(validate_code_challenge(RFC_CHALLENGE));
        assert!(!validate_code_challenge(&RFC_CHALLENGE[..42]));
        assert!(!validate_code_challenge(
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw+cM"
        ));
    }

    proptest! {
        #[test]
        fn computed_challenge_always_verifies(verifier in "[A-Za-z0-9._~-]{43,128}") {
            let challenge = compute_s256_challenge(&verifier);
            prop_assert!(validate_code_challenge(&challenge));
            prop_assert!(verify_pkce(&verifier, &challenge));
        }

        #[test]
        fn mutated_verifier_fails(verifier in "[A-Za-z0-9._~-]{43,128}") {
            let challenge = compute_s256_challenge(&verifier);
            let mut mutated = verifier.clone();
            let last = mutated.pop().unwrap();
            mutated.push(if last == 'a' { 'b' } else { 'a' });
            prop_assert!(!verify_pkce(&mutated, &challenge));
        }
    }
}
