//! Bearer token generation and digesting.
//!
//! Tokens are `lens_` followed by 32 random bytes in URL-safe base64 without
//! padding. Only the SHA-256 digest of a token is ever stored.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix carried by every issued token.
pub const TOKEN_PREFIX: &str = "lens_";

/// Random bytes per token.
const TOKEN_BYTES: usize = 32;

/// SHA-256 digest of a token.
pub type TokenDigest = [u8; 32];

/// Generate a fresh token from the thread-local CSPRNG (OS-seeded).
pub fn generate() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Digest a token for storage or lookup.
pub fn digest(token: &str) -> TokenDigest {
    Sha256::digest(token.as_bytes()).into()
}

/// Compare two digests without short-circuiting on the first mismatch.
pub fn digests_match(a: &TokenDigest, b: &TokenDigest) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_shape() {
        let token = generate();
        let body = token.strip_prefix(TOKEN_PREFIX).unwrap();
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(body.len(), 43);
        assert!(
            body.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(generate(), generate());
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(digest("abc"), digest("abc"));
        assert_ne!(digest("abc"), digest("abd"));
    }

    #[test]
    fn digests_match_compares_all_bytes() {
        let a = digest("one");
        let mut b = a;
        assert!(digests_match(&a, &b));
        b[31] ^= 1;
        assert!(!digests_match(&a, &b));
    }
}
