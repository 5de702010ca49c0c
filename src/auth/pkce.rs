//! PKCE (RFC 7636) and CSRF state for the installed-app consent flow

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Verifier length; RFC 7636 allows 43-128
const CODE_VERIFIER_LENGTH: usize = 64;

const STATE_LENGTH: usize = 32;

/// Unreserved URI characters
const VERIFIER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

const STATE_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn random_string(charset: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

/// S256 challenge: BASE64URL(SHA256(verifier))
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random `state` parameter matched against the redirect
pub fn generate_state() -> String {
    random_string(STATE_CHARSET, STATE_LENGTH)
}

/// Verifier and the challenge derived from it
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier = random_string(VERIFIER_CHARSET, CODE_VERIFIER_LENGTH);
        let challenge = code_challenge(&verifier);
        Self { verifier, challenge }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_shape() {
        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), CODE_VERIFIER_LENGTH);
        assert!(pair.verifier.bytes().all(|b| VERIFIER_CHARSET.contains(&b)));
    }

    #[test]
    fn test_challenge_matches_verifier() {
        let pair = PkcePair::generate();
        assert_eq!(pair.challenge, code_challenge(&pair.verifier));
        // 32 byte digest, unpadded base64url
        assert_eq!(pair.challenge.len(), 43);
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_state_is_random_alphanumeric() {
        let s1 = generate_state();
        let s2 = generate_state();
        assert_eq!(s1.len(), STATE_LENGTH);
        assert!(s1.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(s1, s2);
    }
}
