//! PKCE code verifier/challenge and CSRF state generation (§4.5 "Per exchange
//! the client stores: code_verifier ... code_challenge ... state").
//!
//! Reuses the `oauth2` crate's PKCE/CSRF primitives (as the teacher's
//! `vpn-identity::oauth` does) rather than hand-rolling the base64url/SHA-256
//! dance.

use oauth2::{CsrfToken, PkceCodeChallenge, PkceCodeVerifier};

pub struct PkceExchange {
    pub challenge: String,
    pub verifier: PkceCodeVerifier,
    pub state: CsrfToken,
}

impl PkceExchange {
    /// Generates a fresh 256-bit verifier, its S256 challenge, and a fresh
    /// CSRF state token, all base64url-encoded per RFC 7636.
    pub fn new() -> Self {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        Self {
            challenge: challenge.as_str().to_string(),
            verifier,
            state: CsrfToken::new_random(),
        }
    }

    pub fn verifier_secret(&self) -> &str {
        self.verifier.secret()
    }

    pub fn state_secret(&self) -> &str {
        self.state.secret()
    }
}

impl Default for PkceExchange {
    fn default() -> Self {
        Self::new()
    }
}
