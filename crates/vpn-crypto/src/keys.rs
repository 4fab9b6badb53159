//! X25519 keypair generation for WireGuard `/connect` requests (§4.6).

use crate::encoding::Base64Encoder;
use crate::error::{CryptoError, Result};
use rand_core::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

#[derive(Debug, Clone)]
pub struct WireGuardKeyPair {
    pub private_key: [u8; 32],
    pub public_key: [u8; 32],
}

impl WireGuardKeyPair {
    pub fn private_key_base64(&self) -> String {
        Base64Encoder::encode(self.private_key)
    }

    pub fn public_key_base64(&self) -> String {
        Base64Encoder::encode(self.public_key)
    }
}

/// Generates a fresh ephemeral keypair, one per `/connect` request
/// (§4.6 "generates a fresh X25519 keypair").
pub fn generate_keypair() -> WireGuardKeyPair {
    let secret = StaticSecret::new(OsRng);
    let public = PublicKey::from(&secret);
    WireGuardKeyPair {
        private_key: secret.to_bytes(),
        public_key: public.to_bytes(),
    }
}

pub fn derive_public_key_base64(private_key_base64: &str) -> Result<String> {
    let bytes = Base64Encoder::decode(private_key_base64)?;
    if bytes.len() != 32 {
        return Err(CryptoError::InvalidKeyFormat(format!(
            "private key must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&bytes);
    let secret = StaticSecret::from(raw);
    let public = PublicKey::from(&secret);
    Ok(Base64Encoder::encode(public.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_32_bytes_and_public_matches_private() {
        let pair = generate_keypair();
        assert_eq!(pair.private_key.len(), 32);
        assert_eq!(pair.public_key.len(), 32);

        let derived = derive_public_key_base64(&pair.private_key_base64()).unwrap();
        assert_eq!(derived, pair.public_key_base64());
    }

    #[test]
    fn successive_keypairs_differ() {
        let a = generate_keypair();
        let b = generate_keypair();
        assert_ne!(a.private_key, b.private_key);
    }
}
