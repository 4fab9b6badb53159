//! Minisign catalog verification and WireGuard key generation (C2).

pub mod encoding;
pub mod error;
pub mod keys;
pub mod minisign;

pub use encoding::{Base64Encoder, HexEncoder};
pub use error::{CryptoError, Result};
pub use keys::{derive_public_key_base64, generate_keypair, WireGuardKeyPair};
pub use minisign::{verify, AllowedKey, VerifyInput, Verified};
