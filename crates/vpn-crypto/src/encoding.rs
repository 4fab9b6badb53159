//! Base64/hex helpers shared by the signature and key modules.

use crate::error::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

pub struct Base64Encoder;

impl Base64Encoder {
    pub fn encode<T: AsRef<[u8]>>(data: T) -> String {
        BASE64.encode(data)
    }

    pub fn decode(encoded: &str) -> Result<Vec<u8>> {
        Ok(BASE64.decode(encoded.trim())?)
    }
}

pub struct HexEncoder;

impl HexEncoder {
    pub fn encode<T: AsRef<[u8]>>(data: T) -> String {
        hex::encode(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips() {
        let data = b"eduvpn-rs";
        let encoded = Base64Encoder::encode(data);
        assert_eq!(Base64Encoder::decode(&encoded).unwrap(), data);
    }
}
