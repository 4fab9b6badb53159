//! Minisign-style detached signature verification (C2, §4.2).
//!
//! A minisig file is three lines: an untrusted comment, a base64 blob of
//! `sig_alg(2) || key_id(8) || signature(64)`, and a line holding the
//! trusted comment plus a base64 global signature over
//! `signature_bytes || trusted_comment_bytes`. `sig_alg` is `Ed` for a plain
//! Ed25519 signature over the payload, or `ED` when the payload was
//! BLAKE2b-512-prehashed before signing.

use crate::error::{CryptoError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

const SIG_BYTES_LEN: usize = 2 + 8 + 64;

/// An allowlisted publisher key: an 8-byte minisign key id and the raw
/// 32-byte Ed25519 public key.
#[derive(Debug, Clone)]
pub struct AllowedKey {
    pub key_id: [u8; 8],
    pub verifying_key: VerifyingKey,
}

impl AllowedKey {
    /// Parses a minisign public-key file (two lines: comment, base64 blob of
    /// `key_alg(2) || key_id(8) || public_key(32)`).
    pub fn from_minisign_public_key(contents: &str) -> Result<Self> {
        let b64_line = contents
            .lines()
            .find(|l| !l.starts_with("untrusted comment:") && !l.trim().is_empty())
            .ok_or_else(|| CryptoError::InvalidKeyFormat("empty public key file".into()))?;

        let raw = BASE64.decode(b64_line.trim())?;
        if raw.len() != 2 + 8 + 32 {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "expected {} bytes, got {}",
                2 + 8 + 32,
                raw.len()
            )));
        }

        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&raw[2..10]);

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&raw[10..42]);
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;

        Ok(AllowedKey { key_id, verifying_key })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedTrustedComment {
    timestamp: u64,
    file: String,
}

/// Parses `timestamp:<uint>\tfile:<name>[optional suffix]` (§4.2 step 4).
fn parse_trusted_comment(raw: &str) -> Result<ParsedTrustedComment> {
    let raw = raw
        .strip_prefix("trusted comment: ")
        .unwrap_or(raw)
        .trim_end();

    let mut fields = raw.split('\t');

    let ts_field = fields
        .next()
        .ok_or_else(|| CryptoError::InvalidTrustedComment("missing timestamp field".into()))?;
    let timestamp_str = ts_field
        .strip_prefix("timestamp:")
        .ok_or_else(|| CryptoError::InvalidTrustedComment("missing timestamp: prefix".into()))?;
    let timestamp: u64 = timestamp_str
        .parse()
        .map_err(|_| CryptoError::InvalidTrustedComment(format!("non-numeric timestamp: {timestamp_str}")))?;

    let file_field = fields
        .next()
        .ok_or_else(|| CryptoError::InvalidTrustedComment("missing file field".into()))?;
    let file = file_field
        .strip_prefix("file:")
        .ok_or_else(|| CryptoError::InvalidTrustedComment("missing file: prefix".into()))?
        .to_string();

    Ok(ParsedTrustedComment { timestamp, file })
}

#[derive(Debug)]
struct ParsedSignature {
    alg: [u8; 2],
    key_id: [u8; 8],
    signature: Signature,
    trusted_comment_line: String,
    global_signature: Vec<u8>,
}

fn parse_minisig(contents: &str) -> Result<ParsedSignature> {
    let mut lines = contents.lines();
    let _untrusted_comment = lines
        .next()
        .ok_or_else(|| CryptoError::InvalidSignatureFormat("empty signature file".into()))?;

    let sig_line = lines
        .next()
        .ok_or_else(|| CryptoError::InvalidSignatureFormat("missing signature line".into()))?;
    let sig_blob = BASE64
        .decode(sig_line.trim())
        .map_err(|e| CryptoError::InvalidSignatureFormat(format!("bad base64: {e}")))?;
    if sig_blob.len() != SIG_BYTES_LEN {
        return Err(CryptoError::InvalidSignatureFormat(format!(
            "expected {SIG_BYTES_LEN} signature bytes, got {}",
            sig_blob.len()
        )));
    }

    let mut alg = [0u8; 2];
    alg.copy_from_slice(&sig_blob[0..2]);
    let mut key_id = [0u8; 8];
    key_id.copy_from_slice(&sig_blob[2..10]);
    let mut sig_bytes = [0u8; 64];
    sig_bytes.copy_from_slice(&sig_blob[10..74]);
    let signature = Signature::from_bytes(&sig_bytes);

    let trusted_comment_line = lines
        .next()
        .ok_or_else(|| CryptoError::InvalidSignatureFormat("missing trusted comment line".into()))?
        .to_string();

    let global_sig_line = lines
        .next()
        .ok_or_else(|| CryptoError::InvalidSignatureFormat("missing global signature line".into()))?;
    let global_signature = BASE64
        .decode(global_sig_line.trim())
        .map_err(|e| CryptoError::InvalidSignatureFormat(format!("bad global signature base64: {e}")))?;

    Ok(ParsedSignature {
        alg,
        key_id,
        signature,
        trusted_comment_line,
        global_signature,
    })
}

/// Inputs to catalog signature verification (§3 "Signature verification inputs").
pub struct VerifyInput<'a> {
    pub signature_file_bytes: &'a [u8],
    pub payload_bytes: &'a [u8],
    pub expected_filename: &'a str,
    pub min_signed_time: u64,
    pub allowed_public_keys: &'a [AllowedKey],
    /// §4.2 step 2: when true, only the `ED` (prehashed) algorithm tag is
    /// accepted; when false, both `Ed` and `ED` are accepted.
    pub force_prehash: bool,
}

/// The verified timestamp, returned so the caller can advance its
/// "last seen version" watermark (§4.3 "on fetch, C2 verifies ... using
/// previous.version as min_signed_time").
pub struct Verified {
    pub timestamp: u64,
}

pub fn verify(input: VerifyInput<'_>) -> Result<Verified> {
    let contents = std::str::from_utf8(input.signature_file_bytes)
        .map_err(|_| CryptoError::InvalidSignatureFormat("signature file is not UTF-8".into()))?;
    let parsed = parse_minisig(contents)?;

    let is_prehashed = match &parsed.alg {
        b"ED" => true,
        b"Ed" if !input.force_prehash => false,
        _ => {
            return Err(CryptoError::InvalidSignatureFormat(format!(
                "unsupported or disallowed algorithm tag {:?}",
                String::from_utf8_lossy(&parsed.alg)
            )))
        }
    };

    let key = input
        .allowed_public_keys
        .iter()
        .find(|k| k.key_id == parsed.key_id)
        .ok_or(CryptoError::NoMatchingKey)?;

    let message: Vec<u8> = if is_prehashed {
        blake2b_simd::Params::new()
            .hash_length(64)
            .to_state()
            .update(input.payload_bytes)
            .finalize()
            .as_bytes()
            .to_vec()
    } else {
        input.payload_bytes.to_vec()
    };

    key.verifying_key
        .verify(&message, &parsed.signature)
        .map_err(|_| CryptoError::VerificationFailed)?;

    // Global signature covers `signature_blob || trusted_comment_bytes`,
    // verified with the same key, binding the trusted comment to this
    // specific signature (prevents mixing comments across catalog files).
    let trusted_comment_bytes = parsed
        .trusted_comment_line
        .strip_prefix("trusted comment: ")
        .unwrap_or(&parsed.trusted_comment_line)
        .as_bytes();
    let mut signed_blob = Vec::with_capacity(SIG_BYTES_LEN + trusted_comment_bytes.len());
    signed_blob.extend_from_slice(&parsed.alg);
    signed_blob.extend_from_slice(&parsed.key_id);
    signed_blob.extend_from_slice(parsed.signature.to_bytes().as_slice());
    signed_blob.extend_from_slice(trusted_comment_bytes);

    if parsed.global_signature.len() == 64 {
        let mut global_sig_bytes = [0u8; 64];
        global_sig_bytes.copy_from_slice(&parsed.global_signature);
        let global_signature = Signature::from_bytes(&global_sig_bytes);
        key.verifying_key
            .verify(&signed_blob, &global_signature)
            .map_err(|_| CryptoError::VerificationFailed)?;
    } else {
        return Err(CryptoError::InvalidSignatureFormat(
            "global signature must be 64 bytes".into(),
        ));
    }

    let comment = parse_trusted_comment(&parsed.trusted_comment_line)?;

    if comment.file != input.expected_filename {
        return Err(CryptoError::WrongFilename {
            got: comment.file,
            expected: input.expected_filename.to_string(),
        });
    }

    if comment.timestamp < input.min_signed_time {
        return Err(CryptoError::TooOld {
            got: comment.timestamp,
            min: input.min_signed_time,
        });
    }

    Ok(Verified {
        timestamp: comment.timestamp,
    })
}
