use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("invalid trusted comment: {0}")]
    InvalidTrustedComment(String),

    #[error("signature does not match any allowlisted key")]
    NoMatchingKey,

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("unexpected filename: got {got}, expected {expected}")]
    WrongFilename { got: String, expected: String },

    #[error("signed timestamp {got} is older than minimum {min}")]
    TooOld { got: u64, min: u64 },

    #[error("base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
