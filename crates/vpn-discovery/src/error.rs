use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("transport error: {0}")]
    Http(#[from] vpn_http::HttpError),

    #[error("signature verification failed: {0}")]
    Signature(#[from] vpn_crypto::CryptoError),

    #[error("{0} is older than the last seen version")]
    Rollback(String),

    #[error("malformed catalog JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("organization {0} not found")]
    OrganizationNotFound(String),

    #[error("no server matches {0}")]
    ServerNotFound(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
