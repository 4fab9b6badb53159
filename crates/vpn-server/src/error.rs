use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("http error: {0}")]
    Http(#[from] vpn_http::HttpError),

    #[error("oauth error: {0}")]
    OAuth(#[from] vpn_oauth::OAuthError),

    #[error("discovery error: {0}")]
    Discovery(#[from] vpn_discovery::DiscoveryError),

    #[error("malformed JSON from server: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("well-known endpoint discovery document is missing the eduVPN API entry")]
    MissingApiEntry,

    #[error("endpoint {endpoint} does not share scheme and host with base URL {base}")]
    EndpointOriginMismatch { endpoint: String, base: String },

    #[error("authorized request failed after a token refresh retry: {0}")]
    ApiAuthorized(String),

    #[error("server has no OAuth tokens")]
    NoTokens,

    #[error("server has no profile selected")]
    NoProfileSelected,

    #[error("server does not support protocol {0:?}")]
    UnsupportedProtocol(vpn_types::VpnProtocol),

    #[error("no `Expires` header in /connect response")]
    MissingExpiresHeader,

    #[error("malformed `Expires` header: {0}")]
    MalformedExpiresHeader(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ServerError>;
