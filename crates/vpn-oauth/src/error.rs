use thiserror::Error;

#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("callback is missing the `iss` parameter")]
    MissingIssuer,

    #[error("callback issuer {got} does not match expected issuer {expected}")]
    IssuerMismatch { got: String, expected: String },

    #[error("callback is missing the `state` parameter")]
    MissingState,

    #[error("callback state does not match the state issued for this exchange")]
    StateMismatch,

    #[error("callback is missing the `code` parameter")]
    MissingCode,

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("loopback callback server failed: {0}")]
    CallbackServerFailed(String),

    #[error("http error: {0}")]
    Http(#[from] vpn_http::HttpError),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, OAuthError>;
