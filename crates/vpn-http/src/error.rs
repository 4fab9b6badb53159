use thiserror::Error;

/// Non-2xx response, carrying enough detail for C6 to distinguish a 401
/// (triggers the OAuth refresh-and-retry branch) from any other status.
#[derive(Debug, Clone)]
pub struct StatusError {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {} from {}", self.status, self.url)
    }
}

impl std::error::Error for StatusError {}

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Status(StatusError),

    #[error("response exceeded the {limit} byte cap")]
    BodyTooLarge { limit: usize },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, HttpError>;
