//! Aggregating error type for the orchestrator (§7 "Error Handling Design").
//!
//! `ClientError` wraps every leaf-crate error plus the taxonomy kinds that
//! only make sense at the orchestrator boundary (`FSMState`, `Internal`,
//! `OAuthCancelled`, `OAuthCallback`, `Cancelled`). It carries a translation
//! map and an `is_internal` flag so the embedder boundary can render a
//! localized message without re-deriving the error kind.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientErrorKind {
    #[error("transport error: {0}")]
    Transport(#[from] vpn_http::HttpError),

    #[error("signature verification failed: {0}")]
    Signature(#[from] vpn_crypto::CryptoError),

    #[error("discovery error: {0}")]
    Discovery(#[from] vpn_discovery::DiscoveryError),

    #[error("oauth error: {0}")]
    OAuth(#[from] vpn_oauth::OAuthError),

    #[error("server error: {0}")]
    Server(#[from] vpn_server::ServerError),

    #[error("failover error: {0}")]
    Failover(#[from] vpn_failover::FailoverError),

    #[error("fsm error: {0}")]
    Fsm(#[from] vpn_fsm::FsmError),

    #[error("cookie error: {0}")]
    Cookie(#[from] vpn_cookie::CookieError),

    #[error("operation not valid in current state: {0}")]
    FsmState(String),

    #[error("oauth cancelled")]
    OAuthCancelled,

    #[error("oauth callback was missing or invalid: {0}")]
    OAuthCallback(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// What crosses the embedder boundary (§7 "Errors include: a cause chain, an
/// English message, a translation map ..., and an `is_internal` flag").
#[derive(Debug, Error, Serialize)]
#[error("{message}")]
pub struct ClientError {
    pub message: String,
    pub translations: HashMap<String, String>,
    pub is_internal: bool,
    #[serde(skip)]
    #[source]
    source: Option<ClientErrorKindBox>,
}

/// `thiserror`'s `#[source]` needs `std::error::Error`; `ClientErrorKind`
/// itself isn't `Send + Sync + 'static`-boxed by default so this newtype
/// keeps the `Error` impl intact for the cause chain.
#[derive(Debug)]
struct ClientErrorKindBox(Box<ClientErrorKind>);

impl std::fmt::Display for ClientErrorKindBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ClientErrorKindBox {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl ClientError {
    /// Internal errors (programmer/embedder misuse) are never translated
    /// (§7 "internal errors are not translated by design").
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: message.clone(),
            translations: HashMap::new(),
            is_internal: true,
            source: Some(ClientErrorKindBox(Box::new(ClientErrorKind::Internal(message)))),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            message: "operation cancelled".to_string(),
            translations: HashMap::new(),
            is_internal: false,
            source: Some(ClientErrorKindBox(Box::new(ClientErrorKind::Cancelled))),
        }
    }

    pub fn fsm_state(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: message.clone(),
            translations: HashMap::new(),
            is_internal: false,
            source: Some(ClientErrorKindBox(Box::new(ClientErrorKind::FsmState(message)))),
        }
    }

    pub fn oauth_cancelled() -> Self {
        Self {
            message: "oauth exchange was cancelled".to_string(),
            translations: HashMap::new(),
            is_internal: false,
            source: Some(ClientErrorKindBox(Box::new(ClientErrorKind::OAuthCancelled))),
        }
    }

    pub fn with_translations(mut self, translations: HashMap<String, String>) -> Self {
        self.translations = translations;
        self
    }
}

impl<E> From<E> for ClientError
where
    ClientErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        let kind = ClientErrorKind::from(err);
        let message = kind.to_string();
        Self {
            message,
            translations: HashMap::new(),
            is_internal: false,
            source: Some(ClientErrorKindBox(Box::new(kind))),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_flagged_and_untranslated() {
        let err = ClientError::internal("adding a non-custom server when the client does not use discovery is not supported");
        assert!(err.is_internal);
        assert!(err.translations.is_empty());
    }

    #[test]
    fn leaf_errors_convert_with_is_internal_false() {
        let err: ClientError = vpn_fsm::FsmError::InvalidTransition(vpn_types::ClientState::Deregistered, vpn_types::ClientState::Connected).into();
        assert!(!err.is_internal);
    }

    #[test]
    fn serializes_without_the_internal_source_chain() {
        let err = ClientError::cancelled();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["message"], "operation cancelled");
        assert_eq!(json["is_internal"], false);
    }
}
