//! PKCE OAuth 2.1 client, loopback callback server, and custom-redirect
//! table for the eduvpn-rs client core (C5).

pub mod callback_server;
pub mod error;
pub mod exchange;
pub mod pkce;
pub mod redirect;

pub use callback_server::CallbackServer;
pub use error::{OAuthError, Result};
pub use exchange::{OAuthClient, OAuthClientConfig, OAuthEndpoints, PendingExchange, StartedExchange};
pub use pkce::PkceExchange;
pub use redirect::{CustomRedirectTable, RedirectMode};
