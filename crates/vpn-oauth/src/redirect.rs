//! Custom-URI redirect table (§4.5 "If the embedder's client id has a
//! registered custom-URI redirect ... use that URI verbatim").

use std::collections::HashMap;

/// How the authorization response is delivered back to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectMode {
    /// The library opens an ephemeral `http://127.0.0.1:<port>/callback`
    /// server and waits on it directly.
    Loopback,
    /// The embedder owns a custom URI scheme and is expected to deliver the
    /// authorization-server response itself, via `CookieReply`.
    CustomUri(String),
}

/// Maps client ids to their registered custom-URI redirect, if any. Clients
/// absent from the table fall back to the loopback server.
#[derive(Debug, Clone, Default)]
pub struct CustomRedirectTable {
    by_client_id: HashMap<String, String>,
}

impl CustomRedirectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client_id: impl Into<String>, redirect_uri: impl Into<String>) {
        self.by_client_id.insert(client_id.into(), redirect_uri.into());
    }

    pub fn mode_for(&self, client_id: &str) -> RedirectMode {
        match self.by_client_id.get(client_id) {
            Some(uri) => RedirectMode::CustomUri(uri.clone()),
            None => RedirectMode::Loopback,
        }
    }
}
