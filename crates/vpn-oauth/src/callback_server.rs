//! One-shot loopback callback server (§4.5, REDESIGN FLAGS "an explicit task
//! with a shutdown handle stored in the exchange session; cancellation
//! drives deterministic teardown").

use crate::error::{OAuthError, Result};
use axum::extract::Query;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vpn_cookie::Cookie;

/// An ephemeral `http://127.0.0.1:<port>/callback` server bound for exactly
/// one authorization response.
pub struct CallbackServer {
    pub redirect_uri: String,
    receiver: oneshot::Receiver<HashMap<String, String>>,
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

async fn handle_callback(
    Query(params): Query<HashMap<String, String>>,
    sender: Arc<Mutex<Option<oneshot::Sender<HashMap<String, String>>>>>,
    shutdown: CancellationToken,
) -> &'static str {
    if let Some(tx) = sender.lock().unwrap().take() {
        let _ = tx.send(params);
    }
    shutdown.cancel();
    "Authorization complete. You may close this window and return to the application."
}

impl CallbackServer {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| OAuthError::CallbackServerFailed(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| OAuthError::CallbackServerFailed(e.to_string()))?
            .port();

        let (tx, rx) = oneshot::channel();
        let sender = Arc::new(Mutex::new(Some(tx)));
        let shutdown = CancellationToken::new();

        let app = {
            let sender = sender.clone();
            let shutdown = shutdown.clone();
            Router::new().route(
                "/callback",
                get(move |query| handle_callback(query, sender.clone(), shutdown.clone())),
            )
        };

        let shutdown_signal = shutdown.clone();
        let join = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown_signal.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "oauth loopback callback server exited with an error");
            }
        });

        Ok(Self {
            redirect_uri: format!("http://127.0.0.1:{port}/callback"),
            receiver: rx,
            shutdown,
            join,
        })
    }

    /// Waits for the single callback request, or for `cookie` to cancel.
    /// Either way the server is shut down before returning.
    pub async fn wait_for_callback(self, cookie: Option<&Cookie>) -> Result<HashMap<String, String>> {
        let CallbackServer {
            receiver,
            shutdown,
            join,
            ..
        } = self;

        let result = match cookie {
            Some(cookie) => {
                tokio::select! {
                    biased;
                    _ = cookie.token().cancelled() => Err(OAuthError::Cancelled),
                    received = receiver => received
                        .map_err(|_| OAuthError::CallbackServerFailed("callback sender dropped without a request".into())),
                }
            }
            None => receiver
                .await
                .map_err(|_| OAuthError::CallbackServerFailed("callback sender dropped without a request".into())),
        };

        shutdown.cancel();
        let _ = join.await;
        result
    }
}
