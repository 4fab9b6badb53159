//! PKCE Authorization-Code exchange and refresh (C5, §4.5).

use std::collections::HashMap;

use serde::Deserialize;
use vpn_cookie::Cookie;
use vpn_http::{HttpClient, HttpError, RequestOptions};
use vpn_types::OAuthTokenSet;

use crate::callback_server::CallbackServer;
use crate::error::{OAuthError, Result};
use crate::pkce::PkceExchange;
use crate::redirect::{CustomRedirectTable, RedirectMode};

/// The authorization/token endpoints and issuer of a single server, as
/// resolved by C6 endpoint discovery.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorization: String,
    pub token: String,
    /// The `iss` value the callback must echo back (§4.5 callback validation).
    pub issuer: String,
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub redirect_table: CustomRedirectTable,
}

/// What the orchestrator hands the FSM for an `OAuthStarted` transition.
pub enum StartedExchange {
    /// Loopback mode: only the URL needs to reach the embedder's browser
    /// launcher. The exchange itself is already listening.
    Direct {
        authorization_url: String,
        pending: PendingExchange,
    },
    /// Custom-redirect mode: the embedder owns delivering the authorization
    /// response, via `CookieReply` on `cookie`.
    NeedsCookieReply {
        authorization_url: String,
        cookie: Cookie,
        pending: PendingExchange,
    },
}

/// State carried between starting an exchange and completing it.
pub struct PendingExchange {
    verifier_secret: String,
    state_secret: String,
    redirect_uri: String,
    endpoints: OAuthEndpoints,
    client_id: String,
    callback_server: Option<CallbackServer>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

pub struct OAuthClient {
    http: HttpClient,
    config: OAuthClientConfig,
}

impl OAuthClient {
    pub fn new(http: HttpClient, config: OAuthClientConfig) -> Self {
        Self { http, config }
    }

    /// Begins a PKCE exchange against `endpoints`. For loopback clients this
    /// opens the ephemeral callback server before returning so no request
    /// can race the listener (§4.5 "The ephemeral server accepts exactly
    /// one request").
    pub async fn start(&self, endpoints: OAuthEndpoints, cookie_registry: &vpn_cookie::CookieRegistry) -> Result<StartedExchange> {
        let pkce = PkceExchange::new();
        let mode = self.config.redirect_table.mode_for(&self.config.client_id);

        match mode {
            RedirectMode::Loopback => {
                let server = CallbackServer::start().await?;
                let redirect_uri = server.redirect_uri.clone();
                let authorization_url = build_authorization_url(&endpoints.authorization, &self.config.client_id, &redirect_uri, &pkce)?;
                let pending = PendingExchange {
                    verifier_secret: pkce.verifier_secret().to_string(),
                    state_secret: pkce.state_secret().to_string(),
                    redirect_uri,
                    endpoints,
                    client_id: self.config.client_id.clone(),
                    callback_server: Some(server),
                };
                Ok(StartedExchange::Direct { authorization_url, pending })
            }
            RedirectMode::CustomUri(redirect_uri) => {
                let authorization_url = build_authorization_url(&endpoints.authorization, &self.config.client_id, &redirect_uri, &pkce)?;
                let cookie = cookie_registry.new_cookie();
                let pending = PendingExchange {
                    verifier_secret: pkce.verifier_secret().to_string(),
                    state_secret: pkce.state_secret().to_string(),
                    redirect_uri,
                    endpoints,
                    client_id: self.config.client_id.clone(),
                    callback_server: None,
                };
                Ok(StartedExchange::NeedsCookieReply { authorization_url, cookie, pending })
            }
        }
    }

    /// Waits for the authorization response (via the loopback server, or via
    /// the `cookie`'s reply channel for custom-redirect clients), validates
    /// it, and exchanges the code for tokens.
    pub async fn complete_loopback(&self, pending: PendingExchange, cookie: Option<&Cookie>) -> Result<OAuthTokenSet> {
        let PendingExchange {
            verifier_secret,
            state_secret,
            redirect_uri,
            endpoints,
            client_id,
            callback_server,
        } = pending;
        let server = callback_server.ok_or_else(|| OAuthError::CallbackServerFailed("no callback server for this exchange".into()))?;
        let params = server.wait_for_callback(cookie).await?;
        self.validate_and_exchange(params, &state_secret, &verifier_secret, &redirect_uri, &endpoints, &client_id, cookie)
            .await
    }

    /// Completes a custom-redirect exchange: the embedder delivers the
    /// authorization response's query parameters (as a JSON object) via
    /// `CookieReply(cookie, {...})`.
    pub async fn complete_custom_redirect(&self, pending: PendingExchange, cookie: &Cookie) -> Result<OAuthTokenSet> {
        let value = cookie.wait_for_reply().await.ok_or(OAuthError::Cancelled)?;
        let params: HashMap<String, String> = serde_json::from_value(value)
            .map_err(|e| OAuthError::CallbackServerFailed(format!("malformed cookie reply: {e}")))?;

        let PendingExchange {
            verifier_secret,
            state_secret,
            redirect_uri,
            endpoints,
            client_id,
            ..
        } = pending;
        self.validate_and_exchange(params, &state_secret, &verifier_secret, &redirect_uri, &endpoints, &client_id, Some(cookie))
            .await
    }

    async fn validate_and_exchange(
        &self,
        params: HashMap<String, String>,
        expected_state: &str,
        verifier: &str,
        redirect_uri: &str,
        endpoints: &OAuthEndpoints,
        client_id: &str,
        cookie: Option<&Cookie>,
    ) -> Result<OAuthTokenSet> {
        validate_callback(&params, expected_state, &endpoints.issuer)?;
        let code = params.get("code").ok_or(OAuthError::MissingCode)?;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("code_verifier", verifier),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
        ];

        let response = self
            .http
            .post_form(&endpoints.token, &form, &RequestOptions::default(), cookie)
            .await
            .map_err(|e| map_http_error(e, OAuthError::TokenExchangeFailed))?;

        let token_response: TokenResponse = serde_json::from_slice(&response.body)
            .map_err(|e| OAuthError::TokenExchangeFailed(format!("malformed token response: {e}")))?;

        Ok(OAuthTokenSet::new(
            token_response.access_token,
            token_response.refresh_token.unwrap_or_default(),
            token_response.token_type,
            token_response.expires_in.unwrap_or(3600),
            now(),
        ))
    }

    /// Refreshes `tokens` in place. Per §3/§4.5: an empty `refresh_token` in
    /// the response means "keep the previous one" (2.x server quirk).
    pub async fn refresh(&self, endpoints: &OAuthEndpoints, tokens: &mut OAuthTokenSet, cookie: Option<&Cookie>) -> Result<()> {
        let form = [("grant_type", "refresh_token"), ("refresh_token", tokens.refresh.as_str())];

        let response = self
            .http
            .post_form(&endpoints.token, &form, &RequestOptions::default(), cookie)
            .await
            .map_err(|e| map_http_error(e, OAuthError::RefreshFailed))?;

        let token_response: TokenResponse = serde_json::from_slice(&response.body)
            .map_err(|e| OAuthError::RefreshFailed(format!("malformed refresh response: {e}")))?;

        tokens.apply_refresh(
            token_response.access_token,
            token_response.refresh_token,
            token_response.token_type,
            token_response.expires_in.unwrap_or(3600),
            now(),
        );
        Ok(())
    }
}

fn map_http_error(err: HttpError, wrap: fn(String) -> OAuthError) -> OAuthError {
    match err {
        HttpError::Cancelled => OAuthError::Cancelled,
        other => wrap(other.to_string()),
    }
}

fn build_authorization_url(authorization_endpoint: &str, client_id: &str, redirect_uri: &str, pkce: &PkceExchange) -> Result<String> {
    let mut url = url::Url::parse(authorization_endpoint).map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("client_id", client_id);
        pairs.append_pair("response_type", "code");
        pairs.append_pair("scope", "config");
        pairs.append_pair("state", pkce.state_secret());
        pairs.append_pair("code_challenge", &pkce.challenge);
        pairs.append_pair("code_challenge_method", "S256");
        pairs.append_pair("redirect_uri", redirect_uri);
    }
    Ok(url.to_string())
}

/// §4.5 "Callback validation": `iss` present and matching, `state` present
/// and matching, `code` present. Any failure is a typed error the caller
/// maps to a `GoBack()` FSM transition.
fn validate_callback(params: &HashMap<String, String>, expected_state: &str, expected_issuer: &str) -> Result<()> {
    let iss = params.get("iss").ok_or(OAuthError::MissingIssuer)?;
    if iss != expected_issuer {
        return Err(OAuthError::IssuerMismatch {
            got: iss.clone(),
            expected: expected_issuer.to_string(),
        });
    }

    let state = params.get("state").ok_or(OAuthError::MissingState)?;
    if state != expected_state {
        return Err(OAuthError::StateMismatch);
    }

    if !params.contains_key("code") {
        return Err(OAuthError::MissingCode);
    }

    Ok(())
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn valid_callback_passes() {
        let p = params(&[("iss", "https://idp.example"), ("state", "s1"), ("code", "c1")]);
        assert!(validate_callback(&p, "s1", "https://idp.example").is_ok());
    }

    #[test]
    fn missing_issuer_is_rejected() {
        let p = params(&[("state", "s1"), ("code", "c1")]);
        assert!(matches!(validate_callback(&p, "s1", "https://idp.example"), Err(OAuthError::MissingIssuer)));
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let p = params(&[("iss", "https://evil.example"), ("state", "s1"), ("code", "c1")]);
        assert!(matches!(
            validate_callback(&p, "s1", "https://idp.example"),
            Err(OAuthError::IssuerMismatch { .. })
        ));
    }

    #[test]
    fn missing_state_is_rejected() {
        let p = params(&[("iss", "https://idp.example"), ("code", "c1")]);
        assert!(matches!(validate_callback(&p, "s1", "https://idp.example"), Err(OAuthError::MissingState)));
    }

    #[test]
    fn state_mismatch_is_rejected() {
        let p = params(&[("iss", "https://idp.example"), ("state", "wrong"), ("code", "c1")]);
        assert!(matches!(validate_callback(&p, "s1", "https://idp.example"), Err(OAuthError::StateMismatch)));
    }

    #[test]
    fn missing_code_is_rejected() {
        let p = params(&[("iss", "https://idp.example"), ("state", "s1")]);
        assert!(matches!(validate_callback(&p, "s1", "https://idp.example"), Err(OAuthError::MissingCode)));
    }

    #[test]
    fn authorization_url_carries_pkce_and_redirect() {
        let pkce = PkceExchange::new();
        let url = build_authorization_url("https://idp.example/authorize", "org.example.app", "http://127.0.0.1:12345/callback", &pkce).unwrap();
        assert!(url.contains("client_id=org.example.app"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A12345%2Fcallback"));
    }
}
