//! Authorized `/info` and `/connect` calls against a server (§4.6).

use tokio::sync::Mutex as AsyncMutex;

use vpn_cookie::Cookie;
use vpn_http::{HttpClient, HttpError, HttpResponse, RequestOptions};
use vpn_oauth::{OAuthClient, OAuthEndpoints};
use vpn_types::{ExpiryInfo, Profile, ProfileSet, VpnProtocol};

use crate::connect_format::{append_openvpn_script_security, reorder_remotes_tcp_first, splice_wireguard_private_key};
use crate::error::{Result, ServerError};
use crate::server::Server;

/// Issues a bearer-authorized GET, retrying exactly once after a refresh on
/// a 401 (§4.6 "Authorized request wrapper"). `refresh_lock` serializes
/// refreshes across concurrent callers for the same server (§5).
pub async fn authorized_get(
    http: &HttpClient,
    oauth: &OAuthClient,
    oauth_endpoints: &OAuthEndpoints,
    refresh_lock: &AsyncMutex<()>,
    server: &mut Server,
    url: &str,
    cookie: Option<&Cookie>,
) -> Result<HttpResponse> {
    ensure_fresh_tokens(oauth, oauth_endpoints, refresh_lock, server, cookie).await?;

    let opts = bearer_opts(server)?;
    let first = http.get(url, &opts, cookie).await;
    retry_once_on_401(first, oauth, oauth_endpoints, refresh_lock, server, cookie, |opts| http.get(url, &opts, cookie)).await
}

/// Runs `first` (the already-issued attempt); on a 401 it forces a refresh
/// and replays the request exactly once via `retry`, surfacing
/// `ServerError::ApiAuthorized` if the retry is also unauthorized.
async fn retry_once_on_401<'a, Fut>(
    first: vpn_http::Result<HttpResponse>,
    oauth: &OAuthClient,
    oauth_endpoints: &OAuthEndpoints,
    refresh_lock: &AsyncMutex<()>,
    server: &mut Server,
    cookie: Option<&Cookie>,
    retry: impl FnOnce(RequestOptions) -> Fut,
) -> Result<HttpResponse>
where
    Fut: std::future::Future<Output = vpn_http::Result<HttpResponse>> + 'a,
{
    match first {
        Ok(resp) => Ok(resp),
        Err(HttpError::Status(e)) if e.status == 401 => {
            // §4.6: "invalidates the stored expiry and retries once (which
            // drives C5 refresh)".
            if let Some(tokens) = server.tokens_mut() {
                tokens.expires_at = 0;
            }
            force_refresh(oauth, oauth_endpoints, refresh_lock, server, cookie).await?;

            let opts = bearer_opts(server)?;
            match retry(opts).await {
                Ok(resp) => Ok(resp),
                Err(HttpError::Status(e)) if e.status == 401 => Err(ServerError::ApiAuthorized(e.to_string())),
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn bearer_opts(server: &Server) -> Result<RequestOptions> {
    let tokens = server.tokens().ok_or(ServerError::NoTokens)?;
    let mut opts = RequestOptions::default();
    opts.headers.insert("Authorization".to_string(), format!("Bearer {}", tokens.access));
    Ok(opts)
}

async fn ensure_fresh_tokens(
    oauth: &OAuthClient,
    oauth_endpoints: &OAuthEndpoints,
    refresh_lock: &AsyncMutex<()>,
    server: &mut Server,
    cookie: Option<&Cookie>,
) -> Result<()> {
    let expired = server.tokens().map(|t| t.is_expired(now())).unwrap_or(true);
    if expired {
        force_refresh(oauth, oauth_endpoints, refresh_lock, server, cookie).await?;
    }
    Ok(())
}

async fn force_refresh(oauth: &OAuthClient, oauth_endpoints: &OAuthEndpoints, refresh_lock: &AsyncMutex<()>, server: &mut Server, cookie: Option<&Cookie>) -> Result<()> {
    let _guard = refresh_lock.lock().await;
    let tokens = server.tokens_mut().as_mut().ok_or(ServerError::NoTokens)?;
    oauth.refresh(oauth_endpoints, tokens, cookie).await.map_err(ServerError::from)
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// `/info`: fetches and parses the profile list (§4.6 "`/info` → profile
/// list, stored raw ... and parsed").
pub async fn fetch_info(
    http: &HttpClient,
    oauth: &OAuthClient,
    oauth_endpoints: &OAuthEndpoints,
    refresh_lock: &AsyncMutex<()>,
    server: &mut Server,
    cookie: Option<&Cookie>,
) -> Result<()> {
    let api_endpoint = server
        .base()
        .endpoints
        .as_ref()
        .map(|e| e.api_endpoint.clone())
        .ok_or(ServerError::MissingApiEntry)?;
    let url = format!("{}/info", api_endpoint.trim_end_matches('/'));

    let response = authorized_get(http, oauth, oauth_endpoints, refresh_lock, server, &url, cookie).await?;
    let raw: serde_json::Value = serde_json::from_slice(&response.body)?;
    let profiles = parse_profiles(&raw)?;

    let base = server.base_mut();
    let previous_selection = base.profiles.current.take();
    base.profiles = ProfileSet::new(profiles, raw);
    // §4.6 "if the embedder-chosen profile no longer exists, the selection
    // is cleared" — carry the prior selection forward and reconcile it
    // against the freshly fetched profile list.
    if base.profiles.current.is_none() {
        base.profiles.current = previous_selection;
    }
    base.profiles.reconcile_selection();
    Ok(())
}

fn parse_profiles(raw: &serde_json::Value) -> Result<Vec<Profile>> {
    let list = raw
        .pointer("/info/profile_list")
        .or_else(|| raw.pointer("/profile_list"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    list.into_iter()
        .map(|entry| serde_json::from_value(entry).map_err(ServerError::from))
        .collect()
}

pub struct ConnectResult {
    pub config: String,
    pub protocol: VpnProtocol,
    pub expiry: ExpiryInfo,
}

/// `/connect`: requests a config for the currently selected profile,
/// negotiating WireGuard vs OpenVPN and applying the post-processing steps
/// of §4.6.
#[allow(clippy::too_many_arguments)]
pub async fn connect(
    http: &HttpClient,
    oauth: &OAuthClient,
    oauth_endpoints: &OAuthEndpoints,
    refresh_lock: &AsyncMutex<()>,
    server: &mut Server,
    prefer_tcp: bool,
    cookie: Option<&Cookie>,
) -> Result<ConnectResult> {
    let api_endpoint = server
        .base()
        .endpoints
        .as_ref()
        .map(|e| e.api_endpoint.clone())
        .ok_or(ServerError::MissingApiEntry)?;
    let profile = server
        .base()
        .profiles
        .current_profile()
        .cloned()
        .ok_or(ServerError::NoProfileSelected)?;

    let wants_wireguard = profile.supports(VpnProtocol::Wireguard);
    let keypair = wants_wireguard.then(vpn_crypto::generate_keypair);

    let mut form: Vec<(String, String)> = vec![("profile_id".to_string(), profile.id.clone())];
    if let Some(kp) = &keypair {
        form.push(("public_key".to_string(), kp.public_key_base64()));
    }

    ensure_fresh_tokens(oauth, oauth_endpoints, refresh_lock, server, cookie).await?;
    let accept = if wants_wireguard {
        "application/x-wireguard-profile"
    } else {
        "application/x-openvpn-profile"
    };

    let url = format!("{}/connect", api_endpoint.trim_end_matches('/'));
    let form_refs: Vec<(&str, &str)> = form.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let opts = bearer_opts(server)?;
    let opts = with_accept(opts, accept);
    let first = http.post_form(&url, &form_refs, &opts, cookie).await;
    let response = retry_once_on_401(first, oauth, oauth_endpoints, refresh_lock, server, cookie, |opts| {
        http.post_form(&url, &form_refs, &with_accept(opts, accept), cookie)
    })
    .await?;

    let protocol = if wants_wireguard && response.header("Content-Type") == Some("application/x-wireguard-profile") {
        VpnProtocol::Wireguard
    } else {
        VpnProtocol::Openvpn
    };

    let mut config = response.text();
    config = match protocol {
        VpnProtocol::Wireguard => {
            let kp = keypair.expect("wireguard protocol implies a keypair was generated");
            splice_wireguard_private_key(&config, &kp.private_key_base64())
        }
        VpnProtocol::Openvpn => append_openvpn_script_security(&config),
    };
    if prefer_tcp {
        config = reorder_remotes_tcp_first(&config);
    }

    let expires_at = response
        .header("Expires")
        .ok_or(ServerError::MissingExpiresHeader)
        .and_then(|h| httpdate_to_unix(h))?;
    let start = now();
    let base = server.base_mut();
    base.session_start = Some(start);
    base.session_end = Some(expires_at);

    Ok(ConnectResult {
        config,
        protocol,
        expiry: ExpiryInfo::from_window(start, expires_at),
    })
}

fn with_accept(mut opts: RequestOptions, accept: &str) -> RequestOptions {
    opts.headers.insert("Accept".to_string(), accept.to_string());
    opts
}

/// Parses an HTTP-date `Expires` header value into a Unix timestamp.
fn httpdate_to_unix(value: &str) -> Result<i64> {
    httpdate::parse_http_date(value)
        .map(|t| t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64)
        .map_err(|e| ServerError::MalformedExpiresHeader(format!("{value}: {e}")))
}
