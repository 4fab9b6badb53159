//! Orchestrator-level integration tests for §8's end-to-end scenarios.
//! Every scenario uses a custom-URI redirect so the OAuth exchange never
//! needs a real loopback listener; the test's `TransitionCallback` plays the
//! embedder, answering `OAuthStarted`/`AskProfile` via `CookieReply` the way
//! a UI would after the user finishes in the browser.

use std::sync::{Arc, Mutex};

use url::Url;
use vpn_client::{Client, ClientConfig};
use vpn_cookie::CookieRegistry;
use vpn_fsm::TransitionCallback;
use vpn_server::ServerVariant;
use vpn_types::{ClientState, OAuthUrl, TransitionPayload};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_CLIENT_ID: &str = "org.example.testclient";

/// Plays the embedder side of interactive states: replies to `OAuthStarted`
/// with a synthetic authorization code (or cancels it), and to `AskProfile`
/// with a fixed profile id.
struct ScriptedEmbedder {
    cookies: CookieRegistry,
    issuer: String,
    cancel_oauth: bool,
    profile_choice: Option<String>,
    transitions: Mutex<Vec<(ClientState, ClientState)>>,
}

impl TransitionCallback for ScriptedEmbedder {
    fn on_transition(&self, old: ClientState, new: ClientState, payload: &TransitionPayload) -> bool {
        self.transitions.lock().unwrap().push((old, new));

        match payload {
            TransitionPayload::OAuthUrl(OAuthUrl::NeedsCookieReply { cookie, authorization_url }) => {
                let cookie_id = *cookie;
                let registry = self.cookies.clone();
                let issuer = self.issuer.clone();
                let cancel = self.cancel_oauth;
                let state = state_param(authorization_url);
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    if cancel {
                        registry.cancel(cookie_id);
                    } else {
                        let _ = registry.reply(
                            cookie_id,
                            serde_json::json!({ "iss": issuer, "state": state, "code": "test-authorization-code" }),
                        );
                    }
                });
                true
            }
            TransitionPayload::ProfilesAsk(ask) => {
                let cookie_id = ask.cookie;
                let registry = self.cookies.clone();
                match &self.profile_choice {
                    Some(choice) => {
                        let choice = choice.clone();
                        tokio::spawn(async move {
                            tokio::task::yield_now().await;
                            let _ = registry.reply(cookie_id, serde_json::json!(choice));
                        });
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }
}

fn state_param(authorization_url: &str) -> String {
    Url::parse(authorization_url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string())
        .unwrap()
}

fn config_with_redirect() -> ClientConfig {
    let mut config = ClientConfig::new(TEST_CLIENT_ID, "1.0.0");
    config.custom_redirects.insert(TEST_CLIENT_ID.to_string(), "org.example.testclient:/callback".to_string());
    config
}

fn well_known_body(mock_uri: &str) -> serde_json::Value {
    serde_json::json!({
        "api": {
            "http://eduvpn.org/api#3": {
                "api_endpoint": format!("{mock_uri}/api.php"),
                "authorization_endpoint": format!("{mock_uri}/oauth/authorize"),
                "token_endpoint": format!("{mock_uri}/oauth/token"),
            }
        }
    })
}

async fn mount_well_known(mock: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/vpn-user-portal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(well_known_body(&mock.uri())))
        .mount(mock)
        .await;
}

async fn mount_token_endpoint(mock: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "access-token",
            "refresh_token": "refresh-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(mock)
        .await;
}

#[tokio::test]
async fn happy_path_custom_wireguard_server_reaches_disconnected_with_config() {
    let mock = MockServer::start().await;
    mount_well_known(&mock).await;
    mount_token_endpoint(&mock).await;
    Mock::given(method("GET"))
        .and(path("/api.php/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "info": {
                "profile_list": [
                    { "id": "employees", "display_name": "Employees", "supported_vpn_protocols": ["wireguard"], "default_gateway": true, "dns_search_domains": [] }
                ]
            }
        })))
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/api.php/connect"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("[Interface]\nAddress = 10.43.43.2/24\n\n[Peer]\nPublicKey = abc\n")
                .append_header("Content-Type", "application/x-wireguard-profile")
                .append_header("Expires", "Tue, 15 Nov 1994 08:12:31 GMT"),
        )
        .mount(&mock)
        .await;

    let callback = Arc::new(ScriptedEmbedder {
        cookies: CookieRegistry::new(),
        issuer: mock.uri(),
        cancel_oauth: false,
        profile_choice: None,
        transitions: Mutex::new(Vec::new()),
    });
    let client = Client::new(config_with_redirect(), callback.clone()).unwrap();
    client.register().unwrap();

    let info = client.add_server(ServerVariant::Custom, &mock.uri(), None).await.unwrap();
    assert_eq!(info.identifier, mock.uri());

    let result = client.get_config(ServerVariant::Custom, &mock.uri(), false, None).await.unwrap();
    assert!(result.config.contains("[Interface]\nPrivateKey ="));
    assert_eq!(client.state(), ClientState::Disconnected);

    let server = client.current_server().unwrap();
    assert_eq!(server.profile_id.as_deref(), Some("employees"));
}

#[tokio::test]
async fn oauth_cancel_leaves_fsm_at_no_server() {
    let mock = MockServer::start().await;
    mount_well_known(&mock).await;

    let callback = Arc::new(ScriptedEmbedder {
        cookies: CookieRegistry::new(),
        issuer: mock.uri(),
        cancel_oauth: true,
        profile_choice: None,
        transitions: Mutex::new(Vec::new()),
    });
    let client = Client::new(config_with_redirect(), callback.clone()).unwrap();
    client.register().unwrap();
    client.add_server(ServerVariant::Custom, &mock.uri(), None).await.unwrap();

    let err = client.get_config(ServerVariant::Custom, &mock.uri(), false, None).await.unwrap_err();
    assert!(!err.is_internal);
    assert_eq!(client.state(), ClientState::NoServer);
}

#[tokio::test]
async fn stale_profile_selection_triggers_ask_profile_and_reconnects() {
    let mock = MockServer::start().await;
    mount_well_known(&mock).await;
    mount_token_endpoint(&mock).await;

    Mock::given(method("GET"))
        .and(path("/api.php/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "info": {
                "profile_list": [
                    { "id": "employees", "display_name": "Employees", "supported_vpn_protocols": ["wireguard"], "default_gateway": true, "dns_search_domains": [] }
                ]
            }
        })))
        .up_to_n_times(1)
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/api.php/connect"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("[Interface]\nAddress = 10.43.43.2/24\n\n[Peer]\nPublicKey = abc\n")
                .append_header("Content-Type", "application/x-wireguard-profile")
                .append_header("Expires", "Tue, 15 Nov 1994 08:12:31 GMT"),
        )
        .mount(&mock)
        .await;

    let callback = Arc::new(ScriptedEmbedder {
        cookies: CookieRegistry::new(),
        issuer: mock.uri(),
        cancel_oauth: false,
        profile_choice: Some("guests".to_string()),
        transitions: Mutex::new(Vec::new()),
    });
    let client = Client::new(config_with_redirect(), callback.clone()).unwrap();
    client.register().unwrap();
    client.add_server(ServerVariant::Custom, &mock.uri(), None).await.unwrap();
    client.get_config(ServerVariant::Custom, &mock.uri(), false, None).await.unwrap();
    assert_eq!(client.current_server().unwrap().profile_id.as_deref(), Some("employees"));

    // Second `/info` response drops "employees" and offers two other
    // profiles; with more than one profile, reconciliation can't fall back
    // to an implicit single choice, so the stale selection is cleared and
    // `AskProfile` fires.
    Mock::given(method("GET"))
        .and(path("/api.php/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "info": {
                "profile_list": [
                    { "id": "guests", "display_name": "Guests", "supported_vpn_protocols": ["wireguard"], "default_gateway": true, "dns_search_domains": [] },
                    { "id": "visitors", "display_name": "Visitors", "supported_vpn_protocols": ["wireguard"], "default_gateway": true, "dns_search_domains": [] }
                ]
            }
        })))
        .mount(&mock)
        .await;

    let result = client.get_config(ServerVariant::Custom, &mock.uri(), false, None).await.unwrap();
    assert!(result.config.contains("[Interface]\nPrivateKey ="));
    assert_eq!(client.current_server().unwrap().profile_id.as_deref(), Some("guests"));

    let saw_ask_profile = callback
        .transitions
        .lock()
        .unwrap()
        .iter()
        .any(|(_, new)| *new == ClientState::AskProfile);
    assert!(saw_ask_profile);
}

#[tokio::test]
async fn lets_connect_client_id_rejects_institute_access_server() {
    let callback = Arc::new(ScriptedEmbedder {
        cookies: CookieRegistry::new(),
        issuer: String::new(),
        cancel_oauth: false,
        profile_choice: None,
        transitions: Mutex::new(Vec::new()),
    });
    let config = ClientConfig::new(vpn_client::LETS_CONNECT_CLIENT_ID, "1.0.0");
    let client = Client::new(config, callback).unwrap();
    client.register().unwrap();

    let err = client
        .add_server(ServerVariant::InstituteAccess, "https://institute.example.org", None)
        .await
        .unwrap_err();
    assert!(err.is_internal);
    assert_eq!(client.state(), ClientState::NoServer);
}

#[tokio::test]
async fn expired_access_token_is_refreshed_once_without_embedder_interaction() {
    let mock = MockServer::start().await;
    mount_well_known(&mock).await;
    mount_token_endpoint(&mock).await;

    Mock::given(method("GET"))
        .and(path("/api.php/info"))
        .and(wiremock::matchers::header("Authorization", "Bearer access-token"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/api.php/info"))
        .and(wiremock::matchers::header("Authorization", "Bearer access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "info": {
                "profile_list": [
                    { "id": "employees", "display_name": "Employees", "supported_vpn_protocols": ["wireguard"], "default_gateway": true, "dns_search_domains": [] }
                ]
            }
        })))
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/api.php/connect"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("[Interface]\nAddress = 10.43.43.2/24\n\n[Peer]\nPublicKey = abc\n")
                .append_header("Content-Type", "application/x-wireguard-profile")
                .append_header("Expires", "Tue, 15 Nov 1994 08:12:31 GMT"),
        )
        .mount(&mock)
        .await;

    let callback = Arc::new(ScriptedEmbedder {
        cookies: CookieRegistry::new(),
        issuer: mock.uri(),
        cancel_oauth: false,
        profile_choice: None,
        transitions: Mutex::new(Vec::new()),
    });
    let client = Client::new(config_with_redirect(), callback).unwrap();
    client.register().unwrap();
    client.add_server(ServerVariant::Custom, &mock.uri(), None).await.unwrap();

    let result = client.get_config(ServerVariant::Custom, &mock.uri(), false, None).await.unwrap();
    assert!(result.config.contains("[Interface]\nPrivateKey ="));
    assert_eq!(client.state(), ClientState::Disconnected);
}
