//! Integration tests for `.well-known` endpoint discovery against a mock
//! eduVPN portal.

use vpn_http::HttpClient;
use vpn_server::{discover_endpoints, ServerError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http() -> HttpClient {
    HttpClient::new("test-client/1.0".to_string())
}

#[tokio::test]
async fn discovers_endpoints_from_well_known_document() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "api": {
            "http://eduvpn.org/api#3": {
                "api_endpoint": format!("{}/api.php", server.uri()),
                "authorization_endpoint": format!("{}/oauth/authorize", server.uri()),
                "token_endpoint": format!("{}/oauth/token", server.uri()),
            }
        }
    });

    Mock::given(method("GET"))
        .and(path("/.well-known/vpn-user-portal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let endpoints = discover_endpoints(&http(), &server.uri(), None).await.unwrap();
    assert_eq!(endpoints.api_endpoint, format!("{}/api.php", server.uri()));
}

#[tokio::test]
async fn rejects_document_without_api_v3_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/vpn-user-portal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "api": {} })))
        .mount(&server)
        .await;

    let err = discover_endpoints(&http(), &server.uri(), None).await.unwrap_err();
    assert!(matches!(err, ServerError::MissingApiEntry));
}

#[tokio::test]
async fn rejects_cross_origin_endpoints() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "api": {
            "http://eduvpn.org/api#3": {
                "api_endpoint": "https://evil.example/api.php",
                "authorization_endpoint": format!("{}/oauth/authorize", server.uri()),
                "token_endpoint": format!("{}/oauth/token", server.uri()),
            }
        }
    });

    Mock::given(method("GET"))
        .and(path("/.well-known/vpn-user-portal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let err = discover_endpoints(&http(), &server.uri(), None).await.unwrap_err();
    assert!(matches!(err, ServerError::EndpointOriginMismatch { .. }));
}
