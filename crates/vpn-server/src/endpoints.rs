//! Well-known endpoint discovery (§4.6 "GET `<base>/.well-known/vpn-user-portal`").

use serde::{Deserialize, Serialize};
use vpn_cookie::Cookie;
use vpn_http::{same_origin, HttpClient, RequestOptions};

use crate::error::{Result, ServerError};

const API_V3_KEY: &str = "http://eduvpn.org/api#3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub api_endpoint: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct WellKnownDocument {
    api: std::collections::HashMap<String, ApiEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
    api_endpoint: String,
    authorization_endpoint: String,
    token_endpoint: String,
}

pub async fn discover_endpoints(http: &HttpClient, base_url: &str, cookie: Option<&Cookie>) -> Result<Endpoints> {
    let url = format!("{}/.well-known/vpn-user-portal", base_url.trim_end_matches('/'));
    let response = http.get(&url, &RequestOptions::default(), cookie).await?;
    let document: WellKnownDocument = serde_json::from_slice(&response.body)?;

    let entry = document.api.get(API_V3_KEY).ok_or(ServerError::MissingApiEntry)?;

    let endpoints = Endpoints {
        api_endpoint: entry.api_endpoint.clone(),
        authorization_endpoint: entry.authorization_endpoint.clone(),
        token_endpoint: entry.token_endpoint.clone(),
    };

    validate_same_origin(base_url, &endpoints)?;
    Ok(endpoints)
}

/// §4.6 "Validate: all three URLs share scheme+host with the base URL".
fn validate_same_origin(base_url: &str, endpoints: &Endpoints) -> Result<()> {
    let base = url::Url::parse(base_url).map_err(|e| ServerError::EndpointOriginMismatch {
        endpoint: base_url.to_string(),
        base: e.to_string(),
    })?;

    for candidate in [&endpoints.api_endpoint, &endpoints.authorization_endpoint, &endpoints.token_endpoint] {
        let parsed = url::Url::parse(candidate).map_err(|_| ServerError::EndpointOriginMismatch {
            endpoint: candidate.clone(),
            base: base_url.to_string(),
        })?;
        if !same_origin(&base, &parsed) {
            return Err(ServerError::EndpointOriginMismatch {
                endpoint: candidate.clone(),
                base: base_url.to_string(),
            });
        }
    }
    Ok(())
}
