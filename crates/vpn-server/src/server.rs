//! Server variants (§3 "Server variants", §9 "sum type `Server = Institute |
//! Custom | SecureInternet`").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use vpn_types::{ExpiryInfo, OAuthTokenSet, ProfileSet};

use crate::endpoints::Endpoints;

/// Tag used by the orchestrator's `AddServer(type, id)` / `RemoveServer`
/// API and as the discriminant stored alongside each server record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerVariant {
    InstituteAccess,
    Custom,
    SecureInternet,
}

/// Fields every variant shares (§3 "All servers share a base record").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerBase {
    pub base_url: String,
    pub endpoints: Option<Endpoints>,
    pub version: Option<String>,
    pub profiles: ProfileSet,
    pub session_start: Option<i64>,
    pub session_end: Option<i64>,
    pub display_name: String,
    pub support_contacts: Vec<String>,
}

impl ServerBase {
    pub fn new(base_url: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    pub fn expiry(&self) -> Option<ExpiryInfo> {
        match (self.session_start, self.session_end) {
            (Some(start), Some(end)) => Some(ExpiryInfo::from_window(start, end)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "variant")]
pub enum Server {
    InstituteAccess { base: ServerBase, tokens: Option<OAuthTokenSet> },
    Custom { base: ServerBase, tokens: Option<OAuthTokenSet> },
    SecureInternet {
        base: ServerBase,
        org_id: String,
        home_url: String,
        locations: HashMap<String, Endpoints>,
        current_location: Option<String>,
        /// Anchored to `home_url` regardless of `current_location`
        /// (§3 "owns a single OAuth token set anchored to the home URL";
        /// see SPEC_FULL.md's Open Question decision).
        tokens: Option<OAuthTokenSet>,
    },
}

impl Server {
    pub fn variant(&self) -> ServerVariant {
        match self {
            Server::InstituteAccess { .. } => ServerVariant::InstituteAccess,
            Server::Custom { .. } => ServerVariant::Custom,
            Server::SecureInternet { .. } => ServerVariant::SecureInternet,
        }
    }

    /// The identifier the embedder uses in `AddServer`/`RemoveServer`: the
    /// base URL for institute/custom servers, the organization id for
    /// secure-internet.
    pub fn identifier(&self) -> &str {
        match self {
            Server::InstituteAccess { base, .. } | Server::Custom { base, .. } => &base.base_url,
            Server::SecureInternet { org_id, .. } => org_id,
        }
    }

    pub fn base(&self) -> &ServerBase {
        match self {
            Server::InstituteAccess { base, .. } | Server::Custom { base, .. } | Server::SecureInternet { base, .. } => base,
        }
    }

    pub fn base_mut(&mut self) -> &mut ServerBase {
        match self {
            Server::InstituteAccess { base, .. } | Server::Custom { base, .. } | Server::SecureInternet { base, .. } => base,
        }
    }

    pub fn tokens(&self) -> Option<&OAuthTokenSet> {
        match self {
            Server::InstituteAccess { tokens, .. } | Server::Custom { tokens, .. } | Server::SecureInternet { tokens, .. } => tokens.as_ref(),
        }
    }

    pub fn tokens_mut(&mut self) -> &mut Option<OAuthTokenSet> {
        match self {
            Server::InstituteAccess { tokens, .. } | Server::Custom { tokens, .. } | Server::SecureInternet { tokens, .. } => tokens,
        }
    }

    /// The URL whose OAuth issuer/endpoints anchor token exchange: the base
    /// URL for institute/custom, the home URL for secure-internet (tokens
    /// are anchored there even when the user is connected to another
    /// location).
    pub fn oauth_anchor_url(&self) -> &str {
        match self {
            Server::InstituteAccess { base, .. } | Server::Custom { base, .. } => &base.base_url,
            Server::SecureInternet { home_url, .. } => home_url,
        }
    }

    /// Switches the active secure-internet location. A no-op on other
    /// variants. Resets `base.endpoints` so the caller re-fetches for the
    /// new location's origin.
    pub fn set_secure_location(&mut self, location_url: &str) -> bool {
        if let Server::SecureInternet {
            base,
            locations,
            current_location,
            ..
        } = self
        {
            if let Some(endpoints) = locations.get(location_url) {
                base.base_url = location_url.to_string();
                base.endpoints = Some(endpoints.clone());
                *current_location = Some(location_url.to_string());
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_locations() -> HashMap<String, Endpoints> {
        let mut map = HashMap::new();
        map.insert(
            "https://nl.example.org".to_string(),
            Endpoints {
                api_endpoint: "https://nl.example.org/api.php".into(),
                authorization_endpoint: "https://nl.example.org/oauth/authorize".into(),
                token_endpoint: "https://nl.example.org/oauth/token".into(),
            },
        );
        map
    }

    #[test]
    fn secure_internet_identifier_is_org_id() {
        let server = Server::SecureInternet {
            base: ServerBase::new("https://nl.example.org", "Example"),
            org_id: "org.example".into(),
            home_url: "https://home.example.org".into(),
            locations: sample_locations(),
            current_location: None,
            tokens: None,
        };
        assert_eq!(server.identifier(), "org.example");
    }

    #[test]
    fn oauth_anchors_on_home_url_for_secure_internet() {
        let server = Server::SecureInternet {
            base: ServerBase::new("https://nl.example.org", "Example"),
            org_id: "org.example".into(),
            home_url: "https://home.example.org".into(),
            locations: sample_locations(),
            current_location: None,
            tokens: None,
        };
        assert_eq!(server.oauth_anchor_url(), "https://home.example.org");
    }

    #[test]
    fn set_secure_location_updates_base_url_and_endpoints() {
        let mut server = Server::SecureInternet {
            base: ServerBase::new("https://home.example.org", "Example"),
            org_id: "org.example".into(),
            home_url: "https://home.example.org".into(),
            locations: sample_locations(),
            current_location: None,
            tokens: None,
        };
        assert!(server.set_secure_location("https://nl.example.org"));
        assert_eq!(server.base().base_url, "https://nl.example.org");
    }

    #[test]
    fn set_secure_location_rejects_unknown_location() {
        let mut server = Server::SecureInternet {
            base: ServerBase::new("https://home.example.org", "Example"),
            org_id: "org.example".into(),
            home_url: "https://home.example.org".into(),
            locations: sample_locations(),
            current_location: None,
            tokens: None,
        };
        assert!(!server.set_secure_location("https://unknown.example.org"));
    }

    #[test]
    fn custom_server_identifier_is_base_url() {
        let server = Server::Custom {
            base: ServerBase::new("https://my-own-server.example", "my-own-server.example"),
            tokens: None,
        };
        assert_eq!(server.identifier(), "https://my-own-server.example");
    }
}
