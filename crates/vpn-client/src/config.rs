//! Embedder-supplied client configuration (§10.3), following the teacher's
//! `toml`-based config pattern (`vpn-cli::config`, `vpn-identity::config`).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// The client id that restricts `AddServer` to custom servers only (§8
/// scenario 6, "Let's-Connect restriction").
pub const LETS_CONNECT_CLIENT_ID: &str = "org.letsconnect-vpn.app.linux";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryUrls {
    pub server_list_url: String,
    pub organization_list_url: String,
}

impl Default for DiscoveryUrls {
    fn default() -> Self {
        Self {
            server_list_url: "https://disco.eduvpn.org/v2/server_list.json".to_string(),
            organization_list_url: "https://disco.eduvpn.org/v2/organization_list.json".to_string(),
        }
    }
}

/// A minisign public key, hex-encoded, plus the 8-byte key id it is bound to
/// (matches `vpn_crypto::AllowedKey`, kept as plain strings here so the
/// config is `toml`-deserializable without a custom `Deserialize` impl).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedKey {
    pub key_id_hex: String,
    pub public_key_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpOverrides {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    vpn_http::DEFAULT_TIMEOUT.as_secs()
}

impl Default for HttpOverrides {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl HttpOverrides {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Registered client ids and their custom-URI redirect, following §4.5's
/// custom-redirect table (`org.letsconnect-vpn.app.android` →
/// `org.letsconnect-vpn.app:/callback`, for example).
pub type RedirectTable = HashMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_version: String,
    #[serde(default)]
    pub discovery: DiscoveryUrls,
    #[serde(default)]
    pub trusted_keys: Vec<TrustedKey>,
    #[serde(default)]
    pub force_prehash: bool,
    #[serde(default)]
    pub http: HttpOverrides,
    #[serde(default)]
    pub custom_redirects: RedirectTable,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_version: client_version.into(),
            discovery: DiscoveryUrls::default(),
            trusted_keys: Vec::new(),
            force_prehash: false,
            http: HttpOverrides::default(),
            custom_redirects: RedirectTable::new(),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ClientError::internal(format!("malformed client config: {e}")))
    }

    /// §4.9/§8 scenario 6: non-custom `AddServer` is rejected for this
    /// client id with an internal error.
    pub fn is_lets_connect(&self) -> bool {
        self.client_id == LETS_CONNECT_CLIENT_ID
    }

    pub fn user_agent(&self) -> String {
        vpn_http::build_user_agent(&self.client_id, &self.client_version)
    }

    pub fn redirect_table(&self) -> vpn_oauth::CustomRedirectTable {
        let mut table = vpn_oauth::CustomRedirectTable::new();
        for (client_id, redirect_uri) in &self.custom_redirects {
            table.register(client_id.clone(), redirect_uri.clone());
        }
        table
    }

    pub fn allowed_keys(&self) -> std::result::Result<Vec<vpn_crypto::AllowedKey>, String> {
        self.trusted_keys.iter().map(parse_trusted_key).collect()
    }
}

fn parse_trusted_key(key: &TrustedKey) -> std::result::Result<vpn_crypto::AllowedKey, String> {
    let key_id_bytes = hex::decode(&key.key_id_hex).map_err(|e| format!("invalid key_id_hex: {e}"))?;
    let key_id: [u8; 8] = key_id_bytes
        .try_into()
        .map_err(|_| "key_id_hex must decode to exactly 8 bytes".to_string())?;

    let public_key_bytes = hex::decode(&key.public_key_hex).map_err(|e| format!("invalid public_key_hex: {e}"))?;
    let verifying_key = ed25519_dalek::VerifyingKey::try_from(public_key_bytes.as_slice()).map_err(|e| format!("invalid ed25519 public key: {e}"))?;

    Ok(vpn_crypto::AllowedKey { key_id, verifying_key })
}
