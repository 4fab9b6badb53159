//! Tagged transition payloads (§6 "State transition payloads", §9
//! "dynamically-typed payloads → tagged variant per transition kind").

use crate::profile::Profile;
use serde::{Deserialize, Serialize};

/// Summary of a server shown to the embedder in `ServersSummary`/`ServerInfo`
/// payloads and in `Connected`/`Disconnected`/`GotConfig` transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub identifier: String,
    pub display_name: String,
    pub profile_id: Option<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesAsk {
    pub cookie: u64,
    pub profiles: Vec<Profile>,
    pub current: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationsAsk {
    pub cookie: u64,
    pub country_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum OAuthUrl {
    /// The library opened a loopback server; the embedder only needs to
    /// open the browser at this URL.
    Direct(String),
    /// A custom-URI redirect is configured; the embedder must deliver the
    /// authorization response back via `CookieReply(cookie, ...)`.
    NeedsCookieReply { cookie: u64, authorization_url: String },
}

/// Tagged union of every payload a transition callback can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum TransitionPayload {
    OAuthUrl(OAuthUrl),
    ProfilesAsk(ProfilesAsk),
    LocationsAsk(LocationsAsk),
    ServerInfo(ServerInfo),
    ServersSummary(Vec<ServerInfo>),
    None,
}

impl Default for TransitionPayload {
    fn default() -> Self {
        TransitionPayload::None
    }
}
