//! Versioned persistent-state shapes (§6 "Persistent state") and the pure
//! v1→v2 migration function.
//!
//! Actually writing the state file to disk is the embedder's job (§1 lists
//! "persistent config file I/O" as an external collaborator); this module
//! only defines the shapes an embedder's storage layer serializes, plus the
//! migration it runs once on first load of a v1 file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use vpn_server::{Endpoints, ServerVariant};
use vpn_types::OAuthTokenSet;

/// The pre-catalog-versioning shape: one OAuth token set and profile
/// selection per institute-access server, keyed by its base URL. No
/// secure-internet support, no cached discovery versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedServerV1 {
    pub base_url: String,
    pub profile_id: Option<String>,
    pub tokens: Option<OAuthTokenSet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedStateV1 {
    pub servers: Vec<PersistedServerV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedServerV2 {
    pub variant: ServerVariant,
    /// Base URL for institute/custom, organization id for secure-internet.
    pub identifier: String,
    pub base_url: String,
    pub endpoints: Option<Endpoints>,
    pub profile_id: Option<String>,
    pub tokens: Option<OAuthTokenSet>,
    #[serde(default)]
    pub secure_internet_locations: HashMap<String, Endpoints>,
    #[serde(default)]
    pub secure_internet_home_url: Option<String>,
    #[serde(default)]
    pub current_location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedStateV2 {
    /// Always `2`; present so an embedder's loader can dispatch on it
    /// without needing an out-of-band schema version.
    pub version: u32,
    pub servers: Vec<PersistedServerV2>,
    pub server_list_version: Option<u64>,
    pub organization_list_version: Option<u64>,
}

impl PersistedStateV2 {
    pub fn empty() -> Self {
        Self {
            version: 2,
            servers: Vec::new(),
            server_list_version: None,
            organization_list_version: None,
        }
    }
}

/// A v1 state file only ever held institute-access servers addressed by
/// base URL; the migration carries those over as-is and leaves every v2-only
/// field at its default (§11 "a concrete migration to call").
pub fn migrate_v1_to_v2(v1: PersistedStateV1) -> PersistedStateV2 {
    PersistedStateV2 {
        version: 2,
        servers: v1
            .servers
            .into_iter()
            .map(|s| PersistedServerV2 {
                variant: ServerVariant::InstituteAccess,
                identifier: s.base_url.clone(),
                base_url: s.base_url,
                endpoints: None,
                profile_id: s.profile_id,
                tokens: s.tokens,
                secure_internet_locations: HashMap::new(),
                secure_internet_home_url: None,
                current_location: None,
            })
            .collect(),
        server_list_version: None,
        organization_list_version: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_servers_migrate_as_institute_access() {
        let v1 = PersistedStateV1 {
            servers: vec![PersistedServerV1 {
                base_url: "https://vpn.example.org".into(),
                profile_id: Some("employees".into()),
                tokens: None,
            }],
        };
        let v2 = migrate_v1_to_v2(v1);
        assert_eq!(v2.version, 2);
        assert_eq!(v2.servers[0].variant, ServerVariant::InstituteAccess);
        assert_eq!(v2.servers[0].identifier, "https://vpn.example.org");
        assert_eq!(v2.servers[0].profile_id.as_deref(), Some("employees"));
    }

    #[test]
    fn migrating_an_empty_v1_file_yields_an_empty_v2_file() {
        let v2 = migrate_v1_to_v2(PersistedStateV1::default());
        assert!(v2.servers.is_empty());
    }
}
