//! Catalog data shapes (§3 "Discovery catalog").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogList<T> {
    pub version: u64,
    pub list: Vec<T>,
    pub fetched_at: i64,
}

impl<T> CatalogList<T> {
    pub fn empty() -> Self {
        Self {
            version: 0,
            list: Vec::new(),
            fetched_at: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerKind {
    InstituteAccess,
    SecureInternet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerListEntry {
    pub server_type: ServerKind,
    /// Present for institute-access entries.
    pub base_url: Option<String>,
    /// Present for secure-internet entries.
    pub organization_id: Option<String>,
    pub country_code: Option<String>,
    pub display_name: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationListEntry {
    pub org_id: String,
    pub display_name: HashMap<String, String>,
    pub secure_internet_home: Option<String>,
}

/// Result of a refresh attempt: the catalog served to the caller (the fresh
/// one on success, the previous one on failure) plus the error, if any
/// (§4.3 "On any error, the previous cached list is retained and returned
/// alongside the error").
pub struct FetchOutcome<T> {
    pub list: CatalogList<T>,
    pub error: Option<crate::error::DiscoveryError>,
}
