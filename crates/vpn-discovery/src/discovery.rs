//! Discovery catalog fetch/cache/match (C3, §4.3).

use crate::catalog::{CatalogList, FetchOutcome, OrganizationListEntry, ServerKind, ServerListEntry};
use crate::embedded::{embedded_organizations, embedded_servers};
use crate::error::{DiscoveryError, Result};
use std::sync::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use vpn_cookie::Cookie;
use vpn_crypto::{AllowedKey, VerifyInput};
use vpn_http::{HttpClient, RequestOptions};

const SERVERS_STALE_AFTER_SECS: i64 = 3600;

pub struct DiscoveryConfig {
    pub server_list_url: String,
    pub organization_list_url: String,
    pub allowed_keys: Vec<AllowedKey>,
    pub force_prehash: bool,
}

struct Cached<T> {
    list: CatalogList<T>,
    has_fetched: bool,
}

pub struct Discovery {
    http: HttpClient,
    config: DiscoveryConfig,
    servers: RwLock<Cached<ServerListEntry>>,
    organizations: RwLock<Cached<OrganizationListEntry>>,
    // Serializes refreshes so concurrent callers don't double-fetch.
    refresh_lock: AsyncMutex<()>,
    now_fn: fn() -> i64,
}

impl Discovery {
    pub fn new(http: HttpClient, config: DiscoveryConfig) -> Self {
        Self::with_clock(http, config, default_now)
    }

    fn with_clock(http: HttpClient, config: DiscoveryConfig, now_fn: fn() -> i64) -> Self {
        Self {
            http,
            config,
            servers: RwLock::new(Cached {
                list: embedded_servers(),
                has_fetched: false,
            }),
            organizations: RwLock::new(Cached {
                list: embedded_organizations(),
                has_fetched: false,
            }),
            refresh_lock: AsyncMutex::new(()),
            now_fn,
        }
    }

    /// §4.3: "servers — at app start and whenever the cached copy is older
    /// than 1 h".
    pub async fn servers(&self, cookie: Option<&Cookie>) -> FetchOutcome<ServerListEntry> {
        let needs_refresh = {
            let cached = self.servers.read().unwrap();
            !cached.has_fetched || (self.now_fn)() - cached.list.fetched_at >= SERVERS_STALE_AFTER_SECS
        };

        if !needs_refresh {
            return FetchOutcome {
                list: self.servers.read().unwrap().list.clone(),
                error: None,
            };
        }

        self.refresh_servers(cookie).await
    }

    /// §4.3: "organizations — first-use only (embedder explicitly
    /// invalidates on e.g. 'org-id not found' error)".
    pub async fn organizations(&self, cookie: Option<&Cookie>) -> FetchOutcome<OrganizationListEntry> {
        let needs_refresh = !self.organizations.read().unwrap().has_fetched;
        if !needs_refresh {
            return FetchOutcome {
                list: self.organizations.read().unwrap().list.clone(),
                error: None,
            };
        }
        self.refresh_organizations(cookie).await
    }

    /// Forces the next `organizations()` call to refetch.
    pub fn invalidate_organizations(&self) {
        self.organizations.write().unwrap().has_fetched = false;
    }

    async fn refresh_servers(&self, cookie: Option<&Cookie>) -> FetchOutcome<ServerListEntry> {
        let _guard = self.refresh_lock.lock().await;
        let previous_version = self.servers.read().unwrap().list.version;

        match self
            .fetch_and_verify::<ServerListEntry>(&self.config.server_list_url, "server_list.json", previous_version, cookie)
            .await
        {
            Ok(fresh) => {
                let mut cached = self.servers.write().unwrap();
                cached.list = fresh.clone();
                cached.has_fetched = true;
                FetchOutcome { list: fresh, error: None }
            }
            Err(e) => {
                tracing::warn!(error = %e, "server_list refresh failed, serving cached copy");
                FetchOutcome {
                    list: self.servers.read().unwrap().list.clone(),
                    error: Some(e),
                }
            }
        }
    }

    async fn refresh_organizations(&self, cookie: Option<&Cookie>) -> FetchOutcome<OrganizationListEntry> {
        let _guard = self.refresh_lock.lock().await;
        let previous_version = self.organizations.read().unwrap().list.version;

        match self
            .fetch_and_verify::<OrganizationListEntry>(
                &self.config.organization_list_url,
                "organization_list.json",
                previous_version,
                cookie,
            )
            .await
        {
            Ok(fresh) => {
                let mut cached = self.organizations.write().unwrap();
                cached.list = fresh.clone();
                cached.has_fetched = true;
                FetchOutcome { list: fresh, error: None }
            }
            Err(e) => {
                tracing::warn!(error = %e, "organization_list refresh failed, serving cached copy");
                FetchOutcome {
                    list: self.organizations.read().unwrap().list.clone(),
                    error: Some(e),
                }
            }
        }
    }

    async fn fetch_and_verify<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        expected_filename: &str,
        min_signed_time: u64,
        cookie: Option<&Cookie>,
    ) -> Result<CatalogList<T>> {
        let opts = RequestOptions::default();
        let payload = self.http.get(url, &opts, cookie).await?;
        let sig_url = format!("{url}.minisig");
        let signature = self.http.get(&sig_url, &opts, cookie).await?;

        // Enforces §4.2 step 5 (trusted-comment timestamp may not regress).
        let _verified = vpn_crypto::verify(VerifyInput {
            signature_file_bytes: &signature.body,
            payload_bytes: &payload.body,
            expected_filename,
            min_signed_time,
            allowed_public_keys: &self.config.allowed_keys,
            force_prehash: self.config.force_prehash,
        })?;

        let mut list: CatalogList<T> = serde_json::from_slice(&payload.body)?;

        // The catalog's own `version` counter is a second rollback guard
        // independent of the minisign trusted-comment timestamp.
        if list.version < min_signed_time {
            return Err(DiscoveryError::Rollback(expected_filename.to_string()));
        }

        list.fetched_at = (self.now_fn)();
        Ok(list)
    }

    pub fn server_by_url(&self, url: &str, kind: ServerKind) -> Result<ServerListEntry> {
        self.servers
            .read()
            .unwrap()
            .list
            .list
            .iter()
            .find(|s| s.server_type == kind && s.base_url.as_deref() == Some(url))
            .cloned()
            .ok_or_else(|| DiscoveryError::ServerNotFound(url.to_string()))
    }

    pub fn server_by_country_code(&self, cc: &str) -> Result<ServerListEntry> {
        self.servers
            .read()
            .unwrap()
            .list
            .list
            .iter()
            .find(|s| s.server_type == ServerKind::SecureInternet && s.country_code.as_deref() == Some(cc))
            .cloned()
            .ok_or_else(|| DiscoveryError::ServerNotFound(cc.to_string()))
    }

    pub fn org_by_id(&self, id: &str) -> Result<OrganizationListEntry> {
        self.organizations
            .read()
            .unwrap()
            .list
            .list
            .iter()
            .find(|o| o.org_id == id)
            .cloned()
            .ok_or_else(|| DiscoveryError::OrganizationNotFound(id.to_string()))
    }

    pub fn secure_location_list(&self) -> Vec<String> {
        self.servers
            .read()
            .unwrap()
            .list
            .list
            .iter()
            .filter(|s| s.server_type == ServerKind::SecureInternet)
            .filter_map(|s| s.country_code.clone())
            .collect()
    }
}

fn default_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
