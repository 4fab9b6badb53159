//! The orchestrator (C9, §4.9): composes the FSM, the cookie registry,
//! discovery, OAuth, the server model, and the failover probe into the
//! embedder-facing operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use vpn_cookie::{Cookie, CookieRegistry};
use vpn_discovery::{Discovery, DiscoveryConfig, ServerKind};
use vpn_failover::{FailoverConfig, FailoverGuard, FailoverOutcome, RxBytesSource};
use vpn_fsm::{StateMachine, TransitionCallback};
use vpn_http::HttpClient;
use vpn_oauth::{OAuthClient, OAuthClientConfig, OAuthEndpoints, StartedExchange};
use vpn_server::{connect, discover_endpoints, fetch_info, ConnectResult, Endpoints, Server, ServerBase, ServerVariant};
use vpn_types::{ClientState, ExpiryInfo, LocationsAsk, OAuthUrl, ProfilesAsk, ServerInfo, TransitionPayload};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Key under which an added server is stored: its variant plus the
/// identifier the embedder addresses it by (base URL, or org id for
/// secure-internet) — §3 "Server variants".
type ServerKey = (ServerVariant, String);

struct ServerRecord {
    server: Server,
    oauth_endpoints: OAuthEndpoints,
    refresh_lock: AsyncMutex<()>,
}

/// The single handle an embedder creates via [`Client::new`] and tears down
/// via [`Client::deregister`] (§3 "Lifecycle: Client: created on register,
/// emptied on deregister; exactly one per process").
pub struct Client {
    config: ClientConfig,
    fsm: StateMachine,
    cookies: CookieRegistry,
    http: HttpClient,
    discovery: Discovery,
    oauth: OAuthClient,
    failover: FailoverGuard,
    servers: Mutex<HashMap<ServerKey, ServerRecord>>,
    current: Mutex<Option<ServerKey>>,
}

impl Client {
    pub fn new(config: ClientConfig, callback: Arc<dyn TransitionCallback>) -> Result<Self> {
        let allowed_keys = config.allowed_keys().map_err(ClientError::internal)?;
        let http = HttpClient::new(config.user_agent());
        let discovery = Discovery::new(
            http.clone(),
            DiscoveryConfig {
                server_list_url: config.discovery.server_list_url.clone(),
                organization_list_url: config.discovery.organization_list_url.clone(),
                allowed_keys,
                force_prehash: config.force_prehash,
            },
        );
        let oauth = OAuthClient::new(
            http.clone(),
            OAuthClientConfig {
                client_id: config.client_id.clone(),
                redirect_table: config.redirect_table(),
            },
        );

        Ok(Self {
            config,
            fsm: StateMachine::new(callback),
            cookies: CookieRegistry::new(),
            http,
            discovery,
            oauth,
            failover: FailoverGuard::new(),
            servers: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ClientState {
        self.fsm.current()
    }

    pub fn cookies(&self) -> &CookieRegistry {
        &self.cookies
    }

    // -- Cookie passthrough (§4.9 "CookieNew/Cancel/Reply/Delete") --------

    pub fn cookie_new(&self) -> Cookie {
        self.cookies.new_cookie()
    }

    pub fn cookie_cancel(&self, id: u64) {
        self.cookies.cancel(id);
    }

    pub fn cookie_reply(&self, id: u64, value: serde_json::Value) -> Result<()> {
        self.cookies.reply(id, value).map_err(ClientError::from)
    }

    pub fn cookie_delete(&self, id: u64) {
        self.cookies.delete(id);
    }

    // -- Registration -------------------------------------------------

    /// `Deregistered -> NoServer`. Every other public operation requires a
    /// prior call to this (§4.9 "All operations except registration require
    /// a prior Register").
    pub fn register(&self) -> Result<()> {
        self.fsm.go_transition(ClientState::NoServer).map_err(ClientError::from)?;
        Ok(())
    }

    /// `NoServer -> Deregistered`, clearing every added server (§3
    /// "Lifecycle ... emptied on deregister").
    pub fn deregister(&self) -> Result<()> {
        self.fsm.go_transition(ClientState::Deregistered).map_err(ClientError::from)?;
        self.servers.lock().unwrap().clear();
        *self.current.lock().unwrap() = None;
        Ok(())
    }

    fn require_registered(&self) -> Result<()> {
        if self.fsm.current() == ClientState::Deregistered {
            return Err(ClientError::fsm_state("operation requires a prior Register"));
        }
        Ok(())
    }

    // -- Discovery ------------------------------------------------------

    pub async fn disco_servers(&self, cookie: Option<&Cookie>) -> DiscoOutcome<vpn_discovery::ServerListEntry> {
        let outcome = self.discovery.servers(cookie).await;
        DiscoOutcome {
            list: outcome.list.list,
            version: outcome.list.version,
            error: outcome.error.map(ClientError::from),
        }
    }

    pub async fn disco_organizations(&self, cookie: Option<&Cookie>) -> DiscoOutcome<vpn_discovery::OrganizationListEntry> {
        let outcome = self.discovery.organizations(cookie).await;
        DiscoOutcome {
            list: outcome.list.list,
            version: outcome.list.version,
            error: outcome.error.map(ClientError::from),
        }
    }

    // -- Server management ----------------------------------------------

    /// `NoServer -> LoadingServer -> ChosenServer` (or `AskLocation` first,
    /// for secure-internet). §8 scenario 6: a Let's Connect! client id may
    /// only add custom servers.
    pub async fn add_server(&self, variant: ServerVariant, identifier: &str, cookie: Option<&Cookie>) -> Result<ServerInfo> {
        self.require_registered()?;

        if self.config.is_lets_connect() && variant != ServerVariant::Custom {
            return Err(ClientError::internal(
                "Adding a non-custom server when the client does not use discovery is not supported",
            ));
        }

        let location_override = if variant == ServerVariant::SecureInternet {
            self.resolve_secure_location(identifier, cookie).await?
        } else {
            None
        };

        self.fsm.go_transition(ClientState::LoadingServer).map_err(ClientError::from)?;

        match self.build_server(variant, identifier, location_override, cookie).await {
            Ok((key, server, oauth_endpoints)) => {
                let info = server_info(&server);
                self.servers.lock().unwrap().insert(
                    key.clone(),
                    ServerRecord {
                        server,
                        oauth_endpoints,
                        refresh_lock: AsyncMutex::new(()),
                    },
                );
                *self.current.lock().unwrap() = Some(key);
                self.fsm
                    .go_transition_with(ClientState::ChosenServer, TransitionPayload::ServerInfo(info.clone()))
                    .map_err(ClientError::from)?;
                Ok(info)
            }
            Err(e) => {
                self.fsm.go_back();
                Err(e)
            }
        }
    }

    /// Asks the embedder to pick a secure-internet location when more than
    /// one is known (`NoServer -> AskLocation -> LoadingServer`). Returns
    /// the chosen country code, or `None` to use the organization's home.
    async fn resolve_secure_location(&self, org_id: &str, cookie: Option<&Cookie>) -> Result<Option<String>> {
        self.discovery.organizations(cookie).await;
        let codes: Vec<String> = self
            .discovery
            .servers(cookie)
            .await
            .list
            .list
            .iter()
            .filter(|s| s.server_type == ServerKind::SecureInternet && s.organization_id.as_deref() == Some(org_id))
            .filter_map(|s| s.country_code.clone())
            .collect();

        if codes.len() <= 1 {
            return Ok(codes.into_iter().next());
        }

        let ask_cookie = self.cookies.new_cookie();
        let payload = TransitionPayload::LocationsAsk(LocationsAsk {
            cookie: ask_cookie.id,
            country_codes: codes,
        });
        let handled = self
            .fsm
            .go_transition_with(ClientState::AskLocation, payload)
            .map_err(ClientError::from)?;

        let chosen = if handled {
            match ask_cookie.wait_for_reply().await {
                Some(value) => value.as_str().map(str::to_string),
                None => None,
            }
        } else {
            None
        };
        self.cookies.delete(ask_cookie.id);

        self.fsm.go_transition(ClientState::LoadingServer).map_err(ClientError::from)?;
        Ok(chosen)
    }

    async fn build_server(
        &self,
        variant: ServerVariant,
        identifier: &str,
        location_override: Option<String>,
        cookie: Option<&Cookie>,
    ) -> Result<(ServerKey, Server, OAuthEndpoints)> {
        match variant {
            ServerVariant::Custom => {
                let endpoints = discover_endpoints(&self.http, identifier, cookie).await?;
                let oauth_endpoints = self.oauth_endpoints_for(identifier, &endpoints);
                let mut base = ServerBase::new(identifier, identifier);
                base.endpoints = Some(endpoints);
                let server = Server::Custom { base, tokens: None };
                Ok(((variant, identifier.to_string()), server, oauth_endpoints))
            }
            ServerVariant::InstituteAccess => {
                let outcome = self.discovery.servers(cookie).await;
                let entry = outcome
                    .list
                    .list
                    .iter()
                    .find(|s| s.server_type == ServerKind::InstituteAccess && s.base_url.as_deref() == Some(identifier))
                    .ok_or_else(|| ClientError::internal(format!("no institute access server known at {identifier}")))?;
                let display_name = display_name_of(&entry.display_name, identifier);

                let endpoints = discover_endpoints(&self.http, identifier, cookie).await?;
                let oauth_endpoints = self.oauth_endpoints_for(identifier, &endpoints);
                let mut base = ServerBase::new(identifier, display_name);
                base.endpoints = Some(endpoints);
                let server = Server::InstituteAccess { base, tokens: None };
                Ok(((variant, identifier.to_string()), server, oauth_endpoints))
            }
            ServerVariant::SecureInternet => {
                let org = self
                    .discovery
                    .org_by_id(identifier)
                    .map_err(ClientError::from)?;
                let home_url = org
                    .secure_internet_home
                    .ok_or_else(|| ClientError::internal(format!("organization {identifier} has no secure-internet home")))?;

                let servers = self.discovery.servers(cookie).await.list.list;
                let mut locations: HashMap<String, Endpoints> = HashMap::new();
                for entry in servers.iter().filter(|s| {
                    s.server_type == ServerKind::SecureInternet && s.organization_id.as_deref() == Some(identifier)
                }) {
                    if let Some(location_url) = &entry.base_url {
                        if let Ok(endpoints) = discover_endpoints(&self.http, location_url, cookie).await {
                            locations.insert(location_url.clone(), endpoints);
                        }
                    }
                }

                let home_endpoints = discover_endpoints(&self.http, &home_url, cookie).await?;
                locations.entry(home_url.clone()).or_insert_with(|| home_endpoints.clone());

                let selected_url = location_override
                    .as_ref()
                    .and_then(|cc| servers.iter().find(|s| s.country_code.as_deref() == Some(cc.as_str())))
                    .and_then(|entry| entry.base_url.clone())
                    .filter(|url| locations.contains_key(url))
                    .unwrap_or_else(|| home_url.clone());

                let display_name = display_name_of(&org.display_name, identifier);
                let selected_endpoints = locations.get(&selected_url).cloned().unwrap_or_else(|| home_endpoints.clone());
                let oauth_endpoints = self.oauth_endpoints_for(&home_url, &selected_endpoints);

                let mut base = ServerBase::new(selected_url.as_str(), display_name);
                base.endpoints = Some(selected_endpoints);
                let server = Server::SecureInternet {
                    base,
                    org_id: identifier.to_string(),
                    home_url,
                    locations,
                    current_location: Some(selected_url),
                    tokens: None,
                };
                Ok(((variant, identifier.to_string()), server, oauth_endpoints))
            }
        }
    }

    fn oauth_endpoints_for(&self, issuer_anchor: &str, endpoints: &Endpoints) -> OAuthEndpoints {
        OAuthEndpoints {
            authorization: endpoints.authorization_endpoint.clone(),
            token: endpoints.token_endpoint.clone(),
            issuer: issuer_anchor.to_string(),
        }
    }

    pub fn remove_server(&self, variant: ServerVariant, identifier: &str) -> Result<()> {
        self.require_registered()?;
        let key = (variant, identifier.to_string());

        let removed = self.servers.lock().unwrap().remove(&key).is_some();
        if !removed {
            return Err(ClientError::internal(format!("no such server: {identifier}")));
        }

        let mut current = self.current.lock().unwrap();
        if current.as_ref() == Some(&key) {
            *current = None;
        }
        drop(current);

        if !matches!(self.fsm.current(), ClientState::NoServer | ClientState::Deregistered) {
            self.fsm.go_transition(ClientState::NoServer).map_err(ClientError::from)?;
        }
        Ok(())
    }

    pub fn server_list(&self) -> Vec<ServerInfo> {
        self.servers.lock().unwrap().values().map(|r| server_info(&r.server)).collect()
    }

    pub fn current_server(&self) -> Option<ServerInfo> {
        let current = self.current.lock().unwrap().clone()?;
        self.servers.lock().unwrap().get(&current).map(|r| server_info(&r.server))
    }

    pub fn set_profile_id(&self, variant: ServerVariant, identifier: &str, profile_id: &str) -> Result<()> {
        let mut servers = self.servers.lock().unwrap();
        let record = servers
            .get_mut(&(variant, identifier.to_string()))
            .ok_or_else(|| ClientError::internal(format!("no such server: {identifier}")))?;
        record.server.base_mut().profiles.set_profile_id(profile_id);
        Ok(())
    }

    pub fn set_secure_location(&self, org_id: &str, location_url: &str) -> Result<()> {
        let mut servers = self.servers.lock().unwrap();
        let record = servers
            .get_mut(&(ServerVariant::SecureInternet, org_id.to_string()))
            .ok_or_else(|| ClientError::internal(format!("no secure-internet server for organization {org_id}")))?;
        if !record.server.set_secure_location(location_url) {
            return Err(ClientError::internal(format!("{location_url} is not a known location for {org_id}")));
        }
        Ok(())
    }

    // -- Config retrieval -------------------------------------------------

    /// The full "get a config" flow of §2's data-flow walkthrough:
    /// `ChosenServer -> (Authorized|OAuthStarted->Authorized) -> RequestConfig
    /// -> (AskProfile)? -> Disconnected`.
    pub async fn get_config(&self, variant: ServerVariant, identifier: &str, prefer_tcp: bool, cookie: Option<&Cookie>) -> Result<ConnectResult> {
        self.require_registered()?;
        let key = (variant, identifier.to_string());
        if self.current.lock().unwrap().as_ref() != Some(&key) {
            return Err(ClientError::fsm_state("GetConfig requires the server to be chosen via AddServer first"));
        }

        if let Err(e) = self.ensure_authorized(&key, cookie).await {
            self.fsm.go_back();
            return Err(e);
        }

        self.fsm.go_transition(ClientState::RequestConfig).map_err(ClientError::from)?;

        match self.fetch_profile_and_connect(&key, prefer_tcp, cookie).await {
            Ok(result) => {
                let info = self.current_server().unwrap_or(ServerInfo {
                    identifier: identifier.to_string(),
                    display_name: identifier.to_string(),
                    profile_id: None,
                    expires_at: Some(result.expiry.times.end),
                });
                self.fsm
                    .go_transition_with(ClientState::Disconnected, TransitionPayload::ServerInfo(info))
                    .map_err(ClientError::from)?;
                Ok(result)
            }
            Err(e) => {
                self.fsm.go_back();
                Err(e)
            }
        }
    }

    async fn ensure_authorized(&self, key: &ServerKey, cookie: Option<&Cookie>) -> Result<()> {
        let has_tokens = self
            .servers
            .lock()
            .unwrap()
            .get(key)
            .map(|r| r.server.tokens().is_some())
            .unwrap_or(false);

        if has_tokens {
            // `ChosenServer -> Authorized` is the first-time path. A repeat
            // `GetConfig` on an already-`Disconnected` server has a direct
            // edge to `RequestConfig` (§4.1) and never revisits `Authorized`;
            // only take the hop when it's actually a valid successor.
            if self.fsm.has_transition(ClientState::Authorized) {
                self.fsm.go_transition(ClientState::Authorized).map_err(ClientError::from)?;
            }
            return Ok(());
        }

        self.run_oauth(key, cookie).await
    }

    /// `ChosenServer -> OAuthStarted -> Authorized` (§4.5, §8 scenario 2
    /// "OAuth cancel").
    async fn run_oauth(&self, key: &ServerKey, cookie: Option<&Cookie>) -> Result<()> {
        let oauth_endpoints = self
            .servers
            .lock()
            .unwrap()
            .get(key)
            .map(|r| r.oauth_endpoints.clone())
            .ok_or_else(|| ClientError::internal("server disappeared mid-flow"))?;

        let started = self.oauth.start(oauth_endpoints, &self.cookies).await.map_err(ClientError::from)?;

        let tokens_result = match started {
            StartedExchange::Direct { authorization_url, pending } => {
                let payload = TransitionPayload::OAuthUrl(OAuthUrl::Direct(authorization_url));
                self.fsm.go_transition_with(ClientState::OAuthStarted, payload).map_err(ClientError::from)?;
                self.oauth.complete_loopback(pending, cookie).await
            }
            StartedExchange::NeedsCookieReply {
                authorization_url,
                cookie: reply_cookie,
                pending,
            } => {
                let payload = TransitionPayload::OAuthUrl(OAuthUrl::NeedsCookieReply {
                    cookie: reply_cookie.id,
                    authorization_url,
                });
                self.fsm.go_transition_with(ClientState::OAuthStarted, payload).map_err(ClientError::from)?;
                let result = self.oauth.complete_custom_redirect(pending, &reply_cookie).await;
                self.cookies.delete(reply_cookie.id);
                result
            }
        };

        match tokens_result {
            Ok(tokens) => {
                if let Some(record) = self.servers.lock().unwrap().get_mut(key) {
                    *record.server.tokens_mut() = Some(tokens);
                }
                self.fsm.go_transition(ClientState::Authorized).map_err(ClientError::from)?;
                Ok(())
            }
            Err(vpn_oauth::OAuthError::Cancelled) => {
                self.fsm.go_back();
                Err(ClientError::cancelled())
            }
            Err(e) => {
                self.fsm.go_back();
                Err(e.into())
            }
        }
    }

    async fn fetch_profile_and_connect(&self, key: &ServerKey, prefer_tcp: bool, cookie: Option<&Cookie>) -> Result<ConnectResult> {
        let mut record = self.take_record(key)?;
        let fetch_result = fetch_info(&self.http, &self.oauth, &record.oauth_endpoints, &record.refresh_lock, &mut record.server, cookie)
            .await
            .map_err(ClientError::from);
        self.put_record(key, record);
        fetch_result?;

        let needs_profile = self
            .servers
            .lock()
            .unwrap()
            .get(key)
            .map(|r| r.server.base().profiles.current.is_none())
            .unwrap_or(true);

        if needs_profile {
            self.ask_profile(key, cookie).await?;
        }

        let mut record = self.take_record(key)?;
        let connect_result = connect(&self.http, &self.oauth, &record.oauth_endpoints, &record.refresh_lock, &mut record.server, prefer_tcp, cookie)
            .await
            .map_err(ClientError::from);
        self.put_record(key, record);
        connect_result
    }

    /// `RequestConfig -> AskProfile -> Disconnected` for a server whose
    /// profile is ambiguous or whose previous selection no longer exists
    /// (§8 scenario 3 "Stale profile reset").
    async fn ask_profile(&self, key: &ServerKey, cookie: Option<&Cookie>) -> Result<()> {
        let profiles = self
            .servers
            .lock()
            .unwrap()
            .get(key)
            .map(|r| r.server.base().profiles.profiles.clone())
            .unwrap_or_default();

        let ask_cookie = self.cookies.new_cookie();
        let payload = TransitionPayload::ProfilesAsk(ProfilesAsk {
            cookie: ask_cookie.id,
            profiles,
            current: String::new(),
        });
        let handled = self.fsm.go_transition_with(ClientState::AskProfile, payload).map_err(ClientError::from)?;

        let chosen = if handled {
            ask_cookie.wait_for_reply().await.and_then(|v| v.as_str().map(str::to_string))
        } else {
            None
        };
        self.cookies.delete(ask_cookie.id);

        let chosen = chosen.ok_or_else(|| ClientError::fsm_state("no profile selected"))?;
        if let Some(record) = self.servers.lock().unwrap().get_mut(key) {
            record.server.base_mut().profiles.set_profile_id(chosen);
        }

        // No edge returns AskProfile -> RequestConfig; the subsequent
        // `connect()` call is issued from here and `get_config` transitions
        // straight from AskProfile to Disconnected, same as the
        // already-had-a-profile path does from RequestConfig.
        Ok(())
    }

    /// Takes a server's record out of the map so it can be mutated across
    /// an await point; a std `Mutex` guard cannot itself be held there.
    /// Paired with [`Client::put_record`]; safe because the orchestrator
    /// only ever has one in-flight operation per server.
    fn take_record(&self, key: &ServerKey) -> Result<ServerRecord> {
        self.servers
            .lock()
            .unwrap()
            .remove(key)
            .ok_or_else(|| ClientError::internal("server disappeared mid-flow"))
    }

    fn put_record(&self, key: &ServerKey, record: ServerRecord) {
        self.servers.lock().unwrap().insert(key.clone(), record);
    }

    // -- Session lifecycle -------------------------------------------------

    /// Re-requests `/connect` to extend the session window, without an FSM
    /// transition of its own — renewal happens from within `Disconnected`
    /// or `Connected` without disturbing the current state.
    pub async fn renew_session(&self, variant: ServerVariant, identifier: &str, prefer_tcp: bool, cookie: Option<&Cookie>) -> Result<ConnectResult> {
        self.require_registered()?;
        let key = (variant, identifier.to_string());
        let mut record = self.take_record(&key)?;
        let result = connect(&self.http, &self.oauth, &record.oauth_endpoints, &record.refresh_lock, &mut record.server, prefer_tcp, cookie)
            .await
            .map_err(ClientError::from);
        self.put_record(&key, record);
        result
    }

    pub fn should_renew_button(&self, variant: ServerVariant, identifier: &str, now: i64) -> Result<bool> {
        let servers = self.servers.lock().unwrap();
        let record = servers
            .get(&(variant, identifier.to_string()))
            .ok_or_else(|| ClientError::internal(format!("no such server: {identifier}")))?;
        let expiry = record
            .server
            .base()
            .expiry()
            .ok_or_else(|| ClientError::internal("server has no active session"))?;
        Ok(expiry.should_show_renew_button(now))
    }

    pub fn expiry_times(&self, variant: ServerVariant, identifier: &str) -> Result<ExpiryInfo> {
        let servers = self.servers.lock().unwrap();
        let record = servers
            .get(&(variant, identifier.to_string()))
            .ok_or_else(|| ClientError::internal(format!("no such server: {identifier}")))?;
        record.server.base().expiry().ok_or_else(|| ClientError::internal("server has no active session"))
    }

    /// Evicts every server's OAuth tokens and resets the organizations
    /// catalog's freshness so the next `DiscoOrganizations` refetches
    /// (§3 "Lifecycle", §11 "Cleanup(tokens)").
    pub fn cleanup(&self, evict_tokens: bool) {
        if evict_tokens {
            for record in self.servers.lock().unwrap().values_mut() {
                *record.server.tokens_mut() = None;
            }
        }
        self.discovery.invalidate_organizations();
    }

    // -- Failover -----------------------------------------------------

    pub async fn start_failover<R: RxBytesSource + 'static>(&self, config: FailoverConfig, rx_source: Arc<R>, cookie: Option<&Cookie>) -> Result<FailoverOutcome> {
        let lease = self.failover.try_start().map_err(ClientError::from)?;
        let outcome = vpn_failover::run_probe(config, rx_source, cookie).await;
        drop(lease);
        outcome.map_err(ClientError::from)
    }

    pub fn cancel_failover(&self, cookie: &Cookie) {
        self.cookies.cancel(cookie.id);
    }
}

fn display_name_of(map: &HashMap<String, String>, fallback: &str) -> String {
    map.get("en").or_else(|| map.values().next()).cloned().unwrap_or_else(|| fallback.to_string())
}

fn server_info(server: &Server) -> ServerInfo {
    let base = server.base();
    ServerInfo {
        identifier: server.identifier().to_string(),
        display_name: base.display_name.clone(),
        profile_id: base.profiles.current.clone(),
        expires_at: base.session_end,
    }
}

pub struct DiscoOutcome<T> {
    pub list: Vec<T>,
    pub version: u64,
    pub error: Option<ClientError>,
}
