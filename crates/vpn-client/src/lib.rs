//! The orchestrator crate (C9, §4.9): the only crate an embedder links
//! against directly. Composes the FSM (`vpn-fsm`), the cookie registry
//! (`vpn-cookie`), the signed catalog (`vpn-discovery`), the OAuth client
//! (`vpn-oauth`), the server model (`vpn-server`) and the failover probe
//! (`vpn-failover`) into the embedder-facing operations described in §6.

pub mod client;
pub mod config;
pub mod error;
pub mod persist;

pub use client::{Client, DiscoOutcome};
pub use config::{ClientConfig, DiscoveryUrls, HttpOverrides, RedirectTable, TrustedKey, LETS_CONNECT_CLIENT_ID};
pub use error::{ClientError, ClientErrorKind, Result};
pub use persist::{migrate_v1_to_v2, PersistedServerV1, PersistedServerV2, PersistedStateV1, PersistedStateV2};

/// Installs a default `tracing-subscriber` pipeline (env-filtered, falling
/// back to `info`). Embedders that already run their own subscriber should
/// not call this; every crate below only ever emits through `tracing`'s
/// facade, never to stdout/stderr directly (§10.1).
///
/// Safe to call more than once: a second global subscriber install is
/// rejected by `tracing` and ignored here.
pub fn init_tracing_subscriber() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
