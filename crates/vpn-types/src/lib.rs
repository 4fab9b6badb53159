//! Shared data model for the eduvpn-rs client core.
//!
//! Kept dependency-free of the other crates so every leaf crate (`vpn-http`,
//! `vpn-crypto`, `vpn-oauth`, `vpn-discovery`, `vpn-server`) can depend on it
//! without a cycle, mirroring how the teacher workspace centralizes shared
//! shapes in `vpn-types`.

pub mod expiry;
pub mod payload;
pub mod profile;
pub mod state;
pub mod token;

pub use expiry::{ExpiryInfo, ExpiryTimes};
pub use payload::{LocationsAsk, OAuthUrl, ProfilesAsk, ServerInfo, TransitionPayload};
pub use profile::{Profile, ProfileSet, VpnProtocol};
pub use state::{edges, ClientState, StateEdge};
pub use token::OAuthTokenSet;
