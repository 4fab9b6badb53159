//! Signed discovery catalog for servers and organizations (C3, §4.3).

mod catalog;
mod discovery;
mod embedded;
mod error;

pub use catalog::{CatalogList, FetchOutcome, OrganizationListEntry, ServerKind, ServerListEntry};
pub use discovery::{Discovery, DiscoveryConfig};
pub use embedded::{embedded_organizations, embedded_servers};
pub use error::{DiscoveryError, Result};
