//! Server/endpoint state model: institute access, secure-internet, and
//! custom servers, `.well-known` discovery, and authorized `/info` /
//! `/connect` calls (C6, §4.6).

pub mod api;
pub mod connect_format;
pub mod endpoints;
pub mod error;
pub mod server;

pub use api::{authorized_get, connect, fetch_info, ConnectResult};
pub use endpoints::{discover_endpoints, Endpoints};
pub use error::{Result, ServerError};
pub use server::{Server, ServerBase, ServerVariant};
