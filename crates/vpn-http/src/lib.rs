//! Shared HTTP client substrate (C4).

pub mod client;
pub mod error;
pub mod url;

pub use client::{build_user_agent, HttpClient, HttpResponse, RequestOptions, DEFAULT_TIMEOUT, MAX_BODY_BYTES};
pub use error::{HttpError, Result, StatusError};
