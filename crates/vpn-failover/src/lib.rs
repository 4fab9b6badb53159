//! ICMP-based stuck-tunnel detection (C8).

pub mod error;
pub mod gateway;
pub mod probe;

pub use error::{FailoverError, Result};
pub use gateway::gateway_from_cidr;
pub use probe::{run_probe, FailoverConfig, FailoverGuard, FailoverLease, FailoverOutcome, RxBytesSource};
