use thiserror::Error;

#[derive(Error, Debug)]
pub enum FailoverError {
    #[error("failed to open an ICMP transport channel: {0}")]
    SocketOpen(String),

    #[error("failed to send an ICMP echo request: {0}")]
    Send(String),

    #[error("a failover probe is already running")]
    AlreadyRunning,

    #[error("invalid gateway CIDR: {0}")]
    InvalidCidr(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, FailoverError>;
