use thiserror::Error;
use vpn_types::ClientState;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmError {
    #[error("{0:?} has no transition to {1:?}")]
    InvalidTransition(ClientState, ClientState),

    #[error("{0:?} has no back-state")]
    NoBackState(ClientState),
}

pub type Result<T> = std::result::Result<T, FsmError>;
