//! Typed state graph mediating every interaction with the embedder (C1).

pub mod error;
pub mod machine;

pub use error::{FsmError, Result};
pub use machine::{DebugSink, StateMachine, TransitionCallback};
pub use vpn_types::{edges, ClientState, StateEdge, TransitionPayload};
