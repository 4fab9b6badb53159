//! FSM state enum and the static successor/back-state table (§3, §4.1).
//!
//! The table itself lives here rather than in `vpn-fsm` so that `vpn-server`
//! and `vpn-client` can reason about reachable states without depending on
//! the FSM engine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientState {
    Deregistered,
    NoServer,
    SearchServer,
    AskLocation,
    LoadingServer,
    ChosenServer,
    OAuthStarted,
    Authorized,
    RequestConfig,
    AskProfile,
    Disconnected,
    Disconnecting,
    Connecting,
    Connected,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientState::Deregistered => "Deregistered",
            ClientState::NoServer => "NoServer",
            ClientState::SearchServer => "SearchServer",
            ClientState::AskLocation => "AskLocation",
            ClientState::LoadingServer => "LoadingServer",
            ClientState::ChosenServer => "ChosenServer",
            ClientState::OAuthStarted => "OAuthStarted",
            ClientState::Authorized => "Authorized",
            ClientState::RequestConfig => "RequestConfig",
            ClientState::AskProfile => "AskProfile",
            ClientState::Disconnected => "Disconnected",
            ClientState::Disconnecting => "Disconnecting",
            ClientState::Connecting => "Connecting",
            ClientState::Connected => "Connected",
        }
    }

    /// States the embedder must be ready to reply to via a cookie.
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            ClientState::OAuthStarted | ClientState::AskProfile | ClientState::AskLocation
        )
    }
}

/// One edge of the state graph: the allowed successors and the optional
/// back-state used by `GoBack()` on transition failure.
pub struct StateEdge {
    pub successors: &'static [ClientState],
    pub back: Option<ClientState>,
}

use ClientState::*;

/// The full edge list from §4.1. Self-loops are listed explicitly where the
/// spec calls them out as idempotent re-entrant transitions.
pub fn edges(state: ClientState) -> StateEdge {
    match state {
        Deregistered => StateEdge {
            successors: &[NoServer],
            back: None,
        },
        NoServer => StateEdge {
            successors: &[SearchServer, LoadingServer, AskLocation, NoServer, Deregistered],
            back: None,
        },
        SearchServer => StateEdge {
            successors: &[LoadingServer, NoServer, AskLocation],
            back: Some(NoServer),
        },
        AskLocation => StateEdge {
            successors: &[LoadingServer, NoServer, SearchServer],
            back: Some(NoServer),
        },
        LoadingServer => StateEdge {
            successors: &[ChosenServer, AskLocation, NoServer],
            back: Some(NoServer),
        },
        ChosenServer => StateEdge {
            successors: &[Authorized, OAuthStarted, NoServer],
            back: Some(NoServer),
        },
        OAuthStarted => StateEdge {
            successors: &[Authorized, NoServer, SearchServer],
            back: Some(NoServer),
        },
        Authorized => StateEdge {
            successors: &[OAuthStarted, RequestConfig, NoServer],
            back: Some(NoServer),
        },
        RequestConfig => StateEdge {
            successors: &[AskProfile, Disconnected, NoServer, OAuthStarted],
            back: Some(ChosenServer),
        },
        AskProfile => StateEdge {
            successors: &[Disconnected, NoServer, SearchServer],
            back: Some(NoServer),
        },
        Disconnected => StateEdge {
            successors: &[Connecting, RequestConfig, NoServer, OAuthStarted, Disconnected],
            back: Some(NoServer),
        },
        Connecting => StateEdge {
            successors: &[Connected, Disconnected],
            back: Some(Disconnected),
        },
        Connected => StateEdge {
            successors: &[Disconnecting],
            back: None,
        },
        Disconnecting => StateEdge {
            successors: &[Disconnected],
            back: Some(Connected),
        },
    }
}
