//! The state machine itself (C1, §4.1).

use crate::error::{FsmError, Result};
use std::sync::{Arc, Mutex};
use vpn_types::{edges, ClientState, TransitionPayload};

/// Invoked synchronously, before the transition call returns to the caller
/// (§4.1 "Callback semantics"). Returns `true` when the embedder consumed
/// the payload and will reply via cookie for interactive states.
pub trait TransitionCallback: Send + Sync {
    fn on_transition(&self, old: ClientState, new: ClientState, payload: &TransitionPayload) -> bool;
}

/// Optional debug export of the state graph as it is walked (§4.1 "Debug mode").
pub trait DebugSink: Send + Sync {
    fn on_transition(&self, mermaid_fragment: &str);
}

impl<F> TransitionCallback for F
where
    F: Fn(ClientState, ClientState, &TransitionPayload) -> bool + Send + Sync,
{
    fn on_transition(&self, old: ClientState, new: ClientState, payload: &TransitionPayload) -> bool {
        self(old, new, payload)
    }
}

pub struct StateMachine {
    current: Mutex<ClientState>,
    callback: Arc<dyn TransitionCallback>,
    debug_sink: Option<Arc<dyn DebugSink>>,
}

impl StateMachine {
    pub fn new(callback: Arc<dyn TransitionCallback>) -> Self {
        Self {
            current: Mutex::new(ClientState::Deregistered),
            callback,
            debug_sink: None,
        }
    }

    pub fn with_debug_sink(mut self, sink: Arc<dyn DebugSink>) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    pub fn current(&self) -> ClientState {
        *self.current.lock().unwrap()
    }

    pub fn in_state(&self, state: ClientState) -> bool {
        self.current() == state
    }

    pub fn has_transition(&self, target: ClientState) -> bool {
        edges(self.current()).successors.contains(&target)
    }

    pub fn go_transition(&self, target: ClientState) -> Result<bool> {
        self.go_transition_with(target, TransitionPayload::None)
    }

    /// Performs a transition, invoking the callback with `(old, new,
    /// payload)`. The mutex guarding `current` is released before the
    /// callback runs so a re-entrant call from inside the callback cannot
    /// deadlock (§5 "callbacks are invoked outside the mutex").
    pub fn go_transition_with(&self, target: ClientState, payload: TransitionPayload) -> Result<bool> {
        let old = {
            let mut current = self.current.lock().unwrap();
            if !edges(*current).successors.contains(&target) {
                return Err(FsmError::InvalidTransition(*current, target));
            }
            let old = *current;
            *current = target;
            old
        };

        tracing::info!(from = old.as_str(), to = target.as_str(), "fsm transition");
        let handled = self.callback.on_transition(old, target, &payload);

        if let Some(sink) = &self.debug_sink {
            sink.on_transition(&mermaid_fragment(old, target));
        }

        Ok(handled)
    }

    /// Restores the current state's declared back-state (§4.1 "used to
    /// recover from errors during multi-step flows"). A no-op (returns
    /// `None`) if the current state has no back-state.
    pub fn go_back(&self) -> Option<ClientState> {
        let (old, back) = {
            let current = self.current.lock().unwrap();
            (*current, edges(*current).back)
        };
        let back = back?;

        {
            let mut current = self.current.lock().unwrap();
            *current = back;
        }

        tracing::warn!(from = old.as_str(), to = back.as_str(), "fsm back-transition");
        self.callback.on_transition(old, back, &TransitionPayload::None);

        if let Some(sink) = &self.debug_sink {
            sink.on_transition(&mermaid_fragment(old, back));
        }

        Some(back)
    }
}

fn mermaid_fragment(old: ClientState, new: ClientState) -> String {
    format!("{} --> {}", old.as_str(), new.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn silent_machine() -> StateMachine {
        StateMachine::new(Arc::new(|_: ClientState, _: ClientState, _: &TransitionPayload| false))
    }

    #[test]
    fn invalid_transition_leaves_state_unchanged() {
        let fsm = silent_machine();
        let err = fsm.go_transition(ClientState::Connected).unwrap_err();
        assert_eq!(err, FsmError::InvalidTransition(ClientState::Deregistered, ClientState::Connected));
        assert_eq!(fsm.current(), ClientState::Deregistered);
    }

    #[test]
    fn valid_transition_updates_state() {
        let fsm = silent_machine();
        fsm.go_transition(ClientState::NoServer).unwrap();
        assert_eq!(fsm.current(), ClientState::NoServer);
    }

    #[test]
    fn self_loop_is_idempotent() {
        let fsm = silent_machine();
        fsm.go_transition(ClientState::NoServer).unwrap();
        fsm.go_transition(ClientState::NoServer).unwrap();
        assert_eq!(fsm.current(), ClientState::NoServer);
    }

    #[test]
    fn go_back_restores_declared_back_state() {
        let fsm = silent_machine();
        fsm.go_transition(ClientState::NoServer).unwrap();
        fsm.go_transition(ClientState::LoadingServer).unwrap();
        let restored = fsm.go_back();
        assert_eq!(restored, Some(ClientState::NoServer));
        assert_eq!(fsm.current(), ClientState::NoServer);
    }

    #[test]
    fn go_back_is_a_no_op_without_a_back_state() {
        let fsm = silent_machine();
        for target in [
            ClientState::NoServer,
            ClientState::LoadingServer,
            ClientState::ChosenServer,
            ClientState::Authorized,
            ClientState::RequestConfig,
            ClientState::Disconnected,
            ClientState::Connecting,
            ClientState::Connected,
        ] {
            fsm.go_transition(target).unwrap();
        }
        assert_eq!(fsm.go_back(), None);
        assert_eq!(fsm.current(), ClientState::Connected);
    }

    #[test]
    fn callback_receives_old_and_new_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let fsm = StateMachine::new(Arc::new(move |old: ClientState, new: ClientState, _: &TransitionPayload| {
            assert_eq!(old, ClientState::Deregistered);
            assert_eq!(new, ClientState::NoServer);
            calls_clone.fetch_add(1, Ordering::SeqCst);
            false
        }));
        fsm.go_transition(ClientState::NoServer).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_true_signals_embedder_will_reply() {
        let fsm = StateMachine::new(Arc::new(|_: ClientState, _: ClientState, _: &TransitionPayload| true));
        let handled = fsm.go_transition(ClientState::NoServer).unwrap();
        assert!(handled);
    }

    struct RecordingSink {
        fragments: Mutex<Vec<String>>,
    }

    impl DebugSink for RecordingSink {
        fn on_transition(&self, fragment: &str) {
            self.fragments.lock().unwrap().push(fragment.to_string());
        }
    }

    #[test]
    fn debug_sink_receives_mermaid_fragment() {
        let sink = Arc::new(RecordingSink { fragments: Mutex::new(vec![]) });
        let fsm = silent_machine().with_debug_sink(sink.clone());
        fsm.go_transition(ClientState::NoServer).unwrap();
        let fragments = sink.fragments.lock().unwrap();
        assert_eq!(fragments.as_slice(), &["Deregistered --> NoServer".to_string()]);
    }
}
