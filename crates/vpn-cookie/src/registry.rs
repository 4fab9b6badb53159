//! Process-wide cookie registry (C7, §4.7).
//!
//! Cookies are integer handles mapping to a cancellation signal and a
//! single-shot reply channel. The registry is the one genuinely
//! process-global singleton in the design (§9 "the process-wide cookie
//! registry remains a singleton with documented teardown"); everything else
//! is owned by an explicit client handle.

use crate::error::{CookieError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieStatus {
    Active,
    Cancelled,
    Deleted,
}

struct Slot {
    status: CookieStatus,
    token: CancellationToken,
    reply_tx: Option<oneshot::Sender<serde_json::Value>>,
}

/// A live handle into the registry for one allocated cookie. Cheap to clone;
/// every clone observes the same underlying slot.
#[derive(Clone)]
pub struct Cookie {
    pub id: u64,
    registry: CookieRegistry,
}

impl Cookie {
    /// The cancellation token to pass into every HTTP call, OAuth wait, and
    /// failover probe this cookie guards (§4.7 "honor the cookie's
    /// cancellation").
    pub fn token(&self) -> CancellationToken {
        self.registry
            .with_slot(self.id, |slot| slot.token.clone())
            .unwrap_or_else(CancellationToken::new)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token().is_cancelled()
    }

    /// Waits for `CookieReply` to deliver a value, or returns `None` if the
    /// cookie is cancelled or deleted first.
    pub async fn wait_for_reply(&self) -> Option<serde_json::Value> {
        let (rx, token) = {
            let mut inner = self.registry.inner.lock().unwrap();
            let slot = inner.get_mut(&self.id)?;
            let (tx, rx) = oneshot::channel();
            slot.reply_tx = Some(tx);
            (rx, slot.token.clone())
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            value = rx => value.ok(),
        }
    }
}

/// The registry itself. Cheaply clonable (an `Arc` internally); a process
/// typically holds exactly one, shared by the orchestrator and every
/// in-flight operation that was handed a cookie.
#[derive(Clone)]
pub struct CookieRegistry {
    inner: std::sync::Arc<Mutex<HashMap<u64, Slot>>>,
    next_id: std::sync::Arc<AtomicU64>,
}

impl Default for CookieRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieRegistry {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(HashMap::new())),
            next_id: std::sync::Arc::new(AtomicU64::new(1)),
        }
    }

    fn with_slot<T>(&self, id: u64, f: impl FnOnce(&Slot) -> T) -> Option<T> {
        let inner = self.inner.lock().unwrap();
        inner.get(&id).map(f)
    }

    /// Allocates a new cookie. Ids are monotonically increasing and never
    /// reused, even once their slot is deleted.
    pub fn new_cookie(&self) -> Cookie {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let slot = Slot {
            status: CookieStatus::Active,
            token: CancellationToken::new(),
            reply_tx: None,
        };
        self.inner.lock().unwrap().insert(id, slot);
        Cookie {
            id,
            registry: self.clone(),
        }
    }

    pub fn status(&self, id: u64) -> Option<CookieStatus> {
        self.with_slot(id, |slot| slot.status)
    }

    /// Marks a cookie cancelled. A second call, or a call after deletion, is
    /// a documented no-op (§8 "CookieCancel then CookieCancel ... is a
    /// no-op").
    pub fn cancel(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.get_mut(&id) {
            if slot.status == CookieStatus::Active {
                slot.status = CookieStatus::Cancelled;
                slot.token.cancel();
            }
        }
    }

    /// Delivers a single reply value to whatever is waiting on this cookie.
    /// A no-op after deletion.
    pub fn reply(&self, id: u64, value: serde_json::Value) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let slot = match inner.get_mut(&id) {
            Some(slot) => slot,
            None => return Ok(()),
        };
        if slot.status == CookieStatus::Deleted {
            return Ok(());
        }
        match slot.reply_tx.take() {
            Some(tx) => {
                let _ = tx.send(value);
                Ok(())
            }
            None => Err(CookieError::AlreadyReplied(id)),
        }
    }

    /// Releases a cookie's slot. Post-delete, `cancel`/`reply` are no-ops.
    pub fn delete(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.get_mut(&id) {
            slot.status = CookieStatus::Deleted;
            slot.token.cancel();
        }
        inner.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_not_reused() {
        let reg = CookieRegistry::new();
        let a = reg.new_cookie();
        reg.delete(a.id);
        let b = reg.new_cookie();
        assert!(b.id > a.id);
    }

    #[test]
    fn cancel_is_idempotent() {
        let reg = CookieRegistry::new();
        let c = reg.new_cookie();
        reg.cancel(c.id);
        reg.cancel(c.id);
        assert_eq!(reg.status(c.id), Some(CookieStatus::Cancelled));
    }

    #[test]
    fn delete_then_cancel_is_a_no_op() {
        let reg = CookieRegistry::new();
        let c = reg.new_cookie();
        reg.delete(c.id);
        reg.cancel(c.id);
        assert_eq!(reg.status(c.id), None);
    }

    #[tokio::test]
    async fn reply_unblocks_waiter() {
        let reg = CookieRegistry::new();
        let c = reg.new_cookie();
        let waiter = tokio::spawn({
            let c = c.clone();
            async move { c.wait_for_reply().await }
        });
        tokio::task::yield_now().await;
        reg.reply(c.id, serde_json::json!("employees")).unwrap();
        let value = waiter.await.unwrap();
        assert_eq!(value, Some(serde_json::json!("employees")));
    }

    #[tokio::test]
    async fn cancel_unblocks_waiter_with_none() {
        let reg = CookieRegistry::new();
        let c = reg.new_cookie();
        let waiter = tokio::spawn({
            let c = c.clone();
            async move { c.wait_for_reply().await }
        });
        tokio::task::yield_now().await;
        reg.cancel(c.id);
        let value = waiter.await.unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn reply_after_delete_is_a_no_op() {
        let reg = CookieRegistry::new();
        let c = reg.new_cookie();
        reg.delete(c.id);
        assert!(reg.reply(c.id, serde_json::json!(1)).is_ok());
    }
}
