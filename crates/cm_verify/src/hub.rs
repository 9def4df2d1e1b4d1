//! Verification cache + pending-watch registry.
//!
//! State machine
//! -------------
//!   record_event(e)      cache[e.hash] = record; every watch on e.hash → Verified
//!   watch_for_hash(..)   cache hit → Verified now; else Pending + timer
//!   timer fires          Pending → TimedOut (removed)
//!   WatchHandle::cancel  Pending → removed, callback never runs
//!
//! Each watch resolves at most once. Callbacks always run after the lock is
//! released, so they may call back into the hub.
//!
//! The cache is keyed by content hash: two messages with identical text share
//! one entry, and one event resolves every watch on that hash.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, info};

use cm_chain::MessageSentEvent;
use cm_crypto::MessageHash;

use crate::config::VerifySettings;

pub type WatchId = u64;

type Callback = Box<dyn FnOnce(VerificationOutcome) + Send + 'static>;

/// A notarization observed on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub message_hash: MessageHash,
    /// Lower-case `0x` address.
    pub sender: String,
    pub recipient: String,
    /// Contract timestamp, unix seconds.
    pub timestamp: u64,
    pub block_number: u64,
    /// Local wall clock at the time the event was recorded.
    pub verified_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn from_event(event: &MessageSentEvent, verified_at: DateTime<Utc>) -> Self {
        Self {
            message_hash: event.message_hash,
            sender: event.sender.to_string(),
            recipient: event.recipient.to_string(),
            timestamp: event.timestamp,
            block_number: event.block_number,
            verified_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified(VerificationRecord),
    TimedOut,
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

struct PendingWatch {
    message_id: String,
    expected_hash: MessageHash,
    callback: Callback,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct HubState {
    cache: HashMap<MessageHash, VerificationRecord>,
    watches: HashMap<WatchId, PendingWatch>,
    by_hash: HashMap<MessageHash, HashSet<WatchId>>,
    by_message: HashMap<String, HashSet<WatchId>>,
    next_id: WatchId,
}

impl HubState {
    fn insert_watch(&mut self, id: WatchId, watch: PendingWatch) {
        self.by_hash.entry(watch.expected_hash).or_default().insert(id);
        self.by_message
            .entry(watch.message_id.clone())
            .or_default()
            .insert(id);
        self.watches.insert(id, watch);
    }

    /// Remove a watch from the arena and both indexes. Empty index sets are dropped.
    fn remove_watch(&mut self, id: WatchId) -> Option<PendingWatch> {
        let watch = self.watches.remove(&id)?;
        if let Some(ids) = self.by_hash.get_mut(&watch.expected_hash) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_hash.remove(&watch.expected_hash);
            }
        }
        if let Some(ids) = self.by_message.get_mut(&watch.message_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_message.remove(&watch.message_id);
            }
        }
        Some(watch)
    }

    fn drain_ids(&mut self, ids: Vec<WatchId>) -> Vec<PendingWatch> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(mut w) = self.remove_watch(id) {
                if let Some(t) = w.timer.take() {
                    t.abort();
                }
                out.push(w);
            }
        }
        out
    }
}

pub struct VerificationHub {
    state: Mutex<HubState>,
    default_timeout: Duration,
}

impl Default for VerificationHub {
    fn default() -> Self {
        Self::new(&VerifySettings::default())
    }
}

impl VerificationHub {
    pub fn new(settings: &VerifySettings) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            default_timeout: settings.watch_timeout(),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Cache the event and resolve every pending watch on its hash.
    /// Returns the number of watches resolved.
    pub fn record_event(&self, event: &MessageSentEvent) -> usize {
        let record = VerificationRecord::from_event(event, Utc::now());
        let resolved = {
            let mut state = self.state.lock();
            state.cache.insert(record.message_hash, record.clone());
            let ids: Vec<WatchId> = state
                .by_hash
                .get(&record.message_hash)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default();
            state.drain_ids(ids)
        };

        info!(
            hash = %record.message_hash,
            sender = %record.sender,
            block = record.block_number,
            waiters = resolved.len(),
            "message hash notarized"
        );

        let n = resolved.len();
        for w in resolved {
            (w.callback)(VerificationOutcome::Verified(record.clone()));
        }
        n
    }

    pub fn get_verification_status(&self, hash: &MessageHash) -> Option<VerificationRecord> {
        self.state.lock().cache.get(hash).cloned()
    }

    // ── Watches ──────────────────────────────────────────────────────────────

    /// [`watch_for_hash`](Self::watch_for_hash) with the configured default timeout.
    pub fn watch<F>(self: &Arc<Self>, message_id: &str, expected_hash: MessageHash, callback: F) -> WatchHandle
    where
        F: FnOnce(VerificationOutcome) + Send + 'static,
    {
        self.watch_for_hash(message_id, expected_hash, self.default_timeout, callback)
    }

    /// Wait for `expected_hash` to be notarized, for at most `timeout`.
    ///
    /// A cached verification invokes `callback` before this returns and the
    /// handle is inert. Must be called from within a tokio runtime.
    pub fn watch_for_hash<F>(
        self: &Arc<Self>,
        message_id: &str,
        expected_hash: MessageHash,
        timeout: Duration,
        callback: F,
    ) -> WatchHandle
    where
        F: FnOnce(VerificationOutcome) + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(record) = state.cache.get(&expected_hash).cloned() {
            drop(state);
            debug!(message_id, hash = %expected_hash, "verification served from cache");
            callback(VerificationOutcome::Verified(record));
            return WatchHandle::inert();
        }

        state.next_id += 1;
        let id = state.next_id;
        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(hub) = weak.upgrade() {
                hub.expire(id);
            }
        });
        state.insert_watch(
            id,
            PendingWatch {
                message_id: message_id.to_string(),
                expected_hash,
                callback: Box::new(callback),
                timer: Some(timer),
            },
        );
        debug!(
            watch_id = id,
            message_id,
            hash = %expected_hash,
            timeout_ms = timeout.as_millis() as u64,
            "watching for notarization"
        );

        WatchHandle {
            id: Some(id),
            hub: Arc::downgrade(self),
        }
    }

    /// Future-returning form of [`watch_for_hash`](Self::watch_for_hash).
    /// Dropping the future before it resolves cancels the watch.
    pub async fn wait_for_hash(
        self: &Arc<Self>,
        message_id: &str,
        expected_hash: MessageHash,
        timeout: Duration,
    ) -> VerificationOutcome {
        let (tx, rx) = oneshot::channel();
        let handle = self.watch_for_hash(message_id, expected_hash, timeout, move |outcome| {
            let _ = tx.send(outcome);
        });
        let _guard = CancelOnDrop(handle);
        rx.await.unwrap_or(VerificationOutcome::TimedOut)
    }

    fn expire(&self, id: WatchId) {
        let watch = self.state.lock().remove_watch(id);
        if let Some(w) = watch {
            debug!(watch_id = id, message_id = %w.message_id, hash = %w.expected_hash, "watch timed out");
            (w.callback)(VerificationOutcome::TimedOut);
        }
    }

    fn cancel(&self, id: WatchId) -> bool {
        let cancelled = self.state.lock().drain_ids(vec![id]);
        !cancelled.is_empty()
    }

    /// Cancel every pending watch registered under `message_id`.
    pub fn cancel_message(&self, message_id: &str) -> usize {
        let mut state = self.state.lock();
        let ids: Vec<WatchId> = state
            .by_message
            .get(message_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        state.drain_ids(ids).len()
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// Evict cache entries recorded more than `max_age` ago. Watches are not touched.
    pub fn purge_expired(&self, max_age: Duration) -> usize {
        self.purge_expired_at(Utc::now(), max_age)
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let Some(cutoff) = now.checked_sub_signed(age) else {
            return 0;
        };
        let mut state = self.state.lock();
        let before = state.cache.len();
        state.cache.retain(|_, r| r.verified_at >= cutoff);
        before - state.cache.len()
    }

    /// Drop the cache and cancel every pending watch without invoking callbacks.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.cache.clear();
        let ids: Vec<WatchId> = state.watches.keys().copied().collect();
        let dropped = state.drain_ids(ids).len();
        debug!(dropped, "verification hub cleared");
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().watches.len()
    }

    /// Hashes still awaited for `message_id`.
    pub fn pending_for_message(&self, message_id: &str) -> Vec<MessageHash> {
        let state = self.state.lock();
        state
            .by_message
            .get(message_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.watches.get(id))
                    .map(|w| w.expected_hash)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn cached_count(&self) -> usize {
        self.state.lock().cache.len()
    }

    #[cfg(test)]
    fn insert_record(&self, record: VerificationRecord) {
        self.state.lock().cache.insert(record.message_hash, record);
    }
}

/// Cancellation handle for one watch. Dropping it leaves the watch armed; the
/// timer still bounds its lifetime.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    id: Option<WatchId>,
    hub: Weak<VerificationHub>,
}

impl WatchHandle {
    fn inert() -> Self {
        Self {
            id: None,
            hub: Weak::new(),
        }
    }

    /// `None` when the watch was answered from cache.
    pub fn id(&self) -> Option<WatchId> {
        self.id
    }

    /// Disarm the timer and forget the watch. Returns false if it had
    /// already resolved, timed out, or was never registered.
    pub fn cancel(&self) -> bool {
        match (self.id, self.hub.upgrade()) {
            (Some(id), Some(hub)) => hub.cancel(id),
            _ => false,
        }
    }
}

/// Cancels the wrapped watch when dropped; a no-op once it has resolved.
struct CancelOnDrop(WatchHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
