//! In-process state store with a monotonic-clock TTL.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::constants::{DEFAULT_STATE_TTL, SWEEP_INTERVAL};
use crate::error::StoreError;
use crate::provider::BoxFuture;
use crate::timestamp::UnixTimestamp;

use super::{PaymentState, StateStore};

struct Entry {
    state: PaymentState,
    stored_at: Instant,
}

struct Inner {
    /// Primary storage: session key → state.
    entries: HashMap<String, Entry>,
    /// Secondary index: payment id → session key.
    payment_index: HashMap<String, String>,
    last_sweep: Instant,
}

/// In-process [`StateStore`] backed by a hash map and a sibling payment-id
/// index, both guarded by one mutex.
///
/// Expiry is keyed off a monotonic clock: entries are lazily dropped when
/// accessed past the TTL, and a full sweep runs opportunistically during
/// normal operations, at most once per sweep interval. There is no
/// background task.
///
/// Suitable for single-process deployments; state does not survive a
/// restart. Use the Redis-backed store for anything distributed.
pub struct InMemoryStore {
    ttl: Duration,
    sweep_interval: Duration,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a store with the default 30-minute TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_STATE_TTL)
    }

    /// Creates a store with a custom TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            sweep_interval: SWEEP_INTERVAL,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                payment_index: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Overrides the opportunistic sweep interval.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweep_if_due(&self, inner: &mut Inner) {
        if inner.last_sweep.elapsed() < self.sweep_interval {
            return;
        }
        inner.last_sweep = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.stored_at.elapsed() > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            Self::remove_with_index(inner, &key);
        }
        if count > 0 {
            tracing::info!(count, "swept expired payment state entries");
        }
    }

    /// Removes an entry and its index in one step, so the primary map and
    /// index never disagree.
    fn remove_with_index(inner: &mut Inner, key: &str) {
        if let Some(entry) = inner.entries.remove(key) {
            inner.payment_index.remove(&entry.state.payment_id);
            tracing::debug!(key, "deleted payment state");
        }
    }

    fn get_locked(&self, inner: &mut Inner, key: &str) -> Option<PaymentState> {
        let entry = inner.entries.get(key)?;
        if entry.stored_at.elapsed() > self.ttl {
            tracing::debug!(key, "payment state expired");
            Self::remove_with_index(inner, key);
            return None;
        }
        Some(entry.state.clone())
    }
}

impl StateStore for InMemoryStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        mut state: PaymentState,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        self.sweep_if_due(inner);

        state.timestamp = UnixTimestamp::now();

        // An overwrite may carry a new payment id; drop the stale index
        // entry in the same critical section.
        if let Some(previous) = inner.entries.get(key) {
            let old_payment_id = previous.state.payment_id.clone();
            if old_payment_id != state.payment_id {
                inner.payment_index.remove(&old_payment_id);
            }
        }
        inner
            .payment_index
            .insert(state.payment_id.clone(), key.to_owned());
        tracing::debug!(key, payment_id = %state.payment_id, "stored payment state");
        inner.entries.insert(
            key.to_owned(),
            Entry {
                state,
                stored_at: Instant::now(),
            },
        );
        drop(guard);
        Box::pin(std::future::ready(Ok(())))
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<PaymentState>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        self.sweep_if_due(inner);
        let state = self.get_locked(inner, key);
        drop(guard);
        Box::pin(std::future::ready(state))
    }

    fn get_by_payment_id<'a>(
        &'a self,
        payment_id: &'a str,
    ) -> BoxFuture<'a, Option<PaymentState>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let key = inner.payment_index.get(payment_id).cloned();
        let state = key.and_then(|key| self.get_locked(inner, &key));
        drop(guard);
        Box::pin(std::future::ready(state))
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        let mut guard = self.lock();
        Self::remove_with_index(&mut guard, key);
        drop(guard);
        Box::pin(std::future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PaymentStatus;

    fn state(session: &str, payment_id: &str) -> PaymentState {
        PaymentState::new(
            Some(session.to_owned()),
            payment_id,
            "https://pay.example/p/1",
            "gen",
            crate::tool::ToolArgs::new(),
            PaymentStatus::Requested,
        )
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = InMemoryStore::new();
        store.put("s1", state("s1", "pid1")).await.unwrap();

        let loaded = store.get("s1").await.unwrap();
        assert_eq!(loaded.payment_id, "pid1");
        assert_eq!(loaded.session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_index_consistency() {
        let store = InMemoryStore::new();
        store.put("s1", state("s1", "pid1")).await.unwrap();

        let by_pid = store.get_by_payment_id("pid1").await.unwrap();
        let by_key = store.get("s1").await.unwrap();
        assert_eq!(by_pid, by_key);

        store.delete("s1").await.unwrap();
        assert!(store.get("s1").await.is_none());
        assert!(store.get_by_payment_id("pid1").await.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_reindexes() {
        let store = InMemoryStore::new();
        store.put("s1", state("s1", "pid1")).await.unwrap();
        store.put("s1", state("s1", "pid2")).await.unwrap();

        // Old index entry is gone, new one resolves.
        assert!(store.get_by_payment_id("pid1").await.is_none());
        assert_eq!(
            store.get_by_payment_id("pid2").await.unwrap().payment_id,
            "pid2"
        );
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_lazy_and_total() {
        let store = InMemoryStore::with_ttl(Duration::from_millis(20));
        store.put("s1", state("s1", "pid1")).await.unwrap();

        std::thread::sleep(Duration::from_millis(40));

        assert!(store.get("s1").await.is_none());
        assert!(store.get_by_payment_id("pid1").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_noop_when_absent() {
        let store = InMemoryStore::new();
        store.delete("nope").await.unwrap();
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_evicts_expired_entries() {
        let store = InMemoryStore::with_ttl(Duration::from_millis(10))
            .with_sweep_interval(Duration::from_millis(10));
        store.put("s1", state("s1", "pid1")).await.unwrap();
        store.put("s2", state("s2", "pid2")).await.unwrap();

        std::thread::sleep(Duration::from_millis(30));

        // Any access past the sweep interval triggers the sweep; s2 is
        // removed even though only s1 is touched.
        assert!(store.get("s1").await.is_none());
        let inner = store.lock();
        assert!(inner.entries.is_empty());
        assert!(inner.payment_index.is_empty());
    }

    #[tokio::test]
    async fn test_put_refreshes_ttl_anchor() {
        let store = InMemoryStore::new();
        let mut s = state("s1", "pid1");
        s.timestamp = UnixTimestamp::from_secs(0);
        store.put("s1", s).await.unwrap();

        let loaded = store.get("s1").await.unwrap();
        assert!(loaded.timestamp.as_secs() > 0);
    }
}
