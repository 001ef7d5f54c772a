//! Durable notification store: single source of truth for persisted
//! notifications.
//!
//! State lives in memory as an id-keyed map with a creation-order index and
//! per-kind counters, and is persisted as one JSON array blob under
//! [`STORAGE_KEY`](crate::storage::STORAGE_KEY) after every mutation. A blob
//! that fails to parse is treated as no data, never as an error.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::metrics::{NOTIFICATIONS_ADDED, NOTIFICATIONS_EVICTED, NOTIFICATIONS_EXPIRED};
use crate::models::{Notification, NotificationKind, NotificationPatch};
use crate::storage::{StorageBackend, STORAGE_KEY};

/// Hard cap on the total number of stored notifications.
pub const MAX_STORED_NOTIFICATIONS: usize = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
    #[error("failed to serialize notification blob: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Default)]
struct StoreState {
    entries: BTreeMap<String, Notification>,
    by_created: BTreeSet<(DateTime<Utc>, String)>,
    kind_counts: HashMap<NotificationKind, usize>,
    unread: usize,
}

impl StoreState {
    fn insert(&mut self, n: Notification) {
        self.remove(&n.id);
        self.by_created.insert((n.created_at, n.id.clone()));
        *self.kind_counts.entry(n.kind).or_insert(0) += 1;
        if !n.is_read {
            self.unread += 1;
        }
        self.entries.insert(n.id.clone(), n);
    }

    fn remove(&mut self, id: &str) -> Option<Notification> {
        let n = self.entries.remove(id)?;
        self.by_created.remove(&(n.created_at, n.id.clone()));
        if let Some(count) = self.kind_counts.get_mut(&n.kind) {
            *count -= 1;
            if *count == 0 {
                self.kind_counts.remove(&n.kind);
            }
        }
        if !n.is_read {
            self.unread -= 1;
        }
        Some(n)
    }

    fn iter_desc(&self) -> impl Iterator<Item = &Notification> {
        self.by_created
            .iter()
            .rev()
            .filter_map(|(_, id)| self.entries.get(id))
    }

    /// Ids to evict to make room for `overflow` new entries: oldest read
    /// notifications first, spilling into oldest unread only when the read
    /// ones cannot cover the overflow.
    fn eviction_candidates(&self, overflow: usize) -> Vec<String> {
        let mut victims = Vec::with_capacity(overflow);
        for read_pass in [true, false] {
            for (_, id) in &self.by_created {
                if victims.len() == overflow {
                    return victims;
                }
                if let Some(n) = self.entries.get(id) {
                    if n.is_read == read_pass {
                        victims.push(id.clone());
                    }
                }
            }
        }
        victims
    }
}

pub struct NotificationStore<B> {
    storage: B,
    state: RwLock<StoreState>,
}

impl<B: StorageBackend> NotificationStore<B> {
    /// Opens the store, loading whatever the backend currently holds.
    /// Never fails: a missing, unreadable or corrupt blob yields an empty
    /// collection.
    pub async fn open(storage: B) -> Self {
        let state = match storage.load(STORAGE_KEY).await {
            Ok(Some(blob)) => parse_blob(&blob),
            Ok(None) => StoreState::default(),
            Err(e) => {
                warn!("failed to load notification blob, starting empty: {e}");
                StoreState::default()
            }
        };
        Self {
            storage,
            state: RwLock::new(state),
        }
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let list: Vec<&Notification> = state.iter_desc().collect();
        let blob = serde_json::to_string(&list)?;
        self.storage.store(STORAGE_KEY, &blob).await?;
        Ok(())
    }

    /// Current collection, descending by creation time. Fresh snapshot on
    /// every call.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.iter_desc().cloned().collect()
    }

    pub async fn unread_count(&self) -> usize {
        self.state.read().await.unread
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stored notification counts per kind.
    pub async fn kind_counts(&self) -> HashMap<NotificationKind, usize> {
        self.state.read().await.kind_counts.clone()
    }

    /// Upsert by id. A fresh insert that would push the collection past
    /// [`MAX_STORED_NOTIFICATIONS`] evicts oldest read entries first, then
    /// oldest unread.
    pub async fn add(&self, n: Notification) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let fresh = !state.entries.contains_key(&n.id);
        if fresh && state.entries.len() >= MAX_STORED_NOTIFICATIONS {
            let overflow = state.entries.len() + 1 - MAX_STORED_NOTIFICATIONS;
            for id in state.eviction_candidates(overflow) {
                debug!(id = %id, "evicting notification to stay under the global cap");
                state.remove(&id);
                NOTIFICATIONS_EVICTED.inc();
            }
        }
        state.insert(n);
        NOTIFICATIONS_ADDED.inc();
        self.persist(&state).await
    }

    /// Merge `patch` into the stored notification. Returns `Ok(false)`
    /// without persisting when the id is absent.
    pub async fn update(&self, id: &str, patch: NotificationPatch) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(existing) = state.entries.get(id) else {
            return Ok(false);
        };
        let mut updated = existing.clone();
        if let Some(is_read) = patch.is_read {
            updated.is_read = is_read;
        }
        if let Some(expires_at) = patch.expires_at {
            updated.expires_at = Some(expires_at);
        }
        if let Some(data) = patch.data {
            updated.data = data;
        }
        state.insert(updated);
        self.persist(&state).await?;
        Ok(true)
    }

    /// Idempotent; `Ok(false)` when the id is absent.
    pub async fn mark_as_read(&self, id: &str) -> Result<bool, StoreError> {
        self.update(
            id,
            NotificationPatch {
                is_read: Some(true),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_all_as_read(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for n in state.entries.values_mut() {
            n.is_read = true;
        }
        state.unread = 0;
        self.persist(&state).await
    }

    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state.remove(id).is_none() {
            return Ok(false);
        }
        self.persist(&state).await?;
        Ok(true)
    }

    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        *state = StoreState::default();
        self.persist(&state).await
    }

    /// Drops entries whose expiry has passed. Persists only when something
    /// was dropped; returns the number removed.
    pub async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|n| n.expires_at.is_some_and(|e| e <= now))
            .map(|n| n.id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        for id in &expired {
            state.remove(id);
        }
        NOTIFICATIONS_EXPIRED.inc_by(expired.len() as f64);
        self.persist(&state).await?;
        Ok(expired.len())
    }

    /// Replaces the whole collection in one write. Maintenance commit path.
    pub async fn replace_all(&self, items: Vec<Notification>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        *state = StoreState::default();
        for n in items {
            state.insert(n);
        }
        self.persist(&state).await
    }
}

fn parse_blob(blob: &str) -> StoreState {
    let mut state = StoreState::default();
    let values: Vec<serde_json::Value> = match serde_json::from_str(blob) {
        Ok(values) => values,
        Err(e) => {
            warn!("corrupt notification blob, treating as empty: {e}");
            return state;
        }
    };
    for value in values {
        match serde_json::from_value::<Notification>(value) {
            Ok(n) => state.insert(n),
            Err(e) => debug!("skipping malformed stored notification: {e}"),
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationKind, NotificationPriority};
    use crate::storage::{MemoryStorage, StorageError};
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample(id: &str, age_secs: i64, is_read: bool) -> Notification {
        let mut n = Notification::new(
            NotificationKind::Flashcard,
            NotificationPriority::Medium,
            format!("title {id}"),
            format!("message {id}"),
        );
        n.id = id.to_string();
        n.created_at = Utc::now() - Duration::seconds(age_secs);
        n.is_read = is_read;
        n
    }

    /// Storage wrapper that counts writes, for persist-once assertions.
    #[derive(Clone)]
    struct CountingBackend {
        inner: MemoryStorage,
        writes: Arc<AtomicUsize>,
    }

    impl CountingBackend {
        fn new() -> Self {
            Self {
                inner: MemoryStorage::new(),
                writes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl StorageBackend for CountingBackend {
        async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.load(key).await
        }

        async fn store(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.store(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_notifications_sorted_desc() {
        let store = NotificationStore::open(MemoryStorage::new()).await;
        store.add(sample("b", 20, false)).await.unwrap();
        store.add(sample("c", 5, false)).await.unwrap();
        store.add(sample("a", 90, false)).await.unwrap();

        let ids: Vec<String> = store
            .notifications()
            .await
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let store = NotificationStore::open(MemoryStorage::new()).await;
        store.add(sample("a", 10, false)).await.unwrap();

        let mut replacement = sample("a", 10, true);
        replacement.title = "updated".to_string();
        store.add(replacement).await.unwrap();

        let all = store.notifications().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "updated");
        assert_eq!(store.unread_count().await, 0);
    }

    #[tokio::test]
    async fn test_unread_count() {
        let store = NotificationStore::open(MemoryStorage::new()).await;
        store.add(sample("a", 30, false)).await.unwrap();
        store.add(sample("b", 20, true)).await.unwrap();
        store.add(sample("c", 10, false)).await.unwrap();
        assert_eq!(store.unread_count().await, 2);
    }

    #[tokio::test]
    async fn test_mark_as_read_idempotent() {
        let store = NotificationStore::open(MemoryStorage::new()).await;
        store.add(sample("a", 10, false)).await.unwrap();

        assert!(store.mark_as_read("a").await.unwrap());
        let first = store.notifications().await;
        assert!(store.mark_as_read("a").await.unwrap());
        let second = store.notifications().await;

        assert_eq!(first, second);
        assert_eq!(store.unread_count().await, 0);
    }

    #[tokio::test]
    async fn test_mark_all_as_read() {
        let store = NotificationStore::open(MemoryStorage::new()).await;
        for i in 0..4 {
            store.add(sample(&format!("n{i}"), i, false)).await.unwrap();
        }
        store.mark_all_as_read().await.unwrap();
        assert_eq!(store.unread_count().await, 0);
        assert!(store.notifications().await.iter().all(|n| n.is_read));
    }

    #[tokio::test]
    async fn test_update_absent_is_noop() {
        let backend = CountingBackend::new();
        let store = NotificationStore::open(backend.clone()).await;
        store.add(sample("a", 10, false)).await.unwrap();
        let writes_before = backend.writes();

        let updated = store
            .update("missing", NotificationPatch::default())
            .await
            .unwrap();
        assert!(!updated);
        assert_eq!(backend.writes(), writes_before);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = NotificationStore::open(MemoryStorage::new()).await;
        store.add(sample("a", 10, false)).await.unwrap();
        store.add(sample("b", 5, false)).await.unwrap();

        assert!(store.remove("a").await.unwrap());
        assert!(!store.remove("a").await.unwrap());
        assert_eq!(store.len().await, 1);

        store.clear_all().await.unwrap();
        assert!(store.is_empty().await);
        assert_eq!(store.unread_count().await, 0);
    }

    #[tokio::test]
    async fn test_global_cap_evicts_oldest_unread_when_no_reads() {
        let store = NotificationStore::open(MemoryStorage::new()).await;
        for i in 0..51 {
            // n0 is the oldest
            store
                .add(sample(&format!("n{i}"), 1000 - i, false))
                .await
                .unwrap();
        }
        let all = store.notifications().await;
        assert_eq!(all.len(), 50);
        assert!(!all.iter().any(|n| n.id == "n0"));
        assert!(all.iter().any(|n| n.id == "n1"));
    }

    #[tokio::test]
    async fn test_global_cap_prefers_oldest_read() {
        let store = NotificationStore::open(MemoryStorage::new()).await;
        for i in 0..50 {
            store
                .add(sample(&format!("n{i}"), 1000 - i, false))
                .await
                .unwrap();
        }
        // n7 is read, so it goes before any unread entry, even older ones.
        store.mark_as_read("n7").await.unwrap();
        store.add(sample("n50", 0, false)).await.unwrap();

        let all = store.notifications().await;
        assert_eq!(all.len(), 50);
        assert!(!all.iter().any(|n| n.id == "n7"));
        assert!(all.iter().any(|n| n.id == "n0"));
        assert!(all.iter().any(|n| n.id == "n50"));
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let backend = CountingBackend::new();
        let store = NotificationStore::open(backend.clone()).await;

        let mut gone = sample("gone", 100, false);
        gone.expires_at = Some(Utc::now() - Duration::minutes(1));
        let mut alive = sample("alive", 50, false);
        alive.expires_at = Some(Utc::now() + Duration::hours(1));
        store.add(gone).await.unwrap();
        store.add(alive).await.unwrap();
        store.add(sample("no-expiry", 10, false)).await.unwrap();

        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 2);

        // Nothing expired now, so no write happens.
        let writes_before = backend.writes();
        assert_eq!(store.cleanup_expired().await.unwrap(), 0);
        assert_eq!(backend.writes(), writes_before);
    }

    #[tokio::test]
    async fn test_round_trip_through_storage() {
        let storage = MemoryStorage::new();
        let store = NotificationStore::open(storage.clone()).await;
        for i in 0..5 {
            let mut n = sample(&format!("n{i}"), 100 - i, i % 2 == 0);
            n.data = serde_json::json!({"route": format!("/lesson/{i}")});
            store.add(n).await.unwrap();
        }
        let original = store.notifications().await;

        let reopened = NotificationStore::open(storage).await;
        let reloaded = reopened.notifications().await;
        assert_eq!(reloaded, original);
        assert_eq!(reopened.unread_count().await, store.unread_count().await);
    }

    #[tokio::test]
    async fn test_corrupt_blob_treated_as_empty() {
        let storage = MemoryStorage::new();
        storage.store(STORAGE_KEY, "{definitely not json").await.unwrap();

        let store = NotificationStore::open(storage).await;
        assert!(store.notifications().await.is_empty());

        // The store stays usable after discarding the corrupt blob.
        store.add(sample("a", 1, false)).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_entries_filtered_individually() {
        let storage = MemoryStorage::new();
        let good = sample("good", 10, false);
        let blob = serde_json::to_string(&vec![
            serde_json::to_value(&good).unwrap(),
            serde_json::json!({"id": "missing-everything-else"}),
        ])
        .unwrap();
        storage.store(STORAGE_KEY, &blob).await.unwrap();

        let store = NotificationStore::open(storage).await;
        let all = store.notifications().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "good");
    }
}
