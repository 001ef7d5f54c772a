//! Maintenance and ranking policy for the notification store.
//!
//! The policy functions are pure transforms over in-memory lists; only
//! [`LifecycleManager::run_maintenance`] persists, and it writes at most
//! once per pass.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::metrics::MAINTENANCE_RUNS;
use crate::models::{Notification, NotificationKind};
use crate::storage::StorageBackend;
use crate::store::{NotificationStore, StoreError};

/// Read notifications older than this many days are auto-dismissed.
pub const DEFAULT_MAX_READ_AGE_DAYS: i64 = 30;

/// Default cadence of the background maintenance task.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Fills in the default expiry from the priority table when the producer
/// did not set one. Pure; existing expiries pass through untouched.
pub fn process_new(mut n: Notification) -> Notification {
    if n.expires_at.is_none() {
        n.expires_at = Some(n.created_at + n.priority.default_ttl());
    }
    n
}

fn drop_expired(list: Vec<Notification>, now: DateTime<Utc>) -> Vec<Notification> {
    list.into_iter()
        .filter(|n| n.expires_at.map_or(true, |e| e > now))
        .collect()
}

/// Enforces the per-kind storage ceilings. For each kind over its maximum,
/// the overflow is removed from the oldest read entries first, then from the
/// oldest unread ones. Kinds are handled independently; the global cap is
/// the store's concern on insert.
pub fn enforce_kind_limits(list: Vec<Notification>) -> Vec<Notification> {
    let kinds: HashSet<NotificationKind> = list.iter().map(|n| n.kind).collect();
    let mut victims: HashSet<String> = HashSet::new();

    for kind in kinds {
        let mut of_kind: Vec<&Notification> = list.iter().filter(|n| n.kind == kind).collect();
        let max = kind.max_stored();
        if of_kind.len() <= max {
            continue;
        }
        let overflow = of_kind.len() - max;
        of_kind.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let read_count = of_kind.iter().filter(|n| n.is_read).count();
        let from_read = overflow.min(read_count);
        victims.extend(
            of_kind
                .iter()
                .filter(|n| n.is_read)
                .take(from_read)
                .map(|n| n.id.clone()),
        );
        victims.extend(
            of_kind
                .iter()
                .filter(|n| !n.is_read)
                .take(overflow - from_read)
                .map(|n| n.id.clone()),
        );
    }

    list.into_iter()
        .filter(|n| !victims.contains(&n.id))
        .collect()
}

/// Removes read notifications older than `max_age_days`. Unread entries are
/// never auto-dismissed, regardless of age.
pub fn auto_dismiss_read(
    list: Vec<Notification>,
    max_age_days: i64,
    now: DateTime<Utc>,
) -> Vec<Notification> {
    let horizon = chrono::Duration::days(max_age_days);
    list.into_iter()
        .filter(|n| !(n.is_read && now - n.created_at > horizon))
        .collect()
}

/// Display-ranking score: priority weight (1..3) + 2 when unread + a linear
/// recency bonus decaying from 3 to 0 over seven days.
pub fn relevance_score(n: &Notification, now: DateTime<Utc>) -> f64 {
    let unread_bonus = if n.is_read { 0.0 } else { 2.0 };
    let age_days = (now - n.created_at).num_milliseconds() as f64 / 86_400_000.0;
    let recency = (3.0 * (1.0 - age_days / 7.0)).max(0.0);
    n.priority.weight() + unread_bonus + recency
}

/// Stable descending sort by relevance score; ties go to the most recently
/// created notification.
pub fn sort_by_relevance(mut list: Vec<Notification>, now: DateTime<Utc>) -> Vec<Notification> {
    list.sort_by(|a, b| {
        relevance_score(b, now)
            .total_cmp(&relevance_score(a, now))
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    list
}

/// Policy layer keeping the store bounded. Runs on demand and on a fixed
/// interval for the lifetime of the process.
pub struct LifecycleManager<B> {
    store: Arc<NotificationStore<B>>,
    interval: Duration,
    max_read_age_days: i64,
}

impl<B: StorageBackend + Send + Sync + 'static> LifecycleManager<B> {
    pub fn new(store: Arc<NotificationStore<B>>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            max_read_age_days: DEFAULT_MAX_READ_AGE_DAYS,
        }
    }

    /// Producer entry point: assign the default expiry and persist.
    pub async fn ingest(&self, n: Notification) -> Result<(), StoreError> {
        self.store.add(process_new(n)).await
    }

    /// Runs expiry cleanup, per-kind quota enforcement and auto-dismiss in
    /// that order, committing to the store only when the pass removed
    /// something. Returns the number of notifications removed.
    pub async fn run_maintenance(&self) -> Result<usize, StoreError> {
        MAINTENANCE_RUNS.inc();
        let now = Utc::now();
        let before = self.store.notifications().await;
        let initial = before.len();

        let mut list = drop_expired(before, now);
        let over_quota = self
            .store
            .kind_counts()
            .await
            .iter()
            .any(|(kind, &count)| count > kind.max_stored());
        if over_quota {
            list = enforce_kind_limits(list);
        }
        list = auto_dismiss_read(list, self.max_read_age_days, now);

        let removed = initial - list.len();
        if removed > 0 {
            self.store.replace_all(list).await?;
            info!(removed, "maintenance pass pruned notifications");
        }
        Ok(removed)
    }

    /// Spawns the periodic maintenance loop. Started once at process init
    /// and runs for the lifetime of the process.
    pub fn spawn_maintenance_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.interval);
            loop {
                interval.tick().await;
                if let Err(e) = manager.run_maintenance().await {
                    error!("error during notification maintenance: {e}");
                }
            }
        })
    }
}
