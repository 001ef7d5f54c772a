//! Client-side notification engine for Linguify: a durable local store of
//! notifications with eviction and quota policy, a maintenance/ranking
//! layer, and a push subscription manager that keeps the server in sync.

pub mod api;
pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod push;
pub mod storage;
pub mod store;

pub use lifecycle::LifecycleManager;
pub use models::{
    Notification, NotificationAction, NotificationKind, NotificationPatch,
    NotificationPriority, PushSubscriptionData,
};
pub use push::{PermissionStatus, PushSubscriptionManager};
pub use store::NotificationStore;
