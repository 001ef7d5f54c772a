//! Push subscription lifecycle: platform registration, permission state,
//! and server-side synchronization of the subscription record.
//!
//! Every operation degrades to a sentinel return value when the platform
//! has no push runtime; nothing here errors across the public surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::SubscriptionGateway;
use crate::metrics::PUSH_SYNC_FAILURES;
use crate::models::PushSubscriptionData;

/// Fixed path the platform worker is registered under.
pub const SERVICE_WORKER_PATH: &str = "/service-worker.js";

const SYNC_MAX_RETRIES: u32 = 3;
const SYNC_BASE_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Default,
    Unsupported,
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push notifications are not supported in this environment")]
    Unsupported,
    #[error("service worker error: {0}")]
    Worker(String),
    #[error("push subscription error: {0}")]
    Subscription(String),
}

/// The platform push runtime the manager drives: worker registration,
/// permission prompts, subscription creation and local display.
#[trait_variant::make(Send)]
pub trait PushPlatform {
    fn is_supported(&self) -> bool;
    fn permission_status(&self) -> PermissionStatus;
    async fn register_worker(&self, path: &str) -> Result<(), PushError>;
    async fn update_worker(&self) -> Result<(), PushError>;
    async fn request_permission(&self) -> PermissionStatus;
    async fn get_subscription(&self) -> Result<Option<PushSubscriptionData>, PushError>;
    async fn create_subscription(
        &self,
        vapid_public_key: &str,
    ) -> Result<PushSubscriptionData, PushError>;
    async fn remove_subscription(&self, endpoint: &str) -> Result<bool, PushError>;
    async fn show_notification(&self, title: &str, message: &str) -> Result<(), PushError>;
}

/// Platform stand-in for hosts without a push runtime. Everything degrades
/// the way an unsupported browser context would.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPlatform;

impl PushPlatform for HeadlessPlatform {
    fn is_supported(&self) -> bool {
        false
    }

    fn permission_status(&self) -> PermissionStatus {
        PermissionStatus::Unsupported
    }

    async fn register_worker(&self, _path: &str) -> Result<(), PushError> {
        Err(PushError::Unsupported)
    }

    async fn update_worker(&self) -> Result<(), PushError> {
        Err(PushError::Unsupported)
    }

    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Unsupported
    }

    async fn get_subscription(&self) -> Result<Option<PushSubscriptionData>, PushError> {
        Ok(None)
    }

    async fn create_subscription(
        &self,
        _vapid_public_key: &str,
    ) -> Result<PushSubscriptionData, PushError> {
        Err(PushError::Unsupported)
    }

    async fn remove_subscription(&self, _endpoint: &str) -> Result<bool, PushError> {
        Ok(false)
    }

    async fn show_notification(&self, _title: &str, _message: &str) -> Result<(), PushError> {
        Err(PushError::Unsupported)
    }
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub vapid_public_key: String,
    pub device_type: String,
    pub device_name: String,
}

pub struct PushSubscriptionManager<P, G> {
    platform: P,
    gateway: Arc<G>,
    config: PushConfig,
    cached: RwLock<Option<PushSubscriptionData>>,
    initialized: AtomicBool,
    sync_cancel: Mutex<Option<CancellationToken>>,
}

impl<P, G> PushSubscriptionManager<P, G>
where
    P: PushPlatform,
    G: SubscriptionGateway + Send + Sync + 'static,
{
    pub fn new(platform: P, gateway: G, config: PushConfig) -> Self {
        Self {
            platform,
            gateway: Arc::new(gateway),
            config,
            cached: RwLock::new(None),
            initialized: AtomicBool::new(false),
            sync_cancel: Mutex::new(None),
        }
    }

    pub fn is_push_supported(&self) -> bool {
        self.platform.is_supported()
    }

    /// Registers the platform worker. Must run before subscribe/unsubscribe.
    /// Returns whether registration succeeded.
    pub async fn init(&self) -> bool {
        if !self.platform.is_supported() {
            warn!("push not supported on this platform, skipping worker registration");
            return false;
        }
        match self.platform.register_worker(SERVICE_WORKER_PATH).await {
            Ok(()) => {
                info!(path = SERVICE_WORKER_PATH, "service worker registered");
                self.initialized.store(true, Ordering::SeqCst);
                true
            }
            Err(e) => {
                error!("service worker registration failed: {e}");
                false
            }
        }
    }

    pub fn permission_status(&self) -> PermissionStatus {
        if !self.platform.is_supported() {
            return PermissionStatus::Unsupported;
        }
        self.platform.permission_status()
    }

    /// Triggers the platform permission prompt and reports whether
    /// permission is granted now. The result is never cached; callers
    /// re-check via [`permission_status`](Self::permission_status).
    pub async fn request_permission(&self) -> bool {
        if !self.platform.is_supported() {
            return false;
        }
        matches!(
            self.platform.request_permission().await,
            PermissionStatus::Granted
        )
    }

    /// Current subscription: the cached slot when populated, otherwise a
    /// platform query whose result fills the slot.
    pub async fn subscription(&self) -> Option<PushSubscriptionData> {
        if !self.platform.is_supported() {
            return None;
        }
        if let Some(sub) = self.cached.read().await.clone() {
            return Some(sub);
        }
        match self.platform.get_subscription().await {
            Ok(Some(sub)) => {
                *self.cached.write().await = Some(sub.clone());
                Some(sub)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("failed to query platform subscription: {e}");
                None
            }
        }
    }

    /// Idempotent subscribe: an existing (cached or platform-reported)
    /// subscription is returned as-is without re-notifying the server. A
    /// newly created one is registered server-side; registration failure is
    /// retried in the background and never rolls back the local
    /// subscription.
    pub async fn subscribe(&self) -> Option<PushSubscriptionData> {
        if !self.platform.is_supported() {
            return None;
        }
        if !self.initialized.load(Ordering::SeqCst) {
            warn!("subscribe called before init");
            return None;
        }
        if let Some(existing) = self.subscription().await {
            debug!(endpoint = %existing.endpoint, "already subscribed");
            return Some(existing);
        }
        if self.platform.permission_status() != PermissionStatus::Granted {
            debug!("push permission not granted, not subscribing");
            return None;
        }

        let sub = match self
            .platform
            .create_subscription(&self.config.vapid_public_key)
            .await
        {
            Ok(sub) => sub,
            Err(e) => {
                error!("failed to create push subscription: {e}");
                return None;
            }
        };
        *self.cached.write().await = Some(sub.clone());
        info!(endpoint = %sub.endpoint, "created push subscription");
        self.sync_registration(sub.clone()).await;
        Some(sub)
    }

    /// First registration attempt runs inline; failures move to a bounded
    /// background retry carrying a cancellation token.
    async fn sync_registration(&self, sub: PushSubscriptionData) {
        let register = self
            .gateway
            .register(&sub, &self.config.device_type, &self.config.device_name)
            .await;
        match register {
            Ok(()) => {
                info!(endpoint = %sub.endpoint, "push subscription registered with server");
            }
            Err(e) => {
                warn!("server registration failed, retrying in background: {e}");
                PUSH_SYNC_FAILURES.inc();

                let token = CancellationToken::new();
                if let Some(previous) = self.sync_cancel.lock().await.replace(token.clone()) {
                    previous.cancel();
                }
                let gateway = Arc::clone(&self.gateway);
                let device_type = self.config.device_type.clone();
                let device_name = self.config.device_name.clone();
                tokio::spawn(async move {
                    let mut backoff = SYNC_BASE_BACKOFF;
                    for attempt in 1..=SYNC_MAX_RETRIES {
                        tokio::select! {
                            _ = token.cancelled() => {
                                debug!("registration retry cancelled");
                                return;
                            }
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        match gateway.register(&sub, &device_type, &device_name).await {
                            Ok(()) => {
                                info!(attempt, endpoint = %sub.endpoint, "push subscription registered with server");
                                return;
                            }
                            Err(e) => {
                                warn!(attempt, "server registration retry failed: {e}");
                                PUSH_SYNC_FAILURES.inc();
                            }
                        }
                        backoff *= 2;
                    }
                    error!(
                        "server registration abandoned after {SYNC_MAX_RETRIES} retries, local subscription kept"
                    );
                });
            }
        }
    }

    /// Removes the server-side record first, then the platform subscription,
    /// then clears the cache. Returns true when there is nothing to
    /// unsubscribe.
    pub async fn unsubscribe(&self) -> bool {
        if !self.platform.is_supported() {
            return true;
        }
        if let Some(pending) = self.sync_cancel.lock().await.take() {
            pending.cancel();
        }
        let Some(sub) = self.subscription().await else {
            return true;
        };

        if let Err(e) = self.gateway.remove(&sub.endpoint).await {
            warn!("failed to remove server-side subscription record: {e}");
            PUSH_SYNC_FAILURES.inc();
        }
        let result = match self.platform.remove_subscription(&sub.endpoint).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("platform unsubscribe failed: {e}");
                false
            }
        };
        *self.cached.write().await = None;
        info!(endpoint = %sub.endpoint, removed = result, "unsubscribed from push");
        result
    }

    /// Drops the cached subscription so the next read re-queries the
    /// platform.
    pub async fn invalidate_cached(&self) {
        *self.cached.write().await = None;
        debug!("push subscription cache invalidated");
    }

    /// Clears the cache slot whenever another context signals that the
    /// subscription may have changed.
    pub fn watch_invalidations(
        self: &Arc<Self>,
        mut rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()>
    where
        P: Send + Sync + 'static,
    {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        manager.invalidate_cached().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Asks the platform to check for a newer worker. Errors are logged
    /// only.
    pub async fn update(&self) {
        if !self.platform.is_supported() {
            return;
        }
        if let Err(e) = self.platform.update_worker().await {
            warn!("service worker update check failed: {e}");
        }
    }

    /// Shows a local notification directly, bypassing the server and push
    /// delivery entirely. Diagnostics only.
    pub async fn send_test_notification(&self, title: &str, message: &str) -> bool {
        if self.permission_status() != PermissionStatus::Granted {
            return false;
        }
        match self.platform.show_notification(title, message).await {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to show test notification: {e}");
                false
            }
        }
    }
}
