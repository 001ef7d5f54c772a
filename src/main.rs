use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use linguify_notifier::api::NotificationApiClient;
use linguify_notifier::config::Config;
use linguify_notifier::lifecycle::LifecycleManager;
use linguify_notifier::push::{HeadlessPlatform, PushConfig, PushSubscriptionManager};
use linguify_notifier::storage::FileStorage;
use linguify_notifier::store::NotificationStore;
use linguify_notifier::{logging, metrics};

fn main() -> Result<()> {
    // Build custom runtime with explicit thread configuration
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Initialize logging first thing
        logging::setup_logging();

        // Load environment variables from .env file if present
        dotenv::dotenv().ok();

        info!("Starting Linguify notification engine");

        let config = Config::from_env()?;

        let storage = FileStorage::new(&config.storage_dir);
        let store = Arc::new(NotificationStore::open(storage).await);
        info!(
            total = store.len().await,
            unread = store.unread_count().await,
            "Notification store loaded"
        );

        // Start background maintenance for the lifetime of the process
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&store),
            Duration::from_secs(config.maintenance_interval_secs),
        ));
        let _maintenance = lifecycle.spawn_maintenance_task();

        let gateway = NotificationApiClient::new(config.api_base_url.clone());
        let push = Arc::new(PushSubscriptionManager::new(
            HeadlessPlatform,
            gateway,
            PushConfig {
                vapid_public_key: config.vapid_public_key.clone(),
                device_type: config.device_type.clone(),
                device_name: config.device_name.clone(),
            },
        ));
        if !push.init().await {
            warn!("push delivery unavailable, running with local notifications only");
        }

        // Handle graceful shutdown
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal, shutting down gracefully");
            }
        }

        info!("Final metrics:\n{}", metrics::metrics_snapshot());
        info!("Shutdown complete");
        Ok(())
    })
}
