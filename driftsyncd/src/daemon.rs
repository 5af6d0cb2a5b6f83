use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use driftsync_core::HttpObjectStore;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::sync::chunk_cache::ChunkCache;
use crate::sync::database::SyncDatabase;
use crate::sync::engine::{FileSyncEngine, SyncPassSummary};
use crate::sync::events::EventBus;
use crate::sync::manager::CloudStorageManager;
use crate::sync::watcher::{drain_coalesced, start_local_watcher};

const WATCHER_DRAIN_INTERVAL: Duration = Duration::from_millis(500);

/// Owns the fully wired sync stack. Everything is constructed here and
/// passed down explicitly; there is no global state to reach for.
pub struct DaemonRuntime {
    settings: SyncSettings,
    engine: Arc<FileSyncEngine<HttpObjectStore>>,
    shutdown: CancellationToken,
}

impl DaemonRuntime {
    pub async fn bootstrap(settings: SyncSettings) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&settings.sync_root)
            .await
            .with_context(|| format!("failed to create sync root at {:?}", settings.sync_root))?;
        tokio::fs::create_dir_all(&settings.state_dir)
            .await
            .with_context(|| format!("failed to create state dir at {:?}", settings.state_dir))?;

        let db = SyncDatabase::new_at(&settings.state_dir.join("state.db"))
            .await
            .context("failed to open the sync database")?;
        let backend = HttpObjectStore::new(&settings.gateway_url, settings.gateway_token.clone())
            .context("failed to construct the gateway client")?
            .with_multipart_threshold(settings.multipart_threshold)
            .with_part_size(settings.chunk_size_bytes);

        let events = EventBus::default();
        let manager = Arc::new(CloudStorageManager::new(
            backend,
            db.clone(),
            settings.sync_root.clone(),
            settings.state_dir.join("scratch"),
            events.clone(),
            settings.manager_config(),
        ));
        let engine = Arc::new(FileSyncEngine::new(
            manager,
            db,
            settings.sync_root.clone(),
            ChunkCache::new(settings.state_dir.join("chunks")),
            events,
            settings.engine_options(),
        ));

        Ok(Self {
            settings,
            engine,
            shutdown: CancellationToken::new(),
        })
    }

    /// Single reconciliation pass, for `--once` runs.
    pub async fn run_once(&self) -> anyhow::Result<SyncPassSummary> {
        let workers = self.engine.manager().spawn_workers(self.shutdown.clone());
        let summary = self.engine.perform_full_sync().await?;
        // Let the queue drain before reporting.
        while self.engine.manager().queue_len() > 0 || self.engine.manager().in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.shutdown.cancel();
        for handle in workers {
            let _ = handle.await;
        }
        Ok(summary)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            sync_root = %self.settings.sync_root.display(),
            remote_prefix = %self.settings.remote_prefix,
            mode = self.settings.mode.as_str(),
            policy = self.settings.conflict_policy.as_str(),
            workers = self.settings.max_concurrent_transfers,
            "driftsyncd starting"
        );

        let worker_handles = self.engine.manager().spawn_workers(self.shutdown.clone());
        if let Err(err) = self.engine.requeue_incomplete().await {
            warn!("failed to requeue interrupted transfers: {err}");
        }

        let mut event_rx = self.engine.manager().events().subscribe();
        let event_shutdown = self.shutdown.clone();
        let event_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = event_shutdown.cancelled() => break,
                    event = event_rx.recv() => match event {
                        Ok(event) => debug!(?event, "sync event"),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        let (watcher, watcher_handle) = if self.settings.enable_watcher {
            match start_local_watcher(&self.settings.sync_root) {
                Ok((watcher, mut rx)) => {
                    let engine = Arc::clone(&self.engine);
                    let shutdown = self.shutdown.clone();
                    let handle = tokio::spawn(async move {
                        loop {
                            tokio::select! {
                                _ = shutdown.cancelled() => break,
                                _ = tokio::time::sleep(WATCHER_DRAIN_INTERVAL) => {
                                    for change in drain_coalesced(&mut rx) {
                                        if let Err(err) = engine.apply_local_change(change).await {
                                            warn!("watcher change failed: {err}");
                                        }
                                    }
                                }
                            }
                        }
                    });
                    (Some(watcher), Some(handle))
                }
                Err(err) => {
                    warn!("failed to start the local watcher: {err}");
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let full_sync_engine = Arc::clone(&self.engine);
        let interval = self.settings.auto_sync_interval;
        let full_sync_shutdown = self.shutdown.clone();
        let full_sync_handle = tokio::spawn(async move {
            loop {
                match full_sync_engine.perform_full_sync().await {
                    Ok(summary) if summary != SyncPassSummary::default() => {
                        info!(
                            uploads = summary.uploads,
                            downloads = summary.downloads,
                            deletes = summary.deletes,
                            conflicts = summary.conflicts,
                            errors = summary.errors,
                            "periodic sync pass"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => warn!("periodic sync pass failed: {err}"),
                }
                tokio::select! {
                    _ = full_sync_shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("shutting down");
        self.shutdown.cancel();
        drop(watcher);

        for handle in worker_handles {
            let _ = handle.await;
        }
        let _ = full_sync_handle.await;
        let _ = event_handle.await;
        if let Some(handle) = watcher_handle {
            let _ = handle.await;
        }
        Ok(())
    }
}
