use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use driftsync_core::{
    ObjectMeta, PartSink, ProgressFn, RemoteObject, ResumeState, StorageBackend, StorageError,
    TransferContext,
};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::database::{DatabaseError, OperationLogStatus, OperationRecord, SyncDatabase};
use super::delta::content_hash;
use super::events::{EventBus, SyncEvent};
use super::metadata::{FileMetadata, SyncStatus};
use super::paths::{PathError, absolute_local_path};
use super::queue::{OperationKind, OperationQueue, SyncOperation};
use super::retry::RetryPolicy;
use super::{file_digest, file_mtime, now_ms, now_unix};
use crate::collab::{EdgeAccelerator, FileCipher};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("local file missing for {0}")]
    MissingLocalFile(String),
    #[error("dependency of operation {0} failed")]
    DependencyFailed(i64),
}

fn is_transient(err: &ManagerError) -> bool {
    match err {
        ManagerError::Storage(storage) => storage.is_retryable(),
        ManagerError::Io(_) => true,
        _ => false,
    }
}

#[derive(Clone)]
pub struct ManagerConfig {
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Idle poll interval of the worker loop; claims normally happen on wake.
    pub poll_interval: Duration,
    pub encryption_key_id: Option<String>,
    /// Objects at or under this size are offered to the edge cache.
    pub edge_cache_max_bytes: u64,
    pub edge_cache_ttl: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_millis(500),
            encryption_key_id: None,
            edge_cache_max_bytes: 8 * 1024 * 1024,
            edge_cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Executes queued operations against the storage backend.
///
/// Owns the operation queue and its lifecycle; of the tracked-file state it
/// only ever touches `sync_status`, `uploaded_chunks`, and the persisted
/// multipart resume state — everything else belongs to the engine. It never
/// holds a reference back to the engine; results surface through the event
/// bus and the database.
pub struct CloudStorageManager<S: StorageBackend> {
    backend: S,
    db: SyncDatabase,
    sync_root: PathBuf,
    scratch_root: PathBuf,
    queue: Mutex<OperationQueue>,
    running: Mutex<HashSet<String>>,
    cancels: Mutex<HashMap<i64, CancellationToken>>,
    events: EventBus,
    cipher: Option<Arc<dyn FileCipher>>,
    edge: Option<Arc<dyn EdgeAccelerator>>,
    config: ManagerConfig,
    wake: Notify,
}

impl<S: StorageBackend> CloudStorageManager<S> {
    pub fn new(
        backend: S,
        db: SyncDatabase,
        sync_root: PathBuf,
        scratch_root: PathBuf,
        events: EventBus,
        config: ManagerConfig,
    ) -> Self {
        Self {
            backend,
            db,
            sync_root,
            scratch_root,
            queue: Mutex::new(OperationQueue::default()),
            running: Mutex::new(HashSet::new()),
            cancels: Mutex::new(HashMap::new()),
            events,
            cipher: None,
            edge: None,
            config,
            wake: Notify::new(),
        }
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn FileCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_edge(mut self, edge: Arc<dyn EdgeAccelerator>) -> Self {
        self.edge = Some(edge);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn in_flight(&self) -> usize {
        self.running.lock().unwrap().len()
    }

    /// Snapshots the metadata and queues the work; returns as soon as the
    /// operation is durably recorded, long before it runs.
    pub async fn enqueue(
        &self,
        snapshot: FileMetadata,
        kind: OperationKind,
        priority: i32,
    ) -> Result<i64, ManagerError> {
        self.enqueue_after(snapshot, kind, priority, Vec::new()).await
    }

    pub async fn enqueue_after(
        &self,
        snapshot: FileMetadata,
        kind: OperationKind,
        priority: i32,
        depends_on: Vec<i64>,
    ) -> Result<i64, ManagerError> {
        if matches!(kind, OperationKind::Upload | OperationKind::Move { .. }) {
            let local = absolute_local_path(&self.sync_root, &snapshot.local_path)?;
            if tokio::fs::metadata(&local).await.is_err() {
                return Err(ManagerError::MissingLocalFile(snapshot.local_path.clone()));
            }
        }

        let created_at = now_unix();
        let id = self
            .db
            .record_operation(
                &snapshot.file_id,
                kind.as_str(),
                priority,
                self.config.retry.max_retries(),
                created_at,
            )
            .await?;
        self.db
            .set_sync_status(&snapshot.file_id, SyncStatus::Pending)
            .await?;

        let mut op = SyncOperation::new(
            id,
            kind,
            snapshot,
            priority,
            self.config.retry.max_retries(),
            created_at,
        );
        op.depends_on = depends_on;
        self.queue.lock().unwrap().push(op);
        self.wake.notify_waiters();
        Ok(id)
    }

    /// Ids of still-queued operations for a file, used to order dependent
    /// work (a move chains behind a pending upload of the same file).
    pub fn pending_operation_ids(&self, file_id: &str) -> Vec<i64> {
        self.queue
            .lock()
            .unwrap()
            .pending_kinds_for(file_id)
            .into_keys()
            .collect()
    }

    /// Cooperative cancel; takes effect at the next chunk/part boundary.
    pub fn cancel_operation(&self, operation_id: i64) -> bool {
        match self.cancels.lock().unwrap().get(&operation_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn spawn_workers(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..self.config.workers.max(1))
            .map(|worker| {
                let manager = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { manager.worker_loop(worker, shutdown).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker: usize, shutdown: CancellationToken) {
        loop {
            let casualties = self.queue.lock().unwrap().take_dependency_casualties();
            for op in casualties {
                let err = ManagerError::DependencyFailed(op.id);
                self.finish_failed(op, err.to_string()).await;
            }

            match self.claim_next() {
                Some(op) => self.run_operation(op).await,
                None => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
            if shutdown.is_cancelled() {
                tracing::debug!(worker, "worker shutting down");
                break;
            }
        }
    }

    fn claim_next(&self) -> Option<SyncOperation> {
        let mut running = self.running.lock().unwrap();
        let mut queue = self.queue.lock().unwrap();
        let op = queue.claim(now_ms(), &running)?;
        running.insert(op.snapshot.file_id.clone());
        Some(op)
    }

    async fn run_operation(&self, mut op: SyncOperation) {
        let file_id = op.snapshot.file_id.clone();
        let token = CancellationToken::new();
        self.cancels.lock().unwrap().insert(op.id, token.clone());

        op.started_at = Some(now_unix());
        let _ = self.db.operation_started(op.id, now_unix()).await;
        let _ = self.db.set_sync_status(&file_id, SyncStatus::Syncing).await;
        self.events.emit(SyncEvent::Started {
            file_id: file_id.clone(),
            operation_id: op.id,
        });
        info!(
            operation = op.id,
            kind = op.kind.as_str(),
            file = %op.snapshot.local_path,
            "operation started"
        );

        let result = self.execute(&op, &token).await;
        self.cancels.lock().unwrap().remove(&op.id);

        match result {
            Ok(()) => {
                let _ = self
                    .db
                    .operation_finished(
                        op.id,
                        OperationLogStatus::Completed,
                        now_unix(),
                        None,
                        op.retry_count,
                    )
                    .await;
                self.queue.lock().unwrap().mark_completed(op.id);
                self.events.emit(SyncEvent::Completed {
                    file_id: file_id.clone(),
                    operation_id: op.id,
                });
                info!(operation = op.id, file = %op.snapshot.local_path, "operation done");
            }
            Err(ManagerError::Storage(StorageError::Cancelled)) => {
                let _ = self
                    .db
                    .operation_finished(
                        op.id,
                        OperationLogStatus::Cancelled,
                        now_unix(),
                        Some("cancelled"),
                        op.retry_count,
                    )
                    .await;
                self.queue.lock().unwrap().mark_failed(op.id);
                let _ = self.db.set_sync_status(&file_id, SyncStatus::Pending).await;
                warn!(operation = op.id, "operation cancelled");
            }
            Err(err) => {
                if matches!(
                    &err,
                    ManagerError::Storage(StorageError::IntegrityMismatch { .. })
                ) {
                    // Partial chunk state cannot be trusted after a hash
                    // mismatch; the retry transfers everything again.
                    let _ = self.db.clear_transfer_state(&file_id).await;
                }
                if is_transient(&err) && self.config.retry.should_retry(op.retry_count) {
                    op.retry_count += 1;
                    let delay = match &err {
                        ManagerError::Storage(storage) => {
                            storage.retry_after_secs().map(Duration::from_secs)
                        }
                        _ => None,
                    }
                    .unwrap_or_else(|| self.config.retry.delay(op.retry_count));
                    op.not_before = Some(now_ms() + delay.as_millis() as i64);
                    let _ = self
                        .db
                        .operation_requeued(op.id, op.retry_count, &err.to_string())
                        .await;
                    warn!(
                        operation = op.id,
                        attempt = op.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "operation requeued: {err}"
                    );
                    self.queue.lock().unwrap().push(op);
                } else {
                    self.finish_failed(op, err.to_string()).await;
                }
            }
        }

        self.running.lock().unwrap().remove(&file_id);
        self.wake.notify_waiters();
    }

    async fn finish_failed(&self, op: SyncOperation, reason: String) {
        let _ = self
            .db
            .operation_finished(
                op.id,
                OperationLogStatus::FailedFinal,
                now_unix(),
                Some(&reason),
                op.retry_count,
            )
            .await;
        let _ = self
            .db
            .set_sync_status(&op.snapshot.file_id, SyncStatus::Failed)
            .await;
        self.queue.lock().unwrap().mark_failed(op.id);
        self.events.emit(SyncEvent::Failed {
            file_id: op.snapshot.file_id.clone(),
            operation_id: op.id,
            reason: reason.clone(),
        });
        warn!(operation = op.id, file = %op.snapshot.local_path, "operation failed for good: {reason}");
    }

    async fn execute(
        &self,
        op: &SyncOperation,
        token: &CancellationToken,
    ) -> Result<(), ManagerError> {
        match &op.kind {
            OperationKind::Upload => self.execute_upload(op, token).await,
            OperationKind::Download => self.execute_download(op, token).await,
            OperationKind::Delete => self.execute_delete(op).await,
            OperationKind::Move { to_remote } => self.execute_move(op, to_remote, token).await,
        }
    }

    async fn execute_upload(
        &self,
        op: &SyncOperation,
        token: &CancellationToken,
    ) -> Result<(), ManagerError> {
        let snapshot = &op.snapshot;

        // Dedup-before-transfer: identical remote content means the work is
        // already done. This is what makes retried and re-enqueued uploads
        // idempotent.
        if let Some(remote) = self.backend.get_file_metadata(&snapshot.remote_path).await?
            && remote.sha256.as_deref() == Some(snapshot.content_hash.as_str())
        {
            self.db
                .mark_upload_synced(&snapshot.file_id, &snapshot.content_hash, snapshot.total_chunks)
                .await?;
            self.events.emit(SyncEvent::Progress {
                file_id: snapshot.file_id.clone(),
                fraction: 1.0,
            });
            info!(file = %snapshot.local_path, "remote already current, skipping transfer");
            return Ok(());
        }

        let local = absolute_local_path(&self.sync_root, &snapshot.local_path)?;
        let mut encrypted_source: Option<PathBuf> = None;
        let (source, meta) = if let (Some(cipher), Some(key_id)) =
            (&self.cipher, &self.config.encryption_key_id)
        {
            let scratch = self.scratch_path(&snapshot.file_id);
            if let Some(parent) = scratch.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            cipher.encrypt_file(&local, &scratch, key_id)?;
            let (size_bytes, sha256) = file_digest(&scratch).await?;
            encrypted_source = Some(scratch.clone());
            (
                scratch,
                ObjectMeta {
                    size_bytes,
                    sha256,
                    mime_type: snapshot.mime_type.clone(),
                    chunk_size: Some(snapshot.chunk_size_bytes),
                },
            )
        } else {
            (
                local,
                ObjectMeta {
                    size_bytes: snapshot.size_bytes,
                    sha256: snapshot.content_hash.clone(),
                    mime_type: snapshot.mime_type.clone(),
                    chunk_size: Some(snapshot.chunk_size_bytes),
                },
            )
        };

        let resume = self.db.load_transfer_state(&snapshot.file_id).await?;
        let ctx = TransferContext::new()
            .with_cancel(token.clone())
            .with_resume(resume)
            .with_progress(self.progress_fn(&snapshot.file_id))
            .with_part_sink(self.part_sink_fn(&snapshot.file_id));

        let result = self
            .backend
            .upload_file(&source, &snapshot.remote_path, &meta, &ctx)
            .await;
        if let Some(scratch) = encrypted_source {
            let _ = tokio::fs::remove_file(scratch).await;
        }
        result?;

        self.db
            .mark_upload_synced(&snapshot.file_id, &snapshot.content_hash, snapshot.total_chunks)
            .await?;
        Ok(())
    }

    async fn execute_download(
        &self,
        op: &SyncOperation,
        token: &CancellationToken,
    ) -> Result<(), ManagerError> {
        let snapshot = &op.snapshot;
        let local = absolute_local_path(&self.sync_root, &snapshot.local_path)?;
        // Download snapshots carry the remote object's hash as the expected
        // content; an empty hash means the remote side did not report one.
        let expected = snapshot.content_hash.clone();

        if !expected.is_empty()
            && let Some(edge) = &self.edge
            && let Some(bytes) = edge.cache_get(&expected)
            && content_hash(&bytes) == expected
        {
            write_atomic(&local, &bytes).await?;
            self.finish_download(snapshot, expected, bytes.len() as u64, &local)
                .await?;
            info!(file = %snapshot.local_path, "served from edge cache");
            return Ok(());
        }

        let use_cipher = self.cipher.is_some() && self.config.encryption_key_id.is_some();
        let target = if use_cipher {
            self.scratch_path(&snapshot.file_id)
        } else {
            local.clone()
        };
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut ctx = TransferContext::new()
            .with_cancel(token.clone())
            .with_progress(self.progress_fn(&snapshot.file_id));
        if !expected.is_empty() && !use_cipher {
            ctx = ctx.with_expected_sha256(expected.clone());
        }
        if let Some(edge) = &self.edge
            && let Some(base) = edge.best_edge()
        {
            ctx = ctx.with_edge_base(base);
        }

        self.backend
            .download_file(&snapshot.remote_path, &target, &ctx)
            .await?;

        if let (Some(cipher), Some(key_id)) = (&self.cipher, &self.config.encryption_key_id) {
            if let Some(parent) = local.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            cipher.decrypt_file(&target, &local, key_id)?;
            let _ = tokio::fs::remove_file(&target).await;
        }

        let (size_bytes, actual_hash) = file_digest(&local).await?;
        let confirmed = if expected.is_empty() { actual_hash } else { expected };

        if let Some(edge) = &self.edge
            && size_bytes <= self.config.edge_cache_max_bytes
            && let Ok(bytes) = tokio::fs::read(&local).await
        {
            edge.cache_put(&confirmed, &bytes, self.config.edge_cache_ttl);
        }

        self.finish_download(snapshot, confirmed, size_bytes, &local)
            .await?;
        Ok(())
    }

    async fn finish_download(
        &self,
        snapshot: &FileMetadata,
        content_hash: String,
        size_bytes: u64,
        local: &PathBuf,
    ) -> Result<(), ManagerError> {
        let modified_at = file_mtime(local).await.unwrap_or_else(now_unix);
        self.db
            .mark_download_synced(&snapshot.file_id, &content_hash, size_bytes, modified_at)
            .await?;
        Ok(())
    }

    async fn execute_delete(&self, op: &SyncOperation) -> Result<(), ManagerError> {
        self.backend.delete_file(&op.snapshot.remote_path).await?;
        self.db.mark_deleted(&op.snapshot.file_id).await?;
        self.db
            .set_sync_status(&op.snapshot.file_id, SyncStatus::Synced)
            .await?;
        Ok(())
    }

    /// The backend contract has no rename, so a move is expressed as an
    /// upload at the new key followed by deleting the old object.
    async fn execute_move(
        &self,
        op: &SyncOperation,
        to_remote: &str,
        token: &CancellationToken,
    ) -> Result<(), ManagerError> {
        let snapshot = &op.snapshot;
        let local = absolute_local_path(&self.sync_root, &snapshot.local_path)?;

        let destination_current = self
            .backend
            .get_file_metadata(to_remote)
            .await?
            .is_some_and(|remote| remote.sha256.as_deref() == Some(snapshot.content_hash.as_str()));
        if !destination_current {
            let meta = ObjectMeta {
                size_bytes: snapshot.size_bytes,
                sha256: snapshot.content_hash.clone(),
                mime_type: snapshot.mime_type.clone(),
                chunk_size: Some(snapshot.chunk_size_bytes),
            };
            let ctx = TransferContext::new()
                .with_cancel(token.clone())
                .with_progress(self.progress_fn(&snapshot.file_id));
            self.backend
                .upload_file(&local, to_remote, &meta, &ctx)
                .await?;
        }
        self.backend.delete_file(&snapshot.remote_path).await?;

        if let Some(mut row) = self.db.file_by_id(&snapshot.file_id).await? {
            row.remote_path = to_remote.to_string();
            self.db.upsert_file(&row).await?;
        }
        self.db
            .mark_upload_synced(&snapshot.file_id, &snapshot.content_hash, snapshot.total_chunks)
            .await?;
        Ok(())
    }

    // Pass-throughs so the engine can consult remote state without holding
    // its own backend reference.

    pub async fn remote_metadata(
        &self,
        remote_path: &str,
    ) -> Result<Option<RemoteObject>, ManagerError> {
        Ok(self.backend.get_file_metadata(remote_path).await?)
    }

    pub async fn list_remote(&self, prefix: &str) -> Result<Vec<RemoteObject>, ManagerError> {
        Ok(self.backend.list_files(prefix).await?)
    }

    pub async fn unresolved_failures(&self) -> Result<Vec<OperationRecord>, ManagerError> {
        Ok(self.db.unacknowledged_failures().await?)
    }

    pub async fn acknowledge_failure(&self, operation_id: i64) -> Result<(), ManagerError> {
        Ok(self.db.acknowledge_operation(operation_id).await?)
    }

    fn progress_fn(&self, file_id: &str) -> ProgressFn {
        let events = self.events.clone();
        let file_id = file_id.to_string();
        Box::new(move |fraction| {
            events.emit(SyncEvent::Progress {
                file_id: file_id.clone(),
                fraction,
            });
        })
    }

    /// Persists multipart receipts as they land so a crash or transient
    /// failure resumes with the remaining parts only.
    fn part_sink_fn(&self, file_id: &str) -> PartSink {
        let db = self.db.clone();
        let file_id = file_id.to_string();
        Box::new(move |state: &ResumeState| {
            let db = db.clone();
            let file_id = file_id.clone();
            let state = state.clone();
            tokio::spawn(async move {
                let result = if state.is_empty() {
                    db.clear_transfer_state(&file_id).await
                } else {
                    db.save_transfer_state(&file_id, &state).await
                };
                if let Err(err) = result {
                    warn!("failed to persist transfer state for {file_id}: {err}");
                }
            });
        })
    }

    fn scratch_path(&self, file_id: &str) -> PathBuf {
        self.scratch_root.join(format!("{file_id}.payload"))
    }
}

async fn write_atomic(path: &PathBuf, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let staging = path.with_extension("drift-staging");
    tokio::fs::write(&staging, bytes).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}
