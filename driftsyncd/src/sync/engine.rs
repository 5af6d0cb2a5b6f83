use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use driftsync_core::{RemoteObject, StorageBackend};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use super::chunk_cache::ChunkCache;
use super::conflict::{
    self, ConflictResolution, ConflictType, ResolutionOutcome, SideSnapshot,
};
use super::database::{DatabaseError, NewVersion, SyncDatabase, VersionOrigin};
use super::delta;
use super::events::{EventBus, SyncEvent};
use super::manager::{CloudStorageManager, ManagerError};
use super::metadata::{FileMetadata, SyncStatus};
use super::paths::{PathError, absolute_local_path, relative_local_path, remote_path_for};
use super::queue::OperationKind;
use super::watcher::LocalChange;
use super::{file_digest, file_mtime, now_unix};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("manager error: {0}")]
    Manager(#[from] ManagerError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("conflict {0} not found")]
    MissingConflict(i64),
}

/// Which directions a full sync pass may enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Bidirectional,
    UploadOnly,
    DownloadOnly,
    /// Remote is forced to match local, including deletions.
    Mirror,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Bidirectional => "bidirectional",
            SyncMode::UploadOnly => "upload-only",
            SyncMode::DownloadOnly => "download-only",
            SyncMode::Mirror => "mirror",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bidirectional" => Some(SyncMode::Bidirectional),
            "upload-only" => Some(SyncMode::UploadOnly),
            "download-only" => Some(SyncMode::DownloadOnly),
            "mirror" => Some(SyncMode::Mirror),
            _ => None,
        }
    }

    fn uploads_enabled(self) -> bool {
        !matches!(self, SyncMode::DownloadOnly)
    }

    fn downloads_enabled(self) -> bool {
        matches!(self, SyncMode::Bidirectional | SyncMode::DownloadOnly)
    }

    fn mirrors_deletions(self) -> bool {
        matches!(self, SyncMode::Mirror)
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub mode: SyncMode,
    pub conflict_policy: ConflictResolution,
    pub remote_prefix: String,
    pub chunk_size_bytes: u64,
    pub keep_versions: u32,
    /// Contents above this size skip delta computation and store full
    /// versions; hashing multi-gigabyte media into block maps is not worth
    /// the memory.
    pub delta_max_bytes: u64,
    pub upload_priority: i32,
    pub download_priority: i32,
    pub delete_priority: i32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Bidirectional,
            conflict_policy: ConflictResolution::Manual,
            remote_prefix: "/".to_string(),
            chunk_size_bytes: 8 * 1024 * 1024,
            keep_versions: 10,
            delta_max_bytes: 32 * 1024 * 1024,
            upload_priority: 50,
            download_priority: 50,
            delete_priority: 60,
        }
    }
}

/// What a single change observation amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    Unchanged,
    /// New file brought under tracking (and queued when the mode allows).
    Tracked,
    /// Change recorded and queued for transfer.
    Queued,
    ConflictRaised,
    /// Not a file, gated by mode, or raced with a concurrent delete.
    Skipped,
}

/// Outcome of a remote metadata lookup. Absent and unreachable are very
/// different answers: the first can mean "nothing to conflict with", the
/// second only means "try again later".
enum RemoteProbe {
    Found(RemoteObject),
    Absent,
    Unreachable,
}

impl RemoteProbe {
    fn into_found(self) -> Option<RemoteObject> {
        match self {
            RemoteProbe::Found(object) => Some(object),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncPassSummary {
    pub scanned: usize,
    pub uploads: usize,
    pub downloads: usize,
    pub deletes: usize,
    pub conflicts: usize,
    pub errors: usize,
}

/// Policy layer: watches local state, decides what to transfer, maintains
/// version history and conflicts. Owns and drives the manager's queue; the
/// manager never calls back, it only emits events.
pub struct FileSyncEngine<S: StorageBackend> {
    manager: Arc<CloudStorageManager<S>>,
    db: SyncDatabase,
    sync_root: PathBuf,
    cache: ChunkCache,
    events: EventBus,
    options: EngineOptions,
}

impl<S: StorageBackend> FileSyncEngine<S> {
    pub fn new(
        manager: Arc<CloudStorageManager<S>>,
        db: SyncDatabase,
        sync_root: PathBuf,
        cache: ChunkCache,
        events: EventBus,
        options: EngineOptions,
    ) -> Self {
        Self {
            manager,
            db,
            sync_root,
            cache,
            events,
            options,
        }
    }

    pub fn manager(&self) -> &Arc<CloudStorageManager<S>> {
        &self.manager
    }

    /// Entry point for watcher events.
    pub async fn apply_local_change(&self, change: LocalChange) -> Result<(), EngineError> {
        match change {
            LocalChange::Modified { path } => {
                self.process_local_path(&path).await?;
            }
            LocalChange::Removed { path } => {
                self.process_local_delete(&path).await?;
            }
            LocalChange::Renamed { from, to } => {
                self.process_local_rename(&from, &to).await?;
            }
        }
        Ok(())
    }

    /// Observes one local path: hashes it if the size+mtime prefilter says
    /// it may have changed, then tracks/commits/conflicts as appropriate.
    pub async fn process_local_path(&self, rel: &str) -> Result<ChangeOutcome, EngineError> {
        let abs = absolute_local_path(&self.sync_root, rel)?;
        let Ok(fs_meta) = tokio::fs::metadata(&abs).await else {
            // Raced with a delete; the Removed event covers it.
            return Ok(ChangeOutcome::Skipped);
        };
        if !fs_meta.is_file() {
            return Ok(ChangeOutcome::Skipped);
        }

        let tracked = self.db.file_by_local_path(rel).await?;
        let mtime = file_mtime(&abs).await.unwrap_or_else(now_unix);
        if let Some(existing) = &tracked {
            if !existing.deleted && existing.sync_status == SyncStatus::Conflict {
                // An unresolved conflict keeps the file out of sync until
                // someone resolves it.
                return Ok(ChangeOutcome::Skipped);
            }
            if !existing.deleted
                && existing.sync_status == SyncStatus::Synced
                && existing.size_bytes == fs_meta.len()
                && existing.modified_at == mtime
            {
                return Ok(ChangeOutcome::Unchanged);
            }
        }

        let (size, hash) = file_digest(&abs).await?;
        match tracked {
            None => self.track_new_local_file(rel, &abs, size, hash, mtime).await,
            Some(mut existing) => {
                let revived = existing.deleted;
                existing.deleted = false;
                if existing.content_hash == hash {
                    if revived || existing.modified_at != mtime {
                        existing.modified_at = mtime;
                        self.db.upsert_file(&existing).await?;
                    }
                    return Ok(ChangeOutcome::Unchanged);
                }
                self.process_modified(existing, &abs, size, hash, mtime).await
            }
        }
    }

    async fn track_new_local_file(
        &self,
        rel: &str,
        abs: &Path,
        size: u64,
        hash: String,
        mtime: i64,
    ) -> Result<ChangeOutcome, EngineError> {
        let remote_path = remote_path_for(&self.options.remote_prefix, rel);
        let mut meta = FileMetadata::new_local(
            rel,
            remote_path,
            size,
            hash.clone(),
            mtime,
            self.options.chunk_size_bytes,
            now_unix(),
        );
        if size <= self.options.delta_max_bytes {
            let _ = self.cache.put_file(&hash, abs).await;
        }

        meta.version = 1;
        self.db
            .record_version(
                &meta,
                &NewVersion {
                    version_number: 1,
                    content_hash: hash.clone(),
                    size_bytes: size,
                    created_at: now_unix(),
                    created_by: VersionOrigin::Local,
                    parent_version: None,
                    delta_info: None,
                    storage_path: meta.remote_path.clone(),
                },
            )
            .await?;
        info!(file = rel, "tracking new local file");

        // A pre-existing remote object at the same path with different
        // content is a divergence with no common base.
        let probe = self.probe_remote(&meta.remote_path).await;
        if matches!(probe, RemoteProbe::Unreachable) {
            // Wait for connectivity; the next sync pass picks this up.
            self.db
                .set_sync_status(&meta.file_id, SyncStatus::Offline)
                .await?;
            return Ok(ChangeOutcome::Tracked);
        }
        if let RemoteProbe::Found(remote_obj) = probe
            && let Some(remote_hash) = remote_obj.sha256.clone()
            && conflict::is_divergent(None, &hash, &remote_hash)
        {
            let local_side = SideSnapshot {
                content_hash: Some(hash),
                modified_at: mtime,
                size_bytes: size,
            };
            self.raise_conflict(meta, local_side, &remote_obj, ConflictType::ContentMismatch)
                .await?;
            return Ok(ChangeOutcome::ConflictRaised);
        }

        if self.options.mode.uploads_enabled() {
            self.manager
                .enqueue(meta, OperationKind::Upload, self.options.upload_priority)
                .await?;
            return Ok(ChangeOutcome::Queued);
        }
        Ok(ChangeOutcome::Tracked)
    }

    async fn process_modified(
        &self,
        prev: FileMetadata,
        abs: &Path,
        size: u64,
        hash: String,
        mtime: i64,
    ) -> Result<ChangeOutcome, EngineError> {
        let probe = self.probe_remote(&prev.remote_path).await;
        if matches!(probe, RemoteProbe::Unreachable) {
            self.db
                .set_sync_status(&prev.file_id, SyncStatus::Offline)
                .await?;
            return Ok(ChangeOutcome::Skipped);
        }
        let divergent_remote = probe.into_found().filter(|obj| {
            obj.sha256.as_deref().is_some_and(|remote_hash| {
                conflict::is_divergent(prev.last_synced_hash.as_deref(), &hash, remote_hash)
            })
        });

        if let Some(remote_obj) = divergent_remote {
            let local_side = SideSnapshot {
                content_hash: Some(hash),
                modified_at: mtime,
                size_bytes: size,
            };
            self.raise_conflict(prev, local_side, &remote_obj, ConflictType::ContentMismatch)
                .await?;
            return Ok(ChangeOutcome::ConflictRaised);
        }

        let mut updated = prev;
        self.commit_local_version(&mut updated, abs, size, hash, mtime)
            .await?;
        if self.options.mode.uploads_enabled() {
            self.manager
                .enqueue(updated, OperationKind::Upload, self.options.upload_priority)
                .await?;
            return Ok(ChangeOutcome::Queued);
        }
        Ok(ChangeOutcome::Skipped)
    }

    /// Appends a version (with a block delta against the cached previous
    /// content when possible) and advances the tracked row atomically.
    async fn commit_local_version(
        &self,
        meta: &mut FileMetadata,
        abs: &Path,
        size: u64,
        hash: String,
        mtime: i64,
    ) -> Result<(), EngineError> {
        let parent_version = meta.version;
        let base_hash = meta.content_hash.clone();
        let delta_info = self.delta_against_cached(&base_hash, abs, size).await;

        meta.apply_new_content(size, hash.clone(), mtime);
        meta.version = parent_version + 1;
        if size <= self.options.delta_max_bytes {
            let _ = self.cache.put_file(&hash, abs).await;
        }

        self.db
            .record_version(
                meta,
                &NewVersion {
                    version_number: meta.version,
                    content_hash: hash,
                    size_bytes: size,
                    created_at: now_unix(),
                    created_by: VersionOrigin::Local,
                    parent_version: (parent_version > 0).then_some(parent_version),
                    delta_info,
                    storage_path: meta.remote_path.clone(),
                },
            )
            .await?;

        let pruned = self
            .db
            .prune_versions(&meta.file_id, self.options.keep_versions)
            .await?;
        if pruned > 0 {
            debug!(file = %meta.local_path, pruned, "pruned old versions");
        }
        Ok(())
    }

    /// Delta against the cached base content, or `None` to store a full
    /// version. Any failure here degrades, it never aborts the change.
    async fn delta_against_cached(
        &self,
        base_hash: &str,
        abs: &Path,
        size: u64,
    ) -> Option<delta::DeltaInfo> {
        if size > self.options.delta_max_bytes {
            return None;
        }
        let base = match self.cache.get(base_hash).await {
            Ok(Some(bytes)) => bytes,
            _ => {
                debug!("no cached base content, storing full version");
                return None;
            }
        };
        let target = tokio::fs::read(abs).await.ok()?;
        let computed = delta::compute_delta(&base, &target, delta::DEFAULT_BLOCK_SIZE);
        match delta::apply_delta(&base, &computed) {
            Ok(_) => Some(computed),
            Err(err) => {
                warn!("delta round-trip failed, storing full version: {err}");
                None
            }
        }
    }

    async fn raise_conflict(
        &self,
        file: FileMetadata,
        local_side: SideSnapshot,
        remote_obj: &RemoteObject,
        conflict_type: ConflictType,
    ) -> Result<i64, EngineError> {
        let remote_side = SideSnapshot {
            content_hash: remote_obj.sha256.clone(),
            modified_at: parse_remote_modified(remote_obj.modified.as_deref()).unwrap_or(0),
            size_bytes: remote_obj.size,
        };
        let conflict_id = self
            .db
            .record_conflict(
                &file.file_id,
                &file.local_path,
                &file.remote_path,
                &local_side,
                &remote_side,
                conflict_type,
                now_unix(),
            )
            .await?;
        self.db
            .set_sync_status(&file.file_id, SyncStatus::Conflict)
            .await?;
        self.events.emit(SyncEvent::ConflictDetected {
            conflict_id,
            local_path: file.local_path.clone(),
        });
        warn!(
            file = %file.local_path,
            kind = conflict_type.as_str(),
            "conflict detected"
        );

        let policy = self.options.conflict_policy;
        let outcome = conflict::resolve(policy, &file.local_path, &local_side, &remote_side);
        if !matches!(outcome, ResolutionOutcome::LeaveOpen) {
            self.db
                .resolve_conflict(conflict_id, policy, now_unix())
                .await?;
            self.execute_outcome(file, outcome, &local_side, &remote_side)
                .await?;
        }
        Ok(conflict_id)
    }

    /// External (manual) resolution of an open conflict. Idempotent: once a
    /// resolution is stored, later calls return it without side effects.
    pub async fn resolve_conflict(
        &self,
        conflict_id: i64,
        resolution: ConflictResolution,
    ) -> Result<ConflictResolution, EngineError> {
        let record = self
            .db
            .conflict_by_id(conflict_id)
            .await?
            .ok_or(EngineError::MissingConflict(conflict_id))?;
        if let Some(existing) = record.resolution {
            return Ok(existing);
        }

        let stored = self
            .db
            .resolve_conflict(conflict_id, resolution, now_unix())
            .await?;
        if let Some(file) = self.db.file_by_id(&record.file_id).await? {
            let outcome = conflict::resolve(
                resolution,
                &file.local_path,
                &record.local_meta,
                &record.remote_meta,
            );
            self.execute_outcome(file, outcome, &record.local_meta, &record.remote_meta)
                .await?;
        }
        Ok(stored)
    }

    async fn execute_outcome(
        &self,
        file: FileMetadata,
        outcome: ResolutionOutcome,
        local_side: &SideSnapshot,
        remote_side: &SideSnapshot,
    ) -> Result<(), EngineError> {
        match outcome {
            ResolutionOutcome::LeaveOpen => Ok(()),
            ResolutionOutcome::KeepLocal => {
                let abs = absolute_local_path(&self.sync_root, &file.local_path)?;
                let mut updated = file;
                let hash = local_side.content_hash.clone().unwrap_or_default();
                self.commit_local_version(
                    &mut updated,
                    &abs,
                    local_side.size_bytes,
                    hash,
                    local_side.modified_at,
                )
                .await?;
                // The resolution explicitly picked a direction; it is not
                // re-gated by the sync mode.
                self.manager
                    .enqueue(updated, OperationKind::Upload, self.options.upload_priority)
                    .await?;
                Ok(())
            }
            ResolutionOutcome::KeepRemote => {
                let mut snapshot = file;
                snapshot.content_hash = remote_side.content_hash.clone().unwrap_or_default();
                snapshot.size_bytes = remote_side.size_bytes;
                self.manager
                    .enqueue(
                        snapshot,
                        OperationKind::Download,
                        self.options.download_priority,
                    )
                    .await?;
                Ok(())
            }
            ResolutionOutcome::KeepBoth { renamed_local } => {
                let abs = absolute_local_path(&self.sync_root, &file.local_path)?;
                let renamed_abs = absolute_local_path(&self.sync_root, &renamed_local)?;
                if let Some(parent) = renamed_abs.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::rename(&abs, &renamed_abs).await?;
                info!(
                    from = %file.local_path,
                    to = %renamed_local,
                    "keep-both: local copy renamed"
                );

                // The renamed copy becomes its own tracked file.
                let hash = local_side.content_hash.clone().unwrap_or_default();
                Box::pin(self.track_new_local_file(
                    &renamed_local,
                    &renamed_abs,
                    local_side.size_bytes,
                    hash,
                    local_side.modified_at,
                ))
                .await?;

                // The original path takes the remote content back.
                let mut snapshot = file;
                snapshot.content_hash = remote_side.content_hash.clone().unwrap_or_default();
                snapshot.size_bytes = remote_side.size_bytes;
                self.manager
                    .enqueue(
                        snapshot,
                        OperationKind::Download,
                        self.options.download_priority,
                    )
                    .await?;
                Ok(())
            }
        }
    }

    pub async fn process_local_delete(&self, rel: &str) -> Result<(), EngineError> {
        let Some(tracked) = self.db.file_by_local_path(rel).await? else {
            return Ok(());
        };
        if tracked.deleted {
            return Ok(());
        }

        // Delete-vs-modify: the remote moved since our last sync while the
        // local copy went away. Never silently lose the remote edit.
        let remote = self.probe_remote(&tracked.remote_path).await.into_found();
        if let Some(remote_obj) = &remote
            && let Some(remote_hash) = remote_obj.sha256.as_deref()
            && tracked
                .last_synced_hash
                .as_deref()
                .is_some_and(|base| base != remote_hash)
        {
            let local_side = SideSnapshot {
                content_hash: None,
                modified_at: now_unix(),
                size_bytes: 0,
            };
            let remote_side = SideSnapshot {
                content_hash: Some(remote_hash.to_string()),
                modified_at: parse_remote_modified(remote_obj.modified.as_deref()).unwrap_or(0),
                size_bytes: remote_obj.size,
            };
            let conflict_id = self
                .db
                .record_conflict(
                    &tracked.file_id,
                    &tracked.local_path,
                    &tracked.remote_path,
                    &local_side,
                    &remote_side,
                    ConflictType::DeleteVsModify,
                    now_unix(),
                )
                .await?;
            self.db
                .set_sync_status(&tracked.file_id, SyncStatus::Conflict)
                .await?;
            self.events.emit(SyncEvent::ConflictDetected {
                conflict_id,
                local_path: tracked.local_path.clone(),
            });
            if self.options.conflict_policy != ConflictResolution::Manual {
                // A deleted local side has no timestamp or size to compare;
                // every automatic policy restores the surviving edit.
                self.db
                    .resolve_conflict(conflict_id, self.options.conflict_policy, now_unix())
                    .await?;
                let mut snapshot = tracked;
                snapshot.content_hash = remote_hash.to_string();
                snapshot.size_bytes = remote_obj.size;
                self.manager
                    .enqueue(
                        snapshot,
                        OperationKind::Download,
                        self.options.download_priority,
                    )
                    .await?;
            }
            return Ok(());
        }

        if self.options.mode.mirrors_deletions() {
            self.manager
                .enqueue(tracked, OperationKind::Delete, self.options.delete_priority)
                .await?;
        } else {
            self.db.mark_deleted(&tracked.file_id).await?;
            info!(file = rel, "local file removed, row tombstoned");
        }
        Ok(())
    }

    pub async fn process_local_rename(&self, from: &str, to: &str) -> Result<(), EngineError> {
        let Some(tracked) = self.db.file_by_local_path(from).await? else {
            // Unknown source; treat the destination as a fresh observation.
            self.process_local_path(to).await?;
            return Ok(());
        };

        let mut updated = tracked;
        updated.local_path = to.to_string();
        self.db.upsert_file(&updated).await?;

        if self.options.mode.uploads_enabled() {
            let new_remote = remote_path_for(&self.options.remote_prefix, to);
            // A rename must not overtake an in-flight upload of the same
            // file; chain it behind whatever is still pending.
            let pending = self.manager.pending_operation_ids(&updated.file_id);
            self.manager
                .enqueue_after(
                    updated,
                    OperationKind::Move {
                        to_remote: new_remote,
                    },
                    self.options.delete_priority,
                    pending,
                )
                .await?;
        }
        Ok(())
    }

    /// One full reconciliation pass: scan local files, detect local
    /// deletions, then reconcile the remote listing. Failures are isolated
    /// per file; the pass always completes.
    pub async fn perform_full_sync(&self) -> Result<SyncPassSummary, EngineError> {
        let mut summary = SyncPassSummary::default();

        let mut seen: HashSet<String> = HashSet::new();
        let local_files = collect_local_files(&self.sync_root).await?;
        for rel in local_files {
            seen.insert(rel.clone());
            summary.scanned += 1;
            match self.process_local_path(&rel).await {
                Ok(ChangeOutcome::Queued) => summary.uploads += 1,
                Ok(ChangeOutcome::ConflictRaised) => summary.conflicts += 1,
                Ok(_) => {}
                Err(err) => {
                    summary.errors += 1;
                    warn!(file = %rel, "sync pass error: {err}");
                }
            }
        }

        for row in self.db.list_tracked().await? {
            if seen.contains(&row.local_path) {
                continue;
            }
            match self.process_local_delete(&row.local_path).await {
                Ok(()) => summary.deletes += 1,
                Err(err) => {
                    summary.errors += 1;
                    warn!(file = %row.local_path, "delete reconciliation error: {err}");
                }
            }
        }

        if self.options.mode.downloads_enabled() || self.options.mode.mirrors_deletions() {
            match self.manager.list_remote(&self.options.remote_prefix).await {
                Ok(remote_items) => {
                    for item in remote_items {
                        if let Err(err) = self.reconcile_remote_item(&item, &mut summary).await {
                            summary.errors += 1;
                            warn!(remote = %item.path, "remote reconciliation error: {err}");
                        }
                    }
                }
                Err(err) => {
                    summary.errors += 1;
                    warn!("remote listing failed: {err}");
                }
            }
        }

        info!(
            scanned = summary.scanned,
            uploads = summary.uploads,
            downloads = summary.downloads,
            deletes = summary.deletes,
            conflicts = summary.conflicts,
            errors = summary.errors,
            "sync pass finished"
        );
        Ok(summary)
    }

    async fn reconcile_remote_item(
        &self,
        item: &RemoteObject,
        summary: &mut SyncPassSummary,
    ) -> Result<(), EngineError> {
        let tracked = self.db.file_by_remote_path(&item.path).await?;
        let Some(tracked) = tracked else {
            if self.options.mode.mirrors_deletions() {
                // Mirror: remote objects with no local counterpart go away.
                let rel = self.relative_from_remote(&item.path);
                let mut ghost = FileMetadata::new_local(
                    rel,
                    item.path.clone(),
                    item.size,
                    item.sha256.clone().unwrap_or_default(),
                    parse_remote_modified(item.modified.as_deref()).unwrap_or_else(now_unix),
                    self.options.chunk_size_bytes,
                    now_unix(),
                );
                ghost.deleted = true;
                self.db.upsert_file(&ghost).await?;
                self.manager
                    .enqueue(ghost, OperationKind::Delete, self.options.delete_priority)
                    .await?;
                summary.deletes += 1;
            } else if self.options.mode.downloads_enabled() {
                // First observation via remote listing.
                let rel = self.relative_from_remote(&item.path);
                let modified =
                    parse_remote_modified(item.modified.as_deref()).unwrap_or_else(now_unix);
                let mut meta = FileMetadata::new_local(
                    rel,
                    item.path.clone(),
                    item.size,
                    item.sha256.clone().unwrap_or_default(),
                    modified,
                    self.options.chunk_size_bytes,
                    now_unix(),
                );
                meta.version = 1;
                self.db
                    .record_version(
                        &meta,
                        &NewVersion {
                            version_number: 1,
                            content_hash: meta.content_hash.clone(),
                            size_bytes: item.size,
                            created_at: now_unix(),
                            created_by: VersionOrigin::Remote,
                            parent_version: None,
                            delta_info: None,
                            storage_path: item.path.clone(),
                        },
                    )
                    .await?;
                self.manager
                    .enqueue(
                        meta,
                        OperationKind::Download,
                        self.options.download_priority,
                    )
                    .await?;
                summary.downloads += 1;
            }
            return Ok(());
        };

        if tracked.deleted {
            if self.options.mode.mirrors_deletions() {
                self.manager
                    .enqueue(tracked, OperationKind::Delete, self.options.delete_priority)
                    .await?;
                summary.deletes += 1;
            }
            return Ok(());
        }

        if item.sha256.is_none() || !self.options.mode.downloads_enabled() {
            return Ok(());
        }
        let local_clean =
            tracked.last_synced_hash.as_deref() == Some(tracked.content_hash.as_str());
        if !local_clean {
            // Both-sides-moved cases surface through the local scan, which
            // sees the divergence and raises the conflict.
            return Ok(());
        }
        // Files with queued or in-flight work sit out this round; the next
        // pass sees them settled.
        if matches!(tracked.sync_status, SyncStatus::Pending | SyncStatus::Syncing) {
            return Ok(());
        }
        // Listing entries go stale under concurrent transfers; confirm with
        // a fresh stat before pulling anything.
        let Some(fresh) = self.probe_remote(&item.path).await.into_found() else {
            return Ok(());
        };
        let Some(remote_hash) = fresh.sha256.clone() else {
            return Ok(());
        };
        if tracked.last_synced_hash.as_deref() == Some(remote_hash.as_str())
            || tracked.content_hash == remote_hash
        {
            return Ok(());
        }

        let mut meta = tracked;
        meta.version += 1;
        let modified = parse_remote_modified(fresh.modified.as_deref()).unwrap_or_else(now_unix);
        self.db
            .record_version(
                &meta,
                &NewVersion {
                    version_number: meta.version,
                    content_hash: remote_hash.clone(),
                    size_bytes: fresh.size,
                    created_at: now_unix(),
                    created_by: VersionOrigin::Remote,
                    parent_version: Some(meta.version - 1),
                    delta_info: None,
                    storage_path: item.path.clone(),
                },
            )
            .await?;
        let mut snapshot = meta;
        snapshot.content_hash = remote_hash;
        snapshot.size_bytes = fresh.size;
        snapshot.modified_at = modified;
        self.manager
            .enqueue(
                snapshot,
                OperationKind::Download,
                self.options.download_priority,
            )
            .await?;
        summary.downloads += 1;
        Ok(())
    }

    /// Re-queues work that was interrupted by a restart: rows left Pending
    /// or Syncing go back through the queue, where dedup and multipart
    /// resume state keep the restart cheap.
    pub async fn requeue_incomplete(&self) -> Result<usize, EngineError> {
        let mut requeued = 0;
        for row in self.db.list_tracked().await? {
            if !matches!(row.sync_status, SyncStatus::Pending | SyncStatus::Syncing) {
                continue;
            }
            if !self.options.mode.uploads_enabled() {
                continue;
            }
            let local = absolute_local_path(&self.sync_root, &row.local_path)?;
            if tokio::fs::metadata(&local).await.is_err() {
                continue;
            }
            self.manager
                .enqueue(row, OperationKind::Upload, self.options.upload_priority)
                .await?;
            requeued += 1;
        }
        if requeued > 0 {
            info!(requeued, "re-queued interrupted transfers");
        }
        Ok(requeued)
    }

    pub async fn open_conflicts(
        &self,
    ) -> Result<Vec<super::database::ConflictRecord>, EngineError> {
        Ok(self.db.open_conflicts().await?)
    }

    async fn probe_remote(&self, remote_path: &str) -> RemoteProbe {
        match self.manager.remote_metadata(remote_path).await {
            Ok(Some(object)) => RemoteProbe::Found(object),
            Ok(None) => RemoteProbe::Absent,
            Err(err) => {
                warn!(remote = %remote_path, "remote metadata unavailable: {err}");
                RemoteProbe::Unreachable
            }
        }
    }

    fn relative_from_remote(&self, remote_path: &str) -> String {
        let prefix = self.options.remote_prefix.trim_end_matches('/');
        remote_path
            .strip_prefix(prefix)
            .unwrap_or(remote_path)
            .trim_start_matches('/')
            .to_string()
    }
}

fn parse_remote_modified(value: Option<&str>) -> Option<i64> {
    let value = value?;
    OffsetDateTime::parse(value, &Rfc3339)
        .ok()
        .map(|stamp| stamp.unix_timestamp())
}

async fn collect_local_files(root: &Path) -> io::Result<Vec<String>> {
    let mut stack = vec![root.to_path_buf()];
    let mut out = Vec::new();
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file()
                && let Some(rel) = relative_local_path(root, &path)
            {
                out.push(rel);
            }
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::manager::ManagerConfig;
    use crate::sync::metadata::SyncStatus;
    use crate::sync::retry::RetryPolicy;
    use driftsync_core::{ObjectMeta, StorageError, TransferContext};
    use sqlx::SqlitePool;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    /// Functional in-memory object store shared between the manager under
    /// test and the assertions.
    #[derive(Clone, Default)]
    struct MemoryStore {
        objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    }

    #[derive(Clone)]
    struct StoredObject {
        bytes: Vec<u8>,
        sha256: String,
        modified: Option<String>,
    }

    impl MemoryStore {
        fn insert(&self, path: &str, bytes: &[u8], modified: Option<&str>) {
            self.objects.lock().unwrap().insert(
                path.to_string(),
                StoredObject {
                    bytes: bytes.to_vec(),
                    sha256: delta::content_hash(bytes),
                    modified: modified.map(String::from),
                },
            );
        }

        fn contains(&self, path: &str) -> bool {
            self.objects.lock().unwrap().contains_key(path)
        }

        fn bytes(&self, path: &str) -> Option<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(path)
                .map(|object| object.bytes.clone())
        }
    }

    impl StorageBackend for MemoryStore {
        async fn upload_file(
            &self,
            local_path: &Path,
            remote_path: &str,
            meta: &ObjectMeta,
            ctx: &TransferContext,
        ) -> Result<(), StorageError> {
            ctx.ensure_active()?;
            let bytes = tokio::fs::read(local_path).await?;
            self.objects.lock().unwrap().insert(
                remote_path.to_string(),
                StoredObject {
                    bytes,
                    sha256: meta.sha256.clone(),
                    modified: None,
                },
            );
            ctx.report_progress(1.0);
            Ok(())
        }

        async fn download_file(
            &self,
            remote_path: &str,
            local_path: &Path,
            ctx: &TransferContext,
        ) -> Result<(), StorageError> {
            ctx.ensure_active()?;
            let stored = self.objects.lock().unwrap().get(remote_path).cloned();
            let Some(stored) = stored else {
                return Err(StorageError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no such object",
                )));
            };
            if let Some(parent) = local_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(local_path, &stored.bytes).await?;
            Ok(())
        }

        async fn delete_file(&self, remote_path: &str) -> Result<(), StorageError> {
            // Absent objects delete cleanly.
            self.objects.lock().unwrap().remove(remote_path);
            Ok(())
        }

        async fn file_exists(&self, remote_path: &str) -> Result<bool, StorageError> {
            Ok(self.contains(remote_path))
        }

        async fn get_file_metadata(
            &self,
            remote_path: &str,
        ) -> Result<Option<RemoteObject>, StorageError> {
            Ok(self.objects.lock().unwrap().get(remote_path).map(|stored| {
                RemoteObject {
                    path: remote_path.to_string(),
                    size: stored.bytes.len() as u64,
                    sha256: Some(stored.sha256.clone()),
                    modified: stored.modified.clone(),
                    mime_type: None,
                }
            }))
        }

        async fn list_files(&self, prefix: &str) -> Result<Vec<RemoteObject>, StorageError> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .iter()
                .filter(|(path, _)| path.starts_with(prefix))
                .map(|(path, stored)| RemoteObject {
                    path: path.clone(),
                    size: stored.bytes.len() as u64,
                    sha256: Some(stored.sha256.clone()),
                    modified: stored.modified.clone(),
                    mime_type: None,
                })
                .collect())
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }

    struct Rig {
        engine: FileSyncEngine<MemoryStore>,
        store: MemoryStore,
        db: SyncDatabase,
        root: PathBuf,
        shutdown: CancellationToken,
        _dir: TempDir,
    }

    impl Drop for Rig {
        fn drop(&mut self) {
            self.shutdown.cancel();
        }
    }

    async fn rig(mode: SyncMode, policy: ConflictResolution) -> Rig {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        tokio::fs::create_dir_all(&root).await.unwrap();
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let db = SyncDatabase::from_pool(pool);
        db.init().await.unwrap();

        let store = MemoryStore::default();
        let events = EventBus::new(64);
        let manager = Arc::new(CloudStorageManager::new(
            store.clone(),
            db.clone(),
            root.clone(),
            dir.path().join("scratch"),
            events.clone(),
            ManagerConfig {
                workers: 2,
                retry: RetryPolicy::new(
                    Duration::from_millis(1),
                    Duration::from_millis(2),
                    2,
                    false,
                ),
                poll_interval: Duration::from_millis(10),
                ..ManagerConfig::default()
            },
        ));
        let shutdown = CancellationToken::new();
        manager.spawn_workers(shutdown.clone());

        let engine = FileSyncEngine::new(
            manager,
            db.clone(),
            root.clone(),
            ChunkCache::new(dir.path().join("chunks")),
            events,
            EngineOptions {
                mode,
                conflict_policy: policy,
                remote_prefix: "/media".into(),
                ..EngineOptions::default()
            },
        );
        Rig {
            engine,
            store,
            db,
            root,
            shutdown,
            _dir: dir,
        }
    }

    async fn wait_synced(db: &SyncDatabase, rel: &str) -> FileMetadata {
        for _ in 0..500 {
            if let Some(row) = db.file_by_local_path(rel).await.unwrap()
                && row.sync_status == SyncStatus::Synced
            {
                return row;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{rel} never reached Synced");
    }

    async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    fn rfc3339(stamp: i64) -> String {
        OffsetDateTime::from_unix_timestamp(stamp)
            .unwrap()
            .format(&Rfc3339)
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_file_uploads_and_records_version_one() {
        let rig = rig(SyncMode::Bidirectional, ConflictResolution::Manual).await;
        tokio::fs::write(rig.root.join("notes.txt"), b"v1").await.unwrap();

        let summary = rig.engine.perform_full_sync().await.unwrap();
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.uploads, 1);
        assert_eq!(summary.conflicts, 0);

        let row = wait_synced(&rig.db, "notes.txt").await;
        assert_eq!(row.version, 1);
        assert_eq!(
            row.last_synced_hash.as_deref(),
            Some(row.content_hash.as_str())
        );
        assert_eq!(rig.db.versions_for(&row.file_id).await.unwrap().len(), 1);
        assert_eq!(
            rig.store.bytes("/media/notes.txt").unwrap(),
            b"v1".to_vec()
        );
    }

    #[tokio::test]
    async fn clean_edit_appends_a_delta_version() {
        let rig = rig(SyncMode::Bidirectional, ConflictResolution::Manual).await;
        tokio::fs::write(rig.root.join("notes.txt"), b"v1").await.unwrap();
        rig.engine.perform_full_sync().await.unwrap();
        wait_synced(&rig.db, "notes.txt").await;

        tokio::fs::write(rig.root.join("notes.txt"), b"v1 plus more")
            .await
            .unwrap();
        rig.engine.perform_full_sync().await.unwrap();
        let row = wait_synced(&rig.db, "notes.txt").await;
        assert_eq!(row.version, 2);

        let versions = rig.db.versions_for(&row.file_id).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].parent_version, Some(1));
        let delta_info = versions[1].delta_info.as_ref().expect("delta recorded");
        assert_eq!(
            delta::apply_delta(b"v1", delta_info).unwrap(),
            b"v1 plus more".to_vec()
        );
        assert_eq!(
            rig.store.bytes("/media/notes.txt").unwrap(),
            b"v1 plus more".to_vec()
        );
    }

    #[tokio::test]
    async fn divergence_raises_a_conflict_regardless_of_timestamps() {
        for remote_stamp in ["2030-01-01T00:00:00Z", "1990-01-01T00:00:00Z"] {
            let rig = rig(SyncMode::Bidirectional, ConflictResolution::Manual).await;
            tokio::fs::write(rig.root.join("notes.txt"), b"base").await.unwrap();
            rig.engine.perform_full_sync().await.unwrap();
            wait_synced(&rig.db, "notes.txt").await;

            // Both sides move independently.
            rig.store
                .insert("/media/notes.txt", b"remote-edit", Some(remote_stamp));
            tokio::fs::write(rig.root.join("notes.txt"), b"local-edit")
                .await
                .unwrap();

            let outcome = rig.engine.process_local_path("notes.txt").await.unwrap();
            assert_eq!(outcome, ChangeOutcome::ConflictRaised);

            let open = rig.engine.open_conflicts().await.unwrap();
            assert_eq!(open.len(), 1);
            assert_eq!(open[0].conflict_type, ConflictType::ContentMismatch);

            let row = rig.db.file_by_local_path("notes.txt").await.unwrap().unwrap();
            assert_eq!(row.sync_status, SyncStatus::Conflict);
            // Neither side was overwritten.
            assert_eq!(
                rig.store.bytes("/media/notes.txt").unwrap(),
                b"remote-edit".to_vec()
            );
            assert_eq!(
                tokio::fs::read(rig.root.join("notes.txt")).await.unwrap(),
                b"local-edit".to_vec()
            );
        }
    }

    #[tokio::test]
    async fn newer_wins_downloads_the_newer_remote() {
        let rig = rig(SyncMode::Bidirectional, ConflictResolution::NewerWins).await;
        tokio::fs::write(rig.root.join("notes.txt"), b"base").await.unwrap();
        rig.engine.perform_full_sync().await.unwrap();
        wait_synced(&rig.db, "notes.txt").await;

        rig.store
            .insert("/media/notes.txt", b"remote-new", Some("2030-01-01T00:00:00Z"));
        tokio::fs::write(rig.root.join("notes.txt"), b"local-new")
            .await
            .unwrap();

        let outcome = rig.engine.process_local_path("notes.txt").await.unwrap();
        assert_eq!(outcome, ChangeOutcome::ConflictRaised);

        let root = rig.root.clone();
        wait_until("remote content to land locally", || {
            std::fs::read(root.join("notes.txt"))
                .map(|bytes| bytes == b"remote-new")
                .unwrap_or(false)
        })
        .await;

        // The conflict is closed with the stored resolution.
        assert!(rig.engine.open_conflicts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exact_timestamp_tie_keeps_local_and_uploads() {
        let rig = rig(SyncMode::Bidirectional, ConflictResolution::NewerWins).await;
        tokio::fs::write(rig.root.join("notes.txt"), b"base").await.unwrap();
        rig.engine.perform_full_sync().await.unwrap();
        wait_synced(&rig.db, "notes.txt").await;

        tokio::fs::write(rig.root.join("notes.txt"), b"local-new")
            .await
            .unwrap();
        let mtime = file_mtime(&rig.root.join("notes.txt")).await.unwrap();
        rig.store
            .insert("/media/notes.txt", b"remote-new", Some(&rfc3339(mtime)));

        let outcome = rig.engine.process_local_path("notes.txt").await.unwrap();
        assert_eq!(outcome, ChangeOutcome::ConflictRaised);

        let store = rig.store.clone();
        wait_until("local content to win the tie", || {
            store.bytes("/media/notes.txt") == Some(b"local-new".to_vec())
        })
        .await;
        assert_eq!(
            tokio::fs::read(rig.root.join("notes.txt")).await.unwrap(),
            b"local-new".to_vec()
        );
    }

    #[tokio::test]
    async fn keep_both_renames_local_and_restores_remote() {
        let rig = rig(SyncMode::Bidirectional, ConflictResolution::KeepBoth).await;
        tokio::fs::write(rig.root.join("notes.txt"), b"base").await.unwrap();
        rig.engine.perform_full_sync().await.unwrap();
        wait_synced(&rig.db, "notes.txt").await;

        rig.store
            .insert("/media/notes.txt", b"remote-x", Some("2030-01-01T00:00:00Z"));
        tokio::fs::write(rig.root.join("notes.txt"), b"local-x")
            .await
            .unwrap();

        let outcome = rig.engine.process_local_path("notes.txt").await.unwrap();
        assert_eq!(outcome, ChangeOutcome::ConflictRaised);

        // The losing local copy was renamed aside and survives.
        let mut names: Vec<String> = std::fs::read_dir(&rig.root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let renamed = names
            .iter()
            .find(|name| name.contains("(conflict"))
            .expect("renamed conflict copy exists")
            .clone();
        assert_eq!(
            std::fs::read(rig.root.join(&renamed)).unwrap(),
            b"local-x".to_vec()
        );

        let store = rig.store.clone();
        let renamed_remote = format!("/media/{renamed}");
        wait_until("conflict copy to upload", || {
            store.bytes(&renamed_remote) == Some(b"local-x".to_vec())
        })
        .await;
        let root = rig.root.clone();
        wait_until("remote content back at the original path", || {
            std::fs::read(root.join("notes.txt"))
                .map(|bytes| bytes == b"remote-x")
                .unwrap_or(false)
        })
        .await;
    }

    #[tokio::test]
    async fn mirror_mode_deletes_remote_for_removed_local_files() {
        let rig = rig(SyncMode::Mirror, ConflictResolution::Manual).await;
        tokio::fs::write(rig.root.join("clip.mp4"), b"frames").await.unwrap();
        rig.engine.perform_full_sync().await.unwrap();
        let row = wait_synced(&rig.db, "clip.mp4").await;
        assert!(rig.store.contains("/media/clip.mp4"));

        tokio::fs::remove_file(rig.root.join("clip.mp4")).await.unwrap();
        rig.engine.perform_full_sync().await.unwrap();

        let store = rig.store.clone();
        wait_until("remote object to disappear", || {
            !store.contains("/media/clip.mp4")
        })
        .await;
        for _ in 0..500 {
            let stored = rig.db.file_by_id(&row.file_id).await.unwrap().unwrap();
            if stored.deleted {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("row was never tombstoned");
    }

    #[tokio::test]
    async fn mirror_delete_tolerates_an_already_absent_remote() {
        let rig = rig(SyncMode::Mirror, ConflictResolution::Manual).await;
        tokio::fs::write(rig.root.join("clip.mp4"), b"frames").await.unwrap();
        rig.engine.perform_full_sync().await.unwrap();
        let row = wait_synced(&rig.db, "clip.mp4").await;

        // Remote side already lost the object.
        rig.store.objects.lock().unwrap().remove("/media/clip.mp4");
        tokio::fs::remove_file(rig.root.join("clip.mp4")).await.unwrap();
        rig.engine.perform_full_sync().await.unwrap();

        for _ in 0..500 {
            let stored = rig.db.file_by_id(&row.file_id).await.unwrap().unwrap();
            if stored.deleted {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let stored = rig.db.file_by_id(&row.file_id).await.unwrap().unwrap();
        assert!(stored.deleted);
        // No failed-final operations: deleting the absent object is a no-op.
        assert!(rig
            .engine
            .manager()
            .unresolved_failures()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn download_only_mode_never_uploads_but_pulls_remote_files() {
        let rig = rig(SyncMode::DownloadOnly, ConflictResolution::Manual).await;
        tokio::fs::write(rig.root.join("local.txt"), b"stays-local")
            .await
            .unwrap();
        rig.store
            .insert("/media/incoming.txt", b"from-cloud", Some("2024-01-01T00:00:00Z"));

        let summary = rig.engine.perform_full_sync().await.unwrap();
        assert_eq!(summary.uploads, 0);
        assert_eq!(summary.downloads, 1);

        let root = rig.root.clone();
        wait_until("remote file to arrive", || {
            std::fs::read(root.join("incoming.txt"))
                .map(|bytes| bytes == b"from-cloud")
                .unwrap_or(false)
        })
        .await;
        // Nothing was pushed.
        assert!(!rig.store.contains("/media/local.txt"));
    }

    #[tokio::test]
    async fn rename_moves_the_remote_object() {
        let rig = rig(SyncMode::Bidirectional, ConflictResolution::Manual).await;
        tokio::fs::write(rig.root.join("old.txt"), b"payload").await.unwrap();
        rig.engine.perform_full_sync().await.unwrap();
        wait_synced(&rig.db, "old.txt").await;

        tokio::fs::rename(rig.root.join("old.txt"), rig.root.join("new.txt"))
            .await
            .unwrap();
        rig.engine
            .process_local_rename("old.txt", "new.txt")
            .await
            .unwrap();

        let store = rig.store.clone();
        wait_until("object to move to the new key", || {
            store.bytes("/media/new.txt") == Some(b"payload".to_vec())
                && !store.contains("/media/old.txt")
        })
        .await;
        let row = rig.db.file_by_local_path("new.txt").await.unwrap().unwrap();
        assert_eq!(row.remote_path, "/media/new.txt");
    }

    #[tokio::test]
    async fn requeue_incomplete_resumes_interrupted_work_after_restart() {
        let rig = rig(SyncMode::Bidirectional, ConflictResolution::Manual).await;
        tokio::fs::write(rig.root.join("notes.txt"), b"v1").await.unwrap();
        let (size, hash) = file_digest(&rig.root.join("notes.txt")).await.unwrap();
        // Simulate a row left mid-flight by a previous process.
        let mut meta = FileMetadata::new_local(
            "notes.txt",
            "/media/notes.txt",
            size,
            hash,
            now_unix(),
            8 * 1024 * 1024,
            now_unix(),
        );
        meta.sync_status = SyncStatus::Syncing;
        rig.db.upsert_file(&meta).await.unwrap();

        assert_eq!(rig.engine.requeue_incomplete().await.unwrap(), 1);
        let row = wait_synced(&rig.db, "notes.txt").await;
        assert_eq!(row.content_hash, meta.content_hash);
        assert!(rig.store.contains("/media/notes.txt"));
    }
}
