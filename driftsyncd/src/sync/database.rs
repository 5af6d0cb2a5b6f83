use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use driftsync_core::ResumeState;
use sqlx::{Row, SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions};
use thiserror::Error;

use super::conflict::{ConflictResolution, ConflictType, SideSnapshot};
use super::delta::DeltaInfo;
use super::metadata::{FileMetadata, SyncStatus};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("data directory is unavailable")]
    MissingDataDir,
    #[error("invalid sync status: {0}")]
    InvalidStatus(String),
    #[error("invalid conflict type: {0}")]
    InvalidConflictType(String),
    #[error("invalid conflict resolution: {0}")]
    InvalidResolution(String),
    #[error("invalid version origin: {0}")]
    InvalidOrigin(String),
    #[error("conflict {0} not found")]
    MissingConflict(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrigin {
    Local,
    Remote,
}

const FILE_SELECT: &str =
    "SELECT file_id, local_path, remote_path, size_bytes, content_hash, mime_type,
            created_at, modified_at, version, sync_status, last_synced_hash,
            chunk_size_bytes, total_chunks, uploaded_chunks, deleted
     FROM files";

impl VersionOrigin {
    fn as_str(&self) -> &'static str {
        match self {
            VersionOrigin::Local => "local",
            VersionOrigin::Remote => "remote",
        }
    }

    fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "local" => Ok(VersionOrigin::Local),
            "remote" => Ok(VersionOrigin::Remote),
            other => Err(DatabaseError::InvalidOrigin(other.to_string())),
        }
    }
}

/// Input for appending one immutable history entry.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub version_number: i64,
    pub content_hash: String,
    pub size_bytes: u64,
    pub created_at: i64,
    pub created_by: VersionOrigin,
    pub parent_version: Option<i64>,
    pub delta_info: Option<DeltaInfo>,
    pub storage_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    pub id: i64,
    pub file_id: String,
    pub version_number: i64,
    pub content_hash: String,
    pub size_bytes: u64,
    pub created_at: i64,
    pub created_by: VersionOrigin,
    pub parent_version: Option<i64>,
    pub delta_info: Option<DeltaInfo>,
    pub storage_path: String,
}

/// Terminal and intermediate states in the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationLogStatus {
    Queued,
    Running,
    Completed,
    FailedFinal,
    Cancelled,
}

impl OperationLogStatus {
    fn as_str(&self) -> &'static str {
        match self {
            OperationLogStatus::Queued => "queued",
            OperationLogStatus::Running => "running",
            OperationLogStatus::Completed => "completed",
            OperationLogStatus::FailedFinal => "failed-final",
            OperationLogStatus::Cancelled => "cancelled",
        }
    }

    fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "queued" => Ok(OperationLogStatus::Queued),
            "running" => Ok(OperationLogStatus::Running),
            "completed" => Ok(OperationLogStatus::Completed),
            "failed-final" => Ok(OperationLogStatus::FailedFinal),
            "cancelled" => Ok(OperationLogStatus::Cancelled),
            other => Err(DatabaseError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
    pub id: i64,
    pub file_id: String,
    pub kind: String,
    pub status: OperationLogStatus,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
    pub id: i64,
    pub file_id: String,
    pub local_path: String,
    pub remote_path: String,
    pub local_meta: SideSnapshot,
    pub remote_meta: SideSnapshot,
    pub conflict_type: ConflictType,
    pub detected_at: i64,
    pub resolution: Option<ConflictResolution>,
    pub resolved_at: Option<i64>,
}

/// Durable store behind the engine and the manager: tracked files, version
/// history, the operation log, and conflicts. Multi-row writes that must not
/// tear (version append + file-row advance, conflict resolution) run inside
/// transactions.
#[derive(Clone)]
pub struct SyncDatabase {
    pool: SqlitePool,
}

impl SyncDatabase {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new(database_url: &str) -> Result<Self, DatabaseError> {
        let pool = SqlitePool::connect(database_url).await?;
        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    pub async fn new_at(path: &PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    pub async fn new_default() -> Result<Self, DatabaseError> {
        let mut path = dirs::data_dir().ok_or(DatabaseError::MissingDataDir)?;
        path.push("driftsync");
        path.push("state.db");
        Self::new_at(&path).await
    }

    pub async fn init(&self) -> Result<(), DatabaseError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    // ---- files ----

    pub async fn upsert_file(&self, meta: &FileMetadata) -> Result<(), DatabaseError> {
        let uploaded = serde_json::to_string(&meta.uploaded_chunks)?;
        sqlx::query(
            "INSERT INTO files (
                file_id, local_path, remote_path, size_bytes, content_hash,
                mime_type, created_at, modified_at, version, sync_status,
                last_synced_hash, chunk_size_bytes, total_chunks,
                uploaded_chunks, deleted
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(file_id) DO UPDATE SET
                local_path = excluded.local_path,
                remote_path = excluded.remote_path,
                size_bytes = excluded.size_bytes,
                content_hash = excluded.content_hash,
                mime_type = excluded.mime_type,
                modified_at = excluded.modified_at,
                version = excluded.version,
                sync_status = excluded.sync_status,
                last_synced_hash = excluded.last_synced_hash,
                chunk_size_bytes = excluded.chunk_size_bytes,
                total_chunks = excluded.total_chunks,
                uploaded_chunks = excluded.uploaded_chunks,
                deleted = excluded.deleted",
        )
        .bind(&meta.file_id)
        .bind(&meta.local_path)
        .bind(&meta.remote_path)
        .bind(meta.size_bytes as i64)
        .bind(&meta.content_hash)
        .bind(&meta.mime_type)
        .bind(meta.created_at)
        .bind(meta.modified_at)
        .bind(meta.version)
        .bind(meta.sync_status.as_str())
        .bind(&meta.last_synced_hash)
        .bind(meta.chunk_size_bytes as i64)
        .bind(i64::from(meta.total_chunks))
        .bind(uploaded)
        .bind(if meta.deleted { 1 } else { 0 })
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn file_by_id(&self, file_id: &str) -> Result<Option<FileMetadata>, DatabaseError> {
        let row = sqlx::query(&format!("{FILE_SELECT} WHERE file_id = ?1"))
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_file).transpose()
    }

    pub async fn file_by_local_path(
        &self,
        local_path: &str,
    ) -> Result<Option<FileMetadata>, DatabaseError> {
        let row = sqlx::query(&format!("{FILE_SELECT} WHERE local_path = ?1"))
            .bind(local_path)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_file).transpose()
    }

    pub async fn file_by_remote_path(
        &self,
        remote_path: &str,
    ) -> Result<Option<FileMetadata>, DatabaseError> {
        let row = sqlx::query(&format!("{FILE_SELECT} WHERE remote_path = ?1"))
            .bind(remote_path)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_file).transpose()
    }

    pub async fn list_tracked(&self) -> Result<Vec<FileMetadata>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "{FILE_SELECT} WHERE deleted = 0 ORDER BY local_path ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_file).collect()
    }

    pub async fn set_sync_status(
        &self,
        file_id: &str,
        status: SyncStatus,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE files SET sync_status = ?1 WHERE file_id = ?2")
            .bind(status.as_str())
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_deleted(&self, file_id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE files SET deleted = 1 WHERE file_id = ?1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upload confirmed: the full chunk range is durably remote and the
    /// remote hash now matches the local one.
    pub async fn mark_upload_synced(
        &self,
        file_id: &str,
        content_hash: &str,
        total_chunks: u32,
    ) -> Result<(), DatabaseError> {
        let full: BTreeSet<u32> = (0..total_chunks).collect();
        let uploaded = serde_json::to_string(&full)?;
        sqlx::query(
            "UPDATE files SET sync_status = 'synced', last_synced_hash = ?1,
                    uploaded_chunks = ?2, transfer_state = NULL
             WHERE file_id = ?3",
        )
        .bind(content_hash)
        .bind(uploaded)
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Download confirmed: local content now mirrors the remote object.
    pub async fn mark_download_synced(
        &self,
        file_id: &str,
        content_hash: &str,
        size_bytes: u64,
        modified_at: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE files SET sync_status = 'synced', content_hash = ?1,
                    last_synced_hash = ?1, size_bytes = ?2, modified_at = ?3,
                    uploaded_chunks = '[]', transfer_state = NULL
             WHERE file_id = ?4",
        )
        .bind(content_hash)
        .bind(size_bytes as i64)
        .bind(modified_at)
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- multipart resume state (manager-owned) ----

    pub async fn save_transfer_state(
        &self,
        file_id: &str,
        state: &ResumeState,
    ) -> Result<(), DatabaseError> {
        let uploaded: BTreeSet<u32> = state.parts.keys().copied().collect();
        sqlx::query(
            "UPDATE files SET transfer_state = ?1, uploaded_chunks = ?2 WHERE file_id = ?3",
        )
        .bind(serde_json::to_string(state)?)
        .bind(serde_json::to_string(&uploaded)?)
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_transfer_state(&self, file_id: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE files SET transfer_state = NULL, uploaded_chunks = '[]' WHERE file_id = ?1",
        )
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_transfer_state(&self, file_id: &str) -> Result<ResumeState, DatabaseError> {
        let row = sqlx::query("SELECT transfer_state FROM files WHERE file_id = ?1")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(ResumeState::default());
        };
        let state: Option<String> = row.try_get("transfer_state")?;
        match state {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(ResumeState::default()),
        }
    }

    // ---- versions ----

    /// Appends a version and advances the file row in one transaction: a
    /// crash can never leave the row pointing at a version that was not
    /// committed.
    pub async fn record_version(
        &self,
        meta: &FileMetadata,
        version: &NewVersion,
    ) -> Result<i64, DatabaseError> {
        let uploaded = serde_json::to_string(&meta.uploaded_chunks)?;
        let delta_json = version
            .delta_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO versions (
                file_id, version_number, content_hash, size_bytes, created_at,
                created_by, parent_version, delta_info, storage_path
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&meta.file_id)
        .bind(version.version_number)
        .bind(&version.content_hash)
        .bind(version.size_bytes as i64)
        .bind(version.created_at)
        .bind(version.created_by.as_str())
        .bind(version.parent_version)
        .bind(delta_json)
        .bind(&version.storage_path)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO files (
                file_id, local_path, remote_path, size_bytes, content_hash,
                mime_type, created_at, modified_at, version, sync_status,
                last_synced_hash, chunk_size_bytes, total_chunks,
                uploaded_chunks, deleted
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(file_id) DO UPDATE SET
                local_path = excluded.local_path,
                remote_path = excluded.remote_path,
                size_bytes = excluded.size_bytes,
                content_hash = excluded.content_hash,
                mime_type = excluded.mime_type,
                modified_at = excluded.modified_at,
                version = excluded.version,
                sync_status = excluded.sync_status,
                last_synced_hash = excluded.last_synced_hash,
                chunk_size_bytes = excluded.chunk_size_bytes,
                total_chunks = excluded.total_chunks,
                uploaded_chunks = excluded.uploaded_chunks,
                deleted = excluded.deleted",
        )
        .bind(&meta.file_id)
        .bind(&meta.local_path)
        .bind(&meta.remote_path)
        .bind(meta.size_bytes as i64)
        .bind(&meta.content_hash)
        .bind(&meta.mime_type)
        .bind(meta.created_at)
        .bind(meta.modified_at)
        .bind(meta.version)
        .bind(meta.sync_status.as_str())
        .bind(&meta.last_synced_hash)
        .bind(meta.chunk_size_bytes as i64)
        .bind(i64::from(meta.total_chunks))
        .bind(uploaded)
        .bind(if meta.deleted { 1 } else { 0 })
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted.last_insert_rowid())
    }

    pub async fn versions_for(&self, file_id: &str) -> Result<Vec<VersionRecord>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT id, file_id, version_number, content_hash, size_bytes, created_at,
                    created_by, parent_version, delta_info, storage_path
             FROM versions WHERE file_id = ?1 ORDER BY version_number ASC",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_version).collect()
    }

    pub async fn latest_version(
        &self,
        file_id: &str,
    ) -> Result<Option<VersionRecord>, DatabaseError> {
        let row = sqlx::query(
            "SELECT id, file_id, version_number, content_hash, size_bytes, created_at,
                    created_by, parent_version, delta_info, storage_path
             FROM versions WHERE file_id = ?1 ORDER BY version_number DESC LIMIT 1",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_version).transpose()
    }

    /// Retention: keep the newest `keep_last` versions, drop the rest.
    pub async fn prune_versions(
        &self,
        file_id: &str,
        keep_last: u32,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM versions WHERE file_id = ?1 AND version_number <= (
                SELECT COALESCE(MAX(version_number), 0) - ?2 FROM versions WHERE file_id = ?1
             )",
        )
        .bind(file_id)
        .bind(i64::from(keep_last))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ---- operation log ----

    pub async fn record_operation(
        &self,
        file_id: &str,
        kind: &str,
        priority: i32,
        max_retries: u32,
        created_at: i64,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO operations (file_id, kind, status, priority, max_retries, created_at)
             VALUES (?1, ?2, 'queued', ?3, ?4, ?5)",
        )
        .bind(file_id)
        .bind(kind)
        .bind(priority)
        .bind(i64::from(max_retries))
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn operation_started(&self, id: i64, started_at: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE operations SET status = 'running', started_at = ?1 WHERE id = ?2")
            .bind(started_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn operation_requeued(
        &self,
        id: i64,
        retry_count: u32,
        error: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE operations SET status = 'queued', retry_count = ?1, error = ?2 WHERE id = ?3",
        )
        .bind(i64::from(retry_count))
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn operation_finished(
        &self,
        id: i64,
        status: OperationLogStatus,
        completed_at: i64,
        error: Option<&str>,
        retry_count: u32,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE operations SET status = ?1, completed_at = ?2, error = ?3, retry_count = ?4
             WHERE id = ?5",
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(error)
        .bind(i64::from(retry_count))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn operation_by_id(
        &self,
        id: i64,
    ) -> Result<Option<OperationRecord>, DatabaseError> {
        let row = sqlx::query(
            "SELECT id, file_id, kind, status, priority, retry_count, max_retries,
                    created_at, started_at, completed_at, error, acknowledged
             FROM operations WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_operation).transpose()
    }

    /// Failed-final operations nobody has acknowledged yet. These stay
    /// queryable forever; silent failure is not an option.
    pub async fn unacknowledged_failures(&self) -> Result<Vec<OperationRecord>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT id, file_id, kind, status, priority, retry_count, max_retries,
                    created_at, started_at, completed_at, error, acknowledged
             FROM operations
             WHERE status = 'failed-final' AND acknowledged = 0
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_operation).collect()
    }

    pub async fn acknowledge_operation(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE operations SET acknowledged = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- conflicts ----

    pub async fn record_conflict(
        &self,
        file_id: &str,
        local_path: &str,
        remote_path: &str,
        local_meta: &SideSnapshot,
        remote_meta: &SideSnapshot,
        conflict_type: ConflictType,
        detected_at: i64,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO conflicts (
                file_id, local_path, remote_path, local_meta, remote_meta,
                conflict_type, detected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(file_id)
        .bind(local_path)
        .bind(remote_path)
        .bind(serde_json::to_string(local_meta)?)
        .bind(serde_json::to_string(remote_meta)?)
        .bind(conflict_type.as_str())
        .bind(detected_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn conflict_by_id(&self, id: i64) -> Result<Option<ConflictRecord>, DatabaseError> {
        let row = sqlx::query(
            "SELECT id, file_id, local_path, remote_path, local_meta, remote_meta,
                    conflict_type, detected_at, resolution, resolved_at
             FROM conflicts WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_conflict).transpose()
    }

    pub async fn open_conflicts(&self) -> Result<Vec<ConflictRecord>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT id, file_id, local_path, remote_path, local_meta, remote_meta,
                    conflict_type, detected_at, resolution, resolved_at
             FROM conflicts WHERE resolution IS NULL ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_conflict).collect()
    }

    /// Terminal and idempotent: the first resolution wins and a second call
    /// returns the stored one without touching the row.
    pub async fn resolve_conflict(
        &self,
        id: i64,
        resolution: ConflictResolution,
        resolved_at: i64,
    ) -> Result<ConflictResolution, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT resolution FROM conflicts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DatabaseError::MissingConflict(id))?;

        let existing: Option<String> = row.try_get("resolution")?;
        if let Some(existing) = existing {
            let stored = ConflictResolution::parse(&existing)
                .ok_or_else(|| DatabaseError::InvalidResolution(existing.clone()))?;
            return Ok(stored);
        }

        sqlx::query(
            "UPDATE conflicts SET resolution = ?1, resolved_at = ?2
             WHERE id = ?3 AND resolution IS NULL",
        )
        .bind(resolution.as_str())
        .bind(resolved_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(resolution)
    }
}

fn row_to_file(row: sqlx::sqlite::SqliteRow) -> Result<FileMetadata, DatabaseError> {
    let status: String = row.try_get("sync_status")?;
    let uploaded_json: String = row.try_get("uploaded_chunks")?;
    let uploaded: BTreeSet<u32> = serde_json::from_str(&uploaded_json)?;
    let size_bytes: i64 = row.try_get("size_bytes")?;
    let chunk_size: i64 = row.try_get("chunk_size_bytes")?;
    let total_chunks: i64 = row.try_get("total_chunks")?;
    let deleted: i64 = row.try_get("deleted")?;
    Ok(FileMetadata {
        file_id: row.try_get("file_id")?,
        local_path: row.try_get("local_path")?,
        remote_path: row.try_get("remote_path")?,
        size_bytes: size_bytes.max(0) as u64,
        content_hash: row.try_get("content_hash")?,
        mime_type: row.try_get("mime_type")?,
        created_at: row.try_get("created_at")?,
        modified_at: row.try_get("modified_at")?,
        version: row.try_get("version")?,
        sync_status: SyncStatus::parse(&status)
            .ok_or(DatabaseError::InvalidStatus(status))?,
        last_synced_hash: row.try_get("last_synced_hash")?,
        chunk_size_bytes: chunk_size.max(0) as u64,
        total_chunks: total_chunks.max(0) as u32,
        uploaded_chunks: uploaded,
        deleted: deleted != 0,
    })
}

fn row_to_version(row: sqlx::sqlite::SqliteRow) -> Result<VersionRecord, DatabaseError> {
    let created_by: String = row.try_get("created_by")?;
    let delta_json: Option<String> = row.try_get("delta_info")?;
    let delta_info: Option<DeltaInfo> = delta_json
        .map(|json| serde_json::from_str(&json))
        .transpose()?;
    let size_bytes: i64 = row.try_get("size_bytes")?;
    Ok(VersionRecord {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        version_number: row.try_get("version_number")?,
        content_hash: row.try_get("content_hash")?,
        size_bytes: size_bytes.max(0) as u64,
        created_at: row.try_get("created_at")?,
        created_by: VersionOrigin::parse(&created_by)?,
        parent_version: row.try_get("parent_version")?,
        delta_info,
        storage_path: row.try_get("storage_path")?,
    })
}

fn row_to_operation(row: sqlx::sqlite::SqliteRow) -> Result<OperationRecord, DatabaseError> {
    let status: String = row.try_get("status")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let max_retries: i64 = row.try_get("max_retries")?;
    let acknowledged: i64 = row.try_get("acknowledged")?;
    Ok(OperationRecord {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        kind: row.try_get("kind")?,
        status: OperationLogStatus::parse(&status)?,
        priority: row.try_get("priority")?,
        retry_count: retry_count.max(0) as u32,
        max_retries: max_retries.max(0) as u32,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error: row.try_get("error")?,
        acknowledged: acknowledged != 0,
    })
}

fn row_to_conflict(row: sqlx::sqlite::SqliteRow) -> Result<ConflictRecord, DatabaseError> {
    let local_meta: String = row.try_get("local_meta")?;
    let remote_meta: String = row.try_get("remote_meta")?;
    let conflict_type: String = row.try_get("conflict_type")?;
    let resolution: Option<String> = row.try_get("resolution")?;
    Ok(ConflictRecord {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        local_path: row.try_get("local_path")?,
        remote_path: row.try_get("remote_path")?,
        local_meta: serde_json::from_str(&local_meta)?,
        remote_meta: serde_json::from_str(&remote_meta)?,
        conflict_type: ConflictType::parse(&conflict_type)
            .ok_or(DatabaseError::InvalidConflictType(conflict_type))?,
        detected_at: row.try_get("detected_at")?,
        resolution: resolution
            .map(|value| {
                ConflictResolution::parse(&value)
                    .ok_or(DatabaseError::InvalidResolution(value))
            })
            .transpose()?,
        resolved_at: row.try_get("resolved_at")?,
    })
}
