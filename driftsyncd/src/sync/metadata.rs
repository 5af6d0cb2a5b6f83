use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sync lifecycle of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
    Conflict,
    Offline,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Offline => "offline",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SyncStatus::Pending),
            "syncing" => Some(SyncStatus::Syncing),
            "synced" => Some(SyncStatus::Synced),
            "failed" => Some(SyncStatus::Failed),
            "conflict" => Some(SyncStatus::Conflict),
            "offline" => Some(SyncStatus::Offline),
            _ => None,
        }
    }
}

/// Canonical description of a tracked file.
///
/// `file_id` is minted once on first observation and survives renames; paths
/// are sync-root-relative with `/` separators. The chunk fields describe the
/// multipart plan for the current content: `uploaded_chunks` always stays
/// within `[0, total_chunks)`, and `Synced` means every chunk is durably
/// stored remotely under `content_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    pub local_path: String,
    pub remote_path: String,
    pub size_bytes: u64,
    pub content_hash: String,
    pub mime_type: Option<String>,
    pub created_at: i64,
    pub modified_at: i64,
    pub version: i64,
    pub sync_status: SyncStatus,
    pub last_synced_hash: Option<String>,
    pub chunk_size_bytes: u64,
    pub total_chunks: u32,
    pub uploaded_chunks: BTreeSet<u32>,
    pub deleted: bool,
}

impl FileMetadata {
    pub fn new_local(
        local_path: impl Into<String>,
        remote_path: impl Into<String>,
        size_bytes: u64,
        content_hash: impl Into<String>,
        modified_at: i64,
        chunk_size_bytes: u64,
        now: i64,
    ) -> Self {
        let local_path = local_path.into();
        let mime_type = mime_type_for(&local_path);
        Self {
            file_id: Uuid::new_v4().to_string(),
            local_path,
            remote_path: remote_path.into(),
            size_bytes,
            content_hash: content_hash.into(),
            mime_type,
            created_at: now,
            modified_at,
            version: 0,
            sync_status: SyncStatus::Pending,
            last_synced_hash: None,
            chunk_size_bytes,
            total_chunks: total_chunks_for(size_bytes, chunk_size_bytes),
            uploaded_chunks: BTreeSet::new(),
            deleted: false,
        }
    }

    /// Re-plans chunking after the content changed.
    pub fn apply_new_content(&mut self, size_bytes: u64, content_hash: String, modified_at: i64) {
        self.size_bytes = size_bytes;
        self.content_hash = content_hash;
        self.modified_at = modified_at;
        self.total_chunks = total_chunks_for(size_bytes, self.chunk_size_bytes);
        self.uploaded_chunks.clear();
        self.sync_status = SyncStatus::Pending;
    }

    pub fn chunk_invariant_holds(&self) -> bool {
        self.uploaded_chunks
            .iter()
            .all(|index| *index < self.total_chunks)
    }

    pub fn is_fully_uploaded(&self) -> bool {
        self.uploaded_chunks.len() as u32 == self.total_chunks
    }
}

pub fn total_chunks_for(size_bytes: u64, chunk_size_bytes: u64) -> u32 {
    size_bytes.div_ceil(chunk_size_bytes.max(1)) as u32
}

/// Extension-based sniffing; the sync core mostly moves media files around.
pub fn mime_type_for(path: &str) -> Option<String> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" | "md" => "text/plain",
        _ => return None,
    };
    Some(mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_plan_covers_the_tail() {
        assert_eq!(total_chunks_for(0, 4), 0);
        assert_eq!(total_chunks_for(4, 4), 1);
        assert_eq!(total_chunks_for(5, 4), 2);
        assert_eq!(total_chunks_for(8, 4), 2);
    }

    #[test]
    fn new_local_file_starts_pending_with_empty_chunk_set() {
        let meta = FileMetadata::new_local("clips/a.mp4", "/media/clips/a.mp4", 10, "h", 5, 4, 5);
        assert_eq!(meta.sync_status, SyncStatus::Pending);
        assert_eq!(meta.total_chunks, 3);
        assert!(meta.uploaded_chunks.is_empty());
        assert!(meta.chunk_invariant_holds());
        assert!(!meta.is_fully_uploaded());
        assert_eq!(meta.mime_type.as_deref(), Some("video/mp4"));
    }

    #[test]
    fn new_content_resets_the_chunk_plan() {
        let mut meta = FileMetadata::new_local("a.txt", "/a.txt", 10, "h1", 5, 4, 5);
        meta.uploaded_chunks.insert(0);
        meta.apply_new_content(3, "h2".into(), 9);
        assert_eq!(meta.total_chunks, 1);
        assert!(meta.uploaded_chunks.is_empty());
        assert_eq!(meta.content_hash, "h2");
        assert_eq!(meta.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn invariant_detects_out_of_range_chunks() {
        let mut meta = FileMetadata::new_local("a.txt", "/a.txt", 8, "h", 5, 4, 5);
        meta.uploaded_chunks.insert(1);
        assert!(meta.chunk_invariant_holds());
        meta.uploaded_chunks.insert(2);
        assert!(!meta.chunk_invariant_holds());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Syncing,
            SyncStatus::Synced,
            SyncStatus::Failed,
            SyncStatus::Conflict,
            SyncStatus::Offline,
        ] {
            assert_eq!(SyncStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SyncStatus::parse("bogus"), None);
    }
}
