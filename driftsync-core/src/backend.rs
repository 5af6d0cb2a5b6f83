use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::StorageError;

/// Metadata supplied alongside an upload.
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub size_bytes: u64,
    pub sha256: String,
    pub mime_type: Option<String>,
    /// Part size override for multipart transfers.
    pub chunk_size: Option<u64>,
}

/// A remote object as reported by `get_file_metadata`/`list_files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub path: String,
    pub size: u64,
    #[serde(default)]
    pub sha256: Option<String>,
    /// RFC 3339 timestamp; callers parse it with their own clock crate.
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Durable multipart progress: the open session plus the receipt the gateway
/// returned for each completed part. Persisted by the caller so an
/// interrupted upload resumes with the remaining parts only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    pub upload_id: Option<String>,
    pub parts: BTreeMap<u32, String>,
}

impl ResumeState {
    pub fn is_empty(&self) -> bool {
        self.upload_id.is_none() && self.parts.is_empty()
    }
}

pub type ProgressFn = Box<dyn Fn(f64) + Send + Sync>;
pub type PartSink = Box<dyn Fn(&ResumeState) + Send + Sync>;

/// Per-transfer context threaded through backend calls: cooperative
/// cancellation, progress reporting, multipart resume state, and an optional
/// CDN edge endpoint to prefer for reads.
#[derive(Default)]
pub struct TransferContext {
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
    part_sink: Option<PartSink>,
    resume: ResumeState,
    expected_sha256: Option<String>,
    edge_base: Option<Url>,
}

impl TransferContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_part_sink(mut self, sink: PartSink) -> Self {
        self.part_sink = Some(sink);
        self
    }

    pub fn with_resume(mut self, resume: ResumeState) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_expected_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.expected_sha256 = Some(sha256.into());
        self
    }

    pub fn with_edge_base(mut self, edge: Url) -> Self {
        self.edge_base = Some(edge);
        self
    }

    pub fn resume(&self) -> &ResumeState {
        &self.resume
    }

    pub fn expected_sha256(&self) -> Option<&str> {
        self.expected_sha256.as_deref()
    }

    pub fn edge_base(&self) -> Option<&Url> {
        self.edge_base.as_ref()
    }

    /// Checked between parts/chunks so a transfer stops at the next quantum.
    pub fn ensure_active(&self) -> Result<(), StorageError> {
        if self.cancel.is_cancelled() {
            Err(StorageError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn report_progress(&self, fraction: f64) {
        if let Some(progress) = &self.progress {
            progress(fraction.clamp(0.0, 1.0));
        }
    }

    pub fn record_parts(&self, state: &ResumeState) {
        if let Some(sink) = &self.part_sink {
            sink(state);
        }
    }
}

/// Contract for a remote object store.
///
/// Every call is independently retryable by the caller; `upload_file` must be
/// an idempotent overwrite, and `delete_file` succeeds on an already-absent
/// object. Callers stay generic over this trait and never branch on the
/// concrete provider.
pub trait StorageBackend: Send + Sync + 'static {
    fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        meta: &ObjectMeta,
        ctx: &TransferContext,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        ctx: &TransferContext,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn delete_file(&self, remote_path: &str)
    -> impl Future<Output = Result<(), StorageError>> + Send;

    fn file_exists(&self, remote_path: &str)
    -> impl Future<Output = Result<bool, StorageError>> + Send;

    fn get_file_metadata(
        &self,
        remote_path: &str,
    ) -> impl Future<Output = Result<Option<RemoteObject>, StorageError>> + Send;

    fn list_files(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<RemoteObject>, StorageError>> + Send;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}
