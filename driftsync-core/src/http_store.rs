use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::backend::{ObjectMeta, RemoteObject, ResumeState, StorageBackend, TransferContext};
use crate::error::StorageError;

const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;
const DEFAULT_MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;
const DEFAULT_PART_ATTEMPTS: u32 = 3;
const PART_RETRY_BASE: Duration = Duration::from_millis(250);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

const SHA256_HEADER: &str = "x-drift-sha256";

/// Reference `StorageBackend` against a generic HTTP object gateway.
///
/// Objects live under `/v1/objects`; large uploads go through multipart
/// sessions under `/v1/uploads`. Authentication is a bearer token.
#[derive(Clone)]
pub struct HttpObjectStore {
    http: Client,
    base_url: Url,
    token: String,
    part_size: u64,
    multipart_threshold: u64,
    part_attempts: u32,
}

impl HttpObjectStore {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, StorageError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            token: token.into(),
            part_size: DEFAULT_PART_SIZE,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            part_attempts: DEFAULT_PART_ATTEMPTS,
        })
    }

    pub fn with_multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = threshold.max(1);
        self
    }

    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    pub fn with_part_attempts(mut self, attempts: u32) -> Self {
        self.part_attempts = attempts.max(1);
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, StorageError> {
        Ok(self.base_url.join(path)?)
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StorageError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> StorageError {
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        StorageError::Api {
            status,
            body,
            retry_after_secs,
        }
    }

    async fn upload_single(
        &self,
        local_path: &Path,
        remote_path: &str,
        meta: &ObjectMeta,
        ctx: &TransferContext,
    ) -> Result<(), StorageError> {
        ctx.ensure_active()?;
        let mut url = self.endpoint("/v1/objects/content")?;
        url.query_pairs_mut().append_pair("path", remote_path);

        let file = tokio::fs::File::open(local_path).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let mut request = self
            .http
            .put(url)
            .header("Authorization", self.auth_header_value())
            .header(SHA256_HEADER, meta.sha256.as_str());
        if let Some(mime) = &meta.mime_type {
            request = request.header(reqwest::header::CONTENT_TYPE, mime.as_str());
        }
        let response = request.body(body).send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        ctx.report_progress(1.0);
        Ok(())
    }

    async fn upload_multipart(
        &self,
        local_path: &Path,
        remote_path: &str,
        meta: &ObjectMeta,
        ctx: &TransferContext,
    ) -> Result<(), StorageError> {
        let part_size = meta.chunk_size.unwrap_or(self.part_size).max(1);
        let total_parts = meta.size_bytes.div_ceil(part_size).max(1) as u32;

        let mut state = match self.reusable_session(ctx.resume()).await? {
            Some(state) => state,
            None => {
                let upload_id = self
                    .initiate_session(remote_path, part_size, total_parts)
                    .await?;
                ResumeState {
                    upload_id: Some(upload_id),
                    parts: Default::default(),
                }
            }
        };
        let upload_id = state
            .upload_id
            .clone()
            .ok_or(StorageError::MissingSession)?;

        let mut file = tokio::fs::File::open(local_path).await?;
        for index in 0..total_parts {
            if state.parts.contains_key(&index) {
                continue;
            }
            if ctx.ensure_active().is_err() {
                self.abort_session(&upload_id).await;
                ctx.record_parts(&ResumeState::default());
                return Err(StorageError::Cancelled);
            }

            let offset = u64::from(index) * part_size;
            let len = part_size.min(meta.size_bytes - offset) as usize;
            let mut buf = vec![0u8; len];
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut buf).await?;

            match self.upload_part(&upload_id, index, buf).await {
                Ok(receipt) => {
                    state.parts.insert(index, receipt);
                    ctx.record_parts(&state);
                    ctx.report_progress(state.parts.len() as f64 / f64::from(total_parts));
                }
                Err(err) if err.is_retryable() => {
                    // The session stays open so a retried operation resumes
                    // with the remaining parts.
                    return Err(err);
                }
                Err(err) => {
                    self.abort_session(&upload_id).await;
                    ctx.record_parts(&ResumeState::default());
                    return Err(err);
                }
            }
        }

        self.commit_session(&upload_id, meta, &state).await?;
        ctx.report_progress(1.0);
        Ok(())
    }

    /// Validates a persisted session against the gateway. A session the
    /// server no longer knows restarts the upload from scratch.
    async fn reusable_session(
        &self,
        resume: &ResumeState,
    ) -> Result<Option<ResumeState>, StorageError> {
        let Some(upload_id) = &resume.upload_id else {
            return Ok(None);
        };
        let url = self.endpoint(&format!("/v1/uploads/{upload_id}"))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(Some(resume.clone())),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn initiate_session(
        &self,
        remote_path: &str,
        part_size: u64,
        total_parts: u32,
    ) -> Result<String, StorageError> {
        let mut url = self.endpoint("/v1/uploads")?;
        url.query_pairs_mut()
            .append_pair("path", remote_path)
            .append_pair("part_size", &part_size.to_string())
            .append_pair("parts", &total_parts.to_string());
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let session: UploadSession = Self::handle_response(response).await?;
        Ok(session.upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        index: u32,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        let url = self.endpoint(&format!("/v1/uploads/{upload_id}/parts/{index}"))?;
        let mut last_error: Option<StorageError> = None;
        for attempt in 0..self.part_attempts {
            let response = self
                .http
                .put(url.clone())
                .header("Authorization", self.auth_header_value())
                .body(bytes.clone())
                .send()
                .await;
            let err = match response {
                Ok(response) if response.status().is_success() => {
                    let receipt: PartReceipt = response.json().await?;
                    return Ok(receipt.receipt);
                }
                Ok(response) => Self::api_error(response).await,
                Err(err) => StorageError::Request(err),
            };
            if !err.is_retryable() {
                return Err(err);
            }
            last_error = Some(err);
            if attempt + 1 < self.part_attempts {
                tokio::time::sleep(PART_RETRY_BASE * 2u32.saturating_pow(attempt)).await;
            }
        }
        Err(StorageError::PartExhausted {
            index,
            attempts: self.part_attempts,
            last_error: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn commit_session(
        &self,
        upload_id: &str,
        meta: &ObjectMeta,
        state: &ResumeState,
    ) -> Result<(), StorageError> {
        let url = self.endpoint(&format!("/v1/uploads/{upload_id}/commit"))?;
        // BTreeMap iteration yields receipts in part order.
        let parts: Vec<&str> = state.parts.values().map(String::as_str).collect();
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&CommitRequest {
                sha256: &meta.sha256,
                parts,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }

    async fn abort_session(&self, upload_id: &str) {
        let Ok(url) = self.endpoint(&format!("/v1/uploads/{upload_id}")) else {
            return;
        };
        let _ = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await;
    }
}

impl StorageBackend for HttpObjectStore {
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        meta: &ObjectMeta,
        ctx: &TransferContext,
    ) -> Result<(), StorageError> {
        if meta.size_bytes >= self.multipart_threshold {
            self.upload_multipart(local_path, remote_path, meta, ctx)
                .await
        } else {
            self.upload_single(local_path, remote_path, meta, ctx).await
        }
    }

    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        ctx: &TransferContext,
    ) -> Result<(), StorageError> {
        ctx.ensure_active()?;
        let base = ctx.edge_base().unwrap_or(&self.base_url);
        let mut url = base.join("/v1/objects/content")?;
        url.query_pairs_mut().append_pair("path", remote_path);
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(local_path);
        let mut file = tokio::fs::File::create(&partial).await?;
        let total = response.content_length();
        let mut received: u64 = 0;
        let mut hasher = ctx.expected_sha256().map(|_| Sha256::new());
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if ctx.ensure_active().is_err() {
                drop(file);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(StorageError::Cancelled);
            }
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }
            if let Some(total) = total.filter(|total| *total > 0) {
                ctx.report_progress(received as f64 / total as f64);
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = ctx.expected_sha256() {
            let actual = format!("{:x}", hasher.expect("hasher initialized").finalize());
            if actual != expected.to_ascii_lowercase() {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(StorageError::IntegrityMismatch {
                    expected: expected.to_ascii_lowercase(),
                    actual,
                });
            }
        }

        tokio::fs::rename(partial, local_path).await?;
        ctx.report_progress(1.0);
        Ok(())
    }

    async fn delete_file(&self, remote_path: &str) -> Result<(), StorageError> {
        let mut url = self.endpoint("/v1/objects")?;
        url.query_pairs_mut().append_pair("path", remote_path);
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            // Deleting an absent object is a no-op.
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn file_exists(&self, remote_path: &str) -> Result<bool, StorageError> {
        Ok(self.get_file_metadata(remote_path).await?.is_some())
    }

    async fn get_file_metadata(
        &self,
        remote_path: &str,
    ) -> Result<Option<RemoteObject>, StorageError> {
        let mut url = self.endpoint("/v1/objects/meta")?;
        url.query_pairs_mut().append_pair("path", remote_path);
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::handle_response(response).await?))
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<RemoteObject>, StorageError> {
        let mut url = self.endpoint("/v1/objects/list")?;
        url.query_pairs_mut().append_pair("prefix", prefix);
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let listing: ObjectListing = Self::handle_response(response).await?;
        Ok(listing.items)
    }

    fn name(&self) -> &'static str {
        "http-object-store"
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".drift-partial");
    PathBuf::from(name)
}

#[derive(Debug, Deserialize, Serialize)]
struct UploadSession {
    upload_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct PartReceipt {
    receipt: String,
}

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    sha256: &'a str,
    parts: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ObjectListing {
    items: Vec<RemoteObject>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sha256_hex(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    fn store(server: &MockServer) -> HttpObjectStore {
        HttpObjectStore::new(&server.uri(), "test-token").unwrap()
    }

    #[tokio::test]
    async fn uploads_small_file_in_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/objects/content"))
            .and(query_param("path", "/media/clip.mp4"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_bytes(b"payload"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"payload").unwrap();

        let meta = ObjectMeta {
            size_bytes: 7,
            sha256: sha256_hex(b"payload"),
            mime_type: Some("video/mp4".into()),
            chunk_size: None,
        };
        store(&server)
            .upload_file(&source, "/media/clip.mp4", &meta, &TransferContext::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn large_upload_runs_the_multipart_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/uploads"))
            .and(query_param("path", "/media/big.bin"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({ "upload_id": "u-1" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/uploads/u-1/parts/0"))
            .and(body_bytes(b"aaaa"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "receipt": "r0" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/uploads/u-1/parts/1"))
            .and(body_bytes(b"bb"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "receipt": "r1" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/uploads/u-1/commit"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("big.bin");
        std::fs::write(&source, b"aaaabb").unwrap();

        let meta = ObjectMeta {
            size_bytes: 6,
            sha256: sha256_hex(b"aaaabb"),
            mime_type: None,
            chunk_size: Some(4),
        };
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let sink_recorded = Arc::clone(&recorded);
        let ctx = TransferContext::new().with_part_sink(Box::new(move |state: &ResumeState| {
            sink_recorded.lock().unwrap().push(state.clone());
        }));

        store(&server)
            .with_multipart_threshold(1)
            .upload_file(&source, "/media/big.bin", &meta, &ctx)
            .await
            .unwrap();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[1].parts.len(), 2);
        assert_eq!(recorded[1].upload_id.as_deref(), Some("u-1"));
    }

    #[tokio::test]
    async fn resumed_multipart_uploads_remaining_parts_only() {
        let server = MockServer::start().await;
        // The persisted session is still alive on the gateway.
        Mock::given(method("GET"))
            .and(path("/v1/uploads/u-7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "upload_id": "u-7" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/uploads/u-7/parts/1"))
            .and(body_bytes(b"bb"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "receipt": "r1" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/uploads/u-7/commit"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("big.bin");
        std::fs::write(&source, b"aaaabb").unwrap();

        let mut resume = ResumeState::default();
        resume.upload_id = Some("u-7".into());
        resume.parts.insert(0, "r0".into());

        let meta = ObjectMeta {
            size_bytes: 6,
            sha256: sha256_hex(b"aaaabb"),
            mime_type: None,
            chunk_size: Some(4),
        };
        store(&server)
            .with_multipart_threshold(1)
            .upload_file(
                &source,
                "/media/big.bin",
                &meta,
                &TransferContext::new().with_resume(resume),
            )
            .await
            .unwrap();
        // Part 0 was never re-sent: no mock exists for it, and the strict
        // expectations above were met.
    }

    #[tokio::test]
    async fn transient_part_exhaustion_keeps_the_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/uploads"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({ "upload_id": "u-2" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/uploads/u-2/parts/0"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/uploads/u-2"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("big.bin");
        std::fs::write(&source, b"aaaabb").unwrap();

        let meta = ObjectMeta {
            size_bytes: 6,
            sha256: sha256_hex(b"aaaabb"),
            mime_type: None,
            chunk_size: Some(4),
        };
        let err = store(&server)
            .with_multipart_threshold(1)
            .with_part_attempts(2)
            .upload_file(&source, "/media/big.bin", &meta, &TransferContext::new())
            .await
            .expect_err("part must exhaust");

        assert!(matches!(
            err,
            StorageError::PartExhausted { index: 0, attempts: 2, .. }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn cancelled_multipart_aborts_the_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/uploads"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({ "upload_id": "u-3" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/uploads/u-3"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("big.bin");
        std::fs::write(&source, b"aaaabb").unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let meta = ObjectMeta {
            size_bytes: 6,
            sha256: sha256_hex(b"aaaabb"),
            mime_type: None,
            chunk_size: Some(4),
        };
        let err = store(&server)
            .with_multipart_threshold(1)
            .upload_file(
                &source,
                "/media/big.bin",
                &meta,
                &TransferContext::new().with_cancel(token),
            )
            .await
            .expect_err("cancelled");
        assert!(matches!(err, StorageError::Cancelled));
    }

    #[tokio::test]
    async fn downloads_verify_content_hash_and_rename_into_place() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/objects/content"))
            .and(query_param("path", "/media/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/clip.mp4");
        store(&server)
            .download_file(
                "/media/clip.mp4",
                &target,
                &TransferContext::new().with_expected_sha256(sha256_hex(b"hello")),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn download_integrity_mismatch_removes_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/objects/content"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("clip.mp4");
        let err = store(&server)
            .download_file(
                "/media/clip.mp4",
                &target,
                &TransferContext::new().with_expected_sha256("deadbeef"),
            )
            .await
            .expect_err("hash mismatch");

        assert!(matches!(err, StorageError::IntegrityMismatch { .. }));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn download_prefers_edge_endpoint_when_present() {
        let origin = MockServer::start().await;
        let edge = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/objects/content"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"edge-bytes"))
            .expect(1)
            .mount(&edge)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("clip.mp4");
        store(&origin)
            .download_file(
                "/media/clip.mp4",
                &target,
                &TransferContext::new().with_edge_base(Url::parse(&edge.uri()).unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"edge-bytes");
    }

    #[tokio::test]
    async fn delete_tolerates_absent_object() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/objects"))
            .and(query_param("path", "/gone.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        store(&server).delete_file("/gone.txt").await.unwrap();
    }

    #[tokio::test]
    async fn stat_returns_none_for_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/objects/meta"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store(&server);
        assert!(store.get_file_metadata("/none.txt").await.unwrap().is_none());
        assert!(!store.file_exists("/none.txt").await.unwrap());
    }

    #[tokio::test]
    async fn lists_objects_under_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/objects/list"))
            .and(query_param("prefix", "/media/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "path": "/media/clip.mp4",
                        "size": 5,
                        "sha256": "abc",
                        "modified": "2024-01-01T00:00:00Z"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let items = store(&server).list_files("/media/").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, "/media/clip.mp4");
        assert_eq!(items[0].sha256.as_deref(), Some("abc"));
    }
}
