use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::sync::conflict::ConflictResolution;
use crate::sync::engine::{EngineOptions, SyncMode};
use crate::sync::manager::ManagerConfig;
use crate::sync::retry::RetryPolicy;

const DEFAULT_SYNC_DIR_NAME: &str = "DriftSync";
const DEFAULT_REMOTE_PREFIX: &str = "/sync";
const DEFAULT_CHUNK_MB: u64 = 8;
const DEFAULT_MULTIPART_THRESHOLD_MB: u64 = 100;
const DEFAULT_MAX_TRANSFERS: u64 = 4;
const DEFAULT_MAX_RETRIES: u64 = 5;
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_KEEP_VERSIONS: u64 = 10;
const DEFAULT_DELTA_MAX_MB: u64 = 32;

/// Everything the daemon reads from its environment. `DRIFTSYNC_GATEWAY_URL`
/// and `DRIFTSYNC_GATEWAY_TOKEN` are required; the rest has defaults.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub sync_root: PathBuf,
    pub state_dir: PathBuf,
    pub gateway_url: String,
    pub gateway_token: String,
    pub remote_prefix: String,
    pub mode: SyncMode,
    pub conflict_policy: ConflictResolution,
    pub chunk_size_bytes: u64,
    pub multipart_threshold: u64,
    pub max_concurrent_transfers: usize,
    pub max_retries: u32,
    pub retry_base: Duration,
    pub auto_sync_interval: Duration,
    pub keep_versions: u32,
    pub delta_max_bytes: u64,
    pub enable_watcher: bool,
    pub encryption_key_id: Option<String>,
}

impl SyncSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Injectable lookup so tests configure without touching the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let sync_root = lookup("DRIFTSYNC_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(DEFAULT_SYNC_DIR_NAME));
        let state_dir = lookup("DRIFTSYNC_STATE_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|dir| dir.join("driftsync")))
            .context("no usable state directory")?;

        let gateway_url =
            lookup("DRIFTSYNC_GATEWAY_URL").context("DRIFTSYNC_GATEWAY_URL is not set")?;
        let gateway_token =
            lookup("DRIFTSYNC_GATEWAY_TOKEN").context("DRIFTSYNC_GATEWAY_TOKEN is not set")?;
        let remote_prefix = lookup("DRIFTSYNC_REMOTE_PREFIX")
            .unwrap_or_else(|| DEFAULT_REMOTE_PREFIX.to_string());

        let mode = match lookup("DRIFTSYNC_MODE") {
            Some(value) => SyncMode::parse(&value)
                .with_context(|| format!("invalid DRIFTSYNC_MODE: {value}"))?,
            None => SyncMode::Bidirectional,
        };
        let conflict_policy = match lookup("DRIFTSYNC_CONFLICT_POLICY") {
            Some(value) => ConflictResolution::parse(&value)
                .with_context(|| format!("invalid DRIFTSYNC_CONFLICT_POLICY: {value}"))?,
            None => ConflictResolution::Manual,
        };

        let chunk_size_bytes =
            read_u64(&lookup, "DRIFTSYNC_CHUNK_MB", DEFAULT_CHUNK_MB) * 1024 * 1024;
        let multipart_threshold = read_u64(
            &lookup,
            "DRIFTSYNC_MULTIPART_THRESHOLD_MB",
            DEFAULT_MULTIPART_THRESHOLD_MB,
        ) * 1024
            * 1024;
        let max_concurrent_transfers =
            read_u64(&lookup, "DRIFTSYNC_MAX_TRANSFERS", DEFAULT_MAX_TRANSFERS) as usize;
        let max_retries = read_u64(&lookup, "DRIFTSYNC_MAX_RETRIES", DEFAULT_MAX_RETRIES) as u32;
        let retry_base = Duration::from_millis(read_u64(
            &lookup,
            "DRIFTSYNC_RETRY_BASE_MS",
            DEFAULT_RETRY_BASE_MS,
        ));
        let auto_sync_interval = Duration::from_secs(read_u64(
            &lookup,
            "DRIFTSYNC_SYNC_INTERVAL_SECS",
            DEFAULT_SYNC_INTERVAL_SECS,
        ));
        let keep_versions =
            read_u64(&lookup, "DRIFTSYNC_KEEP_VERSIONS", DEFAULT_KEEP_VERSIONS) as u32;
        let delta_max_bytes =
            read_u64(&lookup, "DRIFTSYNC_DELTA_MAX_MB", DEFAULT_DELTA_MAX_MB) * 1024 * 1024;
        let enable_watcher = read_bool(&lookup, "DRIFTSYNC_ENABLE_WATCHER", true);
        let encryption_key_id =
            lookup("DRIFTSYNC_ENCRYPTION_KEY_ID").filter(|value| !value.is_empty());

        Ok(Self {
            sync_root,
            state_dir,
            gateway_url,
            gateway_token,
            remote_prefix,
            mode,
            conflict_policy,
            chunk_size_bytes,
            multipart_threshold,
            max_concurrent_transfers,
            max_retries,
            retry_base,
            auto_sync_interval,
            keep_versions,
            delta_max_bytes,
            enable_watcher,
            encryption_key_id,
        })
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            mode: self.mode,
            conflict_policy: self.conflict_policy,
            remote_prefix: self.remote_prefix.clone(),
            chunk_size_bytes: self.chunk_size_bytes,
            keep_versions: self.keep_versions,
            delta_max_bytes: self.delta_max_bytes,
            ..EngineOptions::default()
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            workers: self.max_concurrent_transfers.max(1),
            retry: RetryPolicy::new(
                self.retry_base,
                Duration::from_secs(60),
                self.max_retries,
                true,
            ),
            encryption_key_id: self.encryption_key_id.clone(),
            ..ManagerConfig::default()
        }
    }
}

fn read_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).as_deref() {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}
