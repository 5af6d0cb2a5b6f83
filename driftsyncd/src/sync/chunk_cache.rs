use std::io;
use std::path::{Path, PathBuf};

/// Content-addressed blob store under a local directory, keyed by SHA-256
/// hex. Holds the last-confirmed content of tracked files so the engine can
/// compute block deltas between versions without refetching anything.
#[derive(Debug, Clone)]
pub struct ChunkCache {
    root: PathBuf,
}

impl ChunkCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, hash: &str) -> io::Result<PathBuf> {
        if hash.len() < 3 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cache key must be a hex content hash",
            ));
        }
        Ok(self.root.join(&hash[..2]).join(hash))
    }

    pub async fn contains(&self, hash: &str) -> bool {
        match self.blob_path(hash) {
            Ok(path) => tokio::fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }

    pub async fn get(&self, hash: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.blob_path(hash)?;
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Writes go through a temp sibling and rename so readers never observe
    /// a half-written blob.
    pub async fn put(&self, hash: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.blob_path(hash)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension("staging");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(path)
    }

    pub async fn put_file(&self, hash: &str, source: &Path) -> io::Result<PathBuf> {
        let path = self.blob_path(hash)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension("staging");
        tokio::fs::copy(source, &staging).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(path)
    }

    pub async fn remove(&self, hash: &str) -> io::Result<()> {
        let path = self.blob_path(hash)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}
