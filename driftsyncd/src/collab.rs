use std::io;
use std::path::Path;
use std::time::Duration;

use url::Url;

/// Encryption collaborator. The sync core calls these around transfers when
/// a key id is configured; the cipher algorithm itself lives elsewhere.
pub trait FileCipher: Send + Sync {
    fn encrypt_file(&self, input: &Path, output: &Path, key_id: &str) -> io::Result<()>;
    fn decrypt_file(&self, input: &Path, output: &Path, key_id: &str) -> io::Result<()>;
}

/// Performance/CDN collaborator. Consulted opportunistically: a missing or
/// cold accelerator degrades to direct backend access, never to a failure.
pub trait EdgeAccelerator: Send + Sync {
    fn best_edge(&self) -> Option<Url>;
    fn cache_get(&self, key: &str) -> Option<Vec<u8>>;
    fn cache_put(&self, key: &str, bytes: &[u8], ttl: Duration);
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory accelerator for tests; ttl is accepted and ignored.
    #[derive(Default)]
    pub struct MemoryEdge {
        pub edge: Option<Url>,
        store: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryEdge {
        pub fn len(&self) -> usize {
            self.store.lock().unwrap().len()
        }
    }

    impl EdgeAccelerator for MemoryEdge {
        fn best_edge(&self) -> Option<Url> {
            self.edge.clone()
        }

        fn cache_get(&self, key: &str) -> Option<Vec<u8>> {
            self.store.lock().unwrap().get(key).cloned()
        }

        fn cache_put(&self, key: &str, bytes: &[u8], _ttl: Duration) {
            self.store
                .lock()
                .unwrap()
                .insert(key.to_string(), bytes.to_vec());
        }
    }
}
