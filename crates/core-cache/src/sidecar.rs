//! Disk-backed artifact caches beside `build-cache.json`.
//!
//! Each side-car directory holds UTF-8 artifacts named by the first 16 hex
//! characters of the keying hash, no framing: the file body is the artifact
//! verbatim. Reads consult a lock-free in-memory map first so repeated hits
//! within a build avoid disk I/O; writes update both layers. Stale files are
//! only orphaned, never swept; deleting the cache directory reclaims them.

use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::warn;

use crate::hash::short_key;

pub(crate) struct SideCache {
    dir: PathBuf,
    ext: &'static str,
    mem: DashMap<String, String>,
}

impl SideCache {
    pub(crate) fn new(cache_dir: &Path, subdir: &str, ext: &'static str) -> Self {
        Self {
            dir: cache_dir.join(subdir),
            ext,
            mem: DashMap::new(),
        }
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{}", self.ext))
    }

    /// Fetch the artifact keyed by `hash`, memory first, then disk.
    pub(crate) fn read(&self, hash: &str) -> Option<String> {
        if hash.is_empty() {
            return None;
        }
        let key = short_key(hash);
        if let Some(hit) = self.mem.get(key) {
            return Some(hit.clone());
        }
        let body = fs::read_to_string(self.file_path(key)).ok()?;
        self.mem.insert(key.to_string(), body.clone());
        Some(body)
    }

    /// Store the artifact under `hash` in both layers. Disk failures are
    /// logged and swallowed; the cache is advisory.
    pub(crate) fn write(&self, hash: &str, body: &str) -> Option<PathBuf> {
        if hash.is_empty() {
            return None;
        }
        let key = short_key(hash);
        self.mem.insert(key.to_string(), body.to_string());
        let path = self.file_path(key);
        let result = fs::create_dir_all(&self.dir).and_then(|_| fs::write(&path, body));
        if let Err(e) = result {
            warn!(target: "cache", path = %path.display(), error = %e, "sidecar_write_failed");
            return None;
        }
        Some(path)
    }

    #[cfg(test)]
    pub(crate) fn forget_memory(&self) {
        self.mem.clear();
    }
}
