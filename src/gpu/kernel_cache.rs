//! Kernel binary cache keyed by a content hash of the WGSL sources.
//!
//! Pipeline compilation is the slowest part of context construction. The
//! driver-compiled pipeline blob from a previous run is persisted next to a
//! sidecar hash of all kernel sources; when the sources are unchanged the
//! blob is handed back to pipeline creation instead of recompiling from
//! scratch. A missing, stale, or unreadable cache falls back to a full
//! compile and the fresh blob is persisted afterwards.

use std::path::{Path, PathBuf};

use crate::core::error::Error;

const CACHE_FILE: &str = "kernels.bin";
const HASH_FILE: &str = "kernels.hash";

/// Combined content hash of every kernel source, hex encoded.
pub fn source_hash(sources: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for source in sources {
        hasher.update(source.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// On-disk cache of compiled kernel binaries.
pub struct KernelCache {
    dir: PathBuf,
    hash: String,
    /// Blob from a previous run, present only when the hash matched.
    cached_data: Option<Vec<u8>>,
}

impl KernelCache {
    /// Open the cache directory and probe it against the given sources.
    pub fn open(dir: &Path, sources: &[&str]) -> Self {
        let hash = source_hash(sources);
        let cached_data = Self::probe(dir, &hash);
        if cached_data.is_some() {
            log::info!("kernel cache hit ({})", &hash[..12]);
        } else {
            log::info!("kernel cache miss, compiling from source");
        }
        Self {
            dir: dir.to_path_buf(),
            hash,
            cached_data,
        }
    }

    fn probe(dir: &Path, hash: &str) -> Option<Vec<u8>> {
        let saved = std::fs::read_to_string(dir.join(HASH_FILE)).ok()?;
        if saved.trim() != hash {
            log::warn!("kernel sources changed, discarding cached binaries");
            return None;
        }
        match std::fs::read(dir.join(CACHE_FILE)) {
            Ok(data) if !data.is_empty() => Some(data),
            _ => {
                log::warn!("kernel cache blob unreadable, recompiling");
                None
            }
        }
    }

    /// Whether a previous run's binaries were found for these sources.
    pub fn is_hit(&self) -> bool {
        self.cached_data.is_some()
    }

    /// Build the device pipeline cache, seeded from disk on a hit.
    ///
    /// `fallback: true` makes the device discard an incompatible blob and
    /// compile from source, so a stale driver cache degrades rather than
    /// fails.
    pub fn device_cache(&self, device: &wgpu::Device) -> wgpu::PipelineCache {
        unsafe {
            device.create_pipeline_cache(&wgpu::PipelineCacheDescriptor {
                label: Some("skyterra_kernel_cache"),
                data: self.cached_data.as_deref(),
                fallback: true,
            })
        }
    }

    /// Persist the compiled blob and its source hash after pipeline creation.
    ///
    /// Called on a miss; a persistence failure is logged and ignored since
    /// the compiled pipelines are already live.
    pub fn store(&self, cache: &wgpu::PipelineCache) -> Result<(), Error> {
        if self.is_hit() {
            return Ok(());
        }
        let Some(data) = cache.get_data() else {
            log::debug!("backend exposes no pipeline cache data, nothing to persist");
            return Ok(());
        };
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.dir.join(CACHE_FILE), &data)?;
        std::fs::write(self.dir.join(HASH_FILE), &self.hash)?;
        log::info!(
            "persisted kernel cache ({} bytes, {})",
            data.len(),
            &self.hash[..12]
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: [&str; 3] = ["kernel a", "kernel b", "kernel c"];

    #[test]
    fn test_source_hash_stable() {
        let a = source_hash(&SOURCES);
        let b = source_hash(&SOURCES);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_source_hash_sensitive_to_change() {
        let a = source_hash(&SOURCES);
        let b = source_hash(&["kernel a", "kernel b", "kernel C"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_miss_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache = KernelCache::open(dir.path(), &SOURCES);
        assert!(!cache.is_hit());
    }

    #[test]
    fn test_hit_after_manual_store() {
        let dir = tempfile::tempdir().unwrap();
        let hash = source_hash(&SOURCES);
        std::fs::write(dir.path().join(HASH_FILE), &hash).unwrap();
        std::fs::write(dir.path().join(CACHE_FILE), b"opaque blob").unwrap();

        let cache = KernelCache::open(dir.path(), &SOURCES);
        assert!(cache.is_hit());
    }

    #[test]
    fn test_miss_on_source_change() {
        let dir = tempfile::tempdir().unwrap();
        let hash = source_hash(&SOURCES);
        std::fs::write(dir.path().join(HASH_FILE), &hash).unwrap();
        std::fs::write(dir.path().join(CACHE_FILE), b"opaque blob").unwrap();

        let cache = KernelCache::open(dir.path(), &["kernel a", "kernel b", "edited"]);
        assert!(!cache.is_hit());
    }

    #[test]
    fn test_miss_on_empty_blob() {
        let dir = tempfile::tempdir().unwrap();
        let hash = source_hash(&SOURCES);
        std::fs::write(dir.path().join(HASH_FILE), &hash).unwrap();
        std::fs::write(dir.path().join(CACHE_FILE), b"").unwrap();

        let cache = KernelCache::open(dir.path(), &SOURCES);
        assert!(!cache.is_hit());
    }
}
