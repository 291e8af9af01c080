/// Content-addressed cache for compiled model specifications.
///
/// Entries are keyed by `<name>-<sha256 of spec text>`, so editing the
/// text always misses. A corrupt entry or one whose stored hash disagrees
/// with the key is treated as a miss and recompiled.
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::SolverError;
use crate::model_spec::{compile, spec_hash, CompiledModel};

pub trait ModelCache {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn put(&self, key: &str, artifact: &[u8]) -> io::Result<()>;
}

/// How a [`load_or_compile`] call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// An entry existed but could not be used.
    Invalid,
}

pub fn cache_key(name: &str, spec_text: &str) -> String {
    format!("{name}-{}", spec_hash(spec_text))
}

/// Return the compiled model for `spec_text`, compiling and storing it on
/// a miss. A failed store is logged, not returned.
pub fn load_or_compile(
    name: &str,
    spec_text: &str,
    cache: &dyn ModelCache,
) -> Result<(CompiledModel, CacheStatus), SolverError> {
    let key = cache_key(name, spec_text);
    let expected_hash = spec_hash(spec_text);

    let status = match cache.get(&key) {
        None => CacheStatus::Miss,
        Some(bytes) => match serde_json::from_slice::<CompiledModel>(&bytes) {
            Ok(model) if model.spec_hash == expected_hash => {
                tracing::debug!(%key, "model cache hit");
                return Ok((model, CacheStatus::Hit));
            }
            Ok(model) => {
                tracing::warn!(%key, stored = %model.spec_hash, "cached model hash mismatch, recompiling");
                CacheStatus::Invalid
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "cached model is unreadable, recompiling");
                CacheStatus::Invalid
            }
        },
    };

    let model = compile(spec_text)?;
    match serde_json::to_vec(&model) {
        Ok(bytes) => {
            if let Err(e) = cache.put(&key, &bytes) {
                tracing::warn!(%key, error = %e, "could not store compiled model");
            }
        }
        Err(e) => tracing::warn!(%key, error = %e, "could not serialize compiled model"),
    }
    Ok((model, status))
}

/// Never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl ModelCache for NoCache {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &str, _artifact: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryModelCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelCache for MemoryModelCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, artifact: &[u8]) -> io::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| io::Error::other("model cache lock poisoned"))?;
        entries.insert(key.to_string(), artifact.to_vec());
        Ok(())
    }
}

/// One JSON file per key under a directory. Writes go to a temp file that
/// is renamed into place, so readers never see a partial entry.
#[derive(Debug, Clone)]
pub struct FsModelCache {
    dir: PathBuf,
}

impl FsModelCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FsModelCache { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl ModelCache for FsModelCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.entry_path(key)).ok()
    }

    fn put(&self, key: &str, artifact: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!(".{key}.{}.tmp", std::process::id()));
        fs::write(&tmp, artifact)?;
        fs::rename(&tmp, self.entry_path(key)).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_spec::DEFAULT_MODEL_SPEC;

    /// Accepts reads, refuses every write.
    struct ReadOnlyCache;

    impl ModelCache for ReadOnlyCache {
        fn get(&self, _key: &str) -> Option<Vec<u8>> {
            None
        }

        fn put(&self, _key: &str, _artifact: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }
    }

    #[test]
    fn test_key_embeds_name_and_hash() {
        let key = cache_key("pairwise", "abc");
        assert_eq!(key, "pairwise-ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = MemoryModelCache::new();
        let (first, status) = load_or_compile("m", DEFAULT_MODEL_SPEC, &cache).unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(cache.len(), 1);

        let (second, status) = load_or_compile("m", DEFAULT_MODEL_SPEC, &cache).unwrap();
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(first, second);
    }

    #[test]
    fn test_changed_text_misses() {
        let cache = MemoryModelCache::new();
        load_or_compile("m", DEFAULT_MODEL_SPEC, &cache).unwrap();
        let edited = DEFAULT_MODEL_SPEC.replace("beta_sd = 1.0", "beta_sd = 2.0");
        let (model, status) = load_or_compile("m", &edited, &cache).unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(model.spec.beta_sd, 2.0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_corrupt_entry_is_recompiled() {
        let cache = MemoryModelCache::new();
        let key = cache_key("m", DEFAULT_MODEL_SPEC);
        cache.put(&key, b"{ not json").unwrap();

        let (_, status) = load_or_compile("m", DEFAULT_MODEL_SPEC, &cache).unwrap();
        assert_eq!(status, CacheStatus::Invalid);
        let (_, status) = load_or_compile("m", DEFAULT_MODEL_SPEC, &cache).unwrap();
        assert_eq!(status, CacheStatus::Hit);
    }

    #[test]
    fn test_hash_mismatch_is_recompiled() {
        let cache = MemoryModelCache::new();
        let mut stale = compile(DEFAULT_MODEL_SPEC).unwrap();
        stale.spec_hash = "0".repeat(64);
        cache.put(&cache_key("m", DEFAULT_MODEL_SPEC), &serde_json::to_vec(&stale).unwrap()).unwrap();

        let (model, status) = load_or_compile("m", DEFAULT_MODEL_SPEC, &cache).unwrap();
        assert_eq!(status, CacheStatus::Invalid);
        assert_eq!(model.spec_hash, spec_hash(DEFAULT_MODEL_SPEC));
    }

    #[test]
    fn test_failed_store_still_returns_model() {
        let (model, status) = load_or_compile("m", DEFAULT_MODEL_SPEC, &ReadOnlyCache).unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(model.spec.name, "pairwise-bands");
    }

    #[test]
    fn test_compile_error_propagates() {
        let err = load_or_compile("m", "ability_sd = ", &NoCache).unwrap_err();
        assert!(matches!(err, SolverError::InvalidSpec(_)));
    }

    #[test]
    fn test_fs_cache_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("models");

        let (_, status) = load_or_compile("m", DEFAULT_MODEL_SPEC, &FsModelCache::new(&cache_dir)).unwrap();
        assert_eq!(status, CacheStatus::Miss);

        let reopened = FsModelCache::new(&cache_dir);
        let (_, status) = load_or_compile("m", DEFAULT_MODEL_SPEC, &reopened).unwrap();
        assert_eq!(status, CacheStatus::Hit);

        let leftovers: Vec<_> = fs::read_dir(&cache_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
