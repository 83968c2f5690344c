//! On-disk memoization of face-feature extraction results.
//!
//! Cache entries are keyed by `(dataset, dialogue_id, utterance_id,
//! extraction params)` and laid out as
//!
//! ```text
//! <root>/persons_<p>_rate_<r>_size_<s>/<dataset>_dia_<d>_utt_<u>.json
//! ```
//!
//! An entry is written once and then treated as valid forever; there is no
//! eviction, TTL or versioning. Changing extraction logic without changing
//! the parameter tuple serves stale results — a documented limitation, not
//! auto-detected. Under concurrent workers the check-then-write sequence is
//! not atomic: two workers may compute the same missing key and both write,
//! last writer wins. Both writes carry the same logical artifact, so this is
//! wasted work, not corruption.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{DatasetError, Result};
use crate::media::{ExtractionParams, FaceTensor};

/// Identity of one cache entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureKey {
    pub dataset: String,
    pub dialogue_id: i64,
    pub utterance_id: i64,
    pub params: ExtractionParams,
}

impl FeatureKey {
    /// File name within the setting directory. Includes the dataset name so
    /// different datasets sharing one cache root never collide.
    pub fn file_name(&self) -> String {
        format!(
            "{}_dia_{}_utt_{}.json",
            self.dataset, self.dialogue_id, self.utterance_id
        )
    }

    fn wrap_compute_error(&self, source: DatasetError) -> DatasetError {
        DatasetError::FeatureCompute {
            dialogue_id: self.dialogue_id,
            utterance_id: self.utterance_id,
            source: Box::new(source),
        }
    }
}

/// Injectable memoization service for face-feature tensors.
///
/// `compute` is only invoked on a miss; its errors are surfaced as
/// `FeatureCompute` with the original error preserved as the source.
pub trait FeatureCache: Send + Sync {
    fn get_or_compute(
        &self,
        key: &FeatureKey,
        compute: &mut dyn FnMut() -> Result<FaceTensor>,
    ) -> Result<FaceTensor>;
}

/// Disk-backed cache rooted at a directory shared across dataset instances.
pub struct DiskFeatureCache {
    root: PathBuf,
}

impl DiskFeatureCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DiskFeatureCache { root: root.into() }
    }

    /// Full path of the entry for `key`.
    pub fn entry_path(&self, key: &FeatureKey) -> PathBuf {
        self.root
            .join(key.params.setting_dir_name())
            .join(key.file_name())
    }

    /// Create `dir` if absent. A concurrent creator winning the race is
    /// success, not failure.
    fn ensure_dir(dir: &Path) -> Result<()> {
        match std::fs::create_dir(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(DatasetError::cache_io(dir, e)),
        }
    }

    fn write_entry(path: &Path, tensor: &FaceTensor) -> Result<()> {
        let file = File::create(path).map_err(|e| DatasetError::cache_io(path, e))?;
        serde_json::to_writer(BufWriter::new(file), tensor).map_err(|e| {
            DatasetError::CacheCodec {
                path: path.to_path_buf(),
                source: e,
            }
        })
    }

    fn read_entry(path: &Path) -> Result<FaceTensor> {
        let file = File::open(path).map_err(|e| DatasetError::cache_io(path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| DatasetError::CacheCodec {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl FeatureCache for DiskFeatureCache {
    fn get_or_compute(
        &self,
        key: &FeatureKey,
        compute: &mut dyn FnMut() -> Result<FaceTensor>,
    ) -> Result<FaceTensor> {
        Self::ensure_dir(&self.root)?;
        let setting_dir = self.root.join(key.params.setting_dir_name());
        Self::ensure_dir(&setting_dir)?;

        let path = setting_dir.join(key.file_name());
        if !path.exists() {
            debug!(path = %path.display(), "feature cache miss");
            let tensor = compute().map_err(|e| key.wrap_compute_error(e))?;
            Self::write_entry(&path, &tensor)?;
        } else {
            debug!(path = %path.display(), "feature cache hit");
        }

        // Always re-read from disk, even right after a fresh write: the value
        // returned now must match exactly what a future cache hit returns,
        // which surfaces serialization round-trip bugs immediately.
        Self::read_entry(&path)
    }
}

/// In-memory cache for unit tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryFeatureCache {
    entries: Mutex<HashMap<String, FaceTensor>>,
}

impl MemoryFeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry_key(key: &FeatureKey) -> String {
        format!("{}/{}", key.params.setting_dir_name(), key.file_name())
    }
}

impl FeatureCache for MemoryFeatureCache {
    fn get_or_compute(
        &self,
        key: &FeatureKey,
        compute: &mut dyn FnMut() -> Result<FaceTensor>,
    ) -> Result<FaceTensor> {
        let slot = Self::entry_key(key);
        {
            let entries = self.entries.lock().unwrap();
            if let Some(tensor) = entries.get(&slot) {
                return Ok(tensor.clone());
            }
        }
        // Computed outside the lock: mirrors the disk cache's accepted
        // last-writer-wins behavior under concurrent misses.
        let tensor = compute().map_err(|e| key.wrap_compute_error(e))?;
        let mut entries = self.entries.lock().unwrap();
        Ok(entries.entry(slot).or_insert(tensor).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array5;

    fn key(dataset: &str, dialogue_id: i64, utterance_id: i64) -> FeatureKey {
        FeatureKey {
            dataset: dataset.to_string(),
            dialogue_id,
            utterance_id,
            params: ExtractionParams {
                max_persons: 2,
                output_size: 4,
                sampling_rate: 5,
            },
        }
    }

    fn tensor(fill: u8) -> FaceTensor {
        Array5::from_elem((1, 2, 4, 4, 3), fill)
    }

    #[test]
    fn test_disk_cache_computes_once_and_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::new(dir.path());
        let k = key("train", 3, 1);

        let calls = std::cell::Cell::new(0usize);
        let mut compute = || {
            calls.set(calls.get() + 1);
            Ok(tensor(42))
        };

        let first = cache.get_or_compute(&k, &mut compute).unwrap();
        assert_eq!(first, tensor(42));
        assert_eq!(calls.get(), 1);

        // Second call is a hit: no recompute, bit-identical result.
        let second = cache.get_or_compute(&k, &mut compute).unwrap();
        assert_eq!(second, first);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_disk_cache_survives_fresh_instance() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("train", 0, 0);
        {
            let cache = DiskFeatureCache::new(dir.path());
            cache.get_or_compute(&k, &mut || Ok(tensor(7))).unwrap();
        }
        // A new cache over the same root simulates a fresh process.
        let cache = DiskFeatureCache::new(dir.path());
        let got = cache
            .get_or_compute(&k, &mut || panic!("must not recompute"))
            .unwrap();
        assert_eq!(got, tensor(7));
    }

    #[test]
    fn test_entry_path_layout() {
        let cache = DiskFeatureCache::new("/cache");
        let k = key("val", 12, 4);
        assert_eq!(
            cache.entry_path(&k),
            PathBuf::from("/cache/persons_2_rate_5_size_4/val_dia_12_utt_4.json")
        );
    }

    #[test]
    fn test_distinct_params_and_datasets_do_not_collide() {
        let cache = DiskFeatureCache::new("/cache");
        let a = key("train", 1, 1);
        let mut b = a.clone();
        b.params.sampling_rate = 15;
        let mut c = a.clone();
        c.dataset = "test".to_string();
        assert_ne!(cache.entry_path(&a), cache.entry_path(&b));
        assert_ne!(cache.entry_path(&a), cache.entry_path(&c));
    }

    #[test]
    fn test_compute_error_is_wrapped_and_nothing_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskFeatureCache::new(dir.path());
        let k = key("train", 9, 2);

        let err = cache
            .get_or_compute(&k, &mut || {
                Err(DatasetError::FeatureExtract("detector exploded".into()))
            })
            .unwrap_err();
        match err {
            DatasetError::FeatureCompute {
                dialogue_id,
                utterance_id,
                source,
            } => {
                assert_eq!(dialogue_id, 9);
                assert_eq!(utterance_id, 2);
                assert!(matches!(*source, DatasetError::FeatureExtract(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!cache.entry_path(&k).exists());

        // The failure leaves the key computable on retry.
        let got = cache.get_or_compute(&k, &mut || Ok(tensor(1))).unwrap();
        assert_eq!(got, tensor(1));
    }

    #[test]
    fn test_memory_cache_is_idempotent() {
        let cache = MemoryFeatureCache::new();
        let k = key("train", 5, 0);
        let mut calls = 0usize;
        let mut compute = || {
            calls += 1;
            Ok(tensor(9))
        };
        let a = cache.get_or_compute(&k, &mut compute).unwrap();
        let b = cache.get_or_compute(&k, &mut compute).unwrap();
        assert_eq!(a, b);
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }
}
