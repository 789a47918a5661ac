// src/cache/memory.rs

//! In-process cache backend, grounded on the teacher's `MemoryHashStore`
//! pattern (a mutex-guarded map) generalized from path-hash pairs to full
//! cache entries. Default backend for single-process runs and tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::cache::{Cache, CacheEntry};
use crate::errors::{EngineError, Result};
use crate::fs::FileSystem;
use crate::graph::model::Task;
use crate::types::NodeResult;

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Cache for MemoryCache {
    fn has(&self, task_hash: &str) -> bool {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .contains_key(task_hash)
    }

    fn get(&self, task_hash: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(task_hash)
            .cloned()
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        // A single `insert` under the write lock is atomic with respect to
        // every other `has`/`get`/`restore` call.
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(entry.task_hash.clone(), entry);
        Ok(())
    }

    fn restore(
        &self,
        fs: &dyn FileSystem,
        task: &Task,
        task_hash: &str,
        work_dir: &Path,
    ) -> Result<NodeResult> {
        let entry = self.get(task_hash).ok_or_else(|| {
            EngineError::Cache(format!(
                "no cache entry for task '{}' with hash {task_hash}",
                task.name
            ))
        })?;

        for (output, content) in &entry.artifacts {
            let path = work_dir.join(output);
            fs.write(&path, content)
                .map_err(|e| EngineError::Cache(format!("{e:#}")))?;
        }

        Ok(NodeResult {
            task_hash: entry.task_hash,
            exit_code: entry.exit_code,
            stdout: entry.stdout,
            stderr: entry.stderr,
            from_cache: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn task() -> Task {
        Task {
            name: "a".to_string(),
            task_type: None,
            command: "true".to_string(),
            inputs: Default::default(),
            env: Default::default(),
            outputs: Default::default(),
            upstream: Vec::new(),
        }
    }

    fn entry(hash: &str, artifacts: Vec<(String, Vec<u8>)>) -> CacheEntry {
        CacheEntry {
            task_hash: hash.to_string(),
            exit_code: 0,
            stdout: b"out".to_vec(),
            stderr: Vec::new(),
            artifacts,
        }
    }

    #[test]
    fn has_is_false_before_put_and_true_after() {
        let cache = MemoryCache::new();
        assert!(!cache.has("h1"));
        cache.put(entry("h1", Vec::new())).unwrap();
        assert!(cache.has("h1"));
    }

    #[test]
    fn get_returns_none_for_absent_entry() {
        let cache = MemoryCache::new();
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn restore_writes_artifacts_to_work_dir_and_marks_from_cache() {
        let cache = MemoryCache::new();
        cache
            .put(entry("h1", vec![("out.txt".to_string(), b"content".to_vec())]))
            .unwrap();
        let fs = MockFileSystem::new();
        let result = cache.restore(&fs, &task(), "h1", Path::new(".")).unwrap();
        assert!(result.from_cache);
        assert_eq!(result.task_hash, "h1");
        assert!(fs.exists(Path::new("./out.txt")));
    }

    #[test]
    fn restore_fails_for_unknown_hash() {
        let cache = MemoryCache::new();
        let fs = MockFileSystem::new();
        let err = cache.restore(&fs, &task(), "missing", Path::new(".")).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Cache);
    }
}
