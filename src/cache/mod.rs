// src/cache/mod.rs

//! Cache interface (§4.3): a content-addressed store keyed by task hash.
//!
//! The core specifies only the capability set (`has`/`get`/`put`/`restore`)
//! and two guarantees: `has() == true` implies `restore()` must succeed
//! modulo I/O errors, and `put()` is atomic. On-disk layout is a backend
//! concern, not a core one — [`memory::MemoryCache`] is the default
//! in-process implementation used by tests and single-shot runs;
//! [`fs_cache::FsCache`] is the reference on-disk implementation.

pub mod fs_cache;
pub mod memory;

use std::path::Path;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::graph::model::Task;
use crate::types::{HashHex, NodeResult};

/// A content-addressed cache entry: the captured outcome of a successful
/// task execution, plus the bytes of its declared output files so they can
/// be restored onto disk without re-running the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub task_hash: HashHex,
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Declared output path (relative to the task's working dir) to content,
    /// sorted by path so `restore` writes files in a deterministic order.
    pub artifacts: Vec<(String, Vec<u8>)>,
}

/// Cache backend contract. Implementations must be safe for concurrent
/// `has`/`get`/`restore`/`put` calls from worker threads (§5).
pub trait Cache: Send + Sync {
    fn has(&self, task_hash: &str) -> bool;
    fn get(&self, task_hash: &str) -> Option<CacheEntry>;
    fn put(&self, entry: CacheEntry) -> Result<()>;

    /// Restores a cache entry's artifacts onto disk under `work_dir` (via
    /// `fs`, the same abstraction the task hasher resolves inputs through)
    /// and returns the resulting [`NodeResult`] with `from_cache = true`.
    fn restore(
        &self,
        fs: &dyn FileSystem,
        task: &Task,
        task_hash: &str,
        work_dir: &Path,
    ) -> Result<NodeResult>;
}
