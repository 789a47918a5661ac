// src/types.rs

//! Small shared type aliases used across module boundaries.

/// Canonical task/node identifier type used throughout the crate.
pub type TaskName = String;

/// Hex-encoded stable content hash (SHA-256 or BLAKE3 digest, rendered as
/// lowercase hex). Kept as a plain `String` rather than a fixed-size array so
/// callers don't need to know which digest produced it.
pub type HashHex = String;

/// Result of running (or restoring) a single node (§3 "Node result"):
/// task hash, exit code, captured output, and whether it came from cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResult {
    pub task_hash: HashHex,
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub from_cache: bool,
}

impl NodeResult {
    pub fn success(task_hash: HashHex, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            task_hash,
            exit_code: 0,
            stdout,
            stderr,
            from_cache: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}
