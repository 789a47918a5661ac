// src/hash/workdir.rs

//! Working-directory identity, fed into the task hash.
//!
//! Original §4.2 says only "working-directory identity" without defining it.
//! This crate resolves that gap (recorded in DESIGN.md) by using the
//! canonicalized absolute path string of the directory the graph is resolved
//! against — not an inode or device number, which would be non-portable and
//! break reproducibility across checkouts of the same tree on different
//! machines or filesystems.

use std::path::{Path, PathBuf};

use crate::errors::{EngineError, Result};
use crate::fs::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkdirIdentity(String);

impl WorkdirIdentity {
    pub fn resolve(fs: &dyn FileSystem, work_dir: &Path) -> Result<Self> {
        let canonical = fs
            .canonicalize(work_dir)
            .map_err(|e| EngineError::Workspace(format!("{e:#}")))?;
        Ok(Self(path_to_identity(&canonical)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn path_to_identity(path: &PathBuf) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn resolve_uses_canonicalized_path() {
        let fs = MockFileSystem::new();
        let identity = WorkdirIdentity::resolve(&fs, Path::new("/work/dir")).unwrap();
        assert_eq!(identity.as_str(), "/work/dir");
    }

    #[test]
    fn backslashes_are_normalized_to_forward_slashes() {
        assert_eq!(path_to_identity(&PathBuf::from("C:\\work\\dir")), "C:/work/dir");
    }
}
