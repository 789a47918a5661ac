use std::path::{Path, PathBuf};

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initializes tracing for the integration test binaries, mirroring the
/// unit-test harness in `taskgraph-test-utils::init_tracing`. Only prints
/// captured output for failing tests unless run with `-- --nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).with_test_writer().with_target(true).init();
    });
}

/// A scratch workspace rooted in a fresh temp directory, with the three
/// directories every run entry point needs: work, cache, recovery.
pub struct Workspace {
    pub root: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("failed to create temp workspace");
        std::fs::create_dir_all(root.path().join("work")).unwrap();
        std::fs::create_dir_all(root.path().join("cache")).unwrap();
        std::fs::create_dir_all(root.path().join("recovery")).unwrap();
        Self { root }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.path().join("cache")
    }

    pub fn recovery_dir(&self) -> PathBuf {
        self.root.path().join("recovery")
    }

    pub fn graph_path(&self) -> PathBuf {
        self.root.path().join("graph.json")
    }

    pub fn write_graph(&self, bytes: &[u8]) {
        std::fs::write(self.graph_path(), bytes).unwrap();
    }

    pub fn write_work_file(&self, relative: &str, content: &[u8]) {
        let path = self.work_dir().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn read_work_file(&self, relative: &str) -> String {
        std::fs::read_to_string(self.work_dir().join(relative)).unwrap()
    }

    pub fn work_file_exists(&self, relative: &str) -> bool {
        self.work_dir().join(relative).is_file()
    }
}

/// Raw JSON document bytes for a graph with no declared tasks or edges —
/// scenario S1 (the empty-graph edge case).
pub fn empty_graph_document() -> Vec<u8> {
    br#"{"schema_version":"1.0.0","graph":{"nodes":[],"edges":[]},"metadata":{}}"#.to_vec()
}

/// Raw JSON document bytes for a document containing a two-node cycle
/// (A depends on B, B depends on A) — scenario S3.
pub fn cyclic_graph_document() -> Vec<u8> {
    br#"{"schema_version":"1.0.0","graph":{
        "nodes":[
            {"id":"a","command":"true","inputs":{},"env":{},"outputs":[]},
            {"id":"b","command":"true","inputs":{},"env":{},"outputs":[]}
        ],
        "edges":[{"from":"a","to":"b"},{"from":"b","to":"a"}]
    },"metadata":{}}"#
        .to_vec()
}

#[allow(dead_code)]
pub fn shell_escape(path: &Path) -> String {
    path.display().to_string()
}
