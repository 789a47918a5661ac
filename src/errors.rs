// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Every variant maps onto one of the closed `Kind`s from the error-handling
//! design: Parse, Schema, Structural, Semantic, Workspace, Cache, Execution,
//! System, Cancellation. Messages are deterministic — task/node ids, not
//! memory addresses or timestamps.

use thiserror::Error;

/// Stable, externally-visible error kind. Used by the CLI surface to map
/// failures onto the closed exit-code set without re-deriving categories
/// from error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Schema,
    Structural,
    Semantic,
    Workspace,
    Cache,
    Execution,
    System,
    Cancellation,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("structural error [{code}]: {message}")]
    Structural { code: &'static str, message: String },

    #[error("semantic error: {0}")]
    Semantic(String),

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("internal error: {0}")]
    System(String),

    #[error("run cancelled")]
    Cancellation,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Parse(_) => ErrorKind::Parse,
            EngineError::Schema(_) => ErrorKind::Schema,
            EngineError::Structural { .. } => ErrorKind::Structural,
            EngineError::Semantic(_) => ErrorKind::Semantic,
            EngineError::Workspace(_) => ErrorKind::Workspace,
            EngineError::Cache(_) => ErrorKind::Cache,
            EngineError::Execution(_) => ErrorKind::Execution,
            EngineError::System(_) => ErrorKind::System,
            EngineError::Cancellation => ErrorKind::Cancellation,
            // Malformed documents surface as Parse; serde_json itself doesn't
            // know about our schema, so callers wrap structural/schema-specific
            // failures before they reach here.
            EngineError::Json(_) => ErrorKind::Parse,
            EngineError::Io(_) => ErrorKind::Workspace,
            EngineError::Other(_) => ErrorKind::System,
        }
    }

    /// Whether this failure class is resumable per the Failure record rules:
    /// Graph and Workspace failures are never resumable; Execution is
    /// conditionally resumable (decided by the caller, who knows whether
    /// checkpoints exist); System is resumable iff checkpoints exist.
    pub fn resumable_class(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Parse
                | ErrorKind::Schema
                | ErrorKind::Structural
                | ErrorKind::Semantic
                | ErrorKind::Workspace
        )
    }

    pub fn structural(code: &'static str, message: impl Into<String>) -> Self {
        EngineError::Structural {
            code,
            message: message.into(),
        }
    }

    /// Maps this error onto the CLI's closed exit-code set: 1 validation/
    /// graph error, 2 arg/system/workspace error, 3 execution failure. Exit
    /// code 4 (plugin error) has no corresponding `ErrorKind` — the CLI
    /// binary assigns it directly for the `plugins` command.
    pub fn cli_exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Parse | ErrorKind::Schema | ErrorKind::Structural | ErrorKind::Semantic => 1,
            ErrorKind::Workspace | ErrorKind::System | ErrorKind::Cancellation => 2,
            ErrorKind::Execution | ErrorKind::Cache => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_level_errors_exit_code_1() {
        for err in [
            EngineError::Parse("x".into()),
            EngineError::Schema("x".into()),
            EngineError::structural("code", "x"),
            EngineError::Semantic("x".into()),
        ] {
            assert_eq!(err.cli_exit_code(), 1);
        }
    }

    #[test]
    fn workspace_system_cancellation_exit_code_2() {
        for err in [
            EngineError::Workspace("x".into()),
            EngineError::System("x".into()),
            EngineError::Cancellation,
        ] {
            assert_eq!(err.cli_exit_code(), 2);
        }
    }

    #[test]
    fn execution_and_cache_exit_code_3() {
        for err in [EngineError::Execution("x".into()), EngineError::Cache("x".into())] {
            assert_eq!(err.cli_exit_code(), 3);
        }
    }

    #[test]
    fn graph_and_workspace_errors_are_never_resumable() {
        for err in [
            EngineError::Parse("x".into()),
            EngineError::Schema("x".into()),
            EngineError::structural("code", "x"),
            EngineError::Semantic("x".into()),
            EngineError::Workspace("x".into()),
        ] {
            assert!(!err.resumable_class());
        }
    }

    #[test]
    fn execution_and_system_errors_are_resumable_class() {
        assert!(EngineError::Execution("x".into()).resumable_class());
        assert!(EngineError::Cache("x".into()).resumable_class());
        assert!(EngineError::System("x".into()).resumable_class());
    }

    #[test]
    fn io_error_maps_to_workspace_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Workspace);
    }

    #[test]
    fn json_error_maps_to_parse_kind() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: EngineError = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn anyhow_error_maps_to_system_kind() {
        let err: EngineError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), ErrorKind::System);
    }

    #[test]
    fn failure_class_from_error_kind_covers_every_kind() {
        use crate::recovery::records::FailureClass;
        assert_eq!(FailureClass::from_error_kind(ErrorKind::Parse), FailureClass::GraphFailure);
        assert_eq!(FailureClass::from_error_kind(ErrorKind::Schema), FailureClass::GraphFailure);
        assert_eq!(FailureClass::from_error_kind(ErrorKind::Structural), FailureClass::GraphFailure);
        assert_eq!(FailureClass::from_error_kind(ErrorKind::Semantic), FailureClass::GraphFailure);
        assert_eq!(FailureClass::from_error_kind(ErrorKind::Workspace), FailureClass::WorkspaceFailure);
        assert_eq!(FailureClass::from_error_kind(ErrorKind::Execution), FailureClass::ExecutionFailure);
        assert_eq!(FailureClass::from_error_kind(ErrorKind::Cache), FailureClass::ExecutionFailure);
        assert_eq!(FailureClass::from_error_kind(ErrorKind::System), FailureClass::SystemFailure);
        assert_eq!(FailureClass::from_error_kind(ErrorKind::Cancellation), FailureClass::SystemFailure);
    }
}
