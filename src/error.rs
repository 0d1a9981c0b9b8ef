//! Error types with actionable diagnostics.
//!
//! Every failure carries enough context (column name, node id, mode string)
//! for the caller to render a precise message. Nothing in this crate
//! terminates the process; encoder and tree invariant violations fail fast
//! rather than returning a degraded result.

use thiserror::Error;

/// Result type alias for destilar operations.
pub type Result<T> = std::result::Result<T, DestilarError>;

/// Errors that can occur across the encode / tree / distill pipeline.
#[derive(Error, Debug)]
pub enum DestilarError {
    /// A required or requested column is absent from the event table.
    #[error("Missing column '{column}' in event table\n  → expected columns: case_id, activity, time:timestamp plus any requested attributes")]
    MissingColumn { column: String },

    /// Event table columns disagree on row count.
    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    ColumnLengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// The event table holds no events.
    #[error("Event table is empty\n  → load an event log before encoding")]
    EmptyTable,

    /// Input disagrees with the bound feature schema.
    #[error("Schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A tree edit addressed a node id that does not exist.
    #[error("Node {node_id} not found in tree")]
    NodeNotFound { node_id: usize },

    /// A tree edit addressed a node of the wrong kind.
    #[error("Node {node_id} is invalid for this operation: {message}")]
    InvalidNode { node_id: usize, message: String },

    /// An unrecognized branch direction was supplied.
    #[error("Invalid direction '{direction}'\n  → expected one of: left, right, auto")]
    InvalidDirection { direction: String },

    /// No training example reaches the target node under the current tree.
    #[error("No training data reaches node {node_id}; cannot retrain subtree")]
    DataMismatch { node_id: usize },

    /// An unrecognized fine-tuning mode string was supplied.
    #[error("Unknown fine-tuning mode '{mode}'\n  → expected one of: changed_complete, changed_ground_truth, ground_truth")]
    UnknownMode { mode: String },

    /// Index-aligned arrays disagree on shape.
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A persisted artifact is missing, e.g. after session cleanup.
    #[error("Artifact '{name}' not found in session '{session}'\n  → the session may have been cleaned up; re-run the producing step")]
    ArtifactNotFound { session: String, name: String },

    /// A session id that cannot be used as a storage key.
    #[error("Invalid session id '{session}': {message}")]
    InvalidSession { session: String, message: String },

    /// A hyperparameter outside its valid range.
    #[error("Invalid value for '{param}': {message}")]
    InvalidParam { param: String, message: String },

    /// An operation that requires a fitted model was called before fit.
    #[error("Model is not fitted; call fit before {operation}")]
    Unfitted { operation: String },

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Pipeline configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl DestilarError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a schema mismatch error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Check if this error is user-recoverable (bad request rather than bug).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::MissingColumn { .. }
                | Self::EmptyTable
                | Self::NodeNotFound { .. }
                | Self::InvalidNode { .. }
                | Self::InvalidDirection { .. }
                | Self::DataMismatch { .. }
                | Self::UnknownMode { .. }
                | Self::ArtifactNotFound { .. }
                | Self::InvalidSession { .. }
                | Self::InvalidParam { .. }
                | Self::Config { .. }
        )
    }

    /// Get the error code for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingColumn { .. } => "E001",
            Self::ColumnLengthMismatch { .. } => "E002",
            Self::EmptyTable => "E003",
            Self::SchemaMismatch { .. } => "E010",
            Self::NodeNotFound { .. } => "E020",
            Self::InvalidNode { .. } => "E021",
            Self::InvalidDirection { .. } => "E022",
            Self::DataMismatch { .. } => "E023",
            Self::UnknownMode { .. } => "E030",
            Self::ShapeMismatch { .. } => "E031",
            Self::ArtifactNotFound { .. } => "E040",
            Self::InvalidSession { .. } => "E041",
            Self::InvalidParam { .. } => "E050",
            Self::Unfitted { .. } => "E051",
            Self::Io { .. } => "E060",
            Self::Serialization { .. } => "E061",
            Self::Config { .. } => "E070",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_names_the_column() {
        let err = DestilarError::MissingColumn {
            column: "case_id".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("case_id"));
        assert!(msg.contains("Missing column"));
    }

    #[test]
    fn test_node_errors_carry_node_id() {
        let err = DestilarError::NodeNotFound { node_id: 17 };
        assert!(err.to_string().contains("17"));

        let err = DestilarError::DataMismatch { node_id: 4 };
        assert!(err.to_string().contains("node 4"));
    }

    #[test]
    fn test_unknown_mode_lists_alternatives() {
        let err = DestilarError::UnknownMode {
            mode: "frobnicate".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("frobnicate"));
        assert!(msg.contains("changed_complete"));
    }

    #[test]
    fn test_error_codes_are_unique() {
        let errors = vec![
            DestilarError::MissingColumn { column: "".into() },
            DestilarError::ColumnLengthMismatch {
                column: "".into(),
                expected: 0,
                actual: 0,
            },
            DestilarError::EmptyTable,
            DestilarError::schema(""),
            DestilarError::NodeNotFound { node_id: 0 },
            DestilarError::InvalidNode {
                node_id: 0,
                message: "".into(),
            },
            DestilarError::InvalidDirection {
                direction: "".into(),
            },
            DestilarError::DataMismatch { node_id: 0 },
            DestilarError::UnknownMode { mode: "".into() },
            DestilarError::ShapeMismatch {
                context: "".into(),
                expected: vec![],
                actual: vec![],
            },
            DestilarError::ArtifactNotFound {
                session: "".into(),
                name: "".into(),
            },
            DestilarError::InvalidSession {
                session: "".into(),
                message: "".into(),
            },
            DestilarError::InvalidParam {
                param: "".into(),
                message: "".into(),
            },
            DestilarError::Unfitted {
                operation: "".into(),
            },
            DestilarError::Serialization { message: "".into() },
            DestilarError::Config { message: "".into() },
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_user_errors_are_recoverable() {
        assert!(DestilarError::EmptyTable.is_user_error());
        assert!(DestilarError::UnknownMode { mode: "x".into() }.is_user_error());
        assert!(DestilarError::ArtifactNotFound {
            session: "s".into(),
            name: "tree".into()
        }
        .is_user_error());
        assert!(!DestilarError::Serialization { message: "".into() }.is_user_error());
    }

    #[test]
    fn test_io_error_constructor() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = DestilarError::io("loading artifact", io_err);
        assert!(matches!(err, DestilarError::Io { .. }));
        assert!(err.to_string().contains("loading artifact"));
    }
}
