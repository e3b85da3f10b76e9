//! Error types for the gearflow core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, GearError>;

/// Errors surfaced by the path guard, the state store, the scorer and the
/// prioritizer.
#[derive(Debug, Error)]
pub enum GearError {
    /// A directory argument failed validation.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A bounded or enumerated parameter failed validation.
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter { param: String, reason: String },

    /// No state document exists yet.
    #[error("State document not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The state document failed validation and no backup could replace it.
    #[error(
        "State document {} is corrupted ({reason}); moved to {}",
        .path.display(),
        .quarantined.display()
    )]
    Corrupted {
        path: PathBuf,
        reason: String,
        quarantined: PathBuf,
    },

    /// The state document exceeds the size ceiling and was not read.
    #[error("State document {} is {size} bytes, over the {limit} byte limit", .path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The state document was written by a newer schema.
    #[error("State document {} has schema version {found}; this build supports up to {supported}", .path.display())]
    UnsupportedSchema {
        path: PathBuf,
        found: u64,
        supported: u32,
    },

    /// The roadmap contains dependency cycles.
    #[error("Dependency cycle detected: {}", format_cycles(.0))]
    CycleDetected(Vec<Vec<String>>),

    /// Invalid scorer or store configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A mutation would break a workflow invariant.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// The document changed since the caller last read it.
    #[error("Revision conflict: expected revision {expected}, found {actual}")]
    RevisionConflict { expected: u64, actual: u64 },

    /// A stage collaborator reported failure.
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GearError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_param(param: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn transition(reason: impl Into<String>) -> Self {
        Self::InvalidTransition(reason.into())
    }

    /// True when the error means "no document yet" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            let mut ids = cycle.clone();
            if let Some(first) = cycle.first() {
                ids.push(first.clone());
            }
            ids.join(" -> ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}
