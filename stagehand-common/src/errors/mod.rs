//! Error types for the harness.
//!
//! [`HarnessError`] is what stage bodies, the state store and collaborators
//! return. [`StageFailure`] ties one of those errors to the stage it halted.

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};

use std::path::PathBuf;

/// Error type for harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("State entry '{key}' not found in run {run}")]
    StateNotFound { run: PathBuf, key: String },

    #[error("Invalid state key '{0}'")]
    InvalidStateKey(String),

    #[error("Retries exhausted for '{description}' after {attempts} attempts: {last_reason}")]
    RetriesExhausted {
        description: String,
        attempts: u32,
        last_reason: String,
    },

    #[error("{collaborator} failed: {message}")]
    FatalCollaborator {
        collaborator: String,
        message: String,
    },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Stage panicked: {0}")]
    Panicked(String),

    #[error("Stage '{0}' registered more than once")]
    DuplicateStage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Shorthand for a non-retryable collaborator failure.
    pub fn fatal(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FatalCollaborator {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// Catalog code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::StateNotFound { .. } => ErrorCode::StateNotFound,
            Self::InvalidStateKey(_) => ErrorCode::StateInvalidKey,
            Self::Serialization(_) => ErrorCode::StateSerialization,
            Self::Io(_) => ErrorCode::StateIo,
            Self::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
            Self::FatalCollaborator { .. } => ErrorCode::CollaboratorFatal,
            Self::Assertion(_) => ErrorCode::StageAssertion,
            Self::Panicked(_) => ErrorCode::StagePanicked,
            Self::DuplicateStage(_) => ErrorCode::StageDuplicate,
            Self::Config(_) => ErrorCode::ConfigInvalid,
        }
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// A stage body failed; names the stage and carries the cause.
#[derive(Debug, thiserror::Error)]
#[error("stage '{stage}' failed [{code}]: {source}", code = .source.code())]
pub struct StageFailure {
    pub stage: String,
    #[source]
    pub source: HarnessError,
}

impl StageFailure {
    pub fn new(stage: impl Into<String>, source: HarnessError) -> Self {
        Self {
            stage: stage.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_names_stage_and_code() {
        let failure = StageFailure::new(
            "wait_for_build",
            HarnessError::fatal("cloud-build", "Build is not successful"),
        );
        let rendered = failure.to_string();
        assert!(rendered.contains("wait_for_build"));
        assert!(rendered.contains("SH-E200"));
        assert!(rendered.contains("Build is not successful"));
    }

    #[test]
    fn test_io_error_converts() {
        let err: HarnessError = std::io::Error::other("disk gone").into();
        assert_eq!(err.code(), ErrorCode::StateIo);
    }

    #[test]
    fn test_state_not_found_mentions_key() {
        let err = HarnessError::StateNotFound {
            run: PathBuf::from("stages/Demo"),
            key: "buildID".to_string(),
        };
        assert!(err.to_string().contains("buildID"));
        assert_eq!(err.code().code_string(), "SH-E001");
    }
}
