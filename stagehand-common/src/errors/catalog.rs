//! Error catalog for stagehand.
//!
//! Every [`HarnessError`](super::HarnessError) maps to a stable code in the
//! `SH-Exxx` format so reports and logs can be grepped across runs.
//!
//! | Range      | Category      | Description                              |
//! |------------|---------------|------------------------------------------|
//! | E001-E099  | State         | State store reads, writes and keys       |
//! | E100-E199  | Retry         | Retry poller exhaustion                  |
//! | E200-E299  | Collaborator  | External tool and API failures           |
//! | E300-E399  | Stage         | Stage body and runner failures           |
//! | E400-E499  | Config        | Configuration parsing                    |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category, derived from the code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    State,
    Retry,
    Collaborator,
    Stage,
    Config,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::State => "state",
            Self::Retry => "retry",
            Self::Collaborator => "collaborator",
            Self::Stage => "stage",
            Self::Config => "config",
        };
        write!(f, "{s}")
    }
}

/// Error code enumeration covering every harness failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // State (E001-E099)
    /// A stage read a key that no earlier stage wrote.
    StateNotFound,
    /// A state key contains characters that cannot name a file.
    StateInvalidKey,
    /// A state entry could not be (de)serialized.
    StateSerialization,
    /// Filesystem failure under the run directory.
    StateIo,

    // Retry (E100-E199)
    /// The poller saw only retryable outcomes until its budget ran out.
    RetriesExhausted,

    // Collaborator (E200-E299)
    /// A collaborator call failed in a non-retryable way.
    CollaboratorFatal,

    // Stage (E300-E399)
    /// A stage-level check did not hold.
    StageAssertion,
    /// A stage body panicked.
    StagePanicked,
    /// Two stages with the same name were registered in one run.
    StageDuplicate,

    // Config (E400-E499)
    /// Configuration could not be parsed.
    ConfigInvalid,
}

/// Catalog entry describing an error code.
#[derive(Debug, Clone, Copy)]
pub struct ErrorEntry {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: &'static str,
    pub remediation: &'static [&'static str],
}

impl ErrorCode {
    /// Stable code string, e.g. `SH-E001`.
    pub fn code_string(&self) -> &'static str {
        self.entry().code
    }

    pub fn category(&self) -> ErrorCategory {
        self.entry().category
    }

    pub fn entry(&self) -> ErrorEntry {
        match self {
            Self::StateNotFound => ErrorEntry {
                code: "SH-E001",
                category: ErrorCategory::State,
                message: "State entry was never written in this run",
                remediation: &[
                    "Run the stage that produces the key first",
                    "Do not skip producing stages on the first run of a scenario",
                ],
            },
            Self::StateInvalidKey => ErrorEntry {
                code: "SH-E002",
                category: ErrorCategory::State,
                message: "State key is not a valid entry name",
                remediation: &["Use ASCII letters, digits, '_', '-' or '.' in state keys"],
            },
            Self::StateSerialization => ErrorEntry {
                code: "SH-E003",
                category: ErrorCategory::State,
                message: "State entry could not be encoded or decoded",
                remediation: &[
                    "Check that the value type matches the one the producing stage saved",
                    "Remove the run directory if it was written by an older version",
                ],
            },
            Self::StateIo => ErrorEntry {
                code: "SH-E004",
                category: ErrorCategory::State,
                message: "Filesystem operation on the run directory failed",
                remediation: &["Check permissions and free space of the state root"],
            },
            Self::RetriesExhausted => ErrorEntry {
                code: "SH-E100",
                category: ErrorCategory::Retry,
                message: "Condition did not become true within the retry budget",
                remediation: &[
                    "Inspect the last reason reported by the poller",
                    "Re-run only the waiting stage with earlier stages skipped",
                ],
            },
            Self::CollaboratorFatal => ErrorEntry {
                code: "SH-E200",
                category: ErrorCategory::Collaborator,
                message: "External collaborator failed",
                remediation: &[
                    "Check credentials and project of the external tool",
                    "Re-run the command shown in the error by hand",
                ],
            },
            Self::StageAssertion => ErrorEntry {
                code: "SH-E300",
                category: ErrorCategory::Stage,
                message: "Stage check failed",
                remediation: &["Inspect the live infrastructure state for the failed stage"],
            },
            Self::StagePanicked => ErrorEntry {
                code: "SH-E301",
                category: ErrorCategory::Stage,
                message: "Stage body panicked",
                remediation: &["Run with --verbose and inspect the panic message"],
            },
            Self::StageDuplicate => ErrorEntry {
                code: "SH-E302",
                category: ErrorCategory::Stage,
                message: "Stage name registered twice in one run",
                remediation: &["Give every stage of a scenario a unique name"],
            },
            Self::ConfigInvalid => ErrorEntry {
                code: "SH-E400",
                category: ErrorCategory::Config,
                message: "Configuration is invalid",
                remediation: &[
                    "Check STAGEHAND_* environment variables",
                    "Validate stagehand.toml syntax",
                ],
            },
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
