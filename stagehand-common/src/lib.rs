//! Core of the stagehand validation harness.
//!
//! A scenario is a sequence of named stages run by a [`StageRunner`]. Stages
//! hand data to one another through a [`StateStore`] scoped to the run, so a
//! later invocation can skip finished stages (via a [`SkipSignalSource`]) and
//! pick up where an earlier one stopped. Waiting on eventually-consistent
//! systems goes through [`poll_until`].

pub mod collab;
pub mod config;
pub mod errors;
pub mod logging;
pub mod options;
pub mod report;
pub mod retry;
pub mod skip;
pub mod stage;
pub mod state;
pub mod testing;
pub mod wait;

pub use config::{EnvParser, HarnessConfig};
pub use errors::{ErrorCode, HarnessError, HarnessResult, StageFailure};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use options::{InfraOptions, InfraOutputs, KubectlOptions};
pub use report::{ScenarioFailure, ScenarioReport, StageRecord, StageStatus};
pub use retry::{
    Poll, Poller, RecordingSleeper, RetryError, RetryPolicy, Sleeper, ThreadSleeper, poll_until,
};
pub use skip::{AnySkipSignal, EnvSkipSignals, NoSkip, SkipSignalSource, StaticSkipSignals};
pub use stage::StageRunner;
pub use state::{RunContext, StateStore};
