//! Test support shared by this crate and its dependents.

pub mod fakes;
pub mod log;

pub use fakes::{
    InfraCall, RecordingCommandRunner, RecordingInfrastructure, ScriptedBuildSource,
    ScriptedNodeSource,
};
pub use log::{init_test_logging, TestLogEntry, TestLogger, TestPhase};
