//! Skip signals: which stages to leave out of this invocation.
//!
//! Sources are built once per invocation and handed to the
//! [`StageRunner`](crate::stage::StageRunner); nothing reads the process
//! environment after construction.

use std::collections::BTreeSet;

/// Prefix of the per-stage skip environment variables (`SKIP_<stage>`).
pub const SKIP_ENV_PREFIX: &str = "SKIP_";

/// Decides whether a named stage is skipped.
pub trait SkipSignalSource {
    fn should_skip(&self, stage: &str) -> bool;
}

/// Never skips anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSkip;

impl SkipSignalSource for NoSkip {
    fn should_skip(&self, _stage: &str) -> bool {
        false
    }
}

/// Explicit set of stage names, e.g. from `--skip` flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSkipSignals {
    stages: BTreeSet<String>,
}

impl StaticSkipSignals {
    pub fn new<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(String::as_str)
    }
}

impl SkipSignalSource for StaticSkipSignals {
    fn should_skip(&self, stage: &str) -> bool {
        self.stages.contains(stage)
    }
}

/// Snapshot of `SKIP_<stage>` variables.
///
/// A stage is skipped when its variable is set to any non-empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSkipSignals {
    inner: StaticSkipSignals,
}

impl EnvSkipSignals {
    /// Capture skip flags from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Capture skip flags from an explicit variable list.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let stages = vars.into_iter().filter_map(|(key, value)| {
            let stage = key.as_ref().strip_prefix(SKIP_ENV_PREFIX)?;
            (!stage.is_empty() && !value.as_ref().is_empty()).then(|| stage.to_string())
        });
        Self {
            inner: StaticSkipSignals::new(stages),
        }
    }

    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.inner.stages()
    }
}

impl SkipSignalSource for EnvSkipSignals {
    fn should_skip(&self, stage: &str) -> bool {
        self.inner.should_skip(stage)
    }
}

/// Skips a stage when any of its sources does.
#[derive(Default)]
pub struct AnySkipSignal {
    sources: Vec<Box<dyn SkipSignalSource>>,
}

impl AnySkipSignal {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, source: impl SkipSignalSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl SkipSignalSource for AnySkipSignal {
    fn should_skip(&self, stage: &str) -> bool {
        self.sources.iter().any(|s| s.should_skip(stage))
    }
}

impl<S: SkipSignalSource + ?Sized> SkipSignalSource for Box<S> {
    fn should_skip(&self, stage: &str) -> bool {
        (**self).should_skip(stage)
    }
}
