//! Process-wide logging setup.
//!
//! Binaries build a [`LogConfig`] (usually [`LogConfig::from_env`]), adjust it
//! from their flags and call [`init_logging`], keeping the returned guards
//! alive until exit so buffered lines are flushed.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::EnvParser;
use crate::errors::{HarnessError, HarnessResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(HarnessError::Config(format!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive; a bare level applies to everything.
    pub level: String,
    pub format: LogFormat,
    /// Also write JSON lines to this file.
    pub file: Option<PathBuf>,
    /// Emit to stderr (stdout stays free for reports).
    pub stderr: bool,
}

impl LogConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::Pretty,
            file: None,
            stderr: false,
        }
    }

    /// Reads `STAGEHAND_LOG_LEVEL`, `STAGEHAND_LOG_FORMAT` and
    /// `STAGEHAND_LOG_FILE`. Malformed values fall back to defaults.
    pub fn from_env(default_level: &str) -> Self {
        Self::from_parser(&mut EnvParser::new(), default_level)
    }

    pub fn from_parser(env: &mut EnvParser, default_level: &str) -> Self {
        let level = env.get_log_level("LOG_LEVEL", default_level);
        let format = env
            .get_optional_string("LOG_FORMAT")
            .and_then(|f| f.parse().ok())
            .unwrap_or_default();
        let file = env.get_optional_path("LOG_FILE");
        Self {
            level,
            format,
            file,
            stderr: false,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Keeps the non-blocking writers flushing; drop at exit.
#[must_use = "dropping the guards stops log delivery"]
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> HarnessResult<LoggingGuards> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guards = Vec::new();

    if config.stderr {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        guards.push(guard);
        let layer = tracing_subscriber::fmt::layer().with_writer(writer);
        layers.push(match config.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Pretty => layer.with_target(false).boxed(),
        });
    }

    if let Some(path) = &config.file {
        let (dir, name) = split_log_path(path)?;
        std::fs::create_dir_all(&dir)?;
        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.filter())
        .try_init()
        .map_err(|e| HarnessError::Config(format!("failed to initialize logging: {e}")))?;

    Ok(LoggingGuards { _guards: guards })
}

fn split_log_path(path: &Path) -> HarnessResult<(PathBuf, PathBuf)> {
    let name = path
        .file_name()
        .ok_or_else(|| HarnessError::Config(format!("log file {} has no name", path.display())))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    Ok((dir, PathBuf::from(name)))
}
