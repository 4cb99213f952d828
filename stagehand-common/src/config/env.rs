//! Environment variable parsing with type safety.
//!
//! The parser reads from a snapshot of variables taken at construction, so
//! tests can hand it a fixed map instead of mutating the process environment.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    #[error("Invalid duration for {var}: {value}")]
    InvalidDuration { var: String, value: String },

    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
/// A malformed value records an error and yields the default.
pub struct EnvParser {
    prefix: &'static str,
    vars: BTreeMap<String, String>,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Parser over the current process environment, prefix `STAGEHAND_`.
    pub fn new() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Parser over an explicit variable set.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: "STAGEHAND_",
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn lookup(&self, name: &str) -> Option<(String, String)> {
        let var_name = self.var_name(name);
        self.vars.get(&var_name).map(|v| (var_name, v.clone()))
    }

    /// Unprefixed variable, ignoring empty values.
    pub fn get_raw(&self, var: &str) -> Option<String> {
        self.vars.get(var).filter(|v| !v.is_empty()).cloned()
    }

    /// First non-empty of several unprefixed variables.
    pub fn get_first_raw(&self, vars: &[&str]) -> Option<String> {
        vars.iter().find_map(|var| self.get_raw(var))
    }

    pub fn get_optional_string(&mut self, name: &str) -> Option<String> {
        self.lookup(name)
            .map(|(_, value)| value)
            .filter(|v| !v.is_empty())
    }

    /// Boolean; accepts 1/true/yes/on and 0/false/no/off/"".
    pub fn get_bool(&mut self, name: &str, default: bool) -> bool {
        let Some((var, value)) = self.lookup(name) else {
            return default;
        };
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" | "" => false,
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                default
            }
        }
    }

    pub fn get_optional_u32_range(&mut self, name: &str, min: u32, max: u32) -> Option<u32> {
        let (var, value) = self.lookup(name)?;
        match value.parse::<u32>() {
            Ok(n) if (min..=max).contains(&n) => Some(n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "unsigned 32-bit integer".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Duration in humantime notation (`10s`, `1m 30s`).
    pub fn get_optional_duration(&mut self, name: &str) -> Option<Duration> {
        let (var, value) = self.lookup(name)?;
        match humantime::parse_duration(value.trim()) {
            Ok(d) => Some(d),
            Err(_) => {
                self.errors.push(EnvError::InvalidDuration { var, value });
                None
            }
        }
    }

    /// Path with `~/` expanded to the home directory.
    pub fn get_optional_path(&mut self, name: &str) -> Option<PathBuf> {
        self.get_optional_string(name).map(|v| expand_tilde(&v))
    }

    pub fn get_log_level(&mut self, name: &str, default: &str) -> String {
        let Some((var, value)) = self.lookup(name) else {
            return default.to_string();
        };
        let lower = value.to_lowercase();
        match lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => lower,
            _ => {
                self.errors.push(EnvError::InvalidLogLevel { var, value });
                default.to_string()
            }
        }
    }

    /// Comma-separated list; `None` when unset.
    pub fn get_optional_list(&mut self, name: &str) -> Option<Vec<String>> {
        let (_, value) = self.lookup(name)?;
        Some(
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn expand_tilde(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), dirs::home_dir()) {
        (Some(stripped), Some(home)) => home.join(stripped),
        _ => PathBuf::from(value),
    }
}
