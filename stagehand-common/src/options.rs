//! Option bags handed to collaborators.
//!
//! Scenarios build typed records and convert them into these wire-level
//! bags explicitly; collaborators only ever see the bags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::errors::{HarnessError, HarnessResult};

/// Options for one declarative infrastructure stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraOptions {
    /// Directory holding the infrastructure template.
    pub template_dir: PathBuf,
    /// Input variables, ordered by name.
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Extra environment for the infrastructure tool.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl InfraOptions {
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
            ..Self::default()
        }
    }

    /// Options whose variables are the fields of `record`.
    ///
    /// `record` must serialize to a JSON object; nested records stay nested.
    pub fn from_record<T: Serialize + ?Sized>(
        template_dir: impl Into<PathBuf>,
        record: &T,
    ) -> HarnessResult<Self> {
        let serde_json::Value::Object(fields) = serde_json::to_value(record)? else {
            return Err(HarnessError::Serialization(<serde_json::Error as serde::ser::Error>::custom(
                "infrastructure variables must serialize to an object",
            )));
        };
        let mut options = Self::new(template_dir);
        options.vars = fields.into_iter().collect();
        Ok(options)
    }

    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// String value of a variable, if present and a string.
    pub fn var_str(&self, name: &str) -> Option<&str> {
        self.vars.get(name).and_then(|v| v.as_str())
    }
}

/// Outputs reported by an infrastructure apply.
pub type InfraOutputs = BTreeMap<String, serde_json::Value>;

/// How to reach a Kubernetes cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubectlOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub config_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl KubectlOptions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            context: None,
            config_path: config_path.into(),
            namespace: None,
        }
    }

    /// Global kubectl flags derived from these options.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--kubeconfig".to_string(),
            self.config_path.display().to_string(),
        ];
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        if let Some(namespace) = &self.namespace {
            args.push("--namespace".to_string());
            args.push(namespace.clone());
        }
        args
    }
}
