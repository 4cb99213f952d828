//! Terraform-backed [`Infrastructure`].
//!
//! Variables are passed through a JSON var-file written next to the
//! template, which keeps nested records (TLS subjects and the like) intact.

use std::path::{Path, PathBuf};

use tracing::info;

use super::command::{CommandRunner, ProcessCommandRunner, ShellCommand};
use super::Infrastructure;
use crate::errors::{HarnessError, HarnessResult};
use crate::options::{InfraOptions, InfraOutputs};

const VAR_FILE: &str = "stagehand.auto.tfvars.json";

#[derive(Debug, Clone)]
pub struct TerraformCli<R = ProcessCommandRunner> {
    runner: R,
    binary: String,
}

impl TerraformCli<ProcessCommandRunner> {
    pub fn new() -> Self {
        Self::with_runner(ProcessCommandRunner::new())
    }
}

impl Default for TerraformCli<ProcessCommandRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> TerraformCli<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            binary: "terraform".to_string(),
        }
    }

    /// Use a different binary (e.g. `tofu`).
    #[must_use]
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self, options: &InfraOptions) -> ShellCommand {
        let mut cmd = ShellCommand::new(&self.binary).current_dir(&options.template_dir);
        for (k, v) in &options.env {
            cmd = cmd.env(k, v);
        }
        cmd.env("TF_IN_AUTOMATION", "1")
    }

    fn write_var_file(&self, options: &InfraOptions) -> HarnessResult<PathBuf> {
        let path = var_file_path(&options.template_dir);
        let content = serde_json::to_vec_pretty(&options.vars)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn init(&self, options: &InfraOptions) -> HarnessResult<()> {
        info!(dir = %options.template_dir.display(), "terraform init");
        self.runner
            .run(&self.command(options).args(["init", "-input=false", "-no-color"]))?;
        Ok(())
    }

    /// All outputs as JSON values.
    pub fn outputs(&self, options: &InfraOptions) -> HarnessResult<InfraOutputs> {
        let raw = self.runner.run(
            &self
                .command(options)
                .args(["output", "-json", "-no-color"])
                .stdout_only(),
        )?;
        parse_outputs(&raw)
    }
}

impl<R: CommandRunner> Infrastructure for TerraformCli<R> {
    /// `terraform init`, then `terraform apply`; returns all outputs.
    fn apply(&self, options: &InfraOptions) -> HarnessResult<InfraOutputs> {
        self.init(options)?;
        let var_file = self.write_var_file(options)?;
        info!(dir = %options.template_dir.display(), vars = options.vars.len(), "terraform apply");
        self.runner.run(&self.command(options).args([
            "apply".to_string(),
            "-auto-approve".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
            format!("-var-file={}", var_file.display()),
        ]))?;
        self.outputs(options)
    }

    fn destroy(&self, options: &InfraOptions) -> HarnessResult<()> {
        let var_file = self.write_var_file(options)?;
        info!(dir = %options.template_dir.display(), "terraform destroy");
        self.runner.run(&self.command(options).args([
            "destroy".to_string(),
            "-auto-approve".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
            format!("-var-file={}", var_file.display()),
        ]))?;
        Ok(())
    }

    fn output(&self, options: &InfraOptions, key: &str) -> HarnessResult<String> {
        let raw = self.runner.run(
            &self
                .command(options)
                .args(["output", "-raw", "-no-color", key])
                .stdout_only(),
        )?;
        Ok(raw.trim().to_string())
    }
}

fn var_file_path(template_dir: &Path) -> PathBuf {
    template_dir.join(VAR_FILE)
}

/// Flatten `terraform output -json` (`{"name": {"value": ...}}`).
fn parse_outputs(raw: &str) -> HarnessResult<InfraOutputs> {
    let parsed: serde_json::Value = serde_json::from_str(raw)?;
    let object = parsed
        .as_object()
        .ok_or_else(|| HarnessError::fatal("terraform", "output -json did not return an object"))?;
    Ok(object
        .iter()
        .map(|(name, entry)| {
            let value = entry.get("value").cloned().unwrap_or(serde_json::Value::Null);
            (name.clone(), value)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingCommandRunner;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_outputs_flattens_values() {
        let raw = r#"{"trigger_id": {"sensitive": false, "type": "string", "value": "abc-123"},
                      "node_count": {"value": 3}}"#;
        let outputs = parse_outputs(raw).unwrap();
        assert_eq!(outputs["trigger_id"], json!("abc-123"));
        assert_eq!(outputs["node_count"], json!(3));
    }

    #[test]
    fn test_parse_outputs_rejects_non_object() {
        assert!(parse_outputs("[]").is_err());
        assert!(parse_outputs("not json").is_err());
    }

    #[test]
    fn test_apply_writes_var_file_and_runs_apply_then_output() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingCommandRunner::new();
        runner.respond_to("terraform output -json", r#"{"cluster_name": {"value": "gke-x"}}"#);
        let terraform = TerraformCli::with_runner(runner.clone());
        let options = InfraOptions::new(tmp.path())
            .with_var("cluster_name", "gke-x")
            .with_var("tls_subject", json!({"org": "Gruntwork"}));

        let outputs = terraform.apply(&options).unwrap();
        assert_eq!(outputs["cluster_name"], json!("gke-x"));

        let var_file: serde_json::Value =
            serde_json::from_slice(&std::fs::read(tmp.path().join(VAR_FILE)).unwrap()).unwrap();
        assert_eq!(var_file["tls_subject"]["org"], "Gruntwork");

        let calls = runner.command_lines();
        assert_eq!(calls[0], "terraform init -input=false -no-color");
        assert!(calls[1].starts_with("terraform apply -auto-approve -input=false"));
        assert!(calls[1].contains(VAR_FILE));
        assert_eq!(calls[2], "terraform output -json -no-color");
        assert!(runner.calls()[0].env.contains_key("TF_IN_AUTOMATION"));
        assert_eq!(runner.calls()[0].working_dir.as_deref(), Some(tmp.path()));
    }

    #[test]
    fn test_output_trims_raw_value() {
        let runner = RecordingCommandRunner::new();
        runner.respond_to("terraform output -raw", "trigger-42\n");
        let terraform = TerraformCli::with_runner(runner.clone());
        let value = terraform
            .output(&InfraOptions::new("/nonexistent"), "trigger_id")
            .unwrap();
        assert_eq!(value, "trigger-42");
        assert_eq!(
            runner.command_lines(),
            vec!["terraform output -raw -no-color trigger_id"]
        );
    }

    #[test]
    fn test_destroy_propagates_failure() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingCommandRunner::new();
        runner.fail_on("terraform destroy", "Error acquiring the state lock");
        let terraform = TerraformCli::with_runner(runner).binary("terraform");
        let err = terraform.destroy(&InfraOptions::new(tmp.path())).unwrap_err();
        assert!(err.to_string().contains("state lock"));
    }
}
