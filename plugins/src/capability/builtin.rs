use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use taskwave_core::api::{Capability, ParamSpec};
use tokio::process::Command;

const DEFAULT_SHELL_TIMEOUT_MS: u64 = 60_000;

/// Returns its input unchanged.
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the input unchanged"
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        Ok(params)
    }
}

/// Runs `command` through `sh -c`.
///
/// Output is `{stdout, stderr, exit_code}`; a non-zero exit is an error.
pub struct ShellCapability {
    workdir: Option<PathBuf>,
}

impl ShellCapability {
    pub fn new(workdir: Option<PathBuf>) -> Self {
        Self { workdir }
    }
}

impl Default for ShellCapability {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Capability for ShellCapability {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command and capture its output"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("command", "string", true).with_description("Command line for sh -c"),
            ParamSpec::new("timeout_ms", "integer", false)
                .with_description("Kill the command after this many milliseconds"),
        ]
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let command = params
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing string parameter 'command'"))?;
        let timeout_ms = params
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_SHELL_TIMEOUT_MS);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().context("failed to spawn sh")?;
        let output = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| anyhow!("command timed out after {}ms", timeout_ms))??;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            bail!("command exited with {}: {}", exit_code, stderr.trim());
        }

        Ok(json!({
            "stdout": stdout,
            "stderr": stderr,
            "exit_code": exit_code,
        }))
    }
}

/// Reads a UTF-8 file: `{path}` → `{path, content}`.
pub struct ReadFileCapability;

#[async_trait]
impl Capability for ReadFileCapability {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::new("path", "string", true)]
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let path = string_param(&params, "path")?;
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path))?;
        Ok(json!({ "path": path, "content": content }))
    }
}

/// Writes `content` to `path`, creating parent directories.
pub struct WriteFileCapability;

#[async_trait]
impl Capability for WriteFileCapability {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("path", "string", true),
            ParamSpec::new("content", "string", true),
        ]
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let path = PathBuf::from(string_param(&params, "path")?);
        let content = match params.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => bail!("missing parameter 'content'"),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(json!({ "path": path.display().to_string(), "bytes": content.len() }))
    }
}

fn string_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing string parameter '{}'", key))
}

/// The capabilities every catalog starts with.
pub fn builtin_capabilities(workdir: Option<PathBuf>) -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(EchoCapability),
        Arc::new(ShellCapability::new(workdir)),
        Arc::new(ReadFileCapability),
        Arc::new(WriteFileCapability),
    ]
}
