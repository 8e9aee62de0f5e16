//! Executor abstraction for agent invocation.
//!
//! The [`Executor`] trait decouples workers and the supervisor from the actual
//! agent backend (an external CLI such as `codex exec`). Tests use scripted
//! executors that write predetermined outputs without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Placeholder replaced by the output schema path in the executor command.
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";
/// Placeholder replaced by the output message path in the executor command.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Parameters for an executor invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Prompt text fed on stdin.
    pub prompt: String,
    /// JSON Schema that constrains the agent's final message.
    pub output_schema_path: PathBuf,
    /// Where the agent must write its final JSON message.
    pub output_path: PathBuf,
    /// Where to write the captured stdout/stderr.
    pub executor_log_path: PathBuf,
    pub timeout: Duration,
    /// Truncate executor logs beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over agent execution backends.
pub trait Executor: Send + Sync {
    /// Run the agent with the given request. Must write output to `request.output_path`.
    fn exec(&self, request: &ExecRequest) -> Result<()>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        (**self).exec(request)
    }
}

impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        (**self).exec(request)
    }
}

/// Executor that spawns a configured command line.
///
/// `{schema}` and `{output}` in any argument are replaced with the request's
/// schema and output paths. The prompt is written to stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    argv: Vec<String>,
}

impl CommandExecutor {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            bail!("executor command must be a non-empty array");
        }
        Ok(Self { argv })
    }

    fn build_command(&self, request: &ExecRequest) -> Command {
        let schema = request.output_schema_path.display().to_string();
        let output = request.output_path.display().to_string();
        let mut args = self.argv.iter().map(|arg| {
            arg.replace(SCHEMA_PLACEHOLDER, &schema)
                .replace(OUTPUT_PLACEHOLDER, &output)
        });
        // `new` guarantees a program name.
        let mut cmd = Command::new(args.next().unwrap_or_default());
        cmd.args(args).current_dir(&request.workdir);
        cmd
    }
}

impl Executor for CommandExecutor {
    #[instrument(skip_all, fields(program = %self.argv[0], timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting agent");

        if !request.output_schema_path.exists() {
            return Err(anyhow!(
                "missing output schema {}",
                request.output_schema_path.display()
            ));
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }

        let output = run_command_with_timeout(
            self.build_command(request),
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.argv[0]))?;

        write_executor_log(
            &request.executor_log_path,
            &output,
            request.output_limit_bytes,
        )?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
            return Err(anyhow!("agent timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(anyhow!(
                "agent exited with status {:?}",
                output.status.code()
            ));
        }

        debug!("agent completed successfully");
        Ok(())
    }
}

/// Execute the agent, then load and schema-check its output as `T`.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn execute_and_load_json<E: Executor + ?Sized, T: DeserializeOwned>(
    executor: &E,
    request: &ExecRequest,
) -> Result<T> {
    executor.exec(request)?;
    if !request.output_path.exists() {
        return Err(anyhow!(
            "missing agent output {}",
            request.output_path.display()
        ));
    }
    let value = read_output_json(&request.output_path)?;
    validate_against_schema(&value, &request.output_schema_path)?;
    serde_json::from_value(value)
        .with_context(|| format!("decode {}", request.output_path.display()))
}

fn read_output_json(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read agent output {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Validate a JSON instance against the schema file (Draft 2020-12).
fn validate_against_schema(instance: &Value, schema_path: &Path) -> Result<()> {
    let raw = fs::read_to_string(schema_path)
        .with_context(|| format!("read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse schema {}", schema_path.display()))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!(
            "agent output violates schema:\n- {}",
            messages.join("\n- ")
        );
    }
    Ok(())
}

fn write_executor_log(path: &Path, output: &CommandOutput, output_limit: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create executor log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.truncated_notice("agent"));
    if output.timed_out {
        buf.push_str("\n[agent timed out]\n");
    }

    if buf.len() > output_limit {
        let mut cut = output_limit;
        while !buf.is_char_boundary(cut) {
            cut -= 1;
        }
        let dropped = buf.len() - cut;
        buf.truncate(cut);
        buf.push_str(&format!("\n[truncated {dropped} bytes]\n"));
    }

    fs::write(path, buf).with_context(|| format!("write executor log {}", path.display()))
}
