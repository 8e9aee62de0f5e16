//! Worker backed by the agent executor.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{Worker, write_output_schema};
use crate::core::budget::remaining_budget;
use crate::core::types::ConversationState;
use crate::io::config::RouterConfig;
use crate::io::executor::{ExecRequest, Executor, execute_and_load_json};
use crate::io::prompt::PromptBuilder;

const WORKER_OUTPUT_SCHEMA: &str = include_str!("../../schemas/worker_output.schema.json");

/// Limits and locations shared by executor-backed agents.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Working directory handed to the agent process.
    pub workdir: PathBuf,
    pub prompt_budget_bytes: usize,
    pub output_limit_bytes: usize,
    pub call_timeout: Duration,
}

impl AgentSettings {
    pub fn from_config(cfg: &RouterConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            prompt_budget_bytes: cfg.prompt_budget_bytes,
            output_limit_bytes: cfg.executor_output_limit_bytes,
            call_timeout: Duration::from_secs(cfg.call_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkerOutput {
    output: String,
}

/// A worker whose reasoning runs in the agent backend.
///
/// Tools (search, scraping, SQL) are whatever the backend provides; the
/// instructions steer how they are used.
#[derive(Debug, Clone)]
pub struct ExecWorker<E> {
    name: String,
    instructions: String,
    executor: E,
    settings: AgentSettings,
}

impl<E: Executor> ExecWorker<E> {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        executor: E,
        settings: AgentSettings,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            executor,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<E: Executor> Worker for ExecWorker<E> {
    #[instrument(skip_all, fields(worker = %self.name, step = state.step()))]
    fn act(&self, state: &ConversationState) -> Result<String> {
        let deadline = Instant::now() + self.settings.call_timeout;
        let scratch = tempfile::Builder::new()
            .prefix("router-worker-")
            .tempdir()
            .context("create worker scratch dir")?;
        let schema_path = scratch.path().join("worker_output.schema.json");
        write_output_schema(&schema_path, WORKER_OUTPUT_SCHEMA)?;

        let prompt = PromptBuilder::new(self.settings.prompt_budget_bytes).worker(
            &self.name,
            &self.instructions,
            state,
        )?;

        let request = ExecRequest {
            workdir: self.settings.workdir.clone(),
            prompt,
            output_schema_path: schema_path,
            output_path: scratch.path().join("output.json"),
            executor_log_path: scratch.path().join("executor.log"),
            timeout: remaining_budget(deadline)?,
            output_limit_bytes: self.settings.output_limit_bytes,
        };

        let out: WorkerOutput = execute_and_load_json(&self.executor, &request)?;
        debug!(bytes = out.output.len(), "worker produced output");
        Ok(out.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::act_fail_soft;
    use crate::test_support::CapturingExecutor;
    use serde_json::json;

    fn settings() -> AgentSettings {
        AgentSettings {
            workdir: std::env::temp_dir(),
            prompt_budget_bytes: 10_000,
            output_limit_bytes: 10_000,
            call_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn returns_output_and_sends_prompt() {
        let executor = CapturingExecutor::new(json!({"output": "Rust 1.80 stabilised LazyLock."}));
        let worker = ExecWorker::new(
            "Web_Searcher",
            "Search the web.",
            &executor,
            settings(),
        );
        let state = ConversationState::seed("What changed in Rust 1.80?");

        let got = worker.act(&state).expect("act");

        assert_eq!(got, "Rust 1.80 stabilised LazyLock.");
        let request = executor.last_request().expect("request");
        assert!(request.prompt.contains("You are Web_Searcher"));
        assert!(request.prompt.contains("What changed in Rust 1.80?"));
        assert!(request.output_path.ends_with("output.json"));
    }

    #[test]
    fn schema_violation_is_an_error_and_soft_fails() {
        let executor = CapturingExecutor::new(json!({"answer": 42}));
        let worker = ExecWorker::new("Insight_Researcher", "Summarize.", &executor, settings());
        let state = ConversationState::seed("q");

        let err = worker.act(&state).unwrap_err();
        assert!(err.to_string().contains("violates schema"));

        let contribution = act_fail_soft(worker.name(), &worker, &state);
        assert_eq!(contribution.author, "Insight_Researcher");
        assert!(contribution.content.starts_with("Error in Insight_Researcher: "));
    }
}
