//! Supervisor backed by the agent executor.
//!
//! The routing schema is generated per call so its `next` enum is exactly the
//! current vocabulary; the reply is still run through the closed-vocabulary
//! parser in case the backend ignores the schema.

use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::worker::AgentSettings;
use super::{DecisionContext, Supervisor, write_output_schema};
use crate::core::budget::remaining_budget;
use crate::core::decision::{parse_route_value, vocabulary};
use crate::core::types::RoutingDecision;
use crate::io::executor::{ExecRequest, Executor, execute_and_load_json};
use crate::io::prompt::PromptBuilder;

/// JSON Schema constraining the supervisor reply to `{"next": <option>}`.
pub fn route_schema(members: &[String]) -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "Route",
        "description": "Select next agent or finish",
        "type": "object",
        "properties": {
            "next": { "enum": vocabulary(members) }
        },
        "required": ["next"],
        "additionalProperties": false
    })
}

#[derive(Debug, Clone)]
pub struct ExecSupervisor<E> {
    executor: E,
    settings: AgentSettings,
}

impl<E: Executor> ExecSupervisor<E> {
    pub fn new(executor: E, settings: AgentSettings) -> Self {
        Self { executor, settings }
    }
}

impl<E: Executor> Supervisor for ExecSupervisor<E> {
    #[instrument(skip_all, fields(step = ctx.state.step(), max_steps = ctx.max_steps))]
    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<RoutingDecision> {
        let deadline = Instant::now() + self.settings.call_timeout;
        let scratch = tempfile::Builder::new()
            .prefix("router-supervisor-")
            .tempdir()
            .context("create supervisor scratch dir")?;
        let schema_path = scratch.path().join("route.schema.json");
        let schema = serde_json::to_string_pretty(&route_schema(ctx.members))?;
        write_output_schema(&schema_path, &schema)?;

        let prompt = PromptBuilder::new(self.settings.prompt_budget_bytes).supervisor(
            ctx.state,
            ctx.members,
            ctx.max_steps,
        )?;

        let request = ExecRequest {
            workdir: self.settings.workdir.clone(),
            prompt,
            output_schema_path: schema_path,
            output_path: scratch.path().join("route.json"),
            executor_log_path: scratch.path().join("executor.log"),
            timeout: remaining_budget(deadline)?,
            output_limit_bytes: self.settings.output_limit_bytes,
        };

        let reply: Value = execute_and_load_json(&self.executor, &request)?;
        let decision = parse_route_value(&reply, ctx.members)?;
        debug!(%decision, "supervisor decided");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ConversationState;
    use crate::test_support::CapturingExecutor;
    use std::time::Duration;

    fn settings() -> AgentSettings {
        AgentSettings {
            workdir: std::env::temp_dir(),
            prompt_budget_bytes: 10_000,
            output_limit_bytes: 10_000,
            call_timeout: Duration::from_secs(5),
        }
    }

    fn members() -> Vec<String> {
        vec!["Web_Searcher".to_string(), "Insight_Researcher".to_string()]
    }

    #[test]
    fn schema_enumerates_vocabulary() {
        let schema = route_schema(&members());
        assert_eq!(
            schema["properties"]["next"]["enum"],
            json!(["FINISH", "Web_Searcher", "Insight_Researcher"])
        );
    }

    #[test]
    fn decides_from_structured_reply() {
        let executor = CapturingExecutor::new(json!({"next": "Insight_Researcher"}));
        let supervisor = ExecSupervisor::new(&executor, settings());
        let state = ConversationState::seed("q");
        let members = members();
        let ctx = DecisionContext {
            state: &state,
            members: &members,
            max_steps: 5,
        };

        let decision = supervisor.decide(&ctx).expect("decide");

        assert_eq!(decision, RoutingDecision::worker("Insight_Researcher"));
        let request = executor.last_request().expect("request");
        assert!(request.prompt.contains("Options: FINISH, Web_Searcher, Insight_Researcher"));
    }

    #[test]
    fn out_of_vocabulary_reply_is_an_error() {
        let executor = CapturingExecutor::new(json!({"next": "Summarizer"}));
        let supervisor = ExecSupervisor::new(&executor, settings());
        let state = ConversationState::seed("q");
        let members = members();
        let ctx = DecisionContext {
            state: &state,
            members: &members,
            max_steps: 5,
        };

        assert!(supervisor.decide(&ctx).is_err());
    }
}
