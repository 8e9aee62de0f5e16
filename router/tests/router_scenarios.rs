//! End-to-end routing scenarios driven through the public API.
//!
//! Supervisors and workers are scripted so every run is deterministic; the
//! last test swaps in the executor-backed agents with a scripted backend.

use std::sync::Arc;

use router::agents::supervisor::ExecSupervisor;
use router::agents::worker::{AgentSettings, ExecWorker};
use router::core::types::{RoutingDecision, StopReason, USER_AUTHOR};
use router::driver::{RouterEvent, RunOptions, UnknownWorkerError, run_router};
use router::registry::WorkerRegistry;
use router::test_support::{ScriptedDecision, ScriptedExecutor, ScriptedSupervisor, ScriptedWorker};
use serde_json::json;

fn research_registry() -> (WorkerRegistry, Arc<ScriptedWorker>, Arc<ScriptedWorker>) {
    let searcher = Arc::new(ScriptedWorker::always("search results"));
    let researcher = Arc::new(ScriptedWorker::always(
        "Rust 2024 stabilised async closures [^1].\n[^1]: [Rust blog](https://blog.rust-lang.org)",
    ));
    let registry = WorkerRegistry::builder()
        .register("Web_Searcher", searcher.clone())
        .and_then(|b| b.register("Insight_Researcher", researcher.clone()))
        .expect("register")
        .build();
    (registry, searcher, researcher)
}

fn options(max_steps: u32) -> RunOptions {
    RunOptions::default().with_max_steps(max_steps)
}

/// Search, research, finish: the canonical two-worker flow.
#[test]
fn research_flow_renders_references() {
    let (registry, searcher, researcher) = research_registry();
    let supervisor = ScriptedSupervisor::symbols(&["Web_Searcher", "Insight_Researcher", "FINISH"]);

    let outcome =
        run_router("What is new in Rust?", &registry, &supervisor, &options(5), |_| {})
            .expect("run");

    assert_eq!(outcome.stop, StopReason::Finished);
    assert_eq!(outcome.steps(), 2);
    assert_eq!(outcome.supervisor_calls, 3);
    assert_eq!((searcher.calls(), researcher.calls()), (1, 1));
    assert_eq!(
        outcome.render(),
        "Rust 2024 stabilised async closures [^1].\n\n**References:**\n[^1]: [Rust blog](https://blog.rust-lang.org)\n"
    );
}

/// The supervisor never finishes; the guard stops the run at the budget.
#[test]
fn step_budget_bounds_every_call() {
    for max_steps in 0..4 {
        let (registry, searcher, researcher) = research_registry();
        let supervisor = ScriptedSupervisor::symbols(&["Web_Searcher"]);

        let outcome =
            run_router("loop forever", &registry, &supervisor, &options(max_steps), |_| {})
                .expect("run");

        assert_eq!(supervisor.calls(), max_steps);
        assert_eq!(searcher.calls() + researcher.calls(), max_steps);
        assert_eq!(outcome.state.len(), 1 + max_steps as usize);
        assert_eq!(
            outcome.stop,
            StopReason::BudgetExhausted {
                steps: max_steps,
                max_steps
            }
        );
    }
}

/// Every merge appends one contribution and the seed stays first.
#[test]
fn conversation_is_append_only() {
    let (registry, _, _) = research_registry();
    let supervisor = ScriptedSupervisor::symbols(&["Insight_Researcher", "Web_Searcher", "FINISH"]);
    let mut merged_steps = Vec::new();

    let outcome = run_router("q", &registry, &supervisor, &options(5), |event| {
        if let RouterEvent::Merged { step, .. } = event {
            merged_steps.push(*step);
        }
    })
    .expect("run");

    assert_eq!(merged_steps, vec![1, 2]);
    let authors: Vec<&str> = outcome
        .state
        .contributions()
        .iter()
        .map(|c| c.author.as_str())
        .collect();
    assert_eq!(authors, vec![USER_AUTHOR, "Insight_Researcher", "Web_Searcher"]);
}

#[test]
fn worker_failure_does_not_abort_the_run() {
    let flaky = Arc::new(ScriptedWorker::new(vec![
        Err("rate limited".to_string()),
        Ok("recovered".to_string()),
    ]));
    let registry = WorkerRegistry::builder()
        .register("Web_Searcher", flaky.clone())
        .expect("register")
        .build();
    let supervisor = ScriptedSupervisor::symbols(&["Web_Searcher", "Web_Searcher", "FINISH"]);

    let outcome = run_router("q", &registry, &supervisor, &options(5), |_| {}).expect("run");

    assert_eq!(flaky.calls(), 2);
    assert_eq!(
        outcome.state.contributions()[1].content,
        "Error in Web_Searcher: rate limited"
    );
    assert_eq!(outcome.render(), "recovered");
}

#[test]
fn unknown_symbol_finishes_and_unknown_worker_fails() {
    let (registry, searcher, _) = research_registry();
    let supervisor = ScriptedSupervisor::symbols(&["Summarizer"]);
    let outcome = run_router("q", &registry, &supervisor, &options(5), |_| {}).expect("run");
    assert!(matches!(outcome.stop, StopReason::MalformedDecision { .. }));
    assert_eq!(searcher.calls(), 0);

    let supervisor = ScriptedSupervisor::new(vec![ScriptedDecision::Unchecked(
        RoutingDecision::worker("Summarizer"),
    )]);
    let err = run_router("q", &registry, &supervisor, &options(5), |_| {}).unwrap_err();
    assert!(err.downcast_ref::<UnknownWorkerError>().is_some());
}

/// Executor-backed supervisor and worker sharing one scripted backend.
#[test]
fn exec_agents_route_through_backend() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(ScriptedExecutor::new(vec![
        json!({"next": "Web_Searcher"}),
        json!({"output": "found it\n[^1]: https://example.com"}),
        json!({"next": "FINISH"}),
    ]));
    let settings = AgentSettings {
        workdir: temp.path().to_path_buf(),
        prompt_budget_bytes: 20_000,
        output_limit_bytes: 20_000,
        call_timeout: std::time::Duration::from_secs(30),
    };
    let registry = WorkerRegistry::builder()
        .register(
            "Web_Searcher",
            ExecWorker::new(
                "Web_Searcher",
                "Search the web.",
                executor.clone(),
                settings.clone(),
            ),
        )
        .expect("register")
        .build();
    let supervisor = ExecSupervisor::new(executor.clone(), settings);

    let outcome =
        run_router("find it", &registry, &supervisor, &options(5), |_| {}).expect("run");

    assert_eq!(outcome.stop, StopReason::Finished);
    assert_eq!(outcome.answer.body, "found it");
    assert_eq!(outcome.answer.references, vec!["[^1]: https://example.com"]);
    let prompts = executor.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].contains("Options: FINISH, Web_Searcher"));
    assert!(prompts[1].contains("Search the web."));
    assert!(prompts[2].contains("found it"));
}
