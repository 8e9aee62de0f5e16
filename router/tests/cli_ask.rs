//! CLI tests for `router init`, `router validate`, and `router ask`.
//!
//! Spawns the router binary against a project whose agent backend is a small
//! shell script, so no external agent is needed.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use router::exit_codes;
use router::io::config::{RouterConfig, SupervisorConfig, SupervisorMode, WorkerConfig, write_config};
use router::io::init::RouterPaths;
use serde_json::Value;

/// Supervisor calls route to `Analyst` once, then finish; worker calls answer
/// with a footnoted result.
const FAKE_AGENT: &str = r#"cat > /dev/null
case "$1" in
  *route.schema.json)
    if [ -f routed ]; then
      printf '%s' '{"next":"FINISH"}' > "$2"
    else
      touch routed
      printf '%s' '{"next":"Analyst"}' > "$2"
    fi
    ;;
  *)
    printf '%s' '{"output":"Analysis done [^1]\n[^1]: https://example.com"}' > "$2"
    ;;
esac
"#;

fn router(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_router"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("spawn router")
}

fn write_project(root: &Path, mode: SupervisorMode) {
    let script = root.join("fake_agent.sh");
    fs::write(&script, FAKE_AGENT).expect("write script");
    let mut cfg = RouterConfig {
        call_timeout_secs: 30,
        supervisor: SupervisorConfig { mode },
        workers: vec![WorkerConfig::new("Analyst", "Analyse the request.")],
        ..RouterConfig::default()
    };
    cfg.executor.command = vec![
        "sh".to_string(),
        script.display().to_string(),
        "{schema}".to_string(),
        "{output}".to_string(),
    ];
    write_config(&RouterPaths::new(root).config_path, &cfg).expect("write config");
}

#[test]
fn init_then_validate_succeeds() {
    let temp = tempfile::tempdir().expect("tempdir");

    let init = router(temp.path(), &["init"]);
    assert_eq!(init.status.code(), Some(exit_codes::OK));
    let validate = router(temp.path(), &["validate"]);
    assert_eq!(validate.status.code(), Some(exit_codes::OK));

    let again = router(temp.path(), &["init"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn validate_rejects_broken_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = RouterPaths::new(temp.path());
    fs::create_dir_all(&paths.router_dir).expect("mkdir");
    fs::write(&paths.config_path, "max_steps = \"many\"\n").expect("write");

    let output = router(temp.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn ask_with_llm_supervisor_prints_answer_and_records_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_project(temp.path(), SupervisorMode::Llm);

    let output = router(temp.path(), &["ask", "analyse this"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout,
        "Analysis done [^1]\n\n**References:**\n[^1]: https://example.com\n"
    );

    let runs: Vec<_> = fs::read_dir(RouterPaths::new(temp.path()).runs_dir)
        .expect("runs dir")
        .flatten()
        .collect();
    assert_eq!(runs.len(), 1);
    let run_dir = runs[0].path();
    assert!(run_dir.join("steps").join("1.json").is_file());
    assert!(run_dir.join("answer.md").is_file());
    let meta: Value =
        serde_json::from_str(&fs::read_to_string(run_dir.join("meta.json")).expect("meta"))
            .expect("json");
    assert_eq!(meta["stop"]["reason"], "finished");
    assert_eq!(meta["supervisor_calls"], 2);
}

#[test]
fn ask_sequential_json_respects_budget() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_project(temp.path(), SupervisorMode::Llm);

    let output = router(
        temp.path(),
        &["ask", "analyse this", "--sequential", "--no-record", "--json", "--max-steps", "0"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{output:?}");
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["steps"], 0);
    assert_eq!(report["supervisor_calls"], 0);
    assert_eq!(report["answer"], "analyse this");
    assert_eq!(report["stop"]["reason"], "budget_exhausted");
    assert!(!RouterPaths::new(temp.path()).runs_dir.exists());
}

#[test]
fn ask_sequential_runs_each_worker_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_project(temp.path(), SupervisorMode::Sequential);

    let output = router(temp.path(), &["ask", "analyse this", "--no-record", "--json"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{output:?}");
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["steps"], 1);
    assert_eq!(report["stop"]["reason"], "finished");
    assert_eq!(report["references"][0], "[^1]: https://example.com");
}
