//! Router configuration stored under `.router/config.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::DEFAULT_MAX_STEPS;
use crate::core::references::DEFAULT_REFERENCE_MARKER;
use crate::core::types::{FINISH, USER_AUTHOR};
use crate::io::executor::{OUTPUT_PLACEHOLDER, SCHEMA_PLACEHOLDER};

/// Router configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults that
/// reproduce the two-worker web research setup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouterConfig {
    /// Maximum decide/act cycles per run. Zero answers with the request itself.
    pub max_steps: u32,

    /// Wall-clock limit for a single supervisor or worker call, in seconds.
    pub call_timeout_secs: u64,

    /// Truncate executor stdout/stderr logs beyond this many bytes.
    pub executor_output_limit_bytes: usize,

    /// Maximum prompt size before sections are dropped or truncated.
    pub prompt_budget_bytes: usize,

    /// Lines of the final answer starting with this token are references.
    pub reference_marker: String,

    pub supervisor: SupervisorConfig,

    pub executor: ExecutorConfig,

    /// Registered workers, in display order.
    pub workers: Vec<WorkerConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorMode {
    /// Ask the agent backend for a schema-constrained routing decision.
    #[default]
    Llm,
    /// Run every worker once in registry order.
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SupervisorConfig {
    pub mode: SupervisorMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Agent command line. `{schema}` and `{output}` are substituted per call.
    pub command: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: [
                "codex",
                "exec",
                "--skip-git-repo-check",
                "--output-schema",
                SCHEMA_PLACEHOLDER,
                "--output-last-message",
                OUTPUT_PLACEHOLDER,
                "-",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerConfig {
    pub name: String,
    pub instructions: String,
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            call_timeout_secs: 10 * 60,
            executor_output_limit_bytes: 100_000,
            prompt_budget_bytes: 40_000,
            reference_marker: DEFAULT_REFERENCE_MARKER.to_string(),
            supervisor: SupervisorConfig::default(),
            executor: ExecutorConfig::default(),
            workers: vec![
                WorkerConfig::new(
                    "Web_Searcher",
                    "You are a web search engine. Search for information on the internet and return the results.",
                ),
                WorkerConfig::new(
                    "Insight_Researcher",
                    "You are an Insight Researcher. Identify key topics from the provided content, \
                     search for more information on them, summarize it, and cite sources as \
                     footnotes of the form `[^n]: [title](url)`.",
                ),
            ],
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.call_timeout_secs == 0 {
            return Err(anyhow!("call_timeout_secs must be > 0"));
        }
        if self.executor_output_limit_bytes == 0 {
            return Err(anyhow!("executor_output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.reference_marker.trim().is_empty() {
            return Err(anyhow!("reference_marker must be non-empty"));
        }
        if self.executor.command.is_empty() || self.executor.command[0].trim().is_empty() {
            return Err(anyhow!("executor.command must be a non-empty array"));
        }
        if self.workers.is_empty() {
            return Err(anyhow!("at least one worker must be configured"));
        }
        let mut seen = HashSet::new();
        for worker in &self.workers {
            validate_worker_name(&worker.name)?;
            if !seen.insert(worker.name.as_str()) {
                return Err(anyhow!("duplicate worker name {:?}", worker.name));
            }
        }
        Ok(())
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name.clone()).collect()
    }
}

/// Worker names must be usable as routing symbols.
pub fn validate_worker_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.trim() != name {
        return Err(anyhow!(
            "worker name {name:?} must be non-empty without surrounding whitespace"
        ));
    }
    if name == FINISH || name == USER_AUTHOR {
        return Err(anyhow!("worker name {name:?} is reserved"));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RouterConfig::default()`.
pub fn load_config(path: &Path) -> Result<RouterConfig> {
    if !path.exists() {
        let cfg = RouterConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RouterConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RouterConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RouterConfig::default());
        assert_eq!(cfg.max_steps, 5);
        assert_eq!(cfg.worker_names(), vec!["Web_Searcher", "Insight_Researcher"]);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = RouterConfig {
            max_steps: 2,
            supervisor: SupervisorConfig {
                mode: SupervisorMode::Sequential,
            },
            ..RouterConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "max_steps = 3\n\n[[workers]]\nname = \"Analyst\"\ninstructions = \"Analyse.\"\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_steps, 3);
        assert_eq!(cfg.worker_names(), vec!["Analyst"]);
        assert_eq!(cfg.reference_marker, "[^");
        assert_eq!(cfg.supervisor.mode, SupervisorMode::Llm);
    }

    #[test]
    fn rejects_reserved_and_duplicate_names() {
        let mut cfg = RouterConfig::default();
        cfg.workers.push(WorkerConfig::new("FINISH", "x"));
        assert!(cfg.validate().unwrap_err().to_string().contains("reserved"));

        let mut cfg = RouterConfig::default();
        cfg.workers.push(WorkerConfig::new("Web_Searcher", "again"));
        assert!(cfg.validate().unwrap_err().to_string().contains("duplicate"));

        let mut cfg = RouterConfig::default();
        cfg.workers.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_limits() {
        let cfg = RouterConfig {
            call_timeout_secs: 0,
            ..RouterConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = RouterConfig {
            reference_marker: " ".to_string(),
            ..RouterConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
