//! Run transcripts under `.router/runs/<run-id>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::core::types::StopReason;
use crate::driver::RouterOutcome;

/// `YYYYMMDD-HHMMSS-<6 hex>`, UTC.
pub fn generate_run_id(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("{}-{suffix:06x}", now.format("%Y%m%d-%H%M%S"))
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub run_id: String,
    pub request: String,
    pub stop: StopReason,
    pub steps: u32,
    pub supervisor_calls: u32,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

/// One merged worker contribution.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord<'a> {
    pub step: u32,
    pub worker: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub steps_dir: PathBuf,
    pub meta_path: PathBuf,
    pub answer_path: PathBuf,
}

impl RunPaths {
    pub fn new(runs_dir: &Path, run_id: &str) -> Self {
        let dir = runs_dir.join(run_id);
        Self {
            steps_dir: dir.join("steps"),
            meta_path: dir.join("meta.json"),
            answer_path: dir.join("answer.md"),
            dir,
        }
    }

    pub fn step_path(&self, step: u32) -> PathBuf {
        self.steps_dir.join(format!("{step}.json"))
    }
}

pub struct TranscriptRequest<'a> {
    pub runs_dir: &'a Path,
    pub run_id: &'a str,
    pub outcome: &'a RouterOutcome,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Persist a finished run. Steps are numbered from 1; the seed is not a step.
pub fn write_transcript(request: &TranscriptRequest<'_>) -> Result<RunPaths> {
    let paths = RunPaths::new(request.runs_dir, request.run_id);
    fs::create_dir_all(&paths.steps_dir)
        .with_context(|| format!("create run dir {}", paths.dir.display()))?;

    let outcome = request.outcome;
    for (step, contribution) in (1u32..).zip(outcome.state.contributions().iter().skip(1)) {
        write_json(
            &paths.step_path(step),
            &StepRecord {
                step,
                worker: &contribution.author,
                content: &contribution.content,
            },
        )?;
    }

    let duration_ms = (request.ended_at - request.started_at)
        .num_milliseconds()
        .max(0) as u64;
    let meta = RunMeta {
        run_id: request.run_id.to_string(),
        request: outcome.state.request().to_string(),
        stop: outcome.stop.clone(),
        steps: outcome.steps(),
        supervisor_calls: outcome.supervisor_calls,
        started_at: request.started_at.to_rfc3339(),
        ended_at: request.ended_at.to_rfc3339(),
        duration_ms,
    };
    write_json(&paths.meta_path, &meta)?;

    let mut answer = outcome.render();
    if !answer.ends_with('\n') {
        answer.push('\n');
    }
    fs::write(&paths.answer_path, answer)
        .with_context(|| format!("write {}", paths.answer_path.display()))?;

    debug!(dir = %paths.dir.display(), steps = meta.steps, "transcript written");
    Ok(paths)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
