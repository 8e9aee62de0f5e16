//! Worker and supervisor abstractions.
//!
//! [`Worker`] and [`Supervisor`] are the two seams the driver calls through.
//! The `Exec*` implementations delegate to an agent backend via
//! [`Executor`](crate::io::executor::Executor); tests use scripted doubles.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::core::types::{Contribution, ConversationState, RoutingDecision};
use crate::io::config::{RouterConfig, SupervisorMode};
use crate::io::executor::Executor;

pub mod sequential;
pub mod supervisor;
pub mod worker;

/// A tool-using reasoning component that contributes one message per call.
///
/// Implementations may fail; the driver never sees those failures directly,
/// see [`act_fail_soft`].
pub trait Worker: Send + Sync {
    fn act(&self, state: &ConversationState) -> Result<String>;
}

impl<W: Worker + ?Sized> Worker for std::sync::Arc<W> {
    fn act(&self, state: &ConversationState) -> Result<String> {
        (**self).act(state)
    }
}

/// Everything a supervisor may look at when choosing the next actor.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub state: &'a ConversationState,
    /// Registered worker names, in registry order.
    pub members: &'a [String],
    pub max_steps: u32,
}

/// Chooses the next worker or FINISH.
///
/// An `Err` means the decision could not be produced or parsed; the driver
/// treats it as FINISH.
pub trait Supervisor {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<RoutingDecision>;
}

impl<S: Supervisor + ?Sized> Supervisor for &S {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<RoutingDecision> {
        (**self).decide(ctx)
    }
}

impl<S: Supervisor + ?Sized> Supervisor for Box<S> {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<RoutingDecision> {
        (**self).decide(ctx)
    }
}

/// Build the configured supervisor; `force_sequential` overrides the mode.
pub fn supervisor_from_config<E>(
    cfg: &RouterConfig,
    force_sequential: bool,
    executor: E,
    workdir: &Path,
) -> Box<dyn Supervisor + Send + Sync>
where
    E: Executor + 'static,
{
    if force_sequential || cfg.supervisor.mode == SupervisorMode::Sequential {
        Box::new(sequential::SequentialSupervisor)
    } else {
        Box::new(supervisor::ExecSupervisor::new(
            executor,
            worker::AgentSettings::from_config(cfg, workdir),
        ))
    }
}

/// Invoke `worker` and always return a contribution authored by `name`.
///
/// Failures become `Error in <name>: <cause>` text so the run continues.
pub fn act_fail_soft(name: &str, worker: &dyn Worker, state: &ConversationState) -> Contribution {
    match worker.act(state) {
        Ok(content) => Contribution::new(name, content),
        Err(err) => {
            warn!(worker = name, err = %format!("{err:#}"), "worker failed");
            Contribution::new(name, format!("Error in {name}: {err:#}"))
        }
    }
}

pub(crate) fn write_output_schema(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create schema dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write schema {}", path.display()))
}
