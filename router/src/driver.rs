//! The bounded routing loop.
//!
//! [`run_router`] walks the [`Phase`] machine:
//!
//! ```text
//! AwaitingDecision --guard tripped / FINISH / malformed--> Terminated
//!        |  worker
//!        v
//!   Dispatching --act (fail-soft)--> Merging --append, step += 1--> AwaitingDecision
//! ```
//!
//! The budget guard runs before every supervisor call, so a run with budget
//! `N` makes at most `N` supervisor calls and at most `N` worker calls.

use std::fmt;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::agents::{DecisionContext, Supervisor, act_fail_soft};
use crate::core::budget::{DEFAULT_MAX_STEPS, budget_exhausted};
use crate::core::references::{DEFAULT_REFERENCE_MARKER, FinalAnswer, split_references};
use crate::core::types::{Contribution, ConversationState, Phase, RoutingDecision, StopReason};
use crate::io::config::RouterConfig;
use crate::registry::WorkerRegistry;

/// Per-run knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub max_steps: u32,
    pub reference_marker: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            reference_marker: DEFAULT_REFERENCE_MARKER.to_string(),
        }
    }
}

impl RunOptions {
    pub fn from_config(cfg: &RouterConfig) -> Self {
        Self {
            max_steps: cfg.max_steps,
            reference_marker: cfg.reference_marker.clone(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Progress notifications emitted while a run advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RouterEvent {
    Decided {
        step: u32,
        decision: RoutingDecision,
    },
    Merged {
        step: u32,
        author: String,
        content: String,
    },
    Terminated {
        steps: u32,
        stop: StopReason,
    },
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RouterOutcome {
    pub state: ConversationState,
    pub stop: StopReason,
    pub supervisor_calls: u32,
    pub answer: FinalAnswer,
}

impl RouterOutcome {
    /// Completed worker invocations.
    pub fn steps(&self) -> u32 {
        self.state.step()
    }

    /// Final answer text with its references block.
    pub fn render(&self) -> String {
        self.answer.render()
    }

    pub fn report(&self, run_id: impl Into<String>) -> RunReport {
        RunReport {
            run_id: run_id.into(),
            answer: self.render(),
            body: self.answer.body.clone(),
            references: self.answer.references.clone(),
            stop: self.stop.clone(),
            steps: self.steps(),
            supervisor_calls: self.supervisor_calls,
            contributions: self.state.contributions().to_vec(),
        }
    }
}

/// Machine-readable run summary (`router ask --json`, `POST /api/ask`).
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub answer: String,
    pub body: String,
    pub references: Vec<String>,
    pub stop: StopReason,
    pub steps: u32,
    pub supervisor_calls: u32,
    pub contributions: Vec<Contribution>,
}

/// The supervisor named a worker that is not registered.
///
/// This is the one fatal condition of a run: the supervisor broke its
/// contract, so the driver refuses to guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownWorkerError {
    pub worker: String,
    pub members: Vec<String>,
}

impl fmt::Display for UnknownWorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "supervisor selected unregistered worker {:?} (registered: {})",
            self.worker,
            self.members.join(", ")
        )
    }
}

impl std::error::Error for UnknownWorkerError {}

/// Run the routing loop for one request.
///
/// Worker failures and malformed decisions never surface as errors; the only
/// `Err` is an [`UnknownWorkerError`].
#[instrument(skip_all, fields(max_steps = options.max_steps, workers = registry.len()))]
pub fn run_router<S, F>(
    request: &str,
    registry: &WorkerRegistry,
    supervisor: &S,
    options: &RunOptions,
    mut on_event: F,
) -> Result<RouterOutcome>
where
    S: Supervisor + ?Sized,
    F: FnMut(&RouterEvent),
{
    info!("starting run");
    let mut state = ConversationState::seed(request);
    let mut supervisor_calls = 0u32;
    let mut phase = Phase::AwaitingDecision;

    let stop = loop {
        phase = match phase {
            Phase::AwaitingDecision => {
                if budget_exhausted(state.step(), options.max_steps) {
                    debug!(step = state.step(), "step budget exhausted");
                    Phase::Terminated {
                        stop: StopReason::BudgetExhausted {
                            steps: state.step(),
                            max_steps: options.max_steps,
                        },
                    }
                } else {
                    supervisor_calls += 1;
                    let ctx = DecisionContext {
                        state: &state,
                        members: registry.names(),
                        max_steps: options.max_steps,
                    };
                    match supervisor.decide(&ctx) {
                        Ok(decision) => {
                            debug!(step = state.step(), %decision, "decision");
                            on_event(&RouterEvent::Decided {
                                step: state.step(),
                                decision: decision.clone(),
                            });
                            match decision {
                                RoutingDecision::Finish => Phase::Terminated {
                                    stop: StopReason::Finished,
                                },
                                RoutingDecision::Worker(worker) => Phase::Dispatching { worker },
                            }
                        }
                        Err(err) => {
                            let detail = format!("{err:#}");
                            warn!(step = state.step(), %detail, "unusable decision, finishing");
                            Phase::Terminated {
                                stop: StopReason::MalformedDecision { detail },
                            }
                        }
                    }
                }
            }
            Phase::Dispatching { worker } => {
                let Some(handle) = registry.get(&worker) else {
                    return Err(UnknownWorkerError {
                        worker,
                        members: registry.names().to_vec(),
                    }
                    .into());
                };
                debug!(%worker, step = state.step(), "dispatching");
                Phase::Merging {
                    contribution: act_fail_soft(&worker, handle, &state),
                }
            }
            Phase::Merging { contribution } => {
                let author = contribution.author.clone();
                let content = contribution.content.clone();
                state.merge(contribution);
                on_event(&RouterEvent::Merged {
                    step: state.step(),
                    author,
                    content,
                });
                Phase::AwaitingDecision
            }
            Phase::Terminated { stop } => break stop,
        };
    };

    let last = state.last().map(|c| c.content.as_str()).unwrap_or_default();
    let answer = split_references(last, &options.reference_marker);
    info!(steps = state.step(), supervisor_calls, %stop, "run terminated");
    on_event(&RouterEvent::Terminated {
        steps: state.step(),
        stop: stop.clone(),
    });

    Ok(RouterOutcome {
        state,
        stop,
        supervisor_calls,
        answer,
    })
}
