//! Shared types for the routing loop.
//!
//! These types carry no I/O and define the contracts between the driver,
//! the supervisor, and the workers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Author tag reserved for the user's seed request.
pub const USER_AUTHOR: &str = "user";

/// Routing symbol that ends a run voluntarily.
pub const FINISH: &str = "FINISH";

/// One authored unit of text in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub author: String,
    pub content: String,
}

impl Contribution {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
        }
    }
}

/// Per-run conversation plus the step counter.
///
/// The contribution list is append-only: the only mutation is [`merge`],
/// which appends one contribution and bumps the counter by exactly one.
///
/// [`merge`]: ConversationState::merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationState {
    contributions: Vec<Contribution>,
    step: u32,
}

impl ConversationState {
    /// Start a run from the user's request.
    pub fn seed(request: impl Into<String>) -> Self {
        Self {
            contributions: vec![Contribution::new(USER_AUTHOR, request)],
            step: 0,
        }
    }

    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    /// Number of completed worker invocations so far.
    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    /// The seed request.
    pub fn request(&self) -> &str {
        self.contributions
            .first()
            .map(|c| c.content.as_str())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<&Contribution> {
        self.contributions.last()
    }

    pub(crate) fn merge(&mut self, contribution: Contribution) {
        self.contributions.push(contribution);
        self.step += 1;
    }
}

/// Next actor chosen by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "worker", rename_all = "lowercase")]
pub enum RoutingDecision {
    Worker(String),
    Finish,
}

impl RoutingDecision {
    pub fn worker(name: impl Into<String>) -> Self {
        Self::Worker(name.into())
    }

    pub fn as_symbol(&self) -> &str {
        match self {
            Self::Worker(name) => name,
            Self::Finish => FINISH,
        }
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_symbol())
    }
}

/// Driver state machine phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    AwaitingDecision,
    Dispatching { worker: String },
    Merging { contribution: Contribution },
    Terminated { stop: StopReason },
}

/// Why a run reached [`Phase::Terminated`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The supervisor returned FINISH.
    Finished,
    /// The step counter reached the configured maximum before a decision.
    BudgetExhausted { steps: u32, max_steps: u32 },
    /// The supervisor produced something outside the routing vocabulary.
    MalformedDecision { detail: String },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => f.write_str("finished"),
            Self::BudgetExhausted { steps, max_steps } => {
                write!(f, "step budget exhausted ({steps}/{max_steps})")
            }
            Self::MalformedDecision { detail } => write!(f, "malformed decision: {detail}"),
        }
    }
}
