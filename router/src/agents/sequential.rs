//! Fixed-order supervisor: each worker once, in registry order, then FINISH.

use anyhow::Result;

use super::{DecisionContext, Supervisor};
use crate::core::types::RoutingDecision;

#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialSupervisor;

impl Supervisor for SequentialSupervisor {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<RoutingDecision> {
        let next = usize::try_from(ctx.state.step())
            .ok()
            .and_then(|idx| ctx.members.get(idx));
        Ok(match next {
            Some(name) => RoutingDecision::worker(name.as_str()),
            None => RoutingDecision::Finish,
        })
    }
}
