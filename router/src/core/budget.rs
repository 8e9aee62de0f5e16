//! Step and time budget helpers.

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

/// Default maximum number of decide/act cycles per run.
pub const DEFAULT_MAX_STEPS: u32 = 5;

/// Termination guard, evaluated before every supervisor call.
pub fn budget_exhausted(step: u32, max_steps: u32) -> bool {
    step >= max_steps
}

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Result<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(anyhow!("call timed out before dispatch"));
    }
    Ok(remaining)
}
