//! Bounded multi-agent router.
//!
//! A supervisor repeatedly picks the next worker (or FINISH) for a shared
//! conversation; every worker contribution is appended and counted against a
//! step budget. The last contribution becomes the answer, split into body and
//! references.
//!
//! - **[`core`]**: pure data model and parsing (decisions, budget, references).
//! - **[`agents`]**: the [`Worker`](agents::Worker) and
//!   [`Supervisor`](agents::Supervisor) seams plus executor-backed impls.
//! - **[`io`]**: config, agent process execution, prompts, transcripts.
//!
//! [`driver::run_router`] ties them together.

pub mod agents;
pub mod core;
pub mod driver;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
