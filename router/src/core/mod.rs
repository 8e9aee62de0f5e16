//! Deterministic, pure logic shared by the router.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod decision;
pub mod references;
pub mod types;
