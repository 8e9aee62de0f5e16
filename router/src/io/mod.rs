//! I/O helpers: config, agent backend, prompts, and transcripts.

pub mod config;
pub mod executor;
pub mod init;
pub mod process;
pub mod prompt;
pub mod transcript;
