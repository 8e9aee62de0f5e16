//! Immutable, ordered worker registry.
//!
//! Built once at startup and shared (behind `Arc`) by every run; nothing
//! mutates it after [`RegistryBuilder::build`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::agents::Worker;
use crate::agents::worker::{AgentSettings, ExecWorker};
use crate::io::config::{RouterConfig, validate_worker_name};
use crate::io::executor::Executor;

pub struct WorkerRegistry {
    names: Vec<String>,
    workers: Vec<Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Register one [`ExecWorker`] per configured worker, sharing `executor`.
    pub fn from_config<E>(cfg: &RouterConfig, executor: E, workdir: &Path) -> Result<Self>
    where
        E: Executor + Clone + 'static,
    {
        let settings = AgentSettings::from_config(cfg, workdir);
        cfg.workers
            .iter()
            .try_fold(Self::builder(), |builder, w| {
                builder.register(
                    w.name.clone(),
                    ExecWorker::new(
                        w.name.clone(),
                        w.instructions.clone(),
                        executor.clone(),
                        settings.clone(),
                    ),
                )
            })
            .map(RegistryBuilder::build)
    }

    /// Worker names in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<&dyn Worker> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.workers[idx].as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    names: Vec<String>,
    workers: Vec<Arc<dyn Worker>>,
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl RegistryBuilder {
    /// Add a worker. Names must be unique and must not collide with `FINISH`
    /// or the user author tag.
    pub fn register(mut self, name: impl Into<String>, worker: impl Worker + 'static) -> Result<Self> {
        let name = name.into();
        validate_worker_name(&name)?;
        if self.names.contains(&name) {
            return Err(anyhow!("worker {name:?} registered twice"));
        }
        self.names.push(name);
        self.workers.push(Arc::new(worker));
        Ok(self)
    }

    pub fn build(self) -> WorkerRegistry {
        WorkerRegistry {
            names: self.names,
            workers: self.workers,
        }
    }
}
