//! Shared application state for the HTTP service.

use std::path::PathBuf;
use std::sync::Arc;

use router::agents::Supervisor;
use router::driver::RouterEvent;
use router::io::config::RouterConfig;
use router::io::init::RouterPaths;
use router::registry::WorkerRegistry;
use tokio::sync::broadcast;

/// Progress of one run, tagged with its id, broadcast to SSE clients.
#[derive(Debug, Clone)]
pub struct RunEvent {
    pub run_id: String,
    pub event: RouterEvent,
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Root directory of the project (contains .router/).
    pub project_dir: PathBuf,
    pub config: Arc<RouterConfig>,
    /// Built once at startup; read-only afterwards.
    pub registry: Arc<WorkerRegistry>,
    pub supervisor: Arc<dyn Supervisor + Send + Sync>,
    /// Write `.router/runs/<run-id>/` for every run.
    pub record: bool,
    pub event_tx: Arc<broadcast::Sender<RunEvent>>,
}

impl AppState {
    pub fn new(
        project_dir: PathBuf,
        config: RouterConfig,
        registry: WorkerRegistry,
        supervisor: Box<dyn Supervisor + Send + Sync>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            project_dir,
            config: Arc::new(config),
            registry: Arc::new(registry),
            supervisor: Arc::from(supervisor),
            record: true,
            event_tx: Arc::new(event_tx),
        }
    }

    pub fn with_record(mut self, record: bool) -> Self {
        self.record = record;
        self
    }

    /// Path to `.router/runs/`.
    pub fn runs_dir(&self) -> PathBuf {
        RouterPaths::new(&self.project_dir).runs_dir
    }
}
