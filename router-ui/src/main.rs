//! Router UI server - HTTP API and live event stream over the router.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use router::agents::supervisor_from_config;
use router::io::config::load_config;
use router::io::executor::CommandExecutor;
use router::io::init::RouterPaths;
use router::registry::WorkerRegistry;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "router-ui")]
#[command(about = "HTTP API and live event stream for the router")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Project directory (contains .router/)
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Directory containing UI static files (defaults to ./ui/dist in the project)
    #[arg(long)]
    ui_dir: Option<PathBuf>,

    /// Run each worker once in order instead of asking the supervisor agent
    #[arg(long)]
    sequential: bool,

    /// Do not write run transcripts
    #[arg(long)]
    no_record: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("router_ui=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let project_dir = args.project_dir.canonicalize().unwrap_or(args.project_dir);
    info!(project_dir = %project_dir.display(), "starting router-ui");

    let paths = RouterPaths::new(&project_dir);
    let config = load_config(&paths.config_path)?;
    let executor = Arc::new(
        CommandExecutor::new(config.executor.command.clone()).context("build agent executor")?,
    );
    let registry = WorkerRegistry::from_config(&config, executor.clone(), &project_dir)?;
    let supervisor = supervisor_from_config(&config, args.sequential, executor, &project_dir);
    info!(workers = ?registry.names(), mode = ?config.supervisor.mode, "registry ready");

    let state = AppState::new(project_dir.clone(), config, registry, supervisor)
        .with_record(!args.no_record);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state);

    let ui_dir = args
        .ui_dir
        .unwrap_or_else(|| project_dir.join("ui").join("dist"));

    if ui_dir.exists() {
        info!(ui_dir = %ui_dir.display(), "serving static UI files");
        app = app.fallback_service(ServeDir::new(ui_dir).append_index_html_on_directories(true));
    } else {
        info!(ui_dir = %ui_dir.display(), "UI directory not found, API-only mode");
    }

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
