//! Bounded multi-agent router CLI.
//!
//! Reads `.router/config.toml`, builds the worker registry, and answers one
//! request per `router ask` invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use router::agents::supervisor_from_config;
use router::driver::{RouterEvent, RunOptions, UnknownWorkerError, run_router};
use router::exit_codes;
use router::io::config::load_config;
use router::io::executor::CommandExecutor;
use router::io::init::{InitOptions, RouterPaths, init_router};
use router::io::transcript::{TranscriptRequest, generate_run_id, write_transcript};
use router::logging;
use router::registry::WorkerRegistry;

#[derive(Parser)]
#[command(name = "router", version, about = "Bounded multi-agent router")]
struct Cli {
    /// Project directory (contains .router/)
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.router/config.toml` with the default workers.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the config.
    Validate,
    /// Print registered worker names in routing order.
    Workers,
    /// Answer one request.
    Ask(AskArgs),
}

#[derive(Args)]
struct AskArgs {
    /// The user request.
    request: String,

    /// Override `max_steps` from the config.
    #[arg(long)]
    max_steps: Option<u32>,

    /// Run each worker once in order instead of asking the supervisor agent.
    #[arg(long)]
    sequential: bool,

    /// Skip writing `.router/runs/<run-id>/`.
    #[arg(long)]
    no_record: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

fn main() {
    logging::init("warn");
    let code = match run(Cli::parse()) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            if err.downcast_ref::<UnknownWorkerError>().is_some() {
                exit_codes::CONTRACT_VIOLATION
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let paths = RouterPaths::new(&cli.project_dir);
    match cli.command {
        Command::Init { force } => cmd_init(&cli.project_dir, force),
        Command::Validate => cmd_validate(&paths),
        Command::Workers => cmd_workers(&paths),
        Command::Ask(args) => cmd_ask(&paths, &args),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<()> {
    let paths = init_router(root, &InitOptions { force })?;
    println!("{}", paths.config_path.display());
    Ok(())
}

fn cmd_validate(paths: &RouterPaths) -> Result<()> {
    if !paths.config_path.is_file() {
        bail!(
            "missing {} (run `router init`)",
            paths.config_path.display()
        );
    }
    let cfg = load_config(&paths.config_path)?;
    println!("ok: {} workers", cfg.workers.len());
    Ok(())
}

fn cmd_workers(paths: &RouterPaths) -> Result<()> {
    let cfg = load_config(&paths.config_path)?;
    for name in cfg.worker_names() {
        println!("{name}");
    }
    Ok(())
}

fn cmd_ask(paths: &RouterPaths, args: &AskArgs) -> Result<()> {
    if args.request.trim().is_empty() {
        bail!("request must be non-empty");
    }
    let cfg = load_config(&paths.config_path)?;
    let executor = Arc::new(CommandExecutor::new(cfg.executor.command.clone())?);
    let registry = WorkerRegistry::from_config(&cfg, executor.clone(), &paths.root)?;
    let supervisor = supervisor_from_config(&cfg, args.sequential, executor, &paths.root);

    let mut options = RunOptions::from_config(&cfg);
    if let Some(max_steps) = args.max_steps {
        options.max_steps = max_steps;
    }

    let started_at = Utc::now();
    let run_id = generate_run_id(started_at);
    let outcome = run_router(&args.request, &registry, &supervisor, &options, log_event)?;
    let ended_at = Utc::now();

    if !args.no_record {
        let run_paths = write_transcript(&TranscriptRequest {
            runs_dir: &paths.runs_dir,
            run_id: &run_id,
            outcome: &outcome,
            started_at,
            ended_at,
        })
        .context("record run transcript")?;
        info!(dir = %run_paths.dir.display(), "transcript recorded");
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome.report(run_id))?
        );
    } else {
        let answer = outcome.render();
        println!("{}", answer.trim_end());
    }
    Ok(())
}

fn log_event(event: &RouterEvent) {
    match event {
        RouterEvent::Decided { step, decision } => info!(step, %decision, "decided"),
        RouterEvent::Merged { step, author, .. } => info!(step, %author, "merged"),
        RouterEvent::Terminated { steps, stop } => info!(steps, %stop, "terminated"),
    }
}
