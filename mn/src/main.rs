//! Midnight - autonomous software-build orchestrator
//!
//! CLI entry point for the daemon, the queue, and the snapshot surface.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{info, warn};

use midnight::agents::{Actor, Sentinel};
use midnight::cli::{Cli, Command, OutputFormat, QueueCommand, SnapshotCommand};
use midnight::config::Config;
use midnight::daemon::DaemonManager;
use midnight::domain::Store;
use midnight::events::create_event_bus;
use midnight::gitops::{CommandGitOps, GitOps};
use midnight::handoff::HandoffRunner;
use midnight::llm::create_client;
use midnight::orchestrator::{Orchestrator, OrchestratorDeps};
use midnight::r#loop::AgentLoop;
use midnight::repomap::FileListingRepoMap;
use midnight::sandbox::{NativeSandbox, SandboxProvider};
use midnight::state::{RecoveryOptions, StateEngine};
use midnight::worktree::WorktreeManager;

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("midnight")
}

fn setup_logging(config: &Config, to_stderr: bool) -> Result<()> {
    let level = if config.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if to_stderr {
        tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(filter).init();
        return Ok(());
    }

    let log_path = config.log_path.clone().unwrap_or_else(|| data_dir().join("logs"));
    std::fs::create_dir_all(&log_path).context("Failed to create log directory")?;
    let log_file = std::fs::File::create(log_path.join("midnight.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();
    Ok(())
}

fn daemon_manager(config: &Config) -> DaemonManager {
    match &config.pid_file {
        Some(path) => DaemonManager::with_pid_file(path.clone()),
        None => DaemonManager::new(),
    }
}

fn open_store_shared(config: &Config) -> Result<Store> {
    Store::open_shared(&config.queue_path).context("Failed to open queue store")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if cli.verbose {
        config.verbose = true;
    }

    // The daemonized process logs to a file; interactive commands log to
    // stderr so output stays visible
    let daemonized = matches!(cli.command, Command::RunDaemon);
    setup_logging(&config, !daemonized)?;

    match cli.command {
        Command::Start { foreground } => cmd_start(&config, foreground).await,
        Command::Stop { force } => cmd_stop(&config, force),
        Command::Status { format } => cmd_status(&config, format),
        Command::Queue { command } => cmd_queue(&config, command),
        Command::Snapshot { command } => cmd_snapshot(&config, command).await,
        Command::Logs { lines } => cmd_logs(&config, lines),
        Command::Health => cmd_health(&config),
        Command::RunDaemon => {
            let daemon = daemon_manager(&config);
            daemon.register_self()?;
            run_daemon(&config).await
        }
    }
}

/// Start the daemon
async fn cmd_start(config: &Config, foreground: bool) -> Result<()> {
    let daemon = daemon_manager(config);

    if daemon.is_running() {
        if let Some(pid) = daemon.running_pid() {
            println!("Midnight is already running (PID: {})", pid);
        }
        return Ok(());
    }

    if foreground {
        println!("Starting Midnight in foreground mode...");
        daemon.register_self()?;
        run_daemon(config).await
    } else {
        let pid = daemon.start()?;
        println!("Midnight started (PID: {})", pid);
        Ok(())
    }
}

/// Stop the daemon
fn cmd_stop(config: &Config, force: bool) -> Result<()> {
    let daemon = daemon_manager(config);

    if !daemon.is_running() {
        println!("Midnight is not running");
        return Ok(());
    }

    let pid = daemon.running_pid();
    daemon.stop(force)?;
    match pid {
        Some(pid) => println!("Midnight stopped (was PID: {})", pid),
        None => println!("Midnight stopped"),
    }
    Ok(())
}

/// Show daemon and queue status
fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    let daemon = daemon_manager(config);
    let status = daemon.status();
    let stats = open_store_shared(config)?.stats()?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": status.running,
                "pid": status.pid,
                "pid_file": status.pid_file.to_string_lossy(),
                "queue": stats,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Midnight Status");
            println!("---------------");
            if status.running {
                println!("Status: {}", "running".green());
                if let Some(pid) = status.pid {
                    println!("PID: {}", pid);
                }
            } else {
                println!("Status: {}", "stopped".red());
            }
            println!("PID file: {}", status.pid_file.display());
            println!();
            println!("Projects: {} total", stats.total);
            println!("  Queued:      {}", stats.queued);
            println!("  In progress: {}", stats.in_progress);
            println!("  Completed:   {}", stats.completed);
            println!("  Failed:      {}", stats.failed);
            if let Some(avg) = stats.avg_completion_ms {
                println!("  Avg completion: {:.1}s", avg / 1000.0);
            }
        }
    }
    Ok(())
}

/// Queue management
fn cmd_queue(config: &Config, command: QueueCommand) -> Result<()> {
    let store = open_store_shared(config)?;

    match command {
        QueueCommand::Add { path, priority } => {
            let absolute = std::fs::canonicalize(&path).context("Project path does not exist")?;
            let project = store.add_project(&absolute.to_string_lossy(), priority)?;
            println!("Queued {} ({})", project.name, project.id);
        }
        QueueCommand::List => {
            let projects = store.list_projects()?;
            if projects.is_empty() {
                println!("Queue is empty");
                return Ok(());
            }
            println!("{:<44} {:<12} {:>8}  NAME", "ID", "STATUS", "PRIORITY");
            println!("{}", "-".repeat(80));
            for project in projects {
                println!(
                    "{:<44} {:<12} {:>8}  {}",
                    project.id, project.status, project.priority, project.name
                );
            }
        }
        QueueCommand::Remove { id } => {
            if store.remove_project(&id)? {
                println!("Removed {}", id);
            } else {
                println!("No such project: {}", id);
            }
        }
        QueueCommand::Reorder { id, priority } => {
            store.reorder_project(&id, priority)?;
            println!("Set {} priority to {}", id, priority);
        }
    }
    Ok(())
}

/// Snapshot management
async fn cmd_snapshot(config: &Config, command: SnapshotCommand) -> Result<()> {
    let store = Arc::new(open_store_shared(config)?);
    let gitops: Arc<dyn GitOps> = Arc::new(CommandGitOps);

    match command {
        SnapshotCommand::List { project_id } => {
            let snapshots = store.list_snapshots(&project_id)?;
            if snapshots.is_empty() {
                println!("No snapshots for {}", project_id);
                return Ok(());
            }
            println!("{:<44} {:<12} CREATED", "ID", "GIT HASH");
            println!("{}", "-".repeat(80));
            for snapshot in snapshots {
                println!(
                    "{:<44} {:<12} {}",
                    snapshot.id,
                    &snapshot.git_hash[..snapshot.git_hash.len().min(12)],
                    snapshot.created_at
                );
            }
        }
        SnapshotCommand::Create { project_id } => {
            let bus = create_event_bus();
            let state = StateEngine::new(store.clone(), gitops, bus.emitter());
            let id = state.save_snapshot(&project_id).await?;
            println!("Snapshot created: {}", id);
        }
        SnapshotCommand::Recover {
            force_snapshot,
            skip_git_reset,
            clear_failed_tasks,
        } => {
            let options = RecoveryOptions {
                force_snapshot,
                skip_git_reset,
                clear_failed_tasks,
            };
            let results = midnight::state::recover(&store, &gitops, &options).await?;
            if results.is_empty() {
                println!("Nothing to recover");
            }
            for result in results {
                println!("{}: {} (status: {})", result.project_id, result.message, result.new_status);
            }
        }
    }
    Ok(())
}

/// Show the execution log
fn cmd_logs(config: &Config, lines: usize) -> Result<()> {
    let store = open_store_shared(config)?;
    let mut rows = store.recent_logs(lines)?;
    rows.reverse();

    if rows.is_empty() {
        println!("Execution log is empty");
        return Ok(());
    }
    for row in rows {
        println!(
            "{} [{}] {}: {}",
            row.timestamp,
            row.level,
            row.source,
            row.message
        );
    }
    Ok(())
}

/// Check daemon liveness
fn cmd_health(config: &Config) -> Result<()> {
    let daemon = daemon_manager(config);
    if daemon.is_running() {
        println!("{}", "healthy".green());
    } else {
        println!("{}", "stopped".yellow());
    }
    Ok(())
}

/// Run the daemon main loop
async fn run_daemon(config: &Config) -> Result<()> {
    info!("Daemon starting...");

    // Fail fast: the store and the gateway key are required
    let store = Arc::new(Store::open(&config.queue_path).context("Failed to open queue store")?);
    let client = create_client(&config.gateway).context("Chat gateway unavailable")?;

    let bus = create_event_bus();
    let gitops: Arc<dyn GitOps> = Arc::new(CommandGitOps);
    let state = Arc::new(StateEngine::new(store.clone(), gitops.clone(), bus.emitter()));

    // Persist every broadcast event into the execution log
    {
        let mut rx = bus.subscribe();
        let log_store = store.clone();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                let entry = queuestore::LogEntry {
                    timestamp: queuestore::now_ms(),
                    level: "event".to_string(),
                    source: event.event_type().to_string(),
                    message: serde_json::to_string(&event).unwrap_or_default(),
                    context: None,
                    project_id: None,
                    task_id: None,
                };
                if let Err(e) = log_store.append_log(&entry) {
                    warn!(error = %e, "Failed to persist event");
                }
            }
        });
    }

    // Container/VM drivers are injected here when present; the stock
    // binary carries the native fallback
    let providers: Vec<Arc<dyn SandboxProvider>> = vec![Arc::new(NativeSandbox::new())];

    let resolved = config.resolved_agent_loop();
    let actor = Actor::new(client.clone(), &config.actor_model, providers);
    let sentinel = Sentinel::new(
        client,
        &config.sentinel_model,
        config.sentinel_effort,
        resolved.quality_threshold,
    );

    let worktree_base = data_dir().join("worktrees");
    let agent_loop = Arc::new(AgentLoop::new(
        actor,
        sentinel,
        WorktreeManager::new(worktree_base),
        Arc::new(FileListingRepoMap::new()),
        bus.emitter(),
        resolved,
        config.enable_worktrees,
    ));

    let handoff = Arc::new(HandoffRunner::new(
        store.clone(),
        gitops.clone(),
        state.clone(),
        None,
        config.handoff.clone(),
        bus.emitter(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorDeps {
            store,
            loader: Arc::new(midnight::loader::DnaFileLoader),
            state,
            agent_loop,
            handoff,
            gitops,
            bus,
        },
        config.clone(),
    ));

    let runner = orchestrator.clone();
    let main_handle = tokio::spawn(async move {
        if let Err(e) = runner.start().await {
            tracing::error!(error = %e, "Orchestrator exited with error");
        }
    });

    info!("Daemon running. SIGTERM or Ctrl+C to stop.");

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!("Daemon shutting down...");
    orchestrator.stop(true).await;
    let _ = main_handle.await;

    let _ = daemon_manager(config).unregister_self();
    info!("Shutdown complete");
    Ok(())
}
