#![forbid(unsafe_code)]

//! `agent-conduit` — interactive console for a `codex proto` agent.
//!
//! Bootstraps configuration, launches an agent session, and bridges stdin
//! to the protocol: plain lines become user input, slash commands control
//! the session.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::io::AsyncBufReadExt;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use agent_conduit::config::GlobalConfig;
use agent_conduit::proto::ReviewDecision;
use agent_conduit::session::{Session, SessionManager};
use agent_conduit::sink::ConsoleSink;
use agent_conduit::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-conduit", about = "Interactive console for a codex proto agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the session working directory.
    #[arg(long)]
    cwd: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-conduit bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };

    // Override the working directory from the CLI if provided.
    if let Some(cwd) = args.cwd {
        let canonical = cwd
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid cwd override: {err}")))?;
        config.cwd = Some(canonical);
    }
    info!("configuration loaded");

    // ── Launch the agent session ────────────────────────
    let manager = SessionManager::new(config.max_sessions);
    let sink = Arc::new(ConsoleSink::new());
    let session = manager
        .launch(&config.spawn_config(), config.configure_params(), sink)
        .await?;
    info!(session_id = session.id(), "agent session ready");

    // ── Bridge stdin to the session ─────────────────────
    let result = repl(&session).await;

    manager.stop_all().await;
    info!("agent-conduit shut down");
    result
}

/// Read stdin line by line until EOF, `/quit`, or a shutdown signal.
async fn repl(session: &Session) -> Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line
                    .map_err(|err| AppError::Io(format!("stdin read failed: {err}")))?
                else {
                    break;
                };
                if !handle_line(session, line.trim()).await? {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Dispatch one console line. Returns `Ok(false)` when the user quits.
async fn handle_line(session: &Session, line: &str) -> Result<bool> {
    if line.is_empty() {
        return Ok(true);
    }

    match line {
        "/quit" | "/q" => return Ok(false),
        "/interrupt" => session.interrupt().await.map(|_| ())?,
        "/approve" => resolve(session, ReviewDecision::Approved).await?,
        "/approve-session" => resolve(session, ReviewDecision::ApprovedForSession).await?,
        "/deny" => resolve(session, ReviewDecision::Denied).await?,
        "/abort" => resolve(session, ReviewDecision::Abort).await?,
        "/status" => print_status(session).await,
        "/help" => print_help(),
        _ if line.starts_with('/') => println!("unknown command: {line} (try /help)"),
        _ => session.submit_user_message(line).await.map(|_| ())?,
    }

    Ok(true)
}

async fn resolve(session: &Session, decision: ReviewDecision) -> Result<()> {
    if session.resolve_approval(decision).await?.is_none() {
        println!("no pending approval");
    }
    Ok(())
}

async fn print_status(session: &Session) {
    let status = session.status().await;
    match session.pending_approval().await {
        Some(pending) => println!(
            "status: {status:?}, pending {:?} approval [{}]",
            pending.kind, pending.submission_id
        ),
        None => println!("status: {status:?}"),
    }
}

fn print_help() {
    println!(
        "commands:\n  \
         /interrupt          stop the current task\n  \
         /approve            approve the pending request\n  \
         /approve-session    approve for the rest of the session\n  \
         /deny               deny the pending request\n  \
         /abort              abort the pending request and task\n  \
         /status             show session status\n  \
         /quit               exit\n  \
         anything else is sent to the agent as user input"
    );
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
