//! Process-backed agent channels.
//!
//! Spawns the agent CLI with piped stdio and `kill_on_drop(true)`, then wires
//! three background tasks around it:
//! - a writer pumping the outbound queue into the child's stdin,
//! - a reader framing the child's stdout through [`ProtoCodec`] into
//!   [`ChannelItem::Line`]s,
//! - an exit monitor that reaps the child and passes its exit status to the
//!   reader.
//!
//! The reader alone emits [`ChannelItem::Closed`], and only after every
//! buffered line has been forwarded, so a consumer never sees a line after
//! the closed notification. Closing the returned [`AgentChannel`] cancels
//! all three tasks and kills the child. The child's environment is inherited
//! unchanged; the agent reads its API key from there.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{AgentChannel, ChannelItem};
use crate::proto::ProtoCodec;
use crate::{AppError, Result};

/// How long the reader waits after EOF for the exit monitor to report how
/// the process died, so the closed notification can carry the exit status.
const EXIT_REPORT_GRACE: Duration = Duration::from_millis(200);

// ── Configuration ────────────────────────────────────────────────────────────

/// Configuration for spawning an agent process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Agent binary (e.g. `codex`).
    pub program: String,
    /// Arguments selecting the protocol front end (e.g. `["proto"]`).
    pub args: Vec<String>,
    /// Directory the agent starts in; inherits the host's when `None`.
    pub cwd: Option<PathBuf>,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn an agent process and return the channel speaking to it.
///
/// The returned receiver yields the agent's protocol lines in arrival order,
/// terminated by exactly one [`ChannelItem::Closed`] once the process dies
/// or its stdout closes. Stderr is discarded.
///
/// # Errors
///
/// Returns [`AppError::Channel`] when the OS refuses to spawn the process or
/// its stdio pipes cannot be captured.
pub fn spawn_agent(
    config: &SpawnConfig,
    session_id: u64,
) -> Result<(AgentChannel, mpsc::Receiver<ChannelItem>)> {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args);
    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Channel(format!("failed to spawn agent: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Channel("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Channel("failed to capture agent stdout".into()))?;

    let (outbound_tx, outbound_rx) = mpsc::channel(AgentChannel::queue_depth());
    let (inbound_tx, inbound_rx) = mpsc::channel(AgentChannel::queue_depth());
    let (exit_tx, exit_rx) = oneshot::channel();
    let cancel = CancellationToken::new();

    info!(session_id, program = %config.program, "spawned agent process");

    tokio::spawn(run_writer(session_id, stdin, outbound_rx, cancel.clone()));
    tokio::spawn(run_reader(
        session_id,
        stdout,
        inbound_tx,
        exit_rx,
        cancel.clone(),
    ));
    tokio::spawn(monitor_exit(session_id, child, exit_tx, cancel.clone()));

    Ok((AgentChannel::from_parts(outbound_tx, cancel), inbound_rx))
}

// ── Writer task ──────────────────────────────────────────────────────────────

/// Pump outbound lines into the child's stdin, `\n`-terminated.
///
/// A write failure ends the task without cancelling the channel; the death
/// it usually signals reaches the session through the reader's EOF, which
/// owns the closed-notification path.
async fn run_writer(
    session_id: u64,
    mut stdin: ChildStdin,
    mut line_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "writer: cancellation received, stopping");
                break;
            }

            line = line_rx.recv() => {
                let Some(line) = line else {
                    debug!(session_id, "writer: outbound queue closed, stopping");
                    break;
                };
                let mut bytes = line.into_bytes();
                bytes.push(b'\n');
                if let Err(err) = stdin.write_all(&bytes).await {
                    warn!(session_id, error = %err, "writer: write to agent stdin failed");
                    break;
                }
            }
        }
    }
}

// ── Reader task ──────────────────────────────────────────────────────────────

/// Frame the child's stdout into protocol lines and forward them inbound.
///
/// This task is the only sender of [`ChannelItem::Closed`]: on EOF it asks
/// the exit monitor how the process died and sends one closed notification
/// after the last line, so ordering is preserved even when the process dies
/// with output still buffered. Framing errors (an overlong line) skip that
/// line only. Cancellation stops the task without a closed notification;
/// that path belongs to whoever cancelled.
async fn run_reader<R>(
    session_id: u64,
    stdout: R,
    item_tx: mpsc::Sender<ChannelItem>,
    mut exit_rx: oneshot::Receiver<String>,
    cancel: CancellationToken,
) where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, ProtoCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(session_id, "reader: EOF on agent stdout");
                        if let Some(reason) = eof_reason(&mut exit_rx, &cancel).await {
                            send_closed(&item_tx, session_id, &reason).await;
                        }
                        break;
                    }
                    Some(Err(AppError::Protocol(ref msg))) => {
                        warn!(
                            session_id,
                            error = msg.as_str(),
                            "reader: framing error, skipping line"
                        );
                    }
                    Some(Err(err)) => {
                        warn!(session_id, error = %err, "reader: stream error, stopping");
                        send_closed(&item_tx, session_id, &format!("stream error: {err}")).await;
                        break;
                    }
                    Some(Ok(line)) => {
                        if item_tx.send(ChannelItem::Line(line)).await.is_err() {
                            debug!(session_id, "reader: inbound queue closed, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Pick the closed-notification reason after EOF. Prefers the exit status
/// when the monitor reports one within the grace period, falls back to a
/// plain stream-closed reason when the process is still alive, and returns
/// `None` when the channel was cancelled in the meantime.
async fn eof_reason(
    exit_rx: &mut oneshot::Receiver<String>,
    cancel: &CancellationToken,
) -> Option<String> {
    tokio::select! {
        biased;

        () = cancel.cancelled() => None,

        reason = exit_rx => {
            Some(reason.unwrap_or_else(|_| "stream closed".to_owned()))
        }

        () = tokio::time::sleep(EXIT_REPORT_GRACE) => Some("stream closed".to_owned()),
    }
}

// ── Exit monitor ─────────────────────────────────────────────────────────────

/// Await child exit and report the status to the reader; kill the child on
/// cancellation.
async fn monitor_exit(
    session_id: u64,
    mut child: Child,
    exit_tx: oneshot::Sender<String>,
    cancel: CancellationToken,
) {
    tokio::select! {
        result = child.wait() => {
            let reason = match result {
                Ok(status) => status.code().map_or_else(
                    || "process terminated by signal".to_owned(),
                    |code| format!("process exited with code {code}"),
                ),
                Err(err) => {
                    warn!(session_id, error = %err, "error waiting for agent process");
                    format!("wait error: {err}")
                }
            };
            exit_tx.send(reason).ok();
        }
        () = cancel.cancelled() => {
            // Deliberate close; kill and reap without a closed notification.
            debug!(session_id, "monitor: cancellation received, killing agent");
            child.kill().await.ok();
        }
    }
}

async fn send_closed(item_tx: &mpsc::Sender<ChannelItem>, session_id: u64, reason: &str) {
    let item = ChannelItem::Closed {
        reason: reason.to_owned(),
    };
    if item_tx.send(item).await.is_err() {
        debug!(session_id, "closed notification dropped, consumer gone");
    }
}
