//! Per-session event dispatch.
//!
//! One loop per session consumes the channel's inbound items in arrival
//! order and applies them to the session state under its lock, so every
//! event observes the effects of all earlier ones. Each event kind has a
//! named handler; anything undecodable within one line is logged and
//! skipped, and channel closure tears the session down after a terminal
//! transcript line.
//!
//! Command and patch progress lines embed the `call_id` in a marker
//! (`command [c1] (running...)`) so the matching end event updates the
//! right line even when several run interleaved.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::channel::ChannelItem;
use crate::proto::event::{
    AgentMessageEvent, AgentReasoningEvent, ApplyPatchApprovalRequestEvent, BackgroundEventEvent,
    ErrorEvent, ExecApprovalRequestEvent, ExecCommandBeginEvent, ExecCommandEndEvent,
    GetHistoryEntryResponseEvent, McpToolCallBeginEvent, McpToolCallEndEvent, PatchApplyBeginEvent,
    PatchApplyEndEvent, SessionConfiguredEvent, TokenCountEvent,
};
use crate::proto::{decode_event, Event, EventMsg, FileChange};
use crate::session::{teardown, ApprovalKind, PendingApproval, SessionId, SessionState, TaskStatus};
use crate::sink::PresentationSink;

// ── Dispatch loop ─────────────────────────────────────────────────────────────

/// Consume one session's inbound items until the channel closes or the
/// session stops.
pub(crate) async fn run_dispatch(
    id: SessionId,
    state: Arc<Mutex<SessionState>>,
    mut inbound_rx: mpsc::Receiver<ChannelItem>,
) {
    while let Some(item) = inbound_rx.recv().await {
        match item {
            ChannelItem::Line(line) => {
                let event = match decode_event(&line) {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(
                            session_id = id,
                            error = %err,
                            raw_line = %line,
                            "undecodable event line, skipping"
                        );
                        continue;
                    }
                };
                let mut state = state.lock().await;
                if state.stopped {
                    break;
                }
                handle_event(id, &mut state, &event);
            }
            ChannelItem::Closed { reason } => {
                let mut state = state.lock().await;
                handle_closed(id, &mut state, &reason);
                break;
            }
        }
    }
    // Senders gone without a closed notification; same treatment.
    let mut state = state.lock().await;
    handle_closed(id, &mut state, "transport dropped");
}

/// Apply one decoded event to the session state.
pub(crate) fn handle_event(id: SessionId, state: &mut SessionState, event: &Event) {
    let Some(sink) = state.sink.clone() else {
        return;
    };
    let sink = sink.as_ref();
    match &event.msg {
        EventMsg::Error(msg) => on_error(sink, msg),
        EventMsg::TaskStarted => on_task_started(state, sink),
        EventMsg::TaskComplete(_) => on_task_complete(state, sink),
        EventMsg::TokenCount(msg) => on_token_count(sink, msg),
        EventMsg::AgentMessage(msg) => on_agent_message(sink, msg),
        EventMsg::AgentReasoning(msg) => on_agent_reasoning(sink, msg),
        EventMsg::SessionConfigured(msg) => on_session_configured(sink, msg),
        EventMsg::McpToolCallBegin(msg) => on_mcp_tool_call_begin(sink, msg),
        EventMsg::McpToolCallEnd(msg) => on_mcp_tool_call_end(sink, msg),
        EventMsg::ExecCommandBegin(msg) => on_exec_command_begin(state, sink, msg),
        EventMsg::ExecCommandEnd(msg) => on_exec_command_end(state, sink, msg),
        EventMsg::ExecApprovalRequest(msg) => {
            on_exec_approval_request(id, state, sink, &event.id, msg);
        }
        EventMsg::ApplyPatchApprovalRequest(msg) => {
            on_apply_patch_approval_request(id, state, sink, &event.id, msg);
        }
        EventMsg::BackgroundEvent(msg) => on_background_event(sink, msg),
        EventMsg::PatchApplyBegin(msg) => on_patch_apply_begin(state, sink, msg),
        EventMsg::PatchApplyEnd(msg) => on_patch_apply_end(state, sink, msg),
        EventMsg::GetHistoryEntryResponse(msg) => on_get_history_entry_response(sink, msg),
        EventMsg::Unknown(raw) => on_unknown(sink, raw),
    }
}

/// React to channel closure: last transcript line, terminal title, then
/// teardown. No-op when the session already stopped.
pub(crate) fn handle_closed(id: SessionId, state: &mut SessionState, reason: &str) {
    if state.stopped {
        return;
    }
    info!(session_id = id, reason, "agent channel closed");
    if let Some(sink) = &state.sink {
        sink.append(&format!("\nsession closed: {reason}\n"));
        sink.set_title("[CLOSED]");
    }
    teardown(id, state);
}

// ── Event handlers ────────────────────────────────────────────────────────────

fn on_error(sink: &dyn PresentationSink, msg: &ErrorEvent) {
    sink.append(&format!("ERROR\n{}", msg.message));
}

fn on_task_started(state: &mut SessionState, sink: &dyn PresentationSink) {
    state.status = TaskStatus::Busy;
    sink.set_title("[THINKING...]");
}

fn on_task_complete(state: &mut SessionState, sink: &dyn PresentationSink) {
    state.status = TaskStatus::Idle;
    sink.set_title("[READY]");
}

fn on_token_count(sink: &dyn PresentationSink, msg: &TokenCountEvent) {
    sink.append(&format!(
        "tokens used: {} (input {}, output {})",
        msg.total_tokens, msg.input_tokens, msg.output_tokens
    ));
}

fn on_agent_message(sink: &dyn PresentationSink, msg: &AgentMessageEvent) {
    sink.append(&format!("codex\n{}", msg.message));
}

fn on_agent_reasoning(sink: &dyn PresentationSink, msg: &AgentReasoningEvent) {
    sink.append(&format!("codex (reasoning)\n{}", msg.text));
}

fn on_session_configured(sink: &dyn PresentationSink, msg: &SessionConfiguredEvent) {
    sink.append(&format!(
        "session configured: model {} (session {})",
        msg.model, msg.session_id
    ));
}

fn on_mcp_tool_call_begin(sink: &dyn PresentationSink, msg: &McpToolCallBeginEvent) {
    sink.append(&format!(
        "tool call [{}]: {}.{}",
        msg.call_id, msg.server, msg.tool
    ));
}

fn on_mcp_tool_call_end(sink: &dyn PresentationSink, msg: &McpToolCallEndEvent) {
    sink.append(&format!("tool call [{}] finished", msg.call_id));
}

fn on_exec_command_begin(
    state: &mut SessionState,
    sink: &dyn PresentationSink,
    msg: &ExecCommandBeginEvent,
) {
    state.running_execs.insert(msg.call_id.clone());
    sink.append(&format!(
        "{}\n$ {}",
        exec_marker(&msg.call_id),
        msg.command.join(" ")
    ));
}

fn on_exec_command_end(
    state: &mut SessionState,
    sink: &dyn PresentationSink,
    msg: &ExecCommandEndEvent,
) {
    let verdict = if msg.exit_code == 0 { "OK" } else { "ERROR" };
    let done = format!("command [{}] ({verdict})", msg.call_id);
    if state.running_execs.remove(&msg.call_id) {
        sink.replace_last_matching(&regex::escape(&exec_marker(&msg.call_id)), &done);
    } else {
        // End without a begin; nothing to update, so record it as new.
        sink.append(&done);
    }
}

fn on_exec_approval_request(
    id: SessionId,
    state: &mut SessionState,
    sink: &dyn PresentationSink,
    submission_id: &str,
    msg: &ExecApprovalRequestEvent,
) {
    set_pending(
        id,
        state,
        PendingApproval {
            submission_id: submission_id.to_owned(),
            kind: ApprovalKind::Exec,
        },
    );
    sink.show_status(&format!(
        "EXEC APPROVAL REQUEST: {}\n[{}]$ {}",
        msg.reason.as_deref().unwrap_or(""),
        msg.cwd.display(),
        msg.command.join(" ")
    ));
}

fn on_apply_patch_approval_request(
    id: SessionId,
    state: &mut SessionState,
    sink: &dyn PresentationSink,
    submission_id: &str,
    msg: &ApplyPatchApprovalRequestEvent,
) {
    set_pending(
        id,
        state,
        PendingApproval {
            submission_id: submission_id.to_owned(),
            kind: ApprovalKind::Patch,
        },
    );
    sink.show_status(&format!(
        "PATCH APPROVAL REQUEST: {}\n{}",
        msg.reason.as_deref().unwrap_or(""),
        file_changes_summary(&msg.changes)
    ));
    if let Some((path, diff)) = first_update_diff(&msg.changes) {
        sink.show_diff_preview(path, diff);
    }
}

fn on_background_event(sink: &dyn PresentationSink, msg: &BackgroundEventEvent) {
    sink.append(&format!("background: {}", msg.message));
}

fn on_patch_apply_begin(
    state: &mut SessionState,
    sink: &dyn PresentationSink,
    msg: &PatchApplyBeginEvent,
) {
    state.running_patches.insert(msg.call_id.clone());
    let mut text = patch_marker(&msg.call_id);
    if msg.auto_approved {
        text.push_str("\nauto-approved");
    }
    let summary = file_changes_summary(&msg.changes);
    if !summary.is_empty() {
        text.push('\n');
        text.push_str(&summary);
    }
    sink.append(&text);
}

fn on_patch_apply_end(
    state: &mut SessionState,
    sink: &dyn PresentationSink,
    msg: &PatchApplyEndEvent,
) {
    let verdict = if msg.success { "OK" } else { "ERROR" };
    let done = format!("patch apply [{}] ({verdict})", msg.call_id);
    if state.running_patches.remove(&msg.call_id) {
        sink.replace_last_matching(&regex::escape(&patch_marker(&msg.call_id)), &done);
    } else {
        sink.append(&done);
    }
}

fn on_get_history_entry_response(
    sink: &dyn PresentationSink,
    msg: &GetHistoryEntryResponseEvent,
) {
    match &msg.entry {
        Some(entry) => sink.append(&format!("history[{}]: {}", msg.offset, entry.text)),
        None => sink.append(&format!("history[{}]: (no entry)", msg.offset)),
    }
}

fn on_unknown(sink: &dyn PresentationSink, raw: &Value) {
    sink.append(&raw.to_string());
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Record the pending approval. A request arriving while another is still
/// pending supersedes it; the stale one can no longer be answered.
fn set_pending(id: SessionId, state: &mut SessionState, pending: PendingApproval) {
    if let Some(previous) = state.pending_approval.replace(pending) {
        warn!(
            session_id = id,
            request_id = %previous.submission_id,
            "approval request superseded before being resolved"
        );
    }
}

/// Progress marker for a running command; the matching end event replaces
/// the line found by this exact text.
fn exec_marker(call_id: &str) -> String {
    format!("command [{call_id}] (running...)")
}

/// Progress marker for a running patch application.
fn patch_marker(call_id: &str) -> String {
    format!("patch apply [{call_id}] (running...)")
}

/// One `kind path` line per change, in map (path) order.
fn file_changes_summary(changes: &BTreeMap<PathBuf, FileChange>) -> String {
    changes
        .iter()
        .map(|(path, change)| {
            let kind = match change {
                FileChange::Add { .. } => "add",
                FileChange::Delete => "delete",
                FileChange::Update { .. } => "update",
            };
            format!("{kind} {}", path.display())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The first `update` change in map order, for the diff preview.
fn first_update_diff(changes: &BTreeMap<PathBuf, FileChange>) -> Option<(&Path, &str)> {
    changes.iter().find_map(|(path, change)| match change {
        FileChange::Update { unified_diff, .. } => Some((path.as_path(), unified_diff.as_str())),
        FileChange::Add { .. } | FileChange::Delete => None,
    })
}
