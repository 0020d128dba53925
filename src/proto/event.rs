//! Inbound wire types: events the agent emits on its stdout stream.
//!
//! Decoding is strict about the envelope and lenient about payloads. A line
//! must be valid JSON with a string `id`, a `msg` object, and a string
//! `msg.type`; anything less is a protocol error confined to that line. Past
//! the envelope, unknown `type` tags and known tags whose payloads do not
//! match the expected shape both decode to [`EventMsg::Unknown`] carrying the
//! raw `msg` object, and missing payload fields fill with defaults. One
//! surprising line must never take the stream down.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{AppError, Result};

// ── Event envelope ────────────────────────────────────────────────────────────

/// One inbound event line: a payload wrapped with the id of the submission it
/// answers (or a server-chosen id for unsolicited events).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Submission id this event correlates to.
    pub id: String,
    /// Event payload.
    pub msg: EventMsg,
}

/// Decode one NDJSON line into an [`Event`].
///
/// # Errors
///
/// Returns [`AppError::Protocol`] if the line is not valid JSON, lacks a
/// string `id`, lacks a `msg` object, or `msg` lacks a string `type`. All
/// other irregularities degrade to [`EventMsg::Unknown`] instead of failing.
pub fn decode_event(line: &str) -> Result<Event> {
    let mut value: Value = serde_json::from_str(line)
        .map_err(|err| AppError::Protocol(format!("malformed event line: {err}")))?;
    let id = match value.get("id").and_then(Value::as_str) {
        Some(id) => id.to_owned(),
        None => return Err(AppError::Protocol("event line missing string `id`".into())),
    };
    let msg = match value.get_mut("msg") {
        Some(msg) => msg.take(),
        None => return Err(AppError::Protocol("event line missing `msg`".into())),
    };
    Ok(Event {
        id,
        msg: EventMsg::from_value(msg)?,
    })
}

// ── Event payloads ────────────────────────────────────────────────────────────

/// Everything the agent can say, plus a catch-all for everything it may
/// learn to say later.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMsg {
    /// Fatal error while servicing a submission.
    Error(ErrorEvent),
    /// The agent started working on a task.
    TaskStarted,
    /// The agent finished the current task.
    TaskComplete(TaskCompleteEvent),
    /// Token usage accounting.
    TokenCount(TokenCountEvent),
    /// Natural-language output for the user.
    AgentMessage(AgentMessageEvent),
    /// Chain-of-thought summary text.
    AgentReasoning(AgentReasoningEvent),
    /// Acknowledgement of `configure_session`.
    SessionConfigured(SessionConfiguredEvent),
    /// An MCP tool invocation started.
    McpToolCallBegin(McpToolCallBeginEvent),
    /// An MCP tool invocation finished.
    McpToolCallEnd(McpToolCallEndEvent),
    /// A shell command started.
    ExecCommandBegin(ExecCommandBeginEvent),
    /// A shell command finished.
    ExecCommandEnd(ExecCommandEndEvent),
    /// The agent wants permission to run a command.
    ExecApprovalRequest(ExecApprovalRequestEvent),
    /// The agent wants permission to apply a patch.
    ApplyPatchApprovalRequest(ApplyPatchApprovalRequestEvent),
    /// Informational notice outside any task structure.
    BackgroundEvent(BackgroundEventEvent),
    /// Patch application started.
    PatchApplyBegin(PatchApplyBeginEvent),
    /// Patch application finished.
    PatchApplyEnd(PatchApplyEndEvent),
    /// Answer to `get_history_entry_request`.
    GetHistoryEntryResponse(GetHistoryEntryResponseEvent),
    /// Anything this build does not recognize, raw `type` tag included.
    #[serde(untagged)]
    Unknown(Value),
}

impl EventMsg {
    /// Decode a `msg` object by its `type` tag.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] only when `type` is missing or not a
    /// string. Unknown tags and malformed payloads yield [`Self::Unknown`].
    pub fn from_value(value: Value) -> Result<Self> {
        let tag = match value.get("type").and_then(Value::as_str) {
            Some(tag) => tag.to_owned(),
            None => {
                return Err(AppError::Protocol(
                    "event `msg` missing string `type`".into(),
                ))
            }
        };
        let decoded = match tag.as_str() {
            "error" => payload(&value).map(Self::Error),
            "task_started" => Some(Self::TaskStarted),
            "task_complete" => payload(&value).map(Self::TaskComplete),
            "token_count" => payload(&value).map(Self::TokenCount),
            "agent_message" => payload(&value).map(Self::AgentMessage),
            "agent_reasoning" => payload(&value).map(Self::AgentReasoning),
            "session_configured" => payload(&value).map(Self::SessionConfigured),
            "mcp_tool_call_begin" => payload(&value).map(Self::McpToolCallBegin),
            "mcp_tool_call_end" => payload(&value).map(Self::McpToolCallEnd),
            "exec_command_begin" => payload(&value).map(Self::ExecCommandBegin),
            "exec_command_end" => payload(&value).map(Self::ExecCommandEnd),
            "exec_approval_request" => payload(&value).map(Self::ExecApprovalRequest),
            "apply_patch_approval_request" => payload(&value).map(Self::ApplyPatchApprovalRequest),
            "background_event" => payload(&value).map(Self::BackgroundEvent),
            "patch_apply_begin" => payload(&value).map(Self::PatchApplyBegin),
            "patch_apply_end" => payload(&value).map(Self::PatchApplyEnd),
            "get_history_entry_response" => payload(&value).map(Self::GetHistoryEntryResponse),
            _ => {
                debug!(tag = %tag, "unrecognized event type; passing through raw");
                None
            }
        };
        Ok(decoded.unwrap_or(Self::Unknown(value)))
    }
}

/// Decode a typed payload out of the raw `msg` object, tolerating extra
/// fields and filling missing ones with defaults. `None` means the payload
/// shape did not match and the caller should fall back to raw passthrough.
fn payload<T: DeserializeOwned>(value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(error = %err, "event payload failed to decode; passing through raw");
            None
        }
    }
}

/// Payload of `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorEvent {
    /// Human-readable description of what went wrong.
    pub message: String,
}

/// Payload of `task_complete`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskCompleteEvent {
    /// Final agent message of the task, when one was produced.
    pub last_agent_message: Option<String>,
}

/// Payload of `token_count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCountEvent {
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Prompt tokens served from cache, when the provider reports it.
    pub cached_input_tokens: Option<u64>,
    /// Completion tokens produced.
    pub output_tokens: u64,
    /// Reasoning tokens produced, when the provider reports it.
    pub reasoning_output_tokens: Option<u64>,
    /// Total tokens for the turn.
    pub total_tokens: u64,
}

/// Payload of `agent_message`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentMessageEvent {
    /// The message text.
    pub message: String,
}

/// Payload of `agent_reasoning`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentReasoningEvent {
    /// The reasoning summary text.
    pub text: String,
}

/// Payload of `session_configured`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfiguredEvent {
    /// Agent-assigned session identifier.
    pub session_id: String,
    /// Model actually in effect, which may differ from the one requested.
    pub model: String,
    /// Identifier of the history log backing this session.
    pub history_log_id: u64,
    /// Number of entries already in that log.
    pub history_entry_count: usize,
}

/// Payload of `mcp_tool_call_begin`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpToolCallBeginEvent {
    /// Correlates with the matching `mcp_tool_call_end`.
    pub call_id: String,
    /// MCP server the tool lives on.
    pub server: String,
    /// Tool name.
    pub tool: String,
    /// Tool arguments, shape defined by the tool.
    pub arguments: Option<Value>,
}

/// Payload of `mcp_tool_call_end`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpToolCallEndEvent {
    /// Correlates with the matching `mcp_tool_call_begin`.
    pub call_id: String,
    /// Tool result, shape defined by the tool.
    pub result: Option<Value>,
}

/// Payload of `exec_command_begin`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecCommandBeginEvent {
    /// Correlates with the matching `exec_command_end`.
    pub call_id: String,
    /// Argv of the command being run.
    pub command: Vec<String>,
    /// Directory the command runs in.
    pub cwd: PathBuf,
}

/// Payload of `exec_command_end`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecCommandEndEvent {
    /// Correlates with the matching `exec_command_begin`.
    pub call_id: String,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code; zero means success.
    pub exit_code: i32,
}

/// Payload of `exec_approval_request`.
///
/// Carries no `call_id`; the pending approval is correlated by the event's
/// envelope id instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecApprovalRequestEvent {
    /// Argv of the command awaiting approval.
    pub command: Vec<String>,
    /// Directory the command would run in.
    pub cwd: PathBuf,
    /// Agent-provided justification, when present.
    pub reason: Option<String>,
}

/// Payload of `apply_patch_approval_request`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyPatchApprovalRequestEvent {
    /// Proposed changes keyed by file path, in path order.
    pub changes: BTreeMap<PathBuf, FileChange>,
    /// Agent-provided justification, when present.
    pub reason: Option<String>,
    /// Root the agent wants write access under for this patch.
    pub grant_root: Option<PathBuf>,
}

/// Payload of `background_event`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundEventEvent {
    /// Informational text.
    pub message: String,
}

/// Payload of `patch_apply_begin`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchApplyBeginEvent {
    /// Correlates with the matching `patch_apply_end`.
    pub call_id: String,
    /// Whether policy approved the patch without asking.
    pub auto_approved: bool,
    /// Changes being applied, keyed by file path.
    pub changes: BTreeMap<PathBuf, FileChange>,
}

/// Payload of `patch_apply_end`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchApplyEndEvent {
    /// Correlates with the matching `patch_apply_begin`.
    pub call_id: String,
    /// Captured standard output of the apply step.
    pub stdout: String,
    /// Captured standard error of the apply step.
    pub stderr: String,
    /// Whether every change applied cleanly.
    pub success: bool,
}

/// Payload of `get_history_entry_response`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetHistoryEntryResponseEvent {
    /// Offset the request asked for.
    pub offset: usize,
    /// History log the request asked about.
    pub log_id: u64,
    /// The entry, when the offset exists.
    pub entry: Option<HistoryEntry>,
}

/// One line of the agent's cross-session history file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryEntry {
    /// Session that recorded the entry.
    pub session_id: String,
    /// Unix timestamp of the entry.
    pub ts: u64,
    /// Recorded text.
    pub text: String,
}

// ── File changes ──────────────────────────────────────────────────────────────

/// One proposed change inside a patch, keyed by path in the change map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileChange {
    /// Create the file with the given content.
    Add {
        /// Full content of the new file.
        content: String,
    },
    /// Delete the file.
    Delete,
    /// Patch the file with a unified diff, optionally renaming it.
    Update {
        /// Unified diff to apply.
        unified_diff: String,
        /// New path when the change is also a rename.
        #[serde(skip_serializing_if = "Option::is_none")]
        move_path: Option<PathBuf>,
    },
}

impl FileChange {
    /// Decode a change object by its `type` tag. Unrecognized tags fall back
    /// to [`Self::Delete`], matching the upstream dialect's own fallback.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let tag = value.get("type").and_then(Value::as_str).unwrap_or("");
        match tag {
            "add" => Self::Add {
                content: string_field(value, "content"),
            },
            "update" => Self::Update {
                unified_diff: string_field(value, "unified_diff"),
                move_path: value
                    .get("move_path")
                    .and_then(Value::as_str)
                    .map(PathBuf::from),
            },
            _ => Self::Delete,
        }
    }
}

impl<'de> Deserialize<'de> for FileChange {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}
