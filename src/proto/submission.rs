//! Outbound wire types: operations the host submits to the agent.
//!
//! Every outbound line is a [`Submission`]: `{"id": "...", "op": {...}}`
//! where `op` is internally tagged with `type`. Shapes match the agent's
//! `proto` dialect exactly, down to which absent optionals serialize as
//! `null` (all of [`ModelProviderInfo`]'s, plus `instructions`) and which
//! drop out of the object entirely (`notify`).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;

// ── Submission envelope ───────────────────────────────────────────────────────

/// One outbound request line: an operation wrapped with a unique id.
///
/// The agent echoes this id on the events it emits while servicing the
/// submission, which is what approval correlation keys on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Identifier echoed back by the agent.
    pub id: String,
    /// Operation payload.
    pub op: Op,
}

impl Submission {
    /// Wrap an operation with a freshly generated UUID id.
    #[must_use]
    pub fn new(op: Op) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            op,
        }
    }

    /// Wrap an operation with a caller-chosen id.
    #[must_use]
    pub fn with_id(id: impl Into<String>, op: Op) -> Self {
        Self { id: id.into(), op }
    }
}

/// Serialize a submission to its single-line wire form (no trailing newline).
///
/// # Errors
///
/// Returns [`AppError::Protocol`](crate::AppError::Protocol) if the value
/// cannot be serialized.
pub fn encode_submission(submission: &Submission) -> Result<String> {
    Ok(serde_json::to_string(submission)?)
}

// ── Operations ────────────────────────────────────────────────────────────────

/// Operations the host can submit to the agent.
///
/// Field order inside `configure_session` is part of the observable wire
/// shape and follows the agent's own serializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Op {
    /// Configure the session. Must be the first operation on a fresh agent.
    ConfigureSession {
        /// Model provider the agent should talk to.
        provider: ModelProviderInfo,
        /// Model slug, e.g. `codex-mini-latest`.
        model: String,
        /// Reasoning effort for reasoning-capable models.
        model_reasoning_effort: ReasoningEffort,
        /// Reasoning summary verbosity.
        model_reasoning_summary: ReasoningSummary,
        /// System instructions override; serialized as `null` when absent.
        instructions: Option<String>,
        /// When the agent must pause for command approval.
        approval_policy: AskForApproval,
        /// Filesystem/network restrictions for agent-run commands.
        sandbox_policy: SandboxPolicy,
        /// Disable server-side response storage.
        disable_response_storage: bool,
        /// Working directory for the session.
        cwd: PathBuf,
        /// Notification program and arguments; omitted entirely when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notify: Option<Vec<String>>,
    },
    /// Interrupt whatever task the agent is currently running.
    Interrupt,
    /// Deliver user input items to the agent.
    UserInput {
        /// Ordered input items (text and image references).
        items: Vec<InputItem>,
    },
    /// Answer a pending command-execution approval request.
    ExecApproval {
        /// Submission id the approval request was raised under.
        id: String,
        /// The verdict.
        decision: ReviewDecision,
    },
    /// Answer a pending patch-application approval request.
    PatchApproval {
        /// Submission id the approval request was raised under.
        id: String,
        /// The verdict.
        decision: ReviewDecision,
    },
    /// Append raw text to the agent's cross-session history file.
    AddToHistory {
        /// Text to record.
        text: String,
    },
    /// Request one history entry; answered by a `get_history_entry_response`
    /// event carrying the same `offset` and `log_id`.
    GetHistoryEntryRequest {
        /// Zero-based entry offset.
        offset: usize,
        /// History log identifier from `session_configured`.
        log_id: u64,
    },
}

// ── Input items ───────────────────────────────────────────────────────────────

/// One element of a `user_input` submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    /// Plain text typed by the user.
    Text {
        /// The text itself.
        text: String,
    },
    /// Image referenced by URL.
    Image {
        /// Where the agent can fetch the image.
        image_url: String,
    },
    /// Image stored on the local filesystem.
    LocalImage {
        /// Path readable by the agent process.
        path: PathBuf,
    },
}

// ── Review decisions ──────────────────────────────────────────────────────────

/// Verdict on a pending approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Run it this once.
    Approved,
    /// Run it, and auto-approve identical requests for the session.
    ApprovedForSession,
    /// Do not run it; the agent may try something else.
    Denied,
    /// Do not run it, and stop working until the next user input.
    Abort,
}

// ── Session policies ──────────────────────────────────────────────────────────

/// When the agent must pause and ask the host for approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AskForApproval {
    /// Ask for everything except known-safe read-only commands.
    #[serde(rename = "untrusted")]
    UnlessTrusted,
    /// Run sandboxed without asking; escalate to the host only on failure.
    OnFailure,
    /// Never ask; failures are returned to the model as-is.
    Never,
}

/// Execution restrictions for agent-run commands, tagged with `mode` on the
/// wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SandboxPolicy {
    /// No restrictions. Use with caution.
    DangerFullAccess,
    /// Read-only filesystem access.
    ReadOnly,
    /// Read everything, write only inside the workspace.
    WorkspaceWrite {
        /// Extra writable roots beyond the working directory.
        #[serde(default)]
        writable_roots: Vec<PathBuf>,
        /// Whether outbound network access is allowed.
        #[serde(default)]
        network_access: bool,
    },
}

// ── Model provider ────────────────────────────────────────────────────────────

/// Description of the model provider the agent should use.
///
/// Every optional field here serializes as an explicit `null` when absent;
/// the agent's own serializer emits the full object and some builds reject
/// sparse ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProviderInfo {
    /// Provider display name, e.g. `openai`.
    pub name: String,
    /// Base URL of the provider API.
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub env_key: Option<String>,
    /// Human-readable instructions for obtaining the key.
    #[serde(default)]
    pub env_key_instructions: Option<String>,
    /// Which provider API dialect to speak.
    #[serde(default)]
    pub wire_api: WireApi,
    /// Extra query parameters appended to every request.
    #[serde(default)]
    pub query_params: Option<HashMap<String, String>>,
    /// Extra headers sent verbatim on every request.
    #[serde(default)]
    pub http_headers: Option<HashMap<String, String>>,
    /// Headers whose values are read from the named environment variables.
    #[serde(default)]
    pub env_http_headers: Option<HashMap<String, String>>,
}

/// Provider API dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireApi {
    /// The Responses API.
    Responses,
    /// The Chat Completions API.
    #[default]
    Chat,
}

/// Reasoning effort for reasoning-capable models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// Favor speed over depth.
    Low,
    /// Balanced effort.
    #[default]
    Medium,
    /// Favor depth over speed.
    High,
    /// Disable reasoning.
    None,
}

/// Reasoning summary verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummary {
    /// Let the model pick.
    #[default]
    Auto,
    /// Short summaries.
    Concise,
    /// Full summaries.
    Detailed,
    /// No summaries.
    None,
}
