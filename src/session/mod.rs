//! Session state machine over one agent channel.
//!
//! A [`Session`] owns the conversation with one agent process: it encodes
//! and sends submissions, consumes the event stream through a dispatch loop,
//! tracks the idle/busy status and the single outstanding approval request,
//! and renders everything through a [`PresentationSink`].
//!
//! All sends are fire-and-forget: acceptance by the channel says nothing
//! about the agent's reaction, which arrives later as events. A failed send
//! means the channel is gone and tears the session down before the error is
//! returned.
//!
//! Submodules:
//! - `dispatch`: the per-session event loop and the named event handlers.
//! - `manager`: the process-wide registry handing out session ids.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::channel::{AgentChannel, ChannelItem};
use crate::proto::{
    encode_submission, AskForApproval, Event, InputItem, ModelProviderInfo, Op, ReasoningEffort,
    ReasoningSummary, ReviewDecision, SandboxPolicy, Submission,
};
use crate::sink::PresentationSink;
use crate::{AppError, Result};

pub mod dispatch;
pub mod manager;

pub use manager::SessionManager;

/// Identifier of a session within one host process. Monotonically
/// increasing, never reused.
pub type SessionId = u64;

// ── Session state types ───────────────────────────────────────────────────────

/// Whether the agent is currently working on a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for input.
    #[default]
    Idle,
    /// Working; a `task_complete` event will follow.
    Busy,
}

/// Which kind of approval the agent asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalKind {
    /// Permission to run a command.
    Exec,
    /// Permission to apply a patch.
    Patch,
}

/// The one approval request allowed to be outstanding at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingApproval {
    /// Envelope id of the event that raised the request; the answer is
    /// addressed to it.
    pub submission_id: String,
    /// What was asked for.
    pub kind: ApprovalKind,
}

/// Everything `configure_session` carries.
#[derive(Debug, Clone)]
pub struct ConfigureParams {
    /// Model provider the agent should talk to.
    pub provider: ModelProviderInfo,
    /// Model slug.
    pub model: String,
    /// Reasoning effort for reasoning-capable models.
    pub reasoning_effort: ReasoningEffort,
    /// Reasoning summary verbosity.
    pub reasoning_summary: ReasoningSummary,
    /// System instructions override.
    pub instructions: Option<String>,
    /// When the agent must pause for approval.
    pub approval_policy: AskForApproval,
    /// Restrictions for agent-run commands.
    pub sandbox_policy: SandboxPolicy,
    /// Disable server-side response storage.
    pub disable_response_storage: bool,
    /// Working directory for the session.
    pub cwd: PathBuf,
    /// Notification program and arguments.
    pub notify: Option<Vec<String>>,
}

impl From<ConfigureParams> for Op {
    fn from(params: ConfigureParams) -> Self {
        Self::ConfigureSession {
            provider: params.provider,
            model: params.model,
            model_reasoning_effort: params.reasoning_effort,
            model_reasoning_summary: params.reasoning_summary,
            instructions: params.instructions,
            approval_policy: params.approval_policy,
            sandbox_policy: params.sandbox_policy,
            disable_response_storage: params.disable_response_storage,
            cwd: params.cwd,
            notify: params.notify,
        }
    }
}

/// Mutable session state, shared between the handle and the dispatch loop.
/// The dispatch loop is the only writer driven by inbound traffic; handle
/// operations mutate it under the same lock.
pub(crate) struct SessionState {
    pub(crate) channel: AgentChannel,
    pub(crate) status: TaskStatus,
    pub(crate) pending_approval: Option<PendingApproval>,
    pub(crate) sink: Option<Arc<dyn PresentationSink>>,
    pub(crate) running_execs: HashSet<String>,
    pub(crate) running_patches: HashSet<String>,
    pub(crate) configured: bool,
    pub(crate) stopped: bool,
}

// ── Session handle ────────────────────────────────────────────────────────────

/// Cloneable handle to one live session.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    state: Arc<Mutex<SessionState>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Bind a channel to a new session and start its dispatch loop.
    ///
    /// The loop runs until the channel reports closure or [`stop`] is
    /// called, whichever comes first.
    ///
    /// [`stop`]: Self::stop
    #[must_use]
    pub fn start(
        id: SessionId,
        channel: AgentChannel,
        inbound_rx: mpsc::Receiver<ChannelItem>,
        sink: Arc<dyn PresentationSink>,
    ) -> Self {
        let state = Arc::new(Mutex::new(SessionState {
            channel,
            status: TaskStatus::Idle,
            pending_approval: None,
            sink: Some(sink),
            running_execs: HashSet::new(),
            running_patches: HashSet::new(),
            configured: false,
            stopped: false,
        }));
        tokio::spawn(dispatch::run_dispatch(id, Arc::clone(&state), inbound_rx));
        Self {
            id,
            created_at: Utc::now(),
            state,
        }
    }

    /// Send `configure_session`. Allowed exactly once per session; the agent
    /// answers with a `session_configured` event.
    ///
    /// Returns the submission id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Misuse`] when the session was already configured,
    /// [`AppError::Channel`] when the session is stopped or the send fails.
    pub async fn configure(&self, params: ConfigureParams) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.configured {
            return Err(AppError::Misuse("session already configured".into()));
        }
        let submission = Submission::new(params.into());
        let submission_id = submission.id.clone();
        self.submit_locked(&mut state, &submission).await?;
        state.configured = true;
        info!(session_id = self.id, submission_id = %submission_id, "configure_session sent");
        Ok(submission_id)
    }

    /// Send the user's text to the agent, then echo it into the transcript.
    ///
    /// Returns the submission id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`] when the session is stopped or the send
    /// fails.
    pub async fn submit_user_message(&self, text: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        let submission = Submission::new(Op::UserInput {
            items: vec![InputItem::Text {
                text: text.to_owned(),
            }],
        });
        let submission_id = submission.id.clone();
        self.submit_locked(&mut state, &submission).await?;
        if let Some(sink) = &state.sink {
            sink.append(&format!("\nuser\n{text}\n"));
        }
        Ok(submission_id)
    }

    /// Send raw input items without a transcript echo.
    ///
    /// Returns the submission id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`] when the session is stopped or the send
    /// fails.
    pub async fn submit_input(&self, items: Vec<InputItem>) -> Result<String> {
        let mut state = self.state.lock().await;
        let submission = Submission::new(Op::UserInput { items });
        let submission_id = submission.id.clone();
        self.submit_locked(&mut state, &submission).await?;
        Ok(submission_id)
    }

    /// Ask the agent to abandon the current task. Safe to call at any time;
    /// the agent ignores it when idle.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`] when the session is stopped or the send
    /// fails.
    pub async fn interrupt(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        let submission = Submission::new(Op::Interrupt);
        let submission_id = submission.id.clone();
        self.submit_locked(&mut state, &submission).await?;
        Ok(submission_id)
    }

    /// Answer the pending approval request, if one exists.
    ///
    /// The answer is addressed to the submission id the request arrived
    /// under; the approval-request UI (status and diff preview) is cleared.
    /// Returns the submission id of the answer, or `None` when nothing was
    /// pending, which is a benign no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`] when the session is stopped or the send
    /// fails. The pending request is discarded either way.
    pub async fn resolve_approval(&self, decision: ReviewDecision) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        let Some(pending) = state.pending_approval.take() else {
            debug!(session_id = self.id, "no approval pending, decision ignored");
            return Ok(None);
        };
        let op = match pending.kind {
            ApprovalKind::Exec => Op::ExecApproval {
                id: pending.submission_id.clone(),
                decision,
            },
            ApprovalKind::Patch => Op::PatchApproval {
                id: pending.submission_id.clone(),
                decision,
            },
        };
        let submission = Submission::new(op);
        let submission_id = submission.id.clone();
        self.submit_locked(&mut state, &submission).await?;
        if let Some(sink) = &state.sink {
            sink.clear_status();
            sink.hide_diff_preview();
        }
        info!(
            session_id = self.id,
            request_id = %pending.submission_id,
            ?decision,
            "approval resolved"
        );
        Ok(Some(submission_id))
    }

    /// Append raw text to the agent's cross-session history file.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`] when the session is stopped or the send
    /// fails.
    pub async fn add_to_history(&self, text: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        let submission = Submission::new(Op::AddToHistory {
            text: text.to_owned(),
        });
        let submission_id = submission.id.clone();
        self.submit_locked(&mut state, &submission).await?;
        Ok(submission_id)
    }

    /// Request one history entry; the agent answers with a
    /// `get_history_entry_response` event.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`] when the session is stopped or the send
    /// fails.
    pub async fn request_history_entry(&self, offset: usize, log_id: u64) -> Result<String> {
        let mut state = self.state.lock().await;
        let submission = Submission::new(Op::GetHistoryEntryRequest { offset, log_id });
        let submission_id = submission.id.clone();
        self.submit_locked(&mut state, &submission).await?;
        Ok(submission_id)
    }

    /// Apply one already-decoded event to the session.
    ///
    /// The spawned dispatch loop calls this for every inbound line;
    /// embedders that deliver events themselves can call it directly.
    /// Events arriving after [`stop`] are ignored.
    ///
    /// [`stop`]: Self::stop
    pub async fn on_event(&self, event: &Event) {
        let mut state = self.state.lock().await;
        if state.stopped {
            debug!(session_id = self.id, "event after stop, ignored");
            return;
        }
        dispatch::handle_event(self.id, &mut state, event);
    }

    /// Stop the session: close the channel (killing a spawned agent),
    /// discard any pending approval, release the sink. Idempotent; the
    /// session is unusable afterwards.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        teardown(self.id, &mut state);
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// When the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current idle/busy status.
    pub async fn status(&self) -> TaskStatus {
        self.state.lock().await.status
    }

    /// The outstanding approval request, if any.
    pub async fn pending_approval(&self) -> Option<PendingApproval> {
        self.state.lock().await.pending_approval.clone()
    }

    /// Whether `configure_session` has been sent.
    pub async fn is_configured(&self) -> bool {
        self.state.lock().await.configured
    }

    /// Whether the session has been stopped or lost its channel.
    pub async fn is_stopped(&self) -> bool {
        self.state.lock().await.stopped
    }

    /// Encode and send one submission on the locked state, tearing the
    /// session down when the channel turns out to be gone.
    async fn submit_locked(&self, state: &mut SessionState, submission: &Submission) -> Result<()> {
        if state.stopped {
            return Err(AppError::Channel("session stopped".into()));
        }
        let line = encode_submission(submission)?;
        if let Err(err) = state.channel.send_line(line).await {
            warn!(session_id = self.id, error = %err, "send failed, closing session");
            dispatch::handle_closed(self.id, state, "send failed");
            return Err(err);
        }
        Ok(())
    }
}

/// Mark the session stopped, close its channel, discard the pending
/// approval, release the sink. Idempotent.
pub(crate) fn teardown(id: SessionId, state: &mut SessionState) {
    if state.stopped {
        return;
    }
    state.stopped = true;
    state.channel.close();
    if let Some(pending) = state.pending_approval.take() {
        warn!(
            session_id = id,
            request_id = %pending.submission_id,
            "pending approval discarded at stop"
        );
    }
    state.sink = None;
    info!(session_id = id, "session stopped");
}
