//! Wire types and codec for the agent's NDJSON protocol stream.
//!
//! One JSON document per line in both directions. Outbound lines carry a
//! [`Submission`] (an operation wrapped with a caller-chosen id); inbound
//! lines carry an [`Event`] (a payload wrapped with the id of the submission
//! it answers, or a server-chosen id for unsolicited events).
//!
//! Submodules:
//! - `submission`: outbound [`Op`] variants and [`encode_submission`].
//! - `event`: inbound [`EventMsg`] variants and [`decode_event`].
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing for
//!   the agent's stdout stream.

pub mod codec;
pub mod event;
pub mod submission;

pub use codec::ProtoCodec;
pub use event::{decode_event, Event, EventMsg, FileChange, HistoryEntry};
pub use submission::{
    encode_submission, AskForApproval, InputItem, ModelProviderInfo, Op, ReasoningEffort,
    ReasoningSummary, ReviewDecision, SandboxPolicy, Submission, WireApi,
};
