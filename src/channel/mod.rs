//! Transport channel between a session and an agent process.
//!
//! A channel is a pair of bounded queues: callers push already-encoded
//! protocol lines out through [`AgentChannel`], and exactly one consumer
//! drains [`ChannelItem`]s arriving from the agent. The final item on any
//! channel is [`ChannelItem::Closed`]; nothing follows it.
//!
//! Submodules:
//! - `spawner`: process-backed channels over a child's stdio, with an exit
//!   monitor whose status report becomes the [`ChannelItem::Closed`] reason.
//!
//! [`AgentChannel::pipe`] builds an in-memory channel pair for embedders
//! that bring their own transport, and for tests.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, Result};

pub mod spawner;

pub use spawner::{spawn_agent, SpawnConfig};

/// Depth of the outbound and inbound queues.
const QUEUE_DEPTH: usize = 64;

/// One item arriving from the agent side of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelItem {
    /// A complete protocol line read from the agent.
    Line(String),
    /// The channel is finished; no further items will arrive.
    Closed {
        /// Human-readable cause, e.g. `process exited with code 0`.
        reason: String,
    },
}

/// Outbound handle to an agent channel.
///
/// Cheap to clone; all clones feed the same queue. Closing any clone closes
/// the channel for all of them.
#[derive(Debug, Clone)]
pub struct AgentChannel {
    outbound_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl AgentChannel {
    /// Enqueue one already-encoded line for delivery to the agent.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`] if the channel has been closed or its
    /// consumer is gone. Delivery is otherwise fire-and-forget; acceptance
    /// here says nothing about whether the agent ever reads the line.
    pub async fn send_line(&self, line: String) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Channel("channel closed".into()));
        }
        self.outbound_tx
            .send(line)
            .await
            .map_err(|_| AppError::Channel("channel closed".into()))
    }

    /// Forcibly close the channel.
    ///
    /// Idempotent. For process-backed channels this kills the agent process;
    /// for in-memory pairs it signals the peer via its cancellation token.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the channel can no longer accept lines.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.outbound_tx.is_closed()
    }

    /// Build an in-memory channel pair: the channel itself, the inbound
    /// receiver a session consumes, and a [`ChannelPeer`] playing the agent.
    #[must_use]
    pub fn pipe() -> (Self, mpsc::Receiver<ChannelItem>, ChannelPeer) {
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_DEPTH);
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        (
            Self {
                outbound_tx,
                cancel: cancel.clone(),
            },
            inbound_rx,
            ChannelPeer {
                outbound_rx,
                inbound_tx,
                cancel,
            },
        )
    }

    /// Assemble a channel from raw parts. `spawner` uses this; embedders
    /// with a custom transport can too.
    #[must_use]
    pub fn from_parts(outbound_tx: mpsc::Sender<String>, cancel: CancellationToken) -> Self {
        Self {
            outbound_tx,
            cancel,
        }
    }

    /// Token observed by the channel's background tasks; fires on [`close`].
    ///
    /// [`close`]: Self::close
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue depth used for channels built by this crate.
    #[must_use]
    pub const fn queue_depth() -> usize {
        QUEUE_DEPTH
    }
}

/// The agent-playing end of an in-memory channel pair.
#[derive(Debug)]
pub struct ChannelPeer {
    /// Lines the session sent outbound, in order.
    pub outbound_rx: mpsc::Receiver<String>,
    /// Feed inbound items to the session from here.
    pub inbound_tx: mpsc::Sender<ChannelItem>,
    /// Fires when the session side closes the channel.
    pub cancel: CancellationToken,
}
