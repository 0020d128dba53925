//! Session registry: allocation, lookup, lifecycle.
//!
//! The manager hands out session ids from a monotonic counter, so an id
//! observed anywhere in the process always denotes the same session even
//! long after it stopped. A configurable ceiling bounds how many sessions
//! run concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, info_span};

use crate::channel::{spawn_agent, SpawnConfig};
use crate::session::{ConfigureParams, Session, SessionId};
use crate::sink::PresentationSink;
use crate::{AppError, Result};

/// Registry of live sessions.
#[derive(Debug)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Session>>,
    next_id: AtomicU64,
    max_sessions: usize,
}

impl SessionManager {
    /// Create a registry allowing up to `max_sessions` live sessions.
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_sessions,
        }
    }

    /// Allocate the next session id. Ids increase monotonically and are
    /// never reused, including for sessions that failed to launch.
    fn allocate_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawn an agent process, register a session over it, and send
    /// `configure_session`.
    ///
    /// On a configure failure the half-started session is stopped and
    /// deregistered; its id stays burned.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Misuse`] when the registry is full,
    /// [`AppError::Channel`] when the spawn or the configure send fails.
    pub async fn launch(
        &self,
        spawn: &SpawnConfig,
        params: ConfigureParams,
        sink: Arc<dyn PresentationSink>,
    ) -> Result<Session> {
        let mut sessions = self.sessions.lock().await;
        if sessions.len() >= self.max_sessions {
            return Err(AppError::Misuse(format!(
                "session limit reached ({} active)",
                sessions.len()
            )));
        }
        let id = self.allocate_id();
        let span = info_span!("launch_session", session_id = id);
        let _guard = span.enter();

        let (channel, inbound_rx) = spawn_agent(spawn, id)?;
        let session = Session::start(id, channel, inbound_rx, sink);
        sessions.insert(id, session.clone());
        drop(sessions);

        if let Err(err) = session.configure(params).await {
            self.sessions.lock().await.remove(&id);
            session.stop().await;
            return Err(err);
        }

        info!(session_id = id, "session launched");
        Ok(session)
    }

    /// Register an externally built session (custom channel or sink).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Misuse`] when the registry is full.
    pub async fn register(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.len() >= self.max_sessions {
            return Err(AppError::Misuse(format!(
                "session limit reached ({} active)",
                sessions.len()
            )));
        }
        sessions.insert(session.id(), session);
        Ok(())
    }

    /// Allocate an id for an externally built session.
    #[must_use]
    pub fn next_session_id(&self) -> SessionId {
        self.allocate_id()
    }

    /// Look up a session by id.
    pub async fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.lock().await.get(&id).cloned()
    }

    /// Number of registered sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Ids of all registered sessions, ascending.
    pub async fn list(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Stop a session and remove it from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] when no session has that id.
    pub async fn stop_session(&self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
        session.stop().await;
        info!(session_id = id, "session deregistered");
        Ok(())
    }

    /// Stop every registered session. Used at shutdown.
    pub async fn stop_all(&self) {
        let sessions: Vec<Session> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.stop().await;
        }
    }
}
