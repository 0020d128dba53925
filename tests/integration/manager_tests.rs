//! Integration tests for the session registry.
//!
//! Validates monotonic never-reused session ids, the concurrent-session
//! ceiling, lookup and listing, stop-all at shutdown, and the full launch
//! path over a real child process.

use agent_conduit::channel::SpawnConfig;
use agent_conduit::session::SessionManager;
use agent_conduit::AppError;

use super::test_helpers::{piped_session, test_params, wait_until_stopped, RecordingSink};

// ── Id allocation ────────────────────────────────────────────────────────────

/// Ids increase monotonically and are never reused, even after the session
/// that held one is gone.
#[tokio::test]
async fn session_ids_increase_and_are_never_reused() {
    let manager = SessionManager::new(8);

    let first = manager.next_session_id();
    let second = manager.next_session_id();
    assert!(second > first);

    let (session, _sink, _peer) = piped_session(first);
    manager.register(session).await.expect("register must succeed");
    manager
        .stop_session(first)
        .await
        .expect("stop must succeed");

    let third = manager.next_session_id();
    assert!(
        third > second,
        "a stopped session's id must stay burned: {third} vs {second}"
    );
    assert!(manager.get(first).await.is_none());
}

// ── Registration and limits ──────────────────────────────────────────────────

/// The ceiling counts registered sessions; stopping one frees a slot.
#[tokio::test]
async fn session_limit_applies_to_registration() {
    let manager = SessionManager::new(2);
    let mut peers = Vec::new();

    for _ in 0..2 {
        let id = manager.next_session_id();
        let (session, _sink, peer) = piped_session(id);
        peers.push(peer);
        manager.register(session).await.expect("register must succeed");
    }

    let id = manager.next_session_id();
    let (session, _sink, peer) = piped_session(id);
    peers.push(peer);
    let refused = manager.register(session.clone()).await;
    assert!(
        matches!(refused, Err(AppError::Misuse(_))),
        "registration beyond the limit must be refused, got: {refused:?}"
    );

    let victim = manager.list().await[0];
    manager.stop_session(victim).await.expect("stop must succeed");
    manager
        .register(session)
        .await
        .expect("a freed slot must accept a new session");
    assert_eq!(manager.active_count().await, 2);
}

/// Lookup returns live handles only; listing is ascending regardless of
/// registration order.
#[tokio::test]
async fn lookup_and_listing_reflect_the_registry() {
    let manager = SessionManager::new(8);
    let ids: Vec<u64> = (0..3).map(|_| manager.next_session_id()).collect();

    let mut peers = Vec::new();
    for &id in ids.iter().rev() {
        let (session, _sink, peer) = piped_session(id);
        peers.push(peer);
        manager.register(session).await.expect("register must succeed");
    }

    assert_eq!(manager.list().await, ids);
    assert_eq!(manager.active_count().await, 3);

    let found = manager.get(ids[1]).await.expect("session must be found");
    assert_eq!(found.id(), ids[1]);
    assert!(manager.get(9_999).await.is_none());
}

/// Stopping an unknown id reports `NotFound` and leaves the registry alone.
#[tokio::test]
async fn stop_session_on_unknown_id_is_not_found() {
    let manager = SessionManager::new(4);
    let id = manager.next_session_id();
    let (session, _sink, _peer) = piped_session(id);
    manager.register(session).await.expect("register must succeed");

    let refused = manager.stop_session(id + 100).await;
    assert!(
        matches!(refused, Err(AppError::NotFound(_))),
        "unknown id must be refused, got: {refused:?}"
    );
    assert_eq!(manager.active_count().await, 1);
}

/// `stop_all` drains the registry and stops every session.
#[tokio::test]
async fn stop_all_stops_every_session() {
    let manager = SessionManager::new(8);
    let mut sessions = Vec::new();
    let mut peers = Vec::new();

    for _ in 0..3 {
        let id = manager.next_session_id();
        let (session, _sink, peer) = piped_session(id);
        peers.push(peer);
        manager
            .register(session.clone())
            .await
            .expect("register must succeed");
        sessions.push(session);
    }

    manager.stop_all().await;

    assert_eq!(manager.active_count().await, 0);
    for session in &sessions {
        assert!(session.is_stopped().await, "session {} must stop", session.id());
    }
}

// ── Launch over a real process ───────────────────────────────────────────────

/// Shell command that consumes stdin until the channel closes.
#[cfg(unix)]
fn stdin_sink_spawn() -> SpawnConfig {
    SpawnConfig {
        program: "sh".to_owned(),
        args: vec!["-c".to_owned(), "cat >/dev/null".to_owned()],
        cwd: None,
    }
}

#[cfg(windows)]
fn stdin_sink_spawn() -> SpawnConfig {
    SpawnConfig {
        program: "cmd".to_owned(),
        args: vec!["/C".to_owned(), "findstr x > NUL".to_owned()],
        cwd: None,
    }
}

/// `launch` spawns the process, registers the session, and sends the
/// configure submission; `stop_session` kills and deregisters it.
#[tokio::test]
async fn launch_spawns_configures_and_registers() {
    let manager = SessionManager::new(2);
    let sink = RecordingSink::new();

    let session = manager
        .launch(&stdin_sink_spawn(), test_params(), sink)
        .await
        .expect("launch must succeed");

    assert!(session.is_configured().await);
    assert_eq!(manager.active_count().await, 1);
    assert_eq!(manager.list().await, vec![session.id()]);

    manager
        .stop_session(session.id())
        .await
        .expect("stop must succeed");
    wait_until_stopped(&session).await;
    assert_eq!(manager.active_count().await, 0);
}

/// A full registry refuses to launch before spawning anything.
#[tokio::test]
async fn launch_refuses_when_the_registry_is_full() {
    let manager = SessionManager::new(0);
    let sink = RecordingSink::new();

    let refused = manager
        .launch(&stdin_sink_spawn(), test_params(), sink)
        .await;
    assert!(
        matches!(refused, Err(AppError::Misuse(_))),
        "a full registry must refuse to launch, got: {refused:?}"
    );
}
