//! Integration tests for agent channels, in-memory and process-backed.
//!
//! The in-memory pair checks queue ordering and close semantics; the
//! process-backed tests spawn real shell commands and verify that stdout
//! lines arrive in order followed by exactly one closed notification
//! carrying the exit status, and that closing the channel cancels the
//! background tasks and kills the child.

use agent_conduit::channel::{spawn_agent, AgentChannel, ChannelItem, SpawnConfig};
use agent_conduit::AppError;
use tokio::time::timeout;

use super::test_helpers::WAIT;

// ── In-memory pair ───────────────────────────────────────────────────────────

/// Lines pushed into the channel come out of the peer in the same order.
#[tokio::test]
async fn pipe_delivers_outbound_lines_in_order() {
    let (channel, _inbound_rx, mut peer) = AgentChannel::pipe();

    for line in ["one", "two", "three"] {
        channel
            .send_line(line.to_owned())
            .await
            .expect("queue must accept");
    }

    for expected in ["one", "two", "three"] {
        let line = timeout(WAIT, peer.outbound_rx.recv())
            .await
            .expect("line should arrive promptly")
            .expect("queue must stay open");
        assert_eq!(line, expected);
    }
}

/// Items fed by the peer reach the inbound receiver unchanged and in order.
#[tokio::test]
async fn peer_items_reach_the_inbound_receiver() {
    let (_channel, mut inbound_rx, peer) = AgentChannel::pipe();

    peer.inbound_tx
        .send(ChannelItem::Line("hello".to_owned()))
        .await
        .expect("queue must accept");
    peer.inbound_tx
        .send(ChannelItem::Closed {
            reason: "done".to_owned(),
        })
        .await
        .expect("queue must accept");

    let first = timeout(WAIT, inbound_rx.recv())
        .await
        .expect("item should arrive promptly")
        .expect("queue must stay open");
    assert_eq!(first, ChannelItem::Line("hello".to_owned()));

    let second = timeout(WAIT, inbound_rx.recv())
        .await
        .expect("item should arrive promptly")
        .expect("queue must stay open");
    assert_eq!(
        second,
        ChannelItem::Closed {
            reason: "done".to_owned()
        }
    );
}

/// Closing is visible on both ends, refuses further sends, and is
/// idempotent.
#[tokio::test]
async fn close_is_visible_on_both_ends_and_idempotent() {
    let (channel, _inbound_rx, peer) = AgentChannel::pipe();
    assert!(!channel.is_closed());
    assert!(!peer.cancel.is_cancelled());

    channel.close();

    assert!(channel.is_closed());
    assert!(peer.cancel.is_cancelled());
    let refused = channel.send_line("late".to_owned()).await;
    assert!(
        matches!(refused, Err(AppError::Channel(_))),
        "send after close must fail, got: {refused:?}"
    );

    channel.close();
    assert!(channel.is_closed());
}

/// Dropping the peer makes the next send fail without a close call.
#[tokio::test]
async fn send_fails_once_the_consumer_is_gone() {
    let (channel, inbound_rx, peer) = AgentChannel::pipe();
    drop(peer);
    drop(inbound_rx);

    let refused = channel.send_line("into the void".to_owned()).await;
    assert!(
        matches!(refused, Err(AppError::Channel(_))),
        "send without a consumer must fail, got: {refused:?}"
    );
    assert!(channel.is_closed());
}

// ── Process-backed channels ──────────────────────────────────────────────────

/// Platform shell used to run test scripts.
#[cfg(unix)]
fn shell_exe() -> String {
    "sh".to_owned()
}

#[cfg(windows)]
fn shell_exe() -> String {
    "cmd".to_owned()
}

#[cfg(unix)]
fn shell_args(script: &str) -> Vec<String> {
    vec!["-c".to_owned(), script.to_owned()]
}

#[cfg(windows)]
fn shell_args(script: &str) -> Vec<String> {
    vec!["/C".to_owned(), script.to_owned()]
}

fn shell_spawn(script: &str) -> SpawnConfig {
    SpawnConfig {
        program: shell_exe(),
        args: shell_args(script),
        cwd: None,
    }
}

/// Script emitting two lines on stdout, then exiting cleanly.
#[cfg(unix)]
fn two_lines_script() -> &'static str {
    "printf 'alpha\\nbeta\\n'"
}

#[cfg(windows)]
fn two_lines_script() -> &'static str {
    "echo alpha& echo beta"
}

/// Script consuming stdin and echoing it back on stdout.
#[cfg(unix)]
fn echo_back_script() -> &'static str {
    "cat"
}

#[cfg(windows)]
fn echo_back_script() -> &'static str {
    "findstr .*"
}

/// Script that never writes and never exits on its own.
#[cfg(unix)]
fn hanging_script() -> &'static str {
    "sleep 300"
}

#[cfg(windows)]
fn hanging_script() -> &'static str {
    "timeout /t 300 /nobreak"
}

/// Stdout lines arrive in order, then exactly one closed notification, then
/// the stream ends.
#[tokio::test]
async fn spawned_lines_arrive_in_order_then_closed() {
    let (_channel, mut inbound_rx) =
        spawn_agent(&shell_spawn(two_lines_script()), 1).expect("spawn must succeed");

    for expected in ["alpha", "beta"] {
        let item = timeout(WAIT, inbound_rx.recv())
            .await
            .expect("line should arrive promptly")
            .expect("stream must not end before the closed notification");
        match item {
            // cmd.exe emits CRLF line endings; the carriage return stays.
            ChannelItem::Line(line) => assert_eq!(line.trim_end_matches('\r'), expected),
            other => panic!("expected a line, got: {other:?}"),
        }
    }

    let item = timeout(WAIT, inbound_rx.recv())
        .await
        .expect("closed notification should arrive promptly")
        .expect("stream must deliver the closed notification");
    assert!(
        matches!(item, ChannelItem::Closed { .. }),
        "expected the closed notification, got: {item:?}"
    );

    let end = timeout(WAIT, inbound_rx.recv())
        .await
        .expect("stream should end promptly");
    assert!(end.is_none(), "nothing may follow the closed notification");
}

/// The closed reason carries the child's exit code.
#[tokio::test]
async fn process_exit_code_reaches_the_closed_reason() {
    let (_channel, mut inbound_rx) =
        spawn_agent(&shell_spawn("exit 7"), 2).expect("spawn must succeed");

    let item = timeout(WAIT, inbound_rx.recv())
        .await
        .expect("closed notification should arrive promptly")
        .expect("stream must deliver the closed notification");
    match item {
        ChannelItem::Closed { reason } => assert!(
            reason.contains("code 7"),
            "reason must carry the exit code, got: {reason}"
        ),
        other => panic!("expected the closed notification, got: {other:?}"),
    }

    let end = timeout(WAIT, inbound_rx.recv())
        .await
        .expect("stream should end promptly");
    assert!(end.is_none());
}

/// Outbound lines are written to the child's stdin newline-terminated.
#[tokio::test]
async fn outbound_lines_reach_the_child_stdin() {
    let (channel, mut inbound_rx) =
        spawn_agent(&shell_spawn(echo_back_script()), 3).expect("spawn must succeed");

    channel
        .send_line("ping".to_owned())
        .await
        .expect("send must succeed");

    let item = timeout(WAIT, inbound_rx.recv())
        .await
        .expect("echo should arrive promptly")
        .expect("stream must stay open");
    match item {
        ChannelItem::Line(line) => assert_eq!(line.trim_end_matches('\r'), "ping"),
        other => panic!("expected the echoed line, got: {other:?}"),
    }

    channel.close();
}

/// Closing the channel kills the child and ends the inbound stream without
/// a closed notification.
#[tokio::test]
async fn closing_the_channel_cancels_everything() {
    let (channel, mut inbound_rx) =
        spawn_agent(&shell_spawn(hanging_script()), 4).expect("spawn must succeed");

    channel.close();

    let end = timeout(WAIT, inbound_rx.recv())
        .await
        .expect("stream should end promptly after close");
    assert!(
        end.is_none(),
        "a deliberate close must not produce a closed notification"
    );

    let refused = channel.send_line("late".to_owned()).await;
    assert!(matches!(refused, Err(AppError::Channel(_))));
}

/// A missing binary surfaces as a channel error at spawn time.
#[tokio::test]
async fn spawn_failure_surfaces_as_channel_error() {
    let config = SpawnConfig {
        program: "/nonexistent/agent-binary-for-tests".to_owned(),
        args: Vec::new(),
        cwd: None,
    };

    let refused = spawn_agent(&config, 5);
    assert!(
        matches!(refused, Err(AppError::Channel(_))),
        "spawning a missing binary must fail with a channel error"
    );
}
