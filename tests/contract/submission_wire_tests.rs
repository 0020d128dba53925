//! Contract tests pinning the outbound wire shapes byte for byte.
//!
//! The agent's `proto` dialect is sensitive to more than JSON equality:
//! `configure_session` emits its fields in a fixed order, absent provider
//! optionals and `instructions` serialize as explicit `null`s, and `notify`
//! drops out of the object entirely when unset. These tests compare whole
//! encoded lines against literal strings so any drift shows up.

use agent_conduit::proto::{
    encode_submission, AskForApproval, InputItem, ModelProviderInfo, Op, ReasoningEffort,
    ReasoningSummary, ReviewDecision, SandboxPolicy, Submission, WireApi,
};

fn openai_provider() -> ModelProviderInfo {
    ModelProviderInfo {
        name: "openai".to_owned(),
        base_url: "https://api.openai.com/v1".to_owned(),
        env_key: Some("OPENAI_API_KEY".to_owned()),
        env_key_instructions: None,
        wire_api: WireApi::Chat,
        query_params: None,
        http_headers: None,
        env_http_headers: None,
    }
}

// ── configure_session ────────────────────────────────────────────────────────

#[test]
fn configure_session_line_matches_the_dialect_exactly() {
    let submission = Submission::with_id(
        "sub-1",
        Op::ConfigureSession {
            provider: openai_provider(),
            model: "codex-mini-latest".to_owned(),
            model_reasoning_effort: ReasoningEffort::Medium,
            model_reasoning_summary: ReasoningSummary::Auto,
            instructions: None,
            approval_policy: AskForApproval::UnlessTrusted,
            sandbox_policy: SandboxPolicy::ReadOnly,
            disable_response_storage: false,
            cwd: "/work/project".into(),
            notify: None,
        },
    );

    let line = encode_submission(&submission).expect("encode must succeed");

    assert_eq!(
        line,
        concat!(
            "{\"id\":\"sub-1\",\"op\":{\"type\":\"configure_session\",",
            "\"provider\":{\"name\":\"openai\",\"base_url\":\"https://api.openai.com/v1\",",
            "\"env_key\":\"OPENAI_API_KEY\",\"env_key_instructions\":null,",
            "\"wire_api\":\"chat\",\"query_params\":null,\"http_headers\":null,",
            "\"env_http_headers\":null},",
            "\"model\":\"codex-mini-latest\",",
            "\"model_reasoning_effort\":\"medium\",",
            "\"model_reasoning_summary\":\"auto\",",
            "\"instructions\":null,",
            "\"approval_policy\":\"untrusted\",",
            "\"sandbox_policy\":{\"mode\":\"read-only\"},",
            "\"disable_response_storage\":false,",
            "\"cwd\":\"/work/project\"}}",
        )
    );
}

#[test]
fn configure_session_includes_notify_and_instructions_when_set() {
    let submission = Submission::with_id(
        "sub-2",
        Op::ConfigureSession {
            provider: ModelProviderInfo {
                name: "openai".to_owned(),
                base_url: "https://api.openai.com/v1".to_owned(),
                env_key: Some("OPENAI_API_KEY".to_owned()),
                env_key_instructions: Some("export OPENAI_API_KEY first".to_owned()),
                wire_api: WireApi::Responses,
                query_params: None,
                http_headers: None,
                env_http_headers: None,
            },
            model: "o3".to_owned(),
            model_reasoning_effort: ReasoningEffort::High,
            model_reasoning_summary: ReasoningSummary::Detailed,
            instructions: Some("be brief".to_owned()),
            approval_policy: AskForApproval::OnFailure,
            sandbox_policy: SandboxPolicy::WorkspaceWrite {
                writable_roots: vec!["/tmp/scratch".into()],
                network_access: true,
            },
            disable_response_storage: true,
            cwd: "/work".into(),
            notify: Some(vec!["notify-send".to_owned(), "done".to_owned()]),
        },
    );

    let line = encode_submission(&submission).expect("encode must succeed");

    assert_eq!(
        line,
        concat!(
            "{\"id\":\"sub-2\",\"op\":{\"type\":\"configure_session\",",
            "\"provider\":{\"name\":\"openai\",\"base_url\":\"https://api.openai.com/v1\",",
            "\"env_key\":\"OPENAI_API_KEY\",",
            "\"env_key_instructions\":\"export OPENAI_API_KEY first\",",
            "\"wire_api\":\"responses\",\"query_params\":null,\"http_headers\":null,",
            "\"env_http_headers\":null},",
            "\"model\":\"o3\",",
            "\"model_reasoning_effort\":\"high\",",
            "\"model_reasoning_summary\":\"detailed\",",
            "\"instructions\":\"be brief\",",
            "\"approval_policy\":\"on-failure\",",
            "\"sandbox_policy\":{\"mode\":\"workspace-write\",",
            "\"writable_roots\":[\"/tmp/scratch\"],\"network_access\":true},",
            "\"disable_response_storage\":true,",
            "\"cwd\":\"/work\",",
            "\"notify\":[\"notify-send\",\"done\"]}}",
        )
    );
}

// ── Other operations ─────────────────────────────────────────────────────────

#[test]
fn interrupt_line_is_minimal() {
    let submission = Submission::with_id("sub-3", Op::Interrupt);

    let line = encode_submission(&submission).expect("encode must succeed");

    assert_eq!(line, "{\"id\":\"sub-3\",\"op\":{\"type\":\"interrupt\"}}");
}

#[test]
fn user_input_line_wraps_text_items() {
    let submission = Submission::with_id(
        "sub-4",
        Op::UserInput {
            items: vec![InputItem::Text {
                text: "hello".to_owned(),
            }],
        },
    );

    let line = encode_submission(&submission).expect("encode must succeed");

    assert_eq!(
        line,
        "{\"id\":\"sub-4\",\"op\":{\"type\":\"user_input\",\"items\":[{\"type\":\"text\",\"text\":\"hello\"}]}}"
    );
}

#[test]
fn exec_approval_line_addresses_the_request() {
    let submission = Submission::with_id(
        "sub-5",
        Op::ExecApproval {
            id: "42".to_owned(),
            decision: ReviewDecision::Approved,
        },
    );

    let line = encode_submission(&submission).expect("encode must succeed");

    assert_eq!(
        line,
        "{\"id\":\"sub-5\",\"op\":{\"type\":\"exec_approval\",\"id\":\"42\",\"decision\":\"approved\"}}"
    );
}

#[test]
fn patch_approval_line_addresses_the_request() {
    let submission = Submission::with_id(
        "sub-6",
        Op::PatchApproval {
            id: "43".to_owned(),
            decision: ReviewDecision::Denied,
        },
    );

    let line = encode_submission(&submission).expect("encode must succeed");

    assert_eq!(
        line,
        "{\"id\":\"sub-6\",\"op\":{\"type\":\"patch_approval\",\"id\":\"43\",\"decision\":\"denied\"}}"
    );
}

#[test]
fn add_to_history_line_carries_the_text() {
    let submission = Submission::with_id(
        "sub-7",
        Op::AddToHistory {
            text: "remember this".to_owned(),
        },
    );

    let line = encode_submission(&submission).expect("encode must succeed");

    assert_eq!(
        line,
        "{\"id\":\"sub-7\",\"op\":{\"type\":\"add_to_history\",\"text\":\"remember this\"}}"
    );
}

#[test]
fn history_request_line_carries_offset_and_log_id() {
    let submission = Submission::with_id(
        "sub-8",
        Op::GetHistoryEntryRequest {
            offset: 3,
            log_id: 99,
        },
    );

    let line = encode_submission(&submission).expect("encode must succeed");

    assert_eq!(
        line,
        "{\"id\":\"sub-8\",\"op\":{\"type\":\"get_history_entry_request\",\"offset\":3,\"log_id\":99}}"
    );
}
