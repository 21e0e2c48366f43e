use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::{json, Map, Value};
use tally_agent::{ConversationState, FileSessionStore, Message, ProposedToolCall, SessionStore};
use tally_cli::commands::{chat, config, pending, resume};
use tally_core::config::LoadOptions;

#[test]
fn pending_is_empty_without_snapshots() {
    let dir = tempfile::tempdir().expect("temp dir");
    with_env(&[("TALLY_AGENT_SESSION_DIR", path_str(dir.path()))], || {
        let result = pending::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "pending");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["details"]["threads"], json!([]));
    });
}

#[test]
fn pending_lists_suspended_threads() {
    let dir = tempfile::tempdir().expect("temp dir");
    save_suspended(dir.path(), "t-1");

    with_env(&[("TALLY_AGENT_SESSION_DIR", path_str(dir.path()))], || {
        let result = pending::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let threads = &payload["details"]["threads"];
        assert_eq!(threads[0]["threadId"], "t-1");
        assert_eq!(threads[0]["pendingReview"]["name"], "bookTimeEntry");
        assert_eq!(threads[0]["pendingReview"]["call_id"], "c1");
    });
}

#[test]
fn resume_rejects_unknown_decision_before_touching_state() {
    let dir = tempfile::tempdir().expect("temp dir");
    save_suspended(dir.path(), "t-1");

    with_env(&[("TALLY_AGENT_SESSION_DIR", path_str(dir.path()))], || {
        for raw in [r#"{"action":"maybe"}"#, "not json"] {
            let result = resume::run(&LoadOptions::default(), "t-1", raw);
            assert_eq!(result.exit_code, 2, "{raw}");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "malformed_decision");
        }
    });
    assert!(dir.path().join("t-1.json").exists(), "snapshot must survive a malformed decision");
}

#[test]
fn resume_reports_missing_thread() {
    let dir = tempfile::tempdir().expect("temp dir");
    with_env(&[("TALLY_AGENT_SESSION_DIR", path_str(dir.path()))], || {
        let result = resume::run(&LoadOptions::default(), "nope", r#"{"action":"approve"}"#);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "thread_not_found");
    });
}

#[test]
fn chat_without_model_key_fails_cleanly() {
    let dir = tempfile::tempdir().expect("temp dir");
    with_env(&[("TALLY_AGENT_SESSION_DIR", path_str(dir.path()))], || {
        let result = chat::run(&LoadOptions::default(), "Book 4 hours", None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "chat");
        assert_eq!(payload["error_class"], "model_unavailable");
    });
}

#[test]
fn chat_refuses_thread_waiting_for_review() {
    let dir = tempfile::tempdir().expect("temp dir");
    save_suspended(dir.path(), "t-1");

    with_env(
        &[("TALLY_AGENT_SESSION_DIR", path_str(dir.path())), ("TALLY_LLM_API_KEY", "sk-test")],
        || {
            let result = chat::run(&LoadOptions::default(), "hello", Some("t-1".to_string()));
            assert_eq!(result.exit_code, 2);
            assert_eq!(parse_payload(&result.output)["error_class"], "review_pending");
        },
    );
}

#[test]
fn invalid_config_is_reported_as_validation_failure() {
    with_env(&[("TALLY_AGENT_MAX_STEPS", "0")], || {
        let result = pending::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn config_redacts_key_and_attributes_sources() {
    with_env(
        &[("TALLY_LLM_API_KEY", "sk-ant-secret-value"), ("TALLY_API_USER_ID", "user123")],
        || {
            let output = config::run(&LoadOptions::default());

            assert!(!output.contains("sk-ant-secret-value"));
            assert!(output.contains("- llm.api_key = <redacted> (source: env (TALLY_LLM_API_KEY))"));
            assert!(output.contains("- api.user_id = user123 (source: env (TALLY_API_USER_ID))"));
            assert!(output.contains("- api.base_url = http://localhost:5008 (source: default)"));
        },
    );
}

fn save_suspended(dir: &Path, thread_id: &str) {
    let mut arguments = Map::new();
    arguments.insert("hours".to_string(), json!(4));
    let call = ProposedToolCall::new("bookTimeEntry", "c1", arguments);
    let mut state = ConversationState::new(vec![
        Message::human("Book 4 hours"),
        Message::Assistant { id: "m1".to_string(), content: String::new(), tool_calls: vec![call.clone()] },
    ])
    .with_thread_id(thread_id);
    state.pending_review = Some(call);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build");
    runtime
        .block_on(FileSessionStore::new(dir).save(thread_id, &state))
        .expect("snapshot should save");
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp dir path should be UTF-8")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TALLY_API_BASE_URL",
        "TALLY_API_USER_ID",
        "TALLY_API_TIMEOUT_SECS",
        "TALLY_LLM_API_KEY",
        "ANTHROPIC_API_KEY",
        "TALLY_LLM_BASE_URL",
        "TALLY_LLM_MODEL",
        "TALLY_LLM_TIMEOUT_SECS",
        "TALLY_LLM_MAX_TOKENS",
        "TALLY_DATABASE_URL",
        "TALLY_DATABASE_MAX_CONNECTIONS",
        "TALLY_DATABASE_TIMEOUT_SECS",
        "TALLY_AGENT_MAX_STEPS",
        "TALLY_AGENT_PROMPT_PATH",
        "TALLY_AGENT_SESSION_DIR",
        "TALLY_LOGGING_LEVEL",
        "TALLY_LOGGING_FORMAT",
        "TALLY_LOG_LEVEL",
        "TALLY_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
