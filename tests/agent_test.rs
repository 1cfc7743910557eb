//! Agent façade tests.
//!
//! All tests use `MockBackend`; no network calls are made.

use agentrelay::{
    Agent, AgentError, History, MockBackend, MockReply, ModelRegistry, ProviderKind,
    RegistryEntry, Reply, Role, Settings, TokenUsage, Turn,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Test helpers
// ─────────────────────────────────────────────────────────────────────────────

fn test_registry() -> ModelRegistry {
    ModelRegistry::builder()
        .entry(RegistryEntry::new("chat-style", ProviderKind::ChatStyle, "gpt-4.1-mini"))
        .entry(RegistryEntry::new("messages-style", ProviderKind::MessagesStyle, "claude-3-5-haiku"))
        .entry(
            RegistryEntry::new("contents-style-json", ProviderKind::ContentsStyle, "gemini-2.0-flash")
                .with_param("max_output_tokens", 256.0),
        )
        .build()
        .expect("test registry is valid")
}

fn mock_agent(
    shorthand: &str,
    keep_history: bool,
    structured: bool,
    mock: Arc<MockBackend>,
) -> Agent {
    Agent::builder(shorthand, "  You are a writing coach.\n")
        .history(keep_history)
        .structured_output(structured)
        .backend(mock)
        .build(&test_registry())
        .expect("agent should build")
}

// ─────────────────────────────────────────────────────────────────────────────
// Construction
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn every_registry_entry_builds_a_matching_agent() {
    for registry in [ModelRegistry::builtin(), test_registry()] {
        for shorthand in registry.shorthands() {
            let expected = registry.resolve(shorthand).unwrap();
            let agent = Agent::new(&registry, shorthand, "prompt", false, false).unwrap();

            assert_eq!(agent.shorthand(), shorthand);
            assert_eq!(agent.provider_kind(), expected.provider_kind);
            assert_eq!(agent.model_id(), expected.model_id);
            assert_eq!(agent.entry(), expected);
        }
    }
}

#[test]
fn unknown_shorthand_is_a_configuration_error() {
    let registry = ModelRegistry::builtin();
    for shorthand in ["nonexistent", "", "GPT", "claude", "gemini-2.0-flash-exp", "sonnet\n"] {
        let result = Agent::new(&registry, shorthand, "prompt", true, true);
        assert!(
            matches!(result, Err(AgentError::Configuration(_))),
            "{shorthand:?} should be rejected"
        );
    }
}

#[test]
fn nonexistent_shorthand_never_touches_the_backend() {
    let mock = Arc::new(MockBackend::texts(["unused"]));
    let result = Agent::builder("nonexistent", "eval")
        .backend(mock.clone())
        .build(&test_registry());

    assert!(matches!(result, Err(AgentError::Configuration(_))));
    assert_eq!(mock.call_count(), 0);
    assert_eq!(mock.remaining(), 1);
}

#[test]
fn system_prompt_is_trimmed() {
    let agent = mock_agent("chat-style", false, false, Arc::new(MockBackend::texts(Vec::<String>::new())));
    assert_eq!(agent.system_prompt(), "You are a writing coach.");
}

#[test]
fn history_snapshot_requires_a_historied_agent() {
    let mut seed = History::new();
    seed.push_exchange("q", "a");

    let result = Agent::builder("chat-style", "p")
        .history_snapshot(seed.clone())
        .build(&test_registry());
    assert!(matches!(result, Err(AgentError::Configuration(_))));

    let agent = Agent::builder("chat-style", "p")
        .history(true)
        .history_snapshot(seed.clone())
        .build(&test_registry())
        .unwrap();
    assert_eq!(agent.history(), seed);
}

#[tokio::test]
async fn seeded_system_turn_gives_way_to_the_agent_prompt() {
    let seed = History::from_turns(vec![
        Turn::system("an older prompt"),
        Turn::user("q"),
        Turn::assistant("a"),
    ])
    .unwrap();
    let mock = Arc::new(MockBackend::texts(["next"]));
    let agent = Agent::builder("messages-style", "p")
        .history(true)
        .history_snapshot(seed)
        .backend(mock.clone())
        .build(&test_registry())
        .unwrap();

    assert_eq!(agent.history().turns(), &[Turn::user("q"), Turn::assistant("a")]);

    agent.respond("again").await.unwrap();
    let sent = mock.request(0).unwrap();
    assert_eq!(sent.system_prompt, "p");
    assert!(sent.prior_turns.iter().all(|t| t.role != Role::System));
}

// ─────────────────────────────────────────────────────────────────────────────
// History
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn historied_agent_records_alternating_pairs_in_call_order() {
    let outputs = ["reply one", "reply two", "reply three", "reply four"];
    let mock = Arc::new(MockBackend::texts(outputs));
    let agent = mock_agent("messages-style", true, false, mock.clone());

    let inputs = ["first", "second", "third", "fourth"];
    for (i, input) in inputs.iter().enumerate() {
        let reply = agent.respond(input).await.unwrap();
        assert_eq!(reply, Reply::Text(outputs[i].to_string()));
    }

    let history = agent.history();
    assert_eq!(history.len(), 2 * inputs.len());
    for (i, pair) in history.turns().chunks(2).enumerate() {
        assert_eq!(pair[0], Turn::user(inputs[i]));
        assert_eq!(pair[1], Turn::assistant(outputs[i]));
    }
}

#[tokio::test]
async fn prior_turns_are_sent_with_each_call() {
    let mock = Arc::new(MockBackend::texts(["a1", "a2", "a3"]));
    let agent = mock_agent("chat-style", true, false, mock.clone());

    agent.respond("q1").await.unwrap();
    agent.respond("q2").await.unwrap();
    agent.respond("q3").await.unwrap();

    let first = mock.request(0).unwrap();
    assert!(first.prior_turns.is_empty());
    assert_eq!(first.system_prompt, "You are a writing coach.");
    assert_eq!(first.new_input, "q1");

    let third = mock.request(2).unwrap();
    assert_eq!(third.prior_turns, vec![
        Turn::user("q1"), Turn::assistant("a1"),
        Turn::user("q2"), Turn::assistant("a2"),
    ]);
    assert_eq!(third.new_input, "q3");
    assert!(!third.structured_output);
}

#[tokio::test]
async fn non_historied_agent_never_records_turns() {
    let mock = Arc::new(MockBackend::new(vec![
        MockReply::text("one"),
        MockReply::fail("503 overloaded"),
        MockReply::text("two"),
    ]));
    let agent = mock_agent("chat-style", false, false, mock.clone());

    assert!(agent.respond("a").await.is_ok());
    assert!(agent.respond("b").await.is_err());
    assert!(agent.respond("c").await.is_ok());

    assert!(agent.history().is_empty());
    assert!(mock.request(2).unwrap().prior_turns.is_empty());
}

#[tokio::test]
async fn failed_call_leaves_history_identical() {
    let mock = Arc::new(MockBackend::new(vec![
        MockReply::text("fine"),
        MockReply::fail("401 invalid api key"),
    ]));
    let agent = mock_agent("messages-style", true, false, mock.clone());

    agent.respond("warm up").await.unwrap();
    let before = serde_json::to_vec(&agent.history()).unwrap();

    let err = agent.respond("this one fails").await.unwrap_err();
    match err {
        AgentError::ProviderRequest { provider, detail } => {
            assert_eq!(provider, ProviderKind::MessagesStyle);
            assert_eq!(detail, "401 invalid api key");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let after = serde_json::to_vec(&agent.history()).unwrap();
    assert_eq!(before, after);
    assert_eq!(agent.history().exchanges(), 1);
}

#[tokio::test]
async fn clear_history_starts_a_fresh_conversation() {
    let mock = Arc::new(MockBackend::texts(["a", "b"]));
    let agent = mock_agent("chat-style", true, false, mock.clone());

    agent.respond("q").await.unwrap();
    agent.clear_history().await;
    assert!(agent.history().is_empty());

    agent.respond("q again").await.unwrap();
    assert!(mock.request(1).unwrap().prior_turns.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Structured output
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn contents_style_json_scenario() {
    let mock = Arc::new(MockBackend::texts(["```json\n{\"badge_1\":{\"earned\":1}}\n```"]));
    let agent = Agent::builder("contents-style-json", "eval")
        .history(true)
        .structured_output(true)
        .backend(mock.clone())
        .build(&test_registry())
        .unwrap();

    let reply = agent.respond("draft text").await.unwrap();
    assert_eq!(reply, Reply::Structured(json!({ "badge_1": { "earned": 1 } })));

    let history = agent.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history.turns()[0], Turn::user("draft text"));
    assert_eq!(history.turns()[1].role, Role::Assistant);
    assert!(mock.request(0).unwrap().structured_output);
}

#[tokio::test]
async fn unparseable_structured_reply_is_a_format_error_and_not_recorded() {
    let mock = Arc::new(MockBackend::texts(["{\"a\":1}", "{\"a\":1"]));
    let agent = mock_agent("contents-style-json", true, true, mock);

    agent.respond("ok").await.unwrap();
    let before = agent.history();

    let err = agent.respond("truncated").await.unwrap_err();
    assert!(matches!(err, AgentError::ResponseFormat(_)), "{err:?}");
    assert_eq!(agent.history(), before);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Badge {
    word:  String,
    emoji: String,
}

#[tokio::test]
async fn respond_json_deserializes_the_payload() {
    let mock = Arc::new(MockBackend::texts([
        r#"{"word": "Vivid", "emoji": "🎨"}"#,
        r#"{"unexpected": true}"#,
    ]));
    let agent = mock_agent("chat-style", false, true, mock);

    let badge: Badge = agent.respond_json("make a badge").await.unwrap();
    assert_eq!(badge, Badge { word: "Vivid".to_string(), emoji: "🎨".to_string() });

    let err = agent.respond_json::<Badge>("again").await.unwrap_err();
    assert!(matches!(err, AgentError::ResponseFormat(_)));
}

#[tokio::test]
async fn respond_json_shape_mismatch_leaves_history_untouched() {
    let mock = Arc::new(MockBackend::texts([
        r#"{"word": "Bold", "emoji": "🦁"}"#,
        r#"{"other": 1}"#,
    ]));
    let agent = mock_agent("contents-style-json", true, true, mock);

    let _: Badge = agent.respond_json("first").await.unwrap();
    let before = agent.history();
    assert_eq!(before.len(), 2);

    let err = agent.respond_json::<Badge>("second").await.unwrap_err();
    assert!(matches!(err, AgentError::ResponseFormat(_)), "{err:?}");
    assert_eq!(agent.history(), before);
    assert_eq!(agent.trace().failures().len(), 1);
}

#[tokio::test]
async fn respond_json_requires_structured_mode() {
    let mock = Arc::new(MockBackend::texts(["{}"]));
    let agent = mock_agent("chat-style", false, false, mock.clone());

    let err = agent.respond_json::<serde_json::Value>("x").await.unwrap_err();
    assert!(matches!(err, AgentError::Configuration(_)));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn plain_agent_returns_text_untouched() {
    let raw = "```json\n{\"a\":1}\n```";
    let agent = mock_agent("chat-style", false, false, Arc::new(MockBackend::texts([raw])));
    assert_eq!(agent.respond_text("x").await.unwrap(), raw);
}

// ─────────────────────────────────────────────────────────────────────────────
// Usage and trace
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn usage_and_trace_track_every_call() {
    let mock = Arc::new(
        MockBackend::new(vec![
            MockReply::text("one"),
            MockReply::fail("boom"),
            MockReply::text("two"),
        ])
        .with_usage(TokenUsage::new(10, 5)),
    );
    let agent = mock_agent("chat-style", false, false, mock);

    agent.respond("a").await.unwrap();
    agent.respond("b").await.unwrap_err();
    agent.respond("c").await.unwrap();

    assert_eq!(agent.usage(), TokenUsage { input_tokens: 20, output_tokens: 10, total_tokens: 30 });

    let trace = agent.trace();
    assert_eq!(trace.len(), 3);
    assert_eq!(trace.failures().len(), 1);
    assert!(trace.get(0).unwrap().is_success());
    assert_eq!(trace.get(1).unwrap().provider, ProviderKind::ChatStyle);
}

#[tokio::test]
async fn trace_keeps_only_the_most_recent_calls() {
    let mock = Arc::new(MockBackend::texts(["1", "2", "3", "4", "5"]));
    let agent = Agent::builder("chat-style", "p")
        .settings(Settings::isolated().with_trace_capacity(2))
        .backend(mock)
        .build(&test_registry())
        .unwrap();

    for input in ["a", "b", "c", "d"] {
        agent.respond(input).await.unwrap();
    }
    let trace = agent.trace();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace.evicted(), 2);

    let drained = agent.take_trace();
    assert_eq!(drained.len(), 2);
    assert!(agent.trace().is_empty());

    agent.respond("e").await.unwrap();
    assert_eq!(agent.trace().len(), 1);
}
