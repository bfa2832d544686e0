//! End-to-end behavior of the context manager and the stateless editor.
//!
//! Fixed conversations first, then property tests over random
//! conversations that mix plain turns with `tool_use` / `tool_result` pairs.

use ctxfit::context::{
    ContextManager, ContextManagerConfig, TRUNCATED_PLACEHOLDER, estimate_tokens, is_well_paired,
    keep_recent, summarize_early,
};
use ctxfit::{Content, ContentBlock, Message, MessageRole, ToolSchema};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn manager(max_tokens: usize) -> ContextManager {
    ContextManager::new(ContextManagerConfig::default().with_max_tokens(max_tokens))
}

fn tool_pair(ids: &[String], output: &str) -> [Message; 2] {
    let calls = ids
        .iter()
        .map(|id| ContentBlock::tool_use(id.clone(), "read_file", json!({"path": id})))
        .collect();
    let results = ids
        .iter()
        .map(|id| ContentBlock::tool_result(id.clone(), output))
        .collect();
    [
        Message::with_blocks(MessageRole::Assistant, calls),
        Message::with_blocks(MessageRole::User, results),
    ]
}

/// Identity of a message that survives tool result truncation.
fn key(message: &Message) -> (MessageRole, String, Vec<String>, Vec<String>) {
    (
        message.role.clone(),
        message.text(),
        message.tool_use_ids().into_iter().map(String::from).collect(),
        message.tool_result_ids().into_iter().map(String::from).collect(),
    )
}

/// True when `output` is `input` with messages removed and tool result
/// payloads possibly replaced by the placeholder.
fn is_ordered_subsequence(output: &[Message], input: &[Message]) -> bool {
    let mut remaining = input.iter();
    output.iter().all(|kept| {
        remaining.any(|original| {
            original == kept || (key(original) == key(kept) && is_truncation_of(kept, original))
        })
    })
}

fn is_truncation_of(kept: &Message, original: &Message) -> bool {
    kept.blocks()
        .iter()
        .zip(original.blocks())
        .all(|(after, before)| match after {
            ContentBlock::ToolResult {
                content: Some(Content::Text(text)),
                ..
            } if text == TRUNCATED_PLACEHOLDER => before.is_tool_result(),
            _ => after == before,
        })
}

fn system_run(messages: &[Message]) -> usize {
    messages
        .iter()
        .take_while(|m| m.role == MessageRole::System)
        .count()
}

fn opens_conversation(message: &Message) -> bool {
    message.role == MessageRole::User && !message.has_tool_result()
}

fn has_opaque_block(message: &Message) -> bool {
    message
        .blocks()
        .iter()
        .any(|b| matches!(b, ContentBlock::Other(_)))
}

/// Leading system run plus the first user message that is not a tool result.
fn privileged_prefix(messages: &[Message]) -> Vec<Message> {
    let systems = system_run(messages);
    let mut prefix = messages[..systems].to_vec();
    if let Some(user) = messages[systems..].iter().find(|m| opens_conversation(m)) {
        prefix.push(user.clone());
    }
    prefix
}

// ============================================================================
// FIXED CONVERSATIONS
// ============================================================================

#[test]
fn long_middle_is_dropped_to_fit() {
    let mgr = manager(50);
    let messages = vec![
        Message::system("You are a helpful assistant."),
        Message::user("My task"),
        Message::assistant("Response 1 ".repeat(50)),
        Message::user("Message 2 ".repeat(50)),
        Message::assistant("Short response"),
        Message::user("Message 3"),
    ];
    assert!(!mgr.fits_in_context(&messages, &[]));

    let out = mgr.compact_messages(&messages, &[]);
    assert_eq!(out[0].role, MessageRole::System);
    assert_eq!(out[1], Message::user("My task"));
    assert_eq!(out.last(), Some(&Message::user("Message 3")));
    assert!(mgr.fits_in_context(&out, &[]));
}

#[test]
fn token_estimate_rounds_up() {
    assert_eq!(estimate_tokens(&"a".repeat(400)), 100);
    assert_eq!(estimate_tokens("abcde"), 2);
    assert_eq!(estimate_tokens(""), 1);
}

#[test]
fn keep_recent_keeps_first_and_tail() {
    let messages: Vec<Message> = (0..20).map(|i| Message::user(format!("m{i}"))).collect();
    let out = keep_recent(&messages, 5);

    assert_eq!(out.len(), 6);
    assert_eq!(out[0], Message::user("m0"));
    assert_eq!(&out[1..], &messages[15..]);
}

#[test]
fn summarize_early_inserts_marker() {
    let mut messages = vec![Message::system("sys")];
    messages.extend((0..20).map(|i| Message::user(format!("m{i}"))));
    let out = summarize_early(&messages, 5);

    assert_eq!(out.len(), 7);
    assert_eq!(out[0], Message::system("sys"));
    assert!(out[1].text().contains("15 earlier messages were summarized"));
    assert_eq!(&out[2..], &messages[16..]);
}

#[test]
fn privileged_prefix_survives_fifty_large_messages() {
    let mgr = manager(2000);
    let mut messages = vec![
        Message::system("You are a coding agent."),
        Message::user("My task"),
    ];
    for i in 0..50 {
        let text = format!("{i}:{}", "x".repeat(1000));
        messages.push(if i % 2 == 0 {
            Message::assistant(text)
        } else {
            Message::user(text)
        });
    }

    let compaction = mgr.compact_with_report(&messages, &[]);
    assert_eq!(compaction.messages[0], messages[0]);
    assert_eq!(compaction.messages[1], Message::user("My task"));
    assert!(compaction.report.fits);
    assert!(compaction.report.dropped_messages > 40);
    assert_eq!(compaction.messages.last(), messages.last());
}

#[test]
fn large_tool_outputs_are_truncated_before_turns_drop() {
    let mgr = manager(300);
    let mut messages = vec![Message::system("sys"), Message::user("Survey the repo")];
    for i in 0..4 {
        messages.extend(tool_pair(&[format!("call_{i}")], &"line\n".repeat(400)));
    }
    messages.push(Message::assistant("Done."));

    let compaction = mgr.compact_with_report(&messages, &[]);
    assert_eq!(compaction.report.truncated_results, 4);
    assert_eq!(compaction.report.dropped_messages, 0);
    assert!(is_well_paired(&compaction.messages));
    assert!(compaction.report.fits);
}

// ============================================================================
// PROPERTY GENERATORS
// ============================================================================

#[derive(Debug, Clone)]
enum Turn {
    User(String),
    Assistant(String),
    ToolPair { calls: usize, output_len: usize },
    Image(String),
}

fn arb_turn() -> impl Strategy<Value = Turn> {
    prop_oneof![
        "[a-z ]{1,400}".prop_map(Turn::User),
        "[a-z ]{1,400}".prop_map(Turn::Assistant),
        (1usize..=3, 1usize..2000)
            .prop_map(|(calls, output_len)| Turn::ToolPair { calls, output_len }),
        "[A-Za-z0-9]{4,800}".prop_map(Turn::Image),
    ]
}

/// Turns that may precede the first user message.
fn arb_leading_turn() -> impl Strategy<Value = Turn> {
    prop_oneof![
        "[a-z ]{1,200}".prop_map(Turn::Assistant),
        (1usize..=2, 1usize..500)
            .prop_map(|(calls, output_len)| Turn::ToolPair { calls, output_len }),
    ]
}

fn push_turn(messages: &mut Vec<Message>, turn: &Turn, tag: &str) {
    match turn {
        Turn::User(text) => messages.push(Message::user(text.clone())),
        Turn::Assistant(text) => messages.push(Message::assistant(text.clone())),
        Turn::ToolPair { calls, output_len } => {
            let ids: Vec<String> = (0..*calls).map(|j| format!("call_{tag}_{j}")).collect();
            messages.extend(tool_pair(&ids, &"o".repeat(*output_len)));
        }
        Turn::Image(data) => messages.push(Message::with_blocks(
            MessageRole::User,
            vec![
                ContentBlock::text("What is in this image?"),
                ContentBlock::Other(json!({
                    "type": "image",
                    "source": {"type": "base64", "media_type": "image/png", "data": data}
                })),
            ],
        )),
    }
}

fn build_conversation(with_system: bool, leading: &[Turn], turns: &[Turn]) -> Vec<Message> {
    let mut messages = Vec::new();
    if with_system {
        messages.push(Message::system("You are a helpful assistant."));
    }
    for (i, turn) in leading.iter().enumerate() {
        push_turn(&mut messages, turn, &format!("lead{i}"));
    }
    messages.push(Message::user("My task"));
    for (i, turn) in turns.iter().enumerate() {
        push_turn(&mut messages, turn, &i.to_string());
    }
    messages
}

fn arb_conversation() -> impl Strategy<Value = Vec<Message>> {
    (
        any::<bool>(),
        prop::collection::vec(arb_leading_turn(), 0..3),
        prop::collection::vec(arb_turn(), 0..30),
    )
        .prop_map(|(with_system, leading, turns)| {
            build_conversation(with_system, &leading, &turns)
        })
}

fn arb_tool() -> impl Strategy<Value = ToolSchema> {
    ("[a-z_]{3,20}", "[a-z ]{0,300}").prop_map(|(name, description)| {
        ToolSchema::new(
            name,
            description,
            json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        )
    })
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn compaction_fits_or_keeps_only_prefix(
        messages in arb_conversation(),
        tools in prop::collection::vec(arb_tool(), 0..3),
        budget in 20usize..2000,
    ) {
        let mgr = manager(budget);
        let out = mgr.compact_messages(&messages, &tools);
        prop_assert!(
            mgr.fits_in_context(&out, &tools) || out == privileged_prefix(&messages),
            "output neither fits nor is the bare prefix"
        );
    }

    #[test]
    fn compaction_output_is_well_paired(
        messages in arb_conversation(),
        budget in 20usize..2000,
    ) {
        let out = manager(budget).compact_messages(&messages, &[]);
        prop_assert!(is_well_paired(&out));
    }

    #[test]
    fn compaction_preserves_prefix(
        messages in arb_conversation(),
        budget in 20usize..2000,
    ) {
        let prefix = privileged_prefix(&messages);
        let out = manager(budget).compact_messages(&messages, &[]);
        prop_assert!(out.len() >= prefix.len());
        prop_assert_eq!(&out[..prefix.len()], &prefix[..]);
    }

    #[test]
    fn compacted_conversation_opens_with_user(
        messages in arb_conversation(),
        budget in 20usize..2000,
    ) {
        let mgr = manager(budget);
        prop_assume!(!mgr.fits_in_context(&messages, &[]));
        let out = mgr.compact_messages(&messages, &[]);
        let systems = system_run(&out);
        prop_assert!(out.get(systems).is_some_and(opens_conversation));
    }

    #[test]
    fn compaction_preserves_order(
        messages in arb_conversation(),
        budget in 20usize..2000,
    ) {
        let out = manager(budget).compact_messages(&messages, &[]);
        prop_assert!(is_ordered_subsequence(&out, &messages));
    }

    #[test]
    fn opaque_blocks_pass_through(
        messages in arb_conversation(),
        budget in 20usize..2000,
    ) {
        let out = manager(budget).compact_messages(&messages, &[]);
        for kept in out.iter().filter(|m| has_opaque_block(m)) {
            prop_assert!(messages.contains(kept));
        }
    }

    #[test]
    fn fitting_conversation_is_untouched(messages in arb_conversation()) {
        let mgr = manager(usize::MAX);
        let out = mgr.compact_messages(&messages, &[]);
        prop_assert_eq!(out, messages);
    }

    #[test]
    fn compaction_does_not_mutate_input(
        messages in arb_conversation(),
        budget in 20usize..2000,
    ) {
        let snapshot = messages.clone();
        let _ = manager(budget).compact_messages(&messages, &[]);
        prop_assert_eq!(messages, snapshot);
    }
}
