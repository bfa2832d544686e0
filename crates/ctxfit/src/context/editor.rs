//! Stateless edits over a message sequence.
//!
//! Each function borrows the input and returns a fresh `Vec`; the caller's
//! messages are never touched. None of these know about budgets. The
//! [`ContextManager`](super::ContextManager) decides when and how to combine
//! them.

use super::estimator::TokenEstimator;
use crate::{Content, ContentBlock, Message, MessageRole};
use serde::Serialize;

/// Remove `tool_result` blocks from block-structured user messages.
///
/// Other blocks keep their order. Plain-text messages and messages of any
/// other role pass through unchanged.
pub fn clear_tool_results(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|msg| match &msg.content {
            Content::Blocks(blocks) if msg.role == MessageRole::User => {
                let kept: Vec<ContentBlock> = blocks
                    .iter()
                    .filter(|b| !b.is_tool_result())
                    .cloned()
                    .collect();
                Message::with_blocks(msg.role.clone(), kept)
            }
            _ => msg.clone(),
        })
        .collect()
}

/// Drop every message with the given role, keeping the rest in order.
pub fn remove_by_role(messages: &[Message], role: &MessageRole) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| &m.role != role)
        .cloned()
        .collect()
}

/// Keep the first message plus the last `limit` messages.
///
/// Sequences of at most `limit + 1` messages are returned unchanged.
pub fn keep_recent(messages: &[Message], limit: usize) -> Vec<Message> {
    if messages.len() <= limit.saturating_add(1) {
        return messages.to_vec();
    }
    let tail_start = messages.len() - limit;
    let mut kept = Vec::with_capacity(limit + 1);
    kept.push(messages[0].clone());
    kept.extend_from_slice(&messages[tail_start..]);
    kept
}

/// Replace everything but the leading system messages and the last `limit`
/// messages with a single [`summary_marker`].
pub fn summarize_early(messages: &[Message], limit: usize) -> Vec<Message> {
    if messages.len() <= limit {
        return messages.to_vec();
    }
    let systems = leading_system_len(messages);
    let body = &messages[systems..];
    let keep = limit.min(body.len());
    let elided = body.len() - keep;
    if elided == 0 {
        return messages.to_vec();
    }

    let mut out = Vec::with_capacity(systems + 1 + keep);
    out.extend_from_slice(&messages[..systems]);
    out.push(summary_marker(elided));
    out.extend_from_slice(&body[elided..]);
    out
}

/// The synthetic message standing in for `count` elided messages.
pub fn summary_marker(count: usize) -> Message {
    let (noun, verb) = if count == 1 {
        ("message", "was")
    } else {
        ("messages", "were")
    };
    Message::user(format!(
        "[Conversation summary: {count} earlier {noun} {verb} summarized to save context.]"
    ))
}

/// Flatten block-structured content to the newline-joined text of its
/// `text` blocks. Non-text blocks are discarded.
pub fn extract_text_only(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|msg| match msg.content {
            Content::Blocks(_) => Message::new(msg.role.clone(), Content::Text(msg.text())),
            Content::Text(_) => msg.clone(),
        })
        .collect()
}

/// Number of consecutive `system` messages at the start of the sequence.
pub fn leading_system_len(messages: &[Message]) -> usize {
    messages
        .iter()
        .take_while(|m| m.role == MessageRole::System)
        .count()
}

/// Read-only summary of a message sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub system_messages: usize,
    pub total_estimated_tokens: usize,
}

impl ContextStats {
    /// Count messages per role and estimate total tokens.
    ///
    /// Unknown roles count toward `total_messages` only.
    pub fn collect(messages: &[Message], estimator: &TokenEstimator) -> Self {
        let mut stats = ContextStats {
            total_messages: messages.len(),
            total_estimated_tokens: estimator.conversation_tokens(messages),
            ..Default::default()
        };
        for msg in messages {
            match msg.role {
                MessageRole::User => stats.user_messages += 1,
                MessageRole::Assistant => stats.assistant_messages += 1,
                MessageRole::System => stats.system_messages += 1,
                MessageRole::Other(_) => {}
            }
        }
        stats
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "{} messages ({} user, {} assistant, {} system), ~{} tokens",
            self.total_messages,
            self.user_messages,
            self.assistant_messages,
            self.system_messages,
            self.total_estimated_tokens,
        )
    }
}

/// [`ContextStats::collect`] with the default estimator.
pub fn get_stats(messages: &[Message]) -> ContextStats {
    ContextStats::collect(messages, &TokenEstimator::default())
}
