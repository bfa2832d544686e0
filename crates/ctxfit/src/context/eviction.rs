//! Tool result eviction: replace tool result payloads with a short placeholder.
//!
//! Tool results are the single largest context consumer in any agent loop.
//! A file read can inject 30KB; a search can return hundreds of lines. Most of
//! it is irrelevant once the model has seen it. Eviction shrinks the payload
//! but keeps the `tool_result` block and its `tool_use_id`, so the
//! `tool_use` / `tool_result` pairing stays intact.

use crate::{Content, ContentBlock, Message};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Payload written into evicted tool results.
///
/// Both the writer and the "already evicted?" check use this constant.
pub const TRUNCATED_PLACEHOLDER: &str = "[tool result truncated]";

/// Configuration for tool result eviction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    /// Tools whose results are never truncated.
    pub protected_tools: HashSet<String>,
}

impl EvictionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a protected tool name (its results will never be evicted).
    pub fn protect_tool(mut self, name: impl Into<String>) -> Self {
        self.protected_tools.insert(name.into());
        self
    }
}

/// Replace tool result payloads in `messages[skip..]` with
/// [`TRUNCATED_PLACEHOLDER`].
///
/// Results of protected tools, payloads already evicted, and payloads no
/// larger than the placeholder are left alone. Returns the new sequence and
/// the number of blocks truncated.
pub fn truncate_tool_results(
    messages: &[Message],
    skip: usize,
    config: &EvictionConfig,
) -> (Vec<Message>, usize) {
    // Tool names are only known from the tool_use side of each pair.
    let tool_names: HashMap<&str, &str> = messages
        .iter()
        .flat_map(|m| m.blocks())
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, .. } => Some((id.as_str(), name.as_str())),
            _ => None,
        })
        .collect();

    let mut truncated = 0;
    let out = messages
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            if i < skip || !msg.has_tool_result() {
                return msg.clone();
            }
            let blocks = msg
                .blocks()
                .iter()
                .map(|block| match block {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content: Some(content),
                        is_error,
                        extra,
                    } if payload_len(content) > TRUNCATED_PLACEHOLDER.len()
                        && !tool_names
                            .get(tool_use_id.as_str())
                            .is_some_and(|name| config.protected_tools.contains(*name)) =>
                    {
                        truncated += 1;
                        ContentBlock::ToolResult {
                            tool_use_id: tool_use_id.clone(),
                            content: Some(Content::Text(TRUNCATED_PLACEHOLDER.to_string())),
                            is_error: *is_error,
                            extra: extra.clone(),
                        }
                    }
                    other => other.clone(),
                })
                .collect();
            Message::with_blocks(msg.role.clone(), blocks)
        })
        .collect();

    (out, truncated)
}

/// Approximate serialized size of a tool result payload.
fn payload_len(content: &Content) -> usize {
    match content {
        Content::Text(text) => text.len(),
        Content::Blocks(_) => serde_json::to_string(content).map_or(0, |s| s.len()),
    }
}
