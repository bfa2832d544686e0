//! Tokenizer-free token estimation.
//!
//! Every estimate is a pure function of its input and the
//! [`EstimatorConfig`] in use: no hidden state, no randomness. Text size is
//! measured in UTF-8 bytes and rounded up, which over-counts non-ASCII text
//! rather than under-counting it.

use crate::{Content, ContentBlock, Message, ToolSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default characters per token (conservative estimate for English text).
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Fixed framing cost of one message (role markers, separators).
pub const DEFAULT_MESSAGE_OVERHEAD: usize = 4;

/// Fixed cost of one tool definition beyond its text.
pub const DEFAULT_TOOL_OVERHEAD: usize = 16;

/// Minimum cost of a non-text content block.
pub const DEFAULT_BLOCK_OVERHEAD: usize = 8;

/// Tuning constants for [`TokenEstimator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Characters per token divisor.
    pub chars_per_token: f64,
    /// Tokens added per message.
    pub message_overhead: usize,
    /// Tokens added per tool schema.
    pub tool_overhead: usize,
    /// Tokens added per non-text block before its serialized size.
    pub block_overhead: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            message_overhead: DEFAULT_MESSAGE_OVERHEAD,
            tool_overhead: DEFAULT_TOOL_OVERHEAD,
            block_overhead: DEFAULT_BLOCK_OVERHEAD,
        }
    }
}

impl EstimatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the characters-per-token divisor, e.g. from observed API usage.
    /// Non-positive ratios fall back to the default.
    pub fn with_chars_per_token(mut self, ratio: f64) -> Self {
        self.chars_per_token = if ratio > 0.0 {
            ratio
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        self
    }

    pub fn with_message_overhead(mut self, tokens: usize) -> Self {
        self.message_overhead = tokens;
        self
    }

    pub fn with_tool_overhead(mut self, tokens: usize) -> Self {
        self.tool_overhead = tokens;
        self
    }

    pub fn with_block_overhead(mut self, tokens: usize) -> Self {
        self.block_overhead = tokens;
        self
    }
}

/// Approximates token cost of text, messages, conversations and tools.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenEstimator {
    config: EstimatorConfig,
}

impl TokenEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimated tokens for a string. Never less than 1, even for `""`.
    pub fn tokens(&self, text: &str) -> usize {
        self.tokens_for_len(text.len())
    }

    fn tokens_for_len(&self, len: usize) -> usize {
        let cpt = if self.config.chars_per_token > 0.0 {
            self.config.chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        ((len as f64 / cpt).ceil() as usize).max(1)
    }

    /// Estimated tokens for one message: framing overhead plus content.
    pub fn message_tokens(&self, message: &Message) -> usize {
        self.config.message_overhead + self.content_tokens(&message.content)
    }

    fn content_tokens(&self, content: &Content) -> usize {
        match content {
            Content::Text(text) => self.tokens(text),
            Content::Blocks(blocks) => blocks.iter().map(|b| self.block_tokens(b)).sum(),
        }
    }

    /// Estimated tokens for one content block. Unmodelled fields kept in a
    /// block's `extra` map count toward its size.
    pub fn block_tokens(&self, block: &ContentBlock) -> usize {
        match block {
            ContentBlock::Text { text, extra } => {
                self.tokens_for_len(text.len() + extra_len(extra))
            }
            ContentBlock::ToolUse {
                id,
                name,
                input,
                extra,
            } => {
                let size = id.len() + name.len() + input.to_string().len() + extra_len(extra);
                self.config.block_overhead + self.tokens_for_len(size)
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                extra,
                ..
            } => {
                let payload = match content {
                    None => 0,
                    Some(Content::Text(text)) => text.len(),
                    Some(blocks) => serde_json::to_string(blocks).map_or(0, |s| s.len()),
                };
                let size = tool_use_id.len() + payload + extra_len(extra);
                self.config.block_overhead + self.tokens_for_len(size)
            }
            ContentBlock::Other(raw) => {
                self.config.block_overhead + self.tokens_for_len(raw.to_string().len())
            }
        }
    }

    /// Sum of [`message_tokens`](Self::message_tokens); 0 for no messages.
    pub fn conversation_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.message_tokens(m)).sum()
    }

    /// Estimated tokens for a tool definition.
    pub fn tool_tokens(&self, tool: &ToolSchema) -> usize {
        self.config.tool_overhead
            + self.tokens(&tool.name)
            + self.tokens(&tool.description)
            + self.tokens(&tool.input_schema.to_string())
    }

    /// Messages plus tool schemas, as sent in one request.
    pub fn total(&self, messages: &[Message], tools: &[ToolSchema]) -> usize {
        self.conversation_tokens(messages) + tools.iter().map(|t| self.tool_tokens(t)).sum::<usize>()
    }
}

fn extra_len(extra: &Map<String, Value>) -> usize {
    if extra.is_empty() {
        0
    } else {
        serde_json::to_string(extra).map_or(0, |s| s.len())
    }
}

/// [`TokenEstimator::tokens`] with default constants.
pub fn estimate_tokens(text: &str) -> usize {
    TokenEstimator::default().tokens(text)
}

/// [`TokenEstimator::message_tokens`] with default constants.
pub fn estimate_message_tokens(message: &Message) -> usize {
    TokenEstimator::default().message_tokens(message)
}

/// [`TokenEstimator::conversation_tokens`] with default constants.
pub fn estimate_conversation_tokens(messages: &[Message]) -> usize {
    TokenEstimator::default().conversation_tokens(messages)
}

/// [`TokenEstimator::tool_tokens`] with default constants.
pub fn estimate_tool_tokens(tool: &ToolSchema) -> usize {
    TokenEstimator::default().tool_tokens(tool)
}

/// [`TokenEstimator::total`] with default constants.
pub fn estimate_total(messages: &[Message], tools: &[ToolSchema]) -> usize {
    TokenEstimator::default().total(messages, tools)
}
