//! Token-budget context management for LLM conversations.
//!
//! `ctxfit` keeps a growing list of dialogue turns inside a fixed token
//! budget before each call to a language model. It never talks to the model
//! itself: an agent asks the [`ContextManager`](context::ContextManager)
//! whether a sequence fits, and if not, asks for a compacted sequence and
//! sends that instead.
//!
//! # Getting started
//!
//! ```
//! use ctxfit::prelude::*;
//!
//! let manager = ContextManager::new(ContextManagerConfig::default().with_max_tokens(50));
//!
//! let messages = vec![
//!     Message::system("You are a helpful assistant."),
//!     Message::user("My task"),
//!     Message::assistant("Response 1 ".repeat(50)),
//!     Message::user("Message 2 ".repeat(50)),
//!     Message::assistant("Short response"),
//!     Message::user("Message 3"),
//! ];
//!
//! assert!(!manager.fits_in_context(&messages, &[]));
//! let compacted = manager.compact_messages(&messages, &[]);
//! assert!(manager.fits_in_context(&compacted, &[]));
//! assert_eq!(compacted[1], Message::user("My task"));
//! ```
//!
//! # Where to find things
//!
//! - **Sizing:** [`context::estimator`] approximates token cost of text,
//!   messages, whole conversations and tool schemas without a tokenizer.
//! - **Stateless edits:** [`context::editor`] holds pure transformations
//!   (drop tool results, filter roles, keep a recency window, replace early
//!   history with a marker, flatten to text) and [`ContextStats`](context::ContextStats).
//! - **Policy:** [`ContextManager`](context::ContextManager) owns the budget
//!   and runs compaction: tool-result truncation first, then oldest-first
//!   turn removal that never splits a `tool_use` / `tool_result` pair.
//!
//! # Invariants
//!
//! Every operation returns a new sequence; the caller's slice is never
//! mutated. Compaction always keeps the leading system message(s) and the
//! first user message, preserves order, and never leaves a `tool_use`
//! without its result in the next message.

pub mod context;
pub mod prelude;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`.
///
/// # Example
///
/// ```
/// use ctxfit::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct GrepArgs {
///     pattern: String,
///     #[serde(default)]
///     path: Option<String>,
/// }
///
/// let schema = json_schema_for::<GrepArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"pattern".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
///
/// Roles outside the three well-known ones are kept as [`MessageRole::Other`]
/// and passed through untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Other(String),
}

impl MessageRole {
    pub fn as_str(&self) -> &str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Other(role) => role,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for MessageRole {
    fn from(role: String) -> Self {
        match role.as_str() {
            "system" => MessageRole::System,
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::Other(role),
        }
    }
}

impl From<&str> for MessageRole {
    fn from(role: &str) -> Self {
        MessageRole::from(role.to_string())
    }
}

impl From<MessageRole> for String {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

/// Message content: either one opaque string or an ordered list of blocks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Blocks of block-structured content; empty for plain text.
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Content::Text(_) => &[],
            Content::Blocks(blocks) => blocks,
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

/// A typed fragment of a message's content.
///
/// Blocks with an unknown `type`, or a known `type` with missing or mistyped
/// fields, are kept as [`ContentBlock::Other`] and serialize back verbatim.
/// Fields a known block does not model (`cache_control`, `citations`, ...)
/// are kept in its `extra` map and written back alongside the known ones.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
        extra: Map<String, Value>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        extra: Map<String, Value>,
    },
    ToolResult {
        tool_use_id: String,
        content: Option<Content>,
        is_error: Option<bool>,
        extra: Map<String, Value>,
    },
    Other(Value),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: text.into(),
            extra: Map::new(),
        }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
            extra: Map::new(),
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: Some(Content::Text(content.into())),
            is_error: None,
            extra: Map::new(),
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, ContentBlock::ToolResult { .. })
    }
}

/// Well-formed blocks as they appear on the wire.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownBlock {
    Text {
        text: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<Content>,
        #[serde(default)]
        is_error: Option<bool>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock<'a> {
    Text {
        text: &'a str,
        #[serde(flatten)]
        extra: &'a Map<String, Value>,
    },
    ToolUse {
        id: &'a str,
        name: &'a str,
        input: &'a Value,
        #[serde(flatten)]
        extra: &'a Map<String, Value>,
    },
    ToolResult {
        tool_use_id: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<&'a Content>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        #[serde(flatten)]
        extra: &'a Map<String, Value>,
    },
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let block = match KnownBlock::deserialize(&raw) {
            Ok(KnownBlock::Text { text, extra }) => ContentBlock::Text { text, extra },
            Ok(KnownBlock::ToolUse {
                id,
                name,
                input,
                extra,
            }) => ContentBlock::ToolUse {
                id,
                name,
                input,
                extra,
            },
            Ok(KnownBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
                extra,
            }) => ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
                extra,
            },
            Err(_) => ContentBlock::Other(raw),
        };
        Ok(block)
    }
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            ContentBlock::Text { text, extra } => WireBlock::Text { text, extra },
            ContentBlock::ToolUse {
                id,
                name,
                input,
                extra,
            } => WireBlock::ToolUse {
                id,
                name,
                input,
                extra,
            },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
                extra,
            } => WireBlock::ToolResult {
                tool_use_id,
                content: content.as_ref(),
                is_error: *is_error,
                extra,
            },
            ContentBlock::Other(raw) => return raw.serialize(serializer),
        };
        wire.serialize(serializer)
    }
}

/// One turn in a conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: Content,
}

impl Message {
    pub fn new(role: impl Into<MessageRole>, content: impl Into<Content>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, Content::Text(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, Content::Text(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, Content::Text(content.into()))
    }

    pub fn with_blocks(role: impl Into<MessageRole>, blocks: Vec<ContentBlock>) -> Self {
        Self::new(role, Content::Blocks(blocks))
    }

    /// Content blocks of this message; empty for plain-text content.
    pub fn blocks(&self) -> &[ContentBlock] {
        self.content.blocks()
    }

    /// Ids of the `tool_use` blocks in this message, in order.
    pub fn tool_use_ids(&self) -> Vec<&str> {
        self.blocks()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Ids answered by the `tool_result` blocks in this message, in order.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.blocks()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_use(&self) -> bool {
        self.blocks()
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    pub fn has_tool_result(&self) -> bool {
        self.blocks().iter().any(ContentBlock::is_tool_result)
    }

    /// Plain text of the message: the string itself, or the `text` blocks
    /// joined with newlines.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// A tool definition as sent to the model. Only used for sizing here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Build a tool schema whose input schema is derived from `T`.
    pub fn for_type<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, json_schema_for::<T>())
    }
}
