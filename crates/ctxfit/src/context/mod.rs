//! Context window management: estimation, stateless edits, and compaction.
//!
//! The context window is the scarcest resource in any LLM agent. This module
//! is layered leaves-first:
//!
//! 1. **[`estimator`]**: [`TokenEstimator`] approximates token cost from text
//!    length with tunable constants. No tokenizer, no I/O.
//!
//! 2. **[`editor`]**: pure transformations over a message sequence plus the
//!    read-only [`ContextStats`] report.
//!
//! 3. **[`eviction`]** and **[`pairing`]**: tool result truncation and
//!    `tool_use` / `tool_result` pairing repair, the building blocks of
//!    compaction.
//!
//! 4. **[`manager`]**: [`ContextManager`] holds the budget and runs
//!    compaction. [`budget`] reports usage levels against it.

pub mod budget;
pub mod editor;
pub mod estimator;
pub mod eviction;
pub mod manager;
pub mod pairing;

// Re-export commonly used items at the module level.
pub use budget::{ContextUsage, UsageLevel};
pub use editor::{
    ContextStats, clear_tool_results, extract_text_only, get_stats, keep_recent, remove_by_role,
    summarize_early,
};
pub use estimator::{
    DEFAULT_CHARS_PER_TOKEN, EstimatorConfig, TokenEstimator, estimate_conversation_tokens,
    estimate_message_tokens, estimate_tokens, estimate_tool_tokens, estimate_total,
};
pub use eviction::{EvictionConfig, TRUNCATED_PLACEHOLDER};
pub use manager::{Compaction, CompactionReport, ContextManager, ContextManagerConfig};
pub use pairing::{is_well_paired, pairing_violations, repair_pairs};
