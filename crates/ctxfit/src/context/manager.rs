//! Budget policy and compaction.
//!
//! The [`ContextManager`] holds configuration only, never conversation
//! state, so one instance can be reused across conversations. Before each
//! model call an agent checks [`fits_in_context`](ContextManager::fits_in_context)
//! and, if the request is too large, sends
//! [`compact_messages`](ContextManager::compact_messages) instead.
//!
//! # Compaction
//!
//! 1. The leading system message(s) and the first user message form the
//!    privileged prefix. They are always kept verbatim, even when they alone
//!    exceed the budget. Messages sitting between them are dropped. A user
//!    message carrying `tool_result` blocks answers an earlier call and does
//!    not count as the first user message.
//! 2. With `clear_tool_results` on, tool result payloads after the prefix are
//!    replaced with [`TRUNCATED_PLACEHOLDER`](super::eviction::TRUNCATED_PLACEHOLDER).
//!    If that fits, removal is skipped.
//! 3. Otherwise the oldest non-prefix message is dropped, one turn at a time,
//!    until the sequence fits or only the prefix is left. A `tool_use`
//!    message and its `tool_result` partner are dropped together.
//! 4. A repair pass drops any remaining unanswered `tool_use` pair, and the
//!    message after the system run is forced to be a user message.
//!
//! Order is never changed and compaction never fails.

use super::budget::{ContextUsage, UsageLevel};
use super::editor::{ContextStats, leading_system_len};
use super::estimator::{EstimatorConfig, TokenEstimator};
use super::eviction::{EvictionConfig, truncate_tool_results};
use super::pairing::repair_pairs;
use crate::{Message, MessageRole, ToolSchema};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

/// Default token ceiling for messages plus tool schemas.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 100_000;

/// Default fraction of the ceiling at which proactive compaction is advised.
pub const DEFAULT_COMPACT_THRESHOLD: f64 = 0.80;

/// Configuration owned by one [`ContextManager`].
///
/// # Example
///
/// ```
/// use ctxfit::context::{ContextManagerConfig, EvictionConfig};
///
/// let config = ContextManagerConfig::default()
///     .with_max_tokens(32_000)
///     .with_compact_threshold(0.7)
///     .with_eviction(EvictionConfig::new().protect_tool("save_draft"));
/// assert_eq!(config.max_context_tokens, 32_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextManagerConfig {
    /// Hard ceiling checked by `fits_in_context`.
    pub max_context_tokens: usize,
    /// Advisory fraction of the ceiling; see `should_compact`.
    pub compact_threshold: f64,
    /// Whether `prepare` compacts automatically.
    pub auto_compact: bool,
    /// Whether compaction truncates tool result payloads before dropping turns.
    pub clear_tool_results: bool,
    pub estimator: EstimatorConfig,
    pub eviction: EvictionConfig,
}

impl Default for ContextManagerConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            auto_compact: true,
            clear_tool_results: true,
            estimator: EstimatorConfig::default(),
            eviction: EvictionConfig::default(),
        }
    }
}

impl ContextManagerConfig {
    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    /// Set the advisory compaction threshold. Values outside `(0, 1]`
    /// fall back to the default.
    pub fn with_compact_threshold(mut self, fraction: f64) -> Self {
        self.compact_threshold = if fraction > 0.0 && fraction <= 1.0 {
            fraction
        } else {
            DEFAULT_COMPACT_THRESHOLD
        };
        self
    }

    pub fn with_auto_compact(mut self, enabled: bool) -> Self {
        self.auto_compact = enabled;
        self
    }

    pub fn with_clear_tool_results(mut self, enabled: bool) -> Self {
        self.clear_tool_results = enabled;
        self
    }

    pub fn with_estimator(mut self, estimator: EstimatorConfig) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_eviction(mut self, eviction: EvictionConfig) -> Self {
        self.eviction = eviction;
        self
    }
}

/// What a compaction did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// Estimated tokens of the input (messages + tools).
    pub tokens_before: usize,
    /// Estimated tokens of the output (messages + tools).
    pub tokens_after: usize,
    /// Tool result blocks whose payload was replaced.
    pub truncated_results: usize,
    /// Messages removed in total.
    pub dropped_messages: usize,
    /// Unanswered `tool_use` messages removed by the repair pass.
    pub repaired_pairs: usize,
    /// Estimated tokens of the tool schemas, which compaction cannot shrink.
    pub tool_tokens: usize,
    /// Whether the output fits the budget.
    pub fits: bool,
}

impl CompactionReport {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "compaction: ~{} -> ~{} tokens, {} result(s) truncated, {} message(s) dropped, {} pair(s) repaired{}",
            self.tokens_before,
            self.tokens_after,
            self.truncated_results,
            self.dropped_messages,
            self.repaired_pairs,
            if self.fits {
                String::new()
            } else {
                format!(" (still over budget, ~{} from tool schemas)", self.tool_tokens)
            },
        )
    }
}

/// Output of [`ContextManager::compact_with_report`].
#[derive(Debug, Clone)]
pub struct Compaction {
    pub messages: Vec<Message>,
    pub report: CompactionReport,
}

/// Keeps message sequences within a token budget.
#[derive(Debug, Clone, Default)]
pub struct ContextManager {
    config: ContextManagerConfig,
    estimator: TokenEstimator,
}

impl ContextManager {
    pub fn new(config: ContextManagerConfig) -> Self {
        let estimator = TokenEstimator::new(config.estimator.clone());
        Self { config, estimator }
    }

    pub fn config(&self) -> &ContextManagerConfig {
        &self.config
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn max_context_tokens(&self) -> usize {
        self.config.max_context_tokens
    }

    pub fn set_max_context_tokens(&mut self, tokens: usize) {
        self.config.max_context_tokens = tokens;
    }

    pub fn compact_threshold(&self) -> f64 {
        self.config.compact_threshold
    }

    /// Estimated tokens for messages plus tool schemas.
    pub fn estimate(&self, messages: &[Message], tools: &[ToolSchema]) -> usize {
        self.estimator.total(messages, tools)
    }

    /// True iff the estimate is within `max_context_tokens`.
    pub fn fits_in_context(&self, messages: &[Message], tools: &[ToolSchema]) -> bool {
        self.estimate(messages, tools) <= self.config.max_context_tokens
    }

    /// Estimate divided by the ceiling. Exceeds 1.0 when over budget.
    pub fn usage_percentage(&self, messages: &[Message], tools: &[ToolSchema]) -> f64 {
        self.usage(messages, tools).usage_pct
    }

    pub fn usage(&self, messages: &[Message], tools: &[ToolSchema]) -> ContextUsage {
        ContextUsage::new(self.estimate(messages, tools), self.config.max_context_tokens)
    }

    /// Advisory: usage has reached the compaction threshold.
    pub fn should_compact(&self, messages: &[Message], tools: &[ToolSchema]) -> bool {
        self.usage(messages, tools).level(self.config.compact_threshold) == UsageLevel::Critical
    }

    pub fn stats(&self, messages: &[Message]) -> ContextStats {
        ContextStats::collect(messages, &self.estimator)
    }

    /// Compact when `auto_compact` is on and the request does not fit;
    /// otherwise return the messages unchanged.
    pub fn prepare(&self, messages: &[Message], tools: &[ToolSchema]) -> Vec<Message> {
        if self.config.auto_compact && !self.fits_in_context(messages, tools) {
            self.compact_messages(messages, tools)
        } else {
            messages.to_vec()
        }
    }

    /// Shrink `messages` to fit the budget. Returns them unchanged if they
    /// already fit.
    pub fn compact_messages(&self, messages: &[Message], tools: &[ToolSchema]) -> Vec<Message> {
        self.compact_with_report(messages, tools).messages
    }

    /// [`compact_messages`](Self::compact_messages) plus a report of what was done.
    pub fn compact_with_report(&self, messages: &[Message], tools: &[ToolSchema]) -> Compaction {
        let budget = self.config.max_context_tokens;
        let tokens_before = self.estimate(messages, tools);
        let tool_tokens: usize = tools.iter().map(|t| self.estimator.tool_tokens(t)).sum();
        if tokens_before <= budget {
            return Compaction {
                messages: messages.to_vec(),
                report: CompactionReport {
                    tokens_before,
                    tokens_after: tokens_before,
                    tool_tokens,
                    fits: true,
                    ..Default::default()
                },
            };
        }
        debug!(
            "Compacting {} messages: ~{} tokens over a budget of {}",
            messages.len(),
            tokens_before,
            budget
        );

        // ── Privileged prefix ──
        let systems = leading_system_len(messages);
        let first_user = messages[systems..]
            .iter()
            .position(is_first_user_candidate)
            .map(|p| p + systems);

        let mut working: Vec<Message> = messages[..systems].to_vec();
        let rest_start = match first_user {
            Some(idx) => {
                if idx > systems {
                    debug!("Dropping {} message(s) before the first user message", idx - systems);
                }
                working.push(messages[idx].clone());
                idx + 1
            }
            None => systems,
        };
        let protected = working.len();
        working.extend_from_slice(&messages[rest_start..]);

        // ── Tool result truncation ──
        let mut truncated_results = 0;
        if self.config.clear_tool_results {
            let (evicted, count) = truncate_tool_results(&working, protected, &self.config.eviction);
            working = evicted;
            truncated_results = count;
            if count > 0 {
                debug!(
                    "Truncated {} tool result(s): ~{} tokens",
                    count,
                    self.estimate(&working, tools)
                );
            }
        }

        // ── Oldest-first turn removal ──
        let mut total = self.estimate(&working, tools);
        let mut cut = protected;
        while total > budget && cut < working.len() {
            let unit = if working[cut].has_tool_use()
                && working.get(cut + 1).is_some_and(Message::has_tool_result)
            {
                2
            } else {
                1
            };
            let freed: usize = working[cut..cut + unit]
                .iter()
                .map(|m| self.estimator.message_tokens(m))
                .sum();
            trace!(index = cut, unit, freed, "dropping turn");
            total -= freed;
            cut += unit;
        }
        working.drain(protected..cut);

        // ── Structural repair ──
        let (repaired, repaired_pairs) = repair_pairs(&working, protected);
        let mut working = repaired;
        if first_user.is_none() && working.len() > protected {
            // Nothing after the system run can open the conversation.
            debug!("Dropping {} message(s) with no user turn", working.len() - protected);
            working.truncate(protected);
        }

        let tokens_after = self.estimate(&working, tools);
        let report = CompactionReport {
            tokens_before,
            tokens_after,
            truncated_results,
            dropped_messages: messages.len() - working.len(),
            repaired_pairs,
            tool_tokens,
            fits: tokens_after <= budget,
        };
        if report.fits {
            info!("{}", report.to_log_string());
        } else {
            warn!(
                "Context still over budget after compaction: ~{} tokens / {} max \
                 (~{} from kept messages, ~{} from tool schemas)",
                tokens_after,
                budget,
                tokens_after - tool_tokens,
                tool_tokens
            );
        }

        Compaction {
            messages: working,
            report,
        }
    }
}

/// A user message that opens the conversation rather than answering an
/// earlier `tool_use`.
fn is_first_user_candidate(message: &Message) -> bool {
    message.role == MessageRole::User && !message.has_tool_result()
}
