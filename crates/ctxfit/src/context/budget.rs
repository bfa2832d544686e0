//! Context usage snapshots and usage levels.
//!
//! A [`ContextUsage`] records how much of the token ceiling a request would
//! consume. Usage above 1.0 is reported as-is: it is a signal, not an error.

use serde::Serialize;

/// Usage fraction at which a warning is reported.
pub const WARNING_THRESHOLD: f64 = 0.60;

/// How close a request is to the token ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageLevel {
    Normal,
    Warning,
    /// At or above the compaction threshold.
    Critical,
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextUsage {
    /// Estimated tokens consumed.
    pub estimated_tokens: usize,
    /// Token ceiling.
    pub max_tokens: usize,
    /// Usage as a fraction (0.0 to 1.0+).
    pub usage_pct: f64,
}

impl ContextUsage {
    pub fn new(estimated_tokens: usize, max_tokens: usize) -> Self {
        let usage_pct = if max_tokens > 0 {
            estimated_tokens as f64 / max_tokens as f64
        } else if estimated_tokens == 0 {
            0.0
        } else {
            f64::INFINITY
        };
        Self {
            estimated_tokens,
            max_tokens,
            usage_pct,
        }
    }

    /// True iff the estimate is within the ceiling.
    pub fn fits(&self) -> bool {
        self.estimated_tokens <= self.max_tokens
    }

    /// Classify usage against the warning threshold and `compact_threshold`.
    pub fn level(&self, compact_threshold: f64) -> UsageLevel {
        if self.usage_pct >= compact_threshold {
            UsageLevel::Critical
        } else if self.usage_pct >= WARNING_THRESHOLD {
            UsageLevel::Warning
        } else {
            UsageLevel::Normal
        }
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {})",
            self.estimated_tokens,
            self.usage_pct * 100.0,
            self.max_tokens,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_usage_is_normal() {
        let usage = ContextUsage::new(100, 1000);
        assert_eq!(usage.level(0.8), UsageLevel::Normal);
    }

    #[test]
    fn warning_threshold_triggers() {
        let usage = ContextUsage::new(650, 1000);
        assert_eq!(usage.level(0.8), UsageLevel::Warning);
        assert_eq!(usage.level(0.7), UsageLevel::Warning);
    }

    #[test]
    fn critical_at_compact_threshold() {
        let usage = ContextUsage::new(800, 1000);
        assert_eq!(usage.level(0.8), UsageLevel::Critical);
        assert!(usage.fits());
    }

    #[test]
    fn low_compact_threshold_skips_warning() {
        let usage = ContextUsage::new(550, 1000);
        assert_eq!(usage.level(0.5), UsageLevel::Critical);
    }

    #[test]
    fn over_budget_is_not_clamped() {
        let usage = ContextUsage::new(1500, 1000);
        assert!((usage.usage_pct - 1.5).abs() < f64::EPSILON);
        assert!(!usage.fits());
    }

    #[test]
    fn zero_ceiling() {
        assert!(ContextUsage::new(0, 0).fits());
        assert_eq!(ContextUsage::new(0, 0).usage_pct, 0.0);
        assert!(ContextUsage::new(1, 0).usage_pct.is_infinite());
    }

    #[test]
    fn usage_log_string_format() {
        let log = ContextUsage::new(250, 1000).to_log_string();
        assert_eq!(log, "context: ~250 tokens (25% of 1000)");
    }
}
