//! Convenience re-exports for common `ctxfit` types.
//!
//! Meant to be glob-imported by agent code:
//!
//! ```ignore
//! use ctxfit::prelude::*;
//! ```
//!
//! Pulls in the message model and the context manager. The individual
//! editor functions and pairing helpers stay in [`crate::context`]; import
//! them from there when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Content, ContentBlock, Message, MessageRole, ToolSchema, json_schema_for};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{
    Compaction, CompactionReport, ContextManager, ContextManagerConfig, ContextStats,
    ContextUsage, EstimatorConfig, EvictionConfig, TokenEstimator, UsageLevel,
};
