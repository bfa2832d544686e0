//! `tool_use` / `tool_result` pairing checks and repair.
//!
//! A message carrying `tool_use` blocks is well paired when the very next
//! message carries `tool_result` blocks answering every one of its ids.

use crate::Message;
use std::collections::HashSet;
use tracing::trace;

/// Whether `messages[index]` has its tool calls answered by the next message.
///
/// Messages without `tool_use` blocks are trivially paired.
fn is_answered(messages: &[Message], index: usize) -> bool {
    let ids = messages[index].tool_use_ids();
    if ids.is_empty() {
        return true;
    }
    let Some(next) = messages.get(index + 1) else {
        return false;
    };
    let answered: HashSet<&str> = next.tool_result_ids().into_iter().collect();
    ids.iter().all(|id| answered.contains(id))
}

/// Indices of messages whose `tool_use` ids are not all answered by the
/// immediately following message.
pub fn pairing_violations(messages: &[Message]) -> Vec<usize> {
    (0..messages.len())
        .filter(|&i| !is_answered(messages, i))
        .collect()
}

/// True when no message has an unanswered `tool_use`.
pub fn is_well_paired(messages: &[Message]) -> bool {
    (0..messages.len()).all(|i| is_answered(messages, i))
}

/// Drop every unanswered `tool_use` message, together with the next message
/// when that one carries `tool_result` blocks.
///
/// The first `protected` messages are never dropped. Returns the repaired
/// sequence and the number of `tool_use` messages dropped.
pub fn repair_pairs(messages: &[Message], protected: usize) -> (Vec<Message>, usize) {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    let mut dropped = 0;
    let mut i = 0;

    while i < messages.len() {
        if i >= protected && !is_answered(messages, i) {
            dropped += 1;
            let partner = messages.get(i + 1).is_some_and(Message::has_tool_result);
            trace!(index = i, partner, "dropping unanswered tool_use");
            i += if partner { 2 } else { 1 };
            continue;
        }
        out.push(messages[i].clone());
        i += 1;
    }

    // Dropping a tool_result-bearing message can strand an earlier
    // tool_use whose result lived there only partially; repeat until stable.
    if dropped > 0 && !is_well_paired(&out[protected.min(out.len())..]) {
        let (again, more) = repair_pairs(&out, protected);
        return (again, dropped + more);
    }

    (out, dropped)
}
