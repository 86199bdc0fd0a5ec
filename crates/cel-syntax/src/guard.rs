//! Per-rule recursion accounting for the grammar front end.

use std::collections::HashMap;

use tracing::warn;

use crate::cst::RuleKind;

/// Tracks how deeply each grammar rule is currently nested.
///
/// Exceeding the limit is reported once per parse; afterwards rules are
/// still rejected but no further message is produced.
#[derive(Debug)]
pub struct RecursionGuard {
    max_depth: i32,
    depths: HashMap<RuleKind, i32>,
    notified: bool,
}

impl RecursionGuard {
    /// A negative `max_depth` disables the limit.
    pub fn new(max_depth: i32) -> Self {
        Self {
            max_depth,
            depths: HashMap::new(),
            notified: false,
        }
    }

    /// Enter a rule. Returns `false` when the rule is nested deeper than the
    /// limit. Every `enter` must be paired with an [`exit`](Self::exit),
    /// whether or not it was admitted.
    pub fn enter(&mut self, rule: RuleKind) -> bool {
        let depth = self.depths.entry(rule).or_insert(0);
        *depth += 1;
        self.max_depth < 0 || *depth <= self.max_depth
    }

    pub fn exit(&mut self, rule: RuleKind) {
        if let Some(depth) = self.depths.get_mut(&rule) {
            *depth -= 1;
        }
    }

    pub fn depth(&self, rule: RuleKind) -> i32 {
        self.depths.get(&rule).copied().unwrap_or(0)
    }

    /// The limit message, the first time it is asked for.
    pub fn notify(&mut self) -> Option<String> {
        if self.notified {
            return None;
        }
        self.notified = true;
        warn!(limit = self.max_depth, "expression recursion limit exceeded");
        Some(format!(
            "expression recursion limit exceeded: {}",
            self.max_depth
        ))
    }
}
