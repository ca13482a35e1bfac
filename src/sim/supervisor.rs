use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tracks handler health across `advance_clock` calls.
///
/// A handler that fails `max_consecutive` times in a row is escalated: the
/// clock stays wedged on it until an operator acknowledges, after which
/// future ticks run without it (each skip is logged and observable, never
/// silent).
#[derive(Debug)]
pub struct Supervisor {
    max_consecutive: u32,
    health: BTreeMap<String, HandlerHealth>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerHealth {
    pub consecutive_failures: u32,
    pub escalated: bool,
    pub acknowledged: bool,
}

impl Supervisor {
    pub fn new(max_consecutive: u32) -> Self {
        Self {
            max_consecutive: max_consecutive.max(1),
            health: BTreeMap::new(),
        }
    }

    /// Record a failure. Returns true if this failure tipped the handler
    /// into the escalated state.
    pub fn record_failure(&mut self, handler: &str) -> bool {
        let entry = self.health.entry(handler.to_string()).or_default();
        entry.consecutive_failures += 1;
        if !entry.escalated && entry.consecutive_failures >= self.max_consecutive {
            entry.escalated = true;
            return true;
        }
        false
    }

    pub fn record_success(&mut self, handler: &str) {
        if let Some(entry) = self.health.get_mut(handler) {
            entry.consecutive_failures = 0;
        }
    }

    pub fn consecutive_failures(&self, handler: &str) -> u32 {
        self.health
            .get(handler)
            .map(|h| h.consecutive_failures)
            .unwrap_or(0)
    }

    pub fn is_escalated(&self, handler: &str) -> bool {
        self.health.get(handler).is_some_and(|h| h.escalated)
    }

    /// Operator acknowledgment: future ticks proceed without this handler.
    /// Returns false if the handler was not escalated.
    pub fn acknowledge(&mut self, handler: &str) -> bool {
        match self.health.get_mut(handler) {
            Some(entry) if entry.escalated => {
                entry.acknowledged = true;
                true
            }
            _ => false,
        }
    }

    /// Whether the registry should skip this handler outright.
    pub fn skip(&self, handler: &str) -> bool {
        self.health
            .get(handler)
            .is_some_and(|h| h.escalated && h.acknowledged)
    }

    /// Health of every tracked handler, for persisting alongside the
    /// checkpoint so consecutive failures accumulate across process runs.
    pub fn snapshot(&self) -> BTreeMap<String, HandlerHealth> {
        self.health.clone()
    }

    pub fn restore(&mut self, health: BTreeMap<String, HandlerHealth>) {
        self.health = health;
    }
}
