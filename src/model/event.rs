use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a scheduled event (election, siege, petition, …).
///
/// Transitions follow a fixed DAG and only ever move forward:
///
/// ```text
/// Pending -> Open -> Closed -> Completed
///                           -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Open,
    Closed,
    Completed,
    Failed,
}

impl EventStatus {
    /// Whether a single transition from `self` to `to` is legal.
    pub fn can_advance_to(self, to: EventStatus) -> bool {
        matches!(
            (self, to),
            (EventStatus::Pending, EventStatus::Open)
                | (EventStatus::Open, EventStatus::Closed)
                | (EventStatus::Closed, EventStatus::Completed)
                | (EventStatus::Closed, EventStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Open => "open",
            EventStatus::Closed => "closed",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a disease outbreak. Forward-only; steps may be skipped
/// (an outbreak that never catches can go straight from emerging to ended).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutbreakStatus {
    Emerging,
    Active,
    Declining,
    Ended,
}

impl OutbreakStatus {
    /// Forward-only: any strictly later phase is reachable.
    pub fn can_advance_to(self, to: OutbreakStatus) -> bool {
        to > self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutbreakStatus::Emerging => "emerging",
            OutbreakStatus::Active => "active",
            OutbreakStatus::Declining => "declining",
            OutbreakStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for OutbreakStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
