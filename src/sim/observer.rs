use serde::{Deserialize, Serialize};

use crate::model::{TickId, WorldDate};

/// Why a handler was passed over in a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A committed record for this (tick, handler) already exists.
    AlreadyCommitted,
    /// The handler was escalated and acknowledged by an operator.
    Escalated,
}

/// Notifications emitted as the scheduler works through a tick. The web
/// layer subscribes to these for player-facing notices; tests use the
/// buffering implementation below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    TickStarted { tick: TickId },
    TickCompleted { tick: TickId },
    ClockAdvanced { tick: TickId, date: WorldDate },
    HandlerCommitted { tick: TickId, handler: String, mutations: usize },
    HandlerSkipped { tick: TickId, handler: String, reason: SkipReason },
    HandlerFailed { tick: TickId, handler: String, error: String },
    HandlerEscalated { handler: String, consecutive_failures: u32 },
}

pub trait Observer {
    fn on_event(&mut self, event: &SimEvent);
}

/// Collects every event it sees. Test helper, also handy for debugging runs.
#[derive(Debug, Default)]
pub struct BufferingObserver {
    pub events: Vec<SimEvent>,
}

impl BufferingObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Observer for BufferingObserver {
    fn on_event(&mut self, event: &SimEvent) {
        self.events.push(event.clone());
    }
}
