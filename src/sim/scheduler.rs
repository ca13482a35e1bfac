use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::config::SimConfig;
use crate::error::ClockError;
use crate::model::{TickId, WorldState};

use super::commit::Journal;
use super::observer::{Observer, SimEvent};
use super::registry::{FailureReport, JobRegistry};
use super::supervisor::{HandlerHealth, Supervisor};

/// What one `advance_clock` call got done.
#[derive(Debug, Serialize)]
pub struct AdvanceOutcome {
    pub ticks_processed: u32,
    pub current_tick_id: TickId,
    pub failures: Vec<FailureReport>,
    pub deadline_hit: bool,
}

/// Owns the world clock: computes how many ticks are due, runs each through
/// the registry, and advances the watermark only after a tick fully commits.
///
/// Safe to call from overlapping timers: each call re-reads the clock and a
/// version check rejects a clock someone else moved underneath us.
pub struct Scheduler {
    registry: JobRegistry,
    config: SimConfig,
    supervisor: Supervisor,
    observers: Vec<Box<dyn Observer>>,
    journal: Box<dyn Journal>,
}

impl Scheduler {
    pub fn new(registry: JobRegistry, config: SimConfig, journal: Box<dyn Journal>) -> Self {
        let supervisor = Supervisor::new(config.max_consecutive_failures);
        Self {
            registry,
            config,
            supervisor,
            observers: Vec::new(),
            journal,
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn observers(&self) -> &[Box<dyn Observer>] {
        &self.observers
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Operator acknowledgment of an escalated handler. Returns false if the
    /// handler was not escalated.
    pub fn acknowledge(&mut self, handler: &str) -> bool {
        if self.supervisor.acknowledge(handler) {
            tracing::info!(handler, "escalation acknowledged, handler will be skipped");
            true
        } else {
            false
        }
    }

    pub fn is_escalated(&self, handler: &str) -> bool {
        self.supervisor.is_escalated(handler)
    }

    /// Handler health for persistence. A cron-style deployment builds a
    /// fresh scheduler per run, so failure counts and acknowledgments only
    /// accumulate if the caller saves this next to the checkpoint and
    /// restores it on the next run.
    pub fn health(&self) -> BTreeMap<String, HandlerHealth> {
        self.supervisor.snapshot()
    }

    pub fn restore_health(&mut self, health: BTreeMap<String, HandlerHealth>) {
        self.supervisor.restore(health);
    }

    /// Catch the world up to wall-clock time `now` (unix seconds).
    ///
    /// Processes at most `max_ticks_per_call` due ticks, stopping early on a
    /// handler failure or when `deadline` passes. The watermark never moves
    /// past a tick that did not fully commit, so the next call resumes at
    /// the failed tick.
    pub fn advance_clock(
        &mut self,
        world: &mut WorldState,
        now: i64,
        deadline: Option<Instant>,
    ) -> Result<AdvanceOutcome, ClockError> {
        let clock = world.clock.as_ref().ok_or(ClockError::Missing)?;
        let mut version = clock.version;

        // Fresh world: anchor the clock to now rather than replaying the
        // whole span since the epoch.
        if clock.last_tick_at == 0 {
            let clock = world.clock.as_mut().ok_or(ClockError::Missing)?;
            clock.last_tick_at = now;
            clock.version += 1;
            return Ok(AdvanceOutcome {
                ticks_processed: 0,
                current_tick_id: clock.last_tick_id,
                failures: Vec::new(),
                deadline_hit: false,
            });
        }

        let interval = self.config.tick_interval_secs as i64;
        let elapsed = now - clock.last_tick_at;
        let due = if elapsed > 0 {
            ((elapsed / interval) as u64).min(self.config.max_ticks_per_call as u64)
        } else {
            0
        };

        let mut outcome = AdvanceOutcome {
            ticks_processed: 0,
            current_tick_id: clock.last_tick_id,
            failures: Vec::new(),
            deadline_hit: false,
        };

        for _ in 0..due {
            let clock = world.clock.as_ref().ok_or(ClockError::Missing)?;
            // Within one process the scheduler is the only version writer;
            // this guards a clock mutated behind our back, e.g. a checkpoint
            // edited between calls or a future shared-store clock.
            if clock.version != version {
                return Err(ClockError::VersionConflict {
                    expected: version,
                    found: clock.version,
                });
            }
            let tick = clock.last_tick_id + 1;
            let tick_at = clock.last_tick_at + interval;

            let run = self.registry.run_tick(
                world,
                tick,
                &self.config,
                &mut self.supervisor,
                self.journal.as_mut(),
                &mut self.observers,
                now,
                deadline,
            );

            if let Some(failure) = run.failure {
                outcome.failures.push(failure);
            }
            if !run.completed {
                outcome.deadline_hit = run.deadline_hit;
                break;
            }

            let clock = world.clock.as_mut().ok_or(ClockError::Missing)?;
            clock.last_tick_id = tick;
            clock.last_tick_at = tick_at;
            clock.version += 1;
            version = clock.version;
            outcome.ticks_processed += 1;
            outcome.current_tick_id = tick;
            let date = world.date;
            for observer in self.observers.iter_mut() {
                observer.on_event(&SimEvent::ClockAdvanced { tick, date });
            }
        }

        if outcome.ticks_processed > 0 {
            tracing::info!(
                ticks = outcome.ticks_processed,
                current = outcome.current_tick_id,
                "clock advanced"
            );
        }
        Ok(outcome)
    }
}
