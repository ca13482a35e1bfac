//! Shared helpers for integration tests and examples. Not part of the
//! public surface proper, but kept in the library so every test target can
//! drive a scheduler the same way.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::SimConfig;
use crate::model::WorldState;
use crate::sim::{
    AdvanceOutcome, NullJournal, Observer, Scheduler, SimEvent, standard_registry,
};

/// Epoch used by test schedulers; any positive anchor works.
pub const T0: i64 = 1_000_000;

/// Scheduler over the full handler roster with an in-memory journal.
pub fn standard_scheduler(config: SimConfig) -> Scheduler {
    let registry = standard_registry().expect("standard registry is valid");
    Scheduler::new(registry, config, Box::new(NullJournal))
}

/// Anchor a fresh world's clock at [`T0`].
pub fn anchor(scheduler: &mut Scheduler, world: &mut WorldState) {
    let outcome = scheduler
        .advance_clock(world, T0, None)
        .expect("anchoring cannot fail");
    assert_eq!(outcome.ticks_processed, 0);
}

/// The wall-clock instant `n` ticks after the anchor.
pub fn at_tick(config: &SimConfig, n: u64) -> i64 {
    T0 + config.tick_interval_secs * n as i64
}

/// Advance the world to tick `n` (absolute, from the anchor), repeating
/// calls until the catch-up cap stops limiting progress.
pub fn advance_to(
    scheduler: &mut Scheduler,
    world: &mut WorldState,
    config: &SimConfig,
    n: u64,
) -> AdvanceOutcome {
    let now = at_tick(config, n);
    loop {
        let outcome = scheduler
            .advance_clock(world, now, None)
            .expect("clock present");
        if outcome.ticks_processed < config.max_ticks_per_call || outcome.current_tick_id >= n {
            return outcome;
        }
    }
}

/// Observer handing its event buffer back through a shared handle, since
/// the scheduler takes ownership of observers it is given.
#[derive(Clone, Default)]
pub struct SharedEvents {
    events: Rc<RefCell<Vec<SimEvent>>>,
}

impl SharedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<SimEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn snapshot(&self) -> Vec<SimEvent> {
        self.events.borrow().clone()
    }
}

impl Observer for SharedEvents {
    fn on_event(&mut self, event: &SimEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
