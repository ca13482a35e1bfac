use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::config::SimConfig;
use crate::error::HandlerError;
use crate::model::{TickId, TickRecord, TickStatus, WorldState};

use super::commit::{CommitOutcome, Journal, commit};
use super::context::HandlerContext;
use super::handler::{Domain, TickHandler};
use super::observer::{Observer, SimEvent, SkipReason};
use super::supervisor::Supervisor;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("handler {0:?} registered twice")]
    DuplicateName(String),
    #[error("handler {handler:?} depends on unknown handler {dependency:?}")]
    UnknownDependency { handler: String, dependency: String },
    #[error("dependency cycle involving {0:?}")]
    CycleDetected(String),
    #[error("handlers {a:?} and {b:?} both write {domain:?} with no ordering between them")]
    UnorderedWriteOverlap { a: String, b: String, domain: Domain },
}

/// Collects handlers, then `build` validates the dependency graph and fixes
/// the execution order for the registry's lifetime.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: Vec<Box<dyn TickHandler>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Box<dyn TickHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<JobRegistry, RegistryError> {
        let mut index: BTreeMap<&str, usize> = BTreeMap::new();
        for (i, handler) in self.handlers.iter().enumerate() {
            if index.insert(handler.name(), i).is_some() {
                return Err(RegistryError::DuplicateName(handler.name().to_string()));
            }
        }

        // Edge dep -> dependent.
        let n = self.handlers.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree: Vec<usize> = vec![0; n];
        for (i, handler) in self.handlers.iter().enumerate() {
            for dep in handler.after() {
                let Some(&d) = index.get(dep) else {
                    return Err(RegistryError::UnknownDependency {
                        handler: handler.name().to_string(),
                        dependency: dep.to_string(),
                    });
                };
                successors[d].push(i);
                in_degree[i] += 1;
            }
        }

        // Kahn's algorithm; ready set kept sorted by registration index so
        // ties break deterministically.
        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order: Vec<usize> = Vec::with_capacity(n);
        while let Some(&next) = ready.iter().min() {
            ready.retain(|&i| i != next);
            order.push(next);
            for &succ in &successors[next] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push(succ);
                }
            }
        }
        if order.len() != n {
            let stuck = (0..n)
                .find(|&i| in_degree[i] > 0)
                .map(|i| self.handlers[i].name().to_string())
                .unwrap_or_default();
            return Err(RegistryError::CycleDetected(stuck));
        }

        // Two writers of the same domain must be ordered, one way or the
        // other, by the dependency graph.
        let reachable = transitive_closure(n, &successors);
        for a in 0..n {
            for b in a + 1..n {
                if reachable[a][b] || reachable[b][a] {
                    continue;
                }
                if let Some(&domain) = self.handlers[a]
                    .writes()
                    .iter()
                    .find(|d| self.handlers[b].writes().contains(d))
                {
                    return Err(RegistryError::UnorderedWriteOverlap {
                        a: self.handlers[a].name().to_string(),
                        b: self.handlers[b].name().to_string(),
                        domain,
                    });
                }
            }
        }

        let mut handlers = self.handlers;
        // Reorder in place by pulling indices in topological order.
        let mut sorted: Vec<Box<dyn TickHandler>> = Vec::with_capacity(n);
        let mut slots: Vec<Option<Box<dyn TickHandler>>> =
            handlers.drain(..).map(Some).collect();
        for i in order {
            sorted.push(slots[i].take().expect("each index taken once"));
        }
        Ok(JobRegistry { handlers: sorted })
    }
}

fn transitive_closure(n: usize, successors: &[Vec<usize>]) -> Vec<Vec<bool>> {
    let mut reachable = vec![vec![false; n]; n];
    for start in 0..n {
        let mut stack: Vec<usize> = successors[start].clone();
        while let Some(node) = stack.pop() {
            if !reachable[start][node] {
                reachable[start][node] = true;
                stack.extend_from_slice(&successors[node]);
            }
        }
    }
    reachable
}

/// One handler failure inside a tick, surfaced to the caller.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailureReport {
    pub tick: TickId,
    pub handler: String,
    pub error: String,
    pub escalated: bool,
}

/// Result of running one tick through the registry.
#[derive(Debug)]
pub struct TickRun {
    /// Every non-skipped handler committed.
    pub completed: bool,
    pub failure: Option<FailureReport>,
    pub deadline_hit: bool,
}

/// Immutable, topologically ordered handler set.
pub struct JobRegistry {
    handlers: Vec<Box<dyn TickHandler>>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("handlers", &self.handler_names())
            .finish()
    }
}

impl JobRegistry {
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run every handler for `tick` in dependency order.
    ///
    /// Stops at the first failing handler (later handlers may depend on its
    /// output) and reports it; earlier commits in the same tick stand, and a
    /// re-run after the fault clears skips them via their records.
    #[allow(clippy::too_many_arguments)]
    pub fn run_tick(
        &self,
        world: &mut WorldState,
        tick: TickId,
        config: &SimConfig,
        supervisor: &mut Supervisor,
        journal: &mut dyn Journal,
        observers: &mut [Box<dyn Observer>],
        now: i64,
        deadline: Option<Instant>,
    ) -> TickRun {
        let mut run = TickRun {
            completed: false,
            failure: None,
            deadline_hit: false,
        };
        emit(observers, &SimEvent::TickStarted { tick });

        for handler in &self.handlers {
            let name = handler.name();

            if supervisor.skip(name) {
                tracing::warn!(handler = name, tick, "skipping acknowledged handler");
                emit(
                    observers,
                    &SimEvent::HandlerSkipped {
                        tick,
                        handler: name.to_string(),
                        reason: SkipReason::Escalated,
                    },
                );
                continue;
            }

            if let Some(record) = world.record(tick, name)
                && record.status == TickStatus::Committed
            {
                emit(
                    observers,
                    &SimEvent::HandlerSkipped {
                        tick,
                        handler: name.to_string(),
                        reason: SkipReason::AlreadyCommitted,
                    },
                );
                continue;
            }

            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                run.deadline_hit = true;
                return run;
            }

            world.put_record(TickRecord {
                tick,
                handler: name.to_string(),
                status: TickStatus::Pending,
                started_at: now,
                completed_at: None,
                error: None,
            });

            let ctx = HandlerContext {
                config,
                seed: world.seed,
            };
            let started = Instant::now();
            let result = handler.handle(tick, world, &ctx).and_then(|output| {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if elapsed_ms > config.handler_budget_ms {
                    return Err(HandlerError::Timeout {
                        budget_ms: config.handler_budget_ms,
                        elapsed_ms,
                    });
                }
                commit(
                    world,
                    journal,
                    name,
                    tick,
                    output,
                    config.transient_retries,
                    now,
                )
            });

            match result {
                Ok(CommitOutcome::Applied { mutations }) => {
                    supervisor.record_success(name);
                    emit(
                        observers,
                        &SimEvent::HandlerCommitted {
                            tick,
                            handler: name.to_string(),
                            mutations,
                        },
                    );
                }
                Ok(CommitOutcome::Skipped) => {
                    emit(
                        observers,
                        &SimEvent::HandlerSkipped {
                            tick,
                            handler: name.to_string(),
                            reason: SkipReason::AlreadyCommitted,
                        },
                    );
                }
                Err(err) => {
                    let message = err.to_string();
                    tracing::warn!(handler = name, tick, error = %message, "handler failed");
                    world.put_record(TickRecord {
                        tick,
                        handler: name.to_string(),
                        status: TickStatus::Failed,
                        started_at: now,
                        completed_at: Some(now),
                        error: Some(message.clone()),
                    });
                    let escalated = supervisor.record_failure(name);
                    emit(
                        observers,
                        &SimEvent::HandlerFailed {
                            tick,
                            handler: name.to_string(),
                            error: message.clone(),
                        },
                    );
                    if escalated {
                        emit(
                            observers,
                            &SimEvent::HandlerEscalated {
                                handler: name.to_string(),
                                consecutive_failures: supervisor.consecutive_failures(name),
                            },
                        );
                    }
                    run.failure = Some(FailureReport {
                        tick,
                        handler: name.to_string(),
                        error: message,
                        escalated,
                    });
                    return run;
                }
            }
        }

        run.completed = true;
        emit(observers, &SimEvent::TickCompleted { tick });
        run
    }
}

fn emit(observers: &mut [Box<dyn Observer>], event: &SimEvent) {
    for observer in observers.iter_mut() {
        observer.on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::commit::NullJournal;
    use crate::sim::handler::HandlerOutput;

    struct Stub {
        name: &'static str,
        after: &'static [&'static str],
        writes: &'static [Domain],
        fail: bool,
    }

    impl Stub {
        fn ok(name: &'static str, after: &'static [&'static str]) -> Box<Self> {
            Box::new(Self {
                name,
                after,
                writes: &[],
                fail: false,
            })
        }
    }

    impl TickHandler for Stub {
        fn name(&self) -> &'static str {
            self.name
        }
        fn reads(&self) -> &'static [Domain] {
            &[]
        }
        fn writes(&self) -> &'static [Domain] {
            self.writes
        }
        fn after(&self) -> &'static [&'static str] {
            self.after
        }
        fn handle(
            &self,
            _tick: TickId,
            _world: &WorldState,
            _ctx: &HandlerContext,
        ) -> Result<HandlerOutput, HandlerError> {
            if self.fail {
                Err(HandlerError::Logic("stub failure".to_string()))
            } else {
                Ok(HandlerOutput::new())
            }
        }
    }

    #[test]
    fn topological_order_respects_edges() {
        let registry = RegistryBuilder::new()
            .register(Stub::ok("c", &["b"]))
            .register(Stub::ok("a", &[]))
            .register(Stub::ok("b", &["a"]))
            .build()
            .unwrap();
        assert_eq!(registry.handler_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn registration_order_breaks_ties() {
        let registry = RegistryBuilder::new()
            .register(Stub::ok("x", &[]))
            .register(Stub::ok("y", &[]))
            .register(Stub::ok("z", &[]))
            .build()
            .unwrap();
        assert_eq!(registry.handler_names(), vec!["x", "y", "z"]);
    }

    #[test]
    fn duplicate_name_rejected() {
        let err = RegistryBuilder::new()
            .register(Stub::ok("a", &[]))
            .register(Stub::ok("a", &[]))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("a".to_string()));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let err = RegistryBuilder::new()
            .register(Stub::ok("a", &["ghost"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownDependency { .. }));
    }

    #[test]
    fn cycle_rejected() {
        let err = RegistryBuilder::new()
            .register(Stub::ok("a", &["b"]))
            .register(Stub::ok("b", &["a"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::CycleDetected(_)));
    }

    #[test]
    fn unordered_write_overlap_rejected() {
        let err = RegistryBuilder::new()
            .register(Box::new(Stub {
                name: "a",
                after: &[],
                writes: &[Domain::Npcs],
                fail: false,
            }))
            .register(Box::new(Stub {
                name: "b",
                after: &[],
                writes: &[Domain::Npcs],
                fail: false,
            }))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnorderedWriteOverlap {
                domain: Domain::Npcs,
                ..
            }
        ));
    }

    #[test]
    fn transitive_ordering_satisfies_overlap_check() {
        // a -> b -> c; a and c overlap but are ordered through b.
        RegistryBuilder::new()
            .register(Box::new(Stub {
                name: "a",
                after: &[],
                writes: &[Domain::Npcs],
                fail: false,
            }))
            .register(Stub::ok("b", &["a"]))
            .register(Box::new(Stub {
                name: "c",
                after: &["b"],
                writes: &[Domain::Npcs],
                fail: false,
            }))
            .build()
            .unwrap();
    }

    #[test]
    fn failure_stops_tick_and_marks_record() {
        let registry = RegistryBuilder::new()
            .register(Stub::ok("first", &[]))
            .register(Box::new(Stub {
                name: "second",
                after: &["first"],
                writes: &[],
                fail: true,
            }))
            .register(Stub::ok("third", &["second"]))
            .build()
            .unwrap();
        let mut world = WorldState::new(0);
        let config = SimConfig::default();
        let mut supervisor = Supervisor::new(3);
        let run = registry.run_tick(
            &mut world,
            1,
            &config,
            &mut supervisor,
            &mut NullJournal,
            &mut [],
            100,
            None,
        );
        assert!(!run.completed);
        let failure = run.failure.unwrap();
        assert_eq!(failure.handler, "second");
        assert!(!failure.escalated);
        assert_eq!(
            world.record(1, "first").unwrap().status,
            TickStatus::Committed
        );
        assert_eq!(
            world.record(1, "second").unwrap().status,
            TickStatus::Failed
        );
        assert!(world.record(1, "third").is_none());
    }

    struct Sleeper {
        name: &'static str,
        sleep_ms: u64,
    }

    impl TickHandler for Sleeper {
        fn name(&self) -> &'static str {
            self.name
        }
        fn reads(&self) -> &'static [Domain] {
            &[Domain::Calendar]
        }
        fn writes(&self) -> &'static [Domain] {
            &[Domain::Calendar]
        }
        fn handle(
            &self,
            _tick: TickId,
            world: &WorldState,
            _ctx: &HandlerContext,
        ) -> Result<HandlerOutput, HandlerError> {
            std::thread::sleep(std::time::Duration::from_millis(self.sleep_ms));
            let mut output = HandlerOutput::new();
            output.mutations.push(crate::model::Mutation::SetDate {
                to: world.date.next(),
            });
            Ok(output)
        }
    }

    #[test]
    fn deadline_stops_between_handlers_and_resumes() {
        let registry = RegistryBuilder::new()
            .register(Box::new(Sleeper {
                name: "slow",
                sleep_ms: 50,
            }))
            .register(Stub::ok("second", &["slow"]))
            .build()
            .unwrap();
        let mut world = WorldState::new(0);
        let config = SimConfig::default();
        let mut supervisor = Supervisor::new(3);

        let deadline = Instant::now() + std::time::Duration::from_millis(10);
        let run = registry.run_tick(
            &mut world,
            1,
            &config,
            &mut supervisor,
            &mut NullJournal,
            &mut [],
            100,
            Some(deadline),
        );
        assert!(run.deadline_hit);
        assert!(!run.completed);
        assert!(run.failure.is_none());
        // The first handler committed before the deadline cut in; the second
        // never started, not even a pending record.
        assert_eq!(
            world.record(1, "slow").unwrap().status,
            TickStatus::Committed
        );
        assert!(world.record(1, "second").is_none());

        let date = world.date;
        let run = registry.run_tick(
            &mut world,
            1,
            &config,
            &mut supervisor,
            &mut NullJournal,
            &mut [],
            100,
            None,
        );
        assert!(run.completed);
        assert_eq!(
            world.record(1, "second").unwrap().status,
            TickStatus::Committed
        );
        // The committed half was skipped, not re-run.
        assert_eq!(world.date, date);
    }

    #[test]
    fn over_budget_handler_output_is_discarded() {
        let registry = RegistryBuilder::new()
            .register(Box::new(Sleeper {
                name: "slow",
                sleep_ms: 50,
            }))
            .build()
            .unwrap();
        let mut world = WorldState::new(0);
        let mut config = SimConfig::default();
        config.handler_budget_ms = 10;
        let mut supervisor = Supervisor::new(3);
        let date = world.date;

        let run = registry.run_tick(
            &mut world,
            1,
            &config,
            &mut supervisor,
            &mut NullJournal,
            &mut [],
            100,
            None,
        );
        assert!(!run.completed);
        let failure = run.failure.unwrap();
        assert_eq!(failure.handler, "slow");
        assert!(failure.error.contains("budget"));
        // Output discarded, record failed, supervisor counted it.
        assert_eq!(world.date, date);
        assert_eq!(world.record(1, "slow").unwrap().status, TickStatus::Failed);
        assert_eq!(supervisor.consecutive_failures("slow"), 1);
    }

    #[test]
    fn rerun_skips_committed_handlers() {
        let registry = RegistryBuilder::new()
            .register(Stub::ok("first", &[]))
            .build()
            .unwrap();
        let mut world = WorldState::new(0);
        let config = SimConfig::default();
        let mut supervisor = Supervisor::new(3);
        registry.run_tick(
            &mut world,
            1,
            &config,
            &mut supervisor,
            &mut NullJournal,
            &mut [],
            100,
            None,
        );
        let mut observers: Vec<Box<dyn Observer>> =
            vec![Box::new(crate::sim::observer::BufferingObserver::new())];
        let run = registry.run_tick(
            &mut world,
            1,
            &config,
            &mut supervisor,
            &mut NullJournal,
            &mut observers,
            100,
            None,
        );
        assert!(run.completed);
    }
}
