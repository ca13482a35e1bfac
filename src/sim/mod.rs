pub mod calendar;
pub mod commit;
pub mod context;
pub mod disasters;
pub mod disease;
pub mod elections;
pub mod handler;
pub mod lifecycle;
pub mod observer;
pub mod registry;
pub mod scheduler;
pub mod siege;
pub mod supervisor;
pub mod treasury;

pub use commit::{CommitOutcome, Journal, NullJournal, commit};
pub use context::HandlerContext;
pub use handler::{Domain, HandlerOutput, TickHandler};
pub use observer::{BufferingObserver, Observer, SimEvent, SkipReason};
pub use registry::{FailureReport, JobRegistry, RegistryBuilder, RegistryError, TickRun};
pub use scheduler::{AdvanceOutcome, Scheduler};
pub use supervisor::{HandlerHealth, Supervisor};

/// The full handler roster with its dependency edges. The registry orders
/// them calendar first, then the week's events, then money.
pub fn standard_registry() -> Result<JobRegistry, RegistryError> {
    RegistryBuilder::new()
        .register(Box::new(calendar::CalendarHandler))
        .register(Box::new(disasters::DisasterHandler))
        .register(Box::new(disease::DiseaseHandler))
        .register(Box::new(lifecycle::LifecycleHandler))
        .register(Box::new(elections::ElectionHandler))
        .register(Box::new(treasury::TreasuryHandler))
        .register(Box::new(siege::SiegeHandler))
        .build()
}
