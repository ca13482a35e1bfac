pub mod config;
pub mod db;
pub mod error;
pub mod flush;
pub mod id;
pub mod model;
pub mod scenario;
pub mod sim;
pub mod testutil;

pub use config::SimConfig;
pub use error::{ClockError, ConsistencyViolation, HandlerError, JournalError};
pub use id::IdGenerator;
pub use model::{
    Account, EventStatus, LocationRef, LogEntry, Mutation, Season, TickId, TickRecord, TickStatus,
    WorldClock, WorldDate, WorldState,
};
