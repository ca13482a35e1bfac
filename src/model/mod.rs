pub mod calendar;
pub mod entity;
pub mod event;
pub mod location;
pub mod mutation;
pub mod world;

/// Discrete simulation step number. Tick N advances the world by one in-game
/// week; tick ids are assigned monotonically by the scheduler.
pub type TickId = u64;

pub use calendar::{Season, WEEKS_PER_SEASON, WEEKS_PER_YEAR, WorldDate};
pub use entity::{
    Account, Army, Ballot, Candidate, Election, Infection, Npc, Outbreak, PlayerRole,
    SalaryPayment, Sex, Siege, TaxCollection, Treasury, Village,
};
pub use event::{EventStatus, OutbreakStatus};
pub use location::LocationRef;
pub use mutation::{LogEntry, Mutation, NpcSeed};
pub use world::{TickRecord, TickStatus, WorldClock, WorldState};
