use crate::error::HandlerError;
use crate::model::{LogEntry, Mutation, TickId, WorldState};

use super::context::HandlerContext;

/// Domain tables a handler may declare in its read/write sets. The registry
/// uses these to reject two handlers writing the same table without an
/// explicit ordering edge between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Domain {
    Calendar,
    Villages,
    Npcs,
    Outbreaks,
    Elections,
    Roles,
    Treasuries,
    Wallets,
    TaxCollections,
    SalaryPayments,
    Armies,
    Sieges,
}

/// What one handler wants done to the world for one tick: a batch of
/// mutations applied atomically, plus audit-log lines.
#[derive(Debug, Default)]
pub struct HandlerOutput {
    pub mutations: Vec<Mutation>,
    pub log: Vec<LogEntry>,
}

impl HandlerOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty() && self.log.is_empty()
    }
}

/// A tick-scoped unit of domain logic.
///
/// `handle` must be pure with respect to `(tick, world)`: the same tick id
/// and the same snapshot produce the same output, with all randomness drawn
/// from `ctx.entity_rng(tick, entity_id)`. Idempotence across retries is
/// enforced by the commit layer's record check, not by the handler.
pub trait TickHandler {
    fn name(&self) -> &'static str;

    fn reads(&self) -> &'static [Domain];

    fn writes(&self) -> &'static [Domain];

    /// Names of handlers that must commit earlier in the same tick.
    fn after(&self) -> &'static [&'static str] {
        &[]
    }

    fn handle(
        &self,
        tick: TickId,
        world: &WorldState,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError>;
}
