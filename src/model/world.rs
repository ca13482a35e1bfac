use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::TickId;
use super::calendar::WorldDate;
use super::entity::{
    Account, Army, Election, Npc, Outbreak, PlayerRole, SalaryPayment, Siege, TaxCollection,
    Treasury, Village,
};
use super::location::LocationRef;
use super::mutation::LogEntry;
use crate::id::IdGenerator;

/// The scheduler's watermark. Exactly one exists per world; only the
/// scheduler mutates it, and every advance bumps `version` so a concurrent
/// writer is detected instead of silently clobbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldClock {
    /// Last fully committed tick.
    pub last_tick_id: TickId,
    /// Unix seconds the last committed tick corresponds to.
    pub last_tick_at: i64,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStatus {
    Pending,
    Committed,
    Failed,
}

/// Audit record for one (tick, handler) execution. A handler re-runs only
/// if its record is missing or failed; a committed record is the idempotent
/// skip that makes tick retry safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub tick: TickId,
    pub handler: String,
    pub status: TickStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
}

/// Full simulation state: the clock, the in-game date, and every domain
/// table, addressed by integer ID. Entities are never hard-deleted during
/// simulation; they end by status transition and stay queryable.
#[derive(Debug)]
pub struct WorldState {
    pub clock: Option<WorldClock>,
    pub date: WorldDate,
    /// Seed all per-(tick, entity) random streams derive from.
    pub seed: u64,

    pub villages: BTreeMap<u64, Village>,
    pub npcs: BTreeMap<u64, Npc>,
    pub outbreaks: BTreeMap<u64, Outbreak>,
    pub elections: BTreeMap<u64, Election>,
    pub roles: BTreeMap<u64, PlayerRole>,
    pub treasuries: BTreeMap<LocationRef, Treasury>,
    pub wallets: BTreeMap<u64, i64>,
    pub salary_payments: Vec<SalaryPayment>,
    pub tax_collections: BTreeMap<u64, TaxCollection>,
    pub armies: BTreeMap<u64, Army>,
    pub sieges: BTreeMap<u64, Siege>,

    pub tick_records: BTreeMap<(TickId, String), TickRecord>,
    pub audit_log: Vec<LogEntry>,
    pub id_gen: IdGenerator,
}

impl WorldState {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: Some(WorldClock {
                last_tick_id: 0,
                last_tick_at: 0,
                version: 1,
            }),
            date: WorldDate::default(),
            seed,
            villages: BTreeMap::new(),
            npcs: BTreeMap::new(),
            outbreaks: BTreeMap::new(),
            elections: BTreeMap::new(),
            roles: BTreeMap::new(),
            treasuries: BTreeMap::new(),
            wallets: BTreeMap::new(),
            salary_payments: Vec::new(),
            tax_collections: BTreeMap::new(),
            armies: BTreeMap::new(),
            sieges: BTreeMap::new(),
            tick_records: BTreeMap::new(),
            audit_log: Vec::new(),
            id_gen: IdGenerator::new(),
        }
    }

    pub fn next_id(&mut self) -> u64 {
        self.id_gen.next_id()
    }

    // --- Accounts ---

    /// Current balance of an account. Wallets spring into existence at zero;
    /// `External` is bottomless and reports zero. Returns `None` only for a
    /// treasury that does not exist.
    pub fn balance(&self, account: &Account) -> Option<i64> {
        match account {
            Account::Treasury { location } => self.treasuries.get(location).map(|t| t.balance),
            Account::Wallet { holder_npc_id } => {
                Some(self.wallets.get(holder_npc_id).copied().unwrap_or(0))
            }
            Account::External => Some(0),
        }
    }

    /// Whether the account may go below zero (war-debt treasuries, External).
    pub fn allows_negative(&self, account: &Account) -> bool {
        match account {
            Account::Treasury { location } => self
                .treasuries
                .get(location)
                .is_some_and(|t| t.allow_negative),
            Account::Wallet { .. } => false,
            Account::External => true,
        }
    }

    /// Apply a signed delta. Callers must have validated the post-condition;
    /// this only mutates.
    pub fn apply_balance_delta(&mut self, account: &Account, delta: i64) {
        match account {
            Account::Treasury { location } => {
                if let Some(treasury) = self.treasuries.get_mut(location) {
                    treasury.balance += delta;
                }
            }
            Account::Wallet { holder_npc_id } => {
                *self.wallets.entry(*holder_npc_id).or_insert(0) += delta;
            }
            Account::External => {}
        }
    }

    // --- Tick records and audit log ---

    pub fn record(&self, tick: TickId, handler: &str) -> Option<&TickRecord> {
        self.tick_records.get(&(tick, handler.to_string()))
    }

    pub fn put_record(&mut self, record: TickRecord) {
        self.tick_records
            .insert((record.tick, record.handler.clone()), record);
    }

    /// Audit entries committed so far for the given tick, in commit order.
    /// Later handlers in the same tick consume these (season-change markers
    /// and the like).
    pub fn log_for_tick(&self, tick: TickId) -> impl Iterator<Item = &LogEntry> {
        self.audit_log.iter().filter(move |e| e.tick == tick)
    }

    // --- Domain queries ---

    /// IDs of active villages belonging to a location: the village itself
    /// for a village ref, or every village sworn to the given fief.
    pub fn villages_in(&self, location: LocationRef) -> Vec<u64> {
        match location {
            LocationRef::Village(id) => self
                .villages
                .get(&id)
                .filter(|v| v.is_active())
                .map(|v| vec![v.id])
                .unwrap_or_default(),
            // Towns are settlements in their own right; no villages below them.
            LocationRef::Town(_) => Vec::new(),
            LocationRef::Barony(_) | LocationRef::Duchy(_) | LocationRef::Kingdom(_) => self
                .villages
                .values()
                .filter(|v| v.is_active() && v.liege == Some(location))
                .map(|v| v.id)
                .collect(),
        }
    }

    /// Living NPCs resident in the given village, in ID order.
    pub fn living_npcs_in(&self, village_id: u64) -> impl Iterator<Item = &Npc> {
        self.npcs
            .values()
            .filter(move |n| n.is_alive() && n.village_id == village_id)
    }

    /// Living NPCs across every active village of a location, in ID order.
    pub fn living_npcs_at(&self, location: LocationRef) -> Vec<&Npc> {
        let villages = self.villages_in(location);
        self.npcs
            .values()
            .filter(|n| n.is_alive() && villages.contains(&n.village_id))
            .collect()
    }

    /// Walks the parent links to decide whether `ancestor_id` is an ancestor
    /// of `npc_id`. Relations are acyclic by game rule, but a visited set
    /// guards against a corrupted arena looping forever.
    pub fn is_ancestor(&self, ancestor_id: u64, npc_id: u64) -> bool {
        let mut visited = BTreeSet::new();
        let mut frontier = vec![npc_id];
        while let Some(current) = frontier.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(npc) = self.npcs.get(&current) else {
                continue;
            };
            for parent in [npc.mother, npc.father].into_iter().flatten() {
                if parent == ancestor_id {
                    return true;
                }
                frontier.push(parent);
            }
        }
        false
    }

    pub fn salary_paid(&self, role_id: u64, period: TickId) -> bool {
        self.salary_payments
            .iter()
            .any(|p| p.role_id == role_id && p.period == period)
    }
}
