use serde::{Deserialize, Serialize};

use super::TickId;
use super::calendar::WorldDate;
use super::entity::{Account, Sex};
use super::event::{EventStatus, OutbreakStatus};
use super::location::LocationRef;

/// Everything a handler needs to create an NPC, minus the ID. The commit
/// layer allocates the ID so a retried handler never burns ID space for
/// output that was rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcSeed {
    pub name: String,
    pub village_id: u64,
    pub sex: Sex,
    pub born_year: u32,
    pub mother: Option<u64>,
    pub father: Option<u64>,
}

/// The only language tick handlers may speak back to the world.
///
/// Handlers compute mutations against an immutable snapshot; the commit
/// layer validates the whole batch (balances, status DAGs, uniqueness)
/// before applying any of it. Resource movements are signed deltas so
/// conservation is checkable by summation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    // Calendar
    SetDate { to: WorldDate },

    // Money
    AdjustBalance { account: Account, delta: i64 },
    MarkTaxCollected { collection_id: u64 },
    RecordSalaryPayment { role_id: u64, period: TickId, amount: i64 },

    // Elections and roles
    SetElectionStatus { election_id: u64, to: EventStatus },
    SetElectionWinner { election_id: u64, npc_id: u64 },
    AppointRoleHolder { role_id: u64, npc_id: u64 },

    // NPCs
    SpawnNpc { seed: NpcSeed },
    KillNpc { npc_id: u64, cause: String },
    SetNpcLastBirth { npc_id: u64, tick: TickId },
    InfectNpc { npc_id: u64, outbreak_id: u64 },
    ProgressInfection { npc_id: u64 },
    RecoverNpc { npc_id: u64 },

    // Outbreaks
    SetOutbreakCounts { outbreak_id: u64, infected: u32, recovered: u32, deaths: u32 },
    SetOutbreakStatus { outbreak_id: u64, to: OutbreakStatus },

    // Villages
    AdjustVillagePopulation { village_id: u64, delta: i64 },
    AdjustGranary { village_id: u64, delta: i64 },
    SetVillageAbandoned { village_id: u64 },
    SetVillageLiege { village_id: u64, liege: LocationRef },

    // Armies and sieges
    AdjustArmyStrength { army_id: u64, delta: i64 },
    SetArmyDisbanded { army_id: u64 },
    SetSiegeStatus { siege_id: u64, to: EventStatus },
    SetSiegeSupplies { siege_id: u64, weeks: u32 },
}

/// One line of the audit trail, keyed by the tick and handler that produced
/// it. `data` carries structured payloads that later handlers in the same
/// tick may consume (e.g. the calendar's season-change marker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub tick: TickId,
    pub handler: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl LogEntry {
    pub fn new(tick: TickId, handler: &str, message: impl Into<String>) -> Self {
        Self {
            tick,
            handler: handler.to_string(),
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(
        tick: TickId,
        handler: &str,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            data,
            ..Self::new(tick, handler, message)
        }
    }

    /// Convenience accessor for the `"type"` field of structured payloads.
    pub fn data_type(&self) -> Option<&str> {
        self.data.get("type").and_then(|v| v.as_str())
    }
}
