use std::fmt;

use serde::{Deserialize, Serialize};

use super::TickId;
use super::event::{EventStatus, OutbreakStatus};
use super::location::LocationRef;

/// A farming settlement. Villages are never hard-deleted: abandonment is a
/// status transition recorded with the tick it happened on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Village {
    pub id: u64,
    pub name: String,
    /// The fief this village answers to (barony, duchy, or kingdom).
    pub liege: Option<LocationRef>,
    /// Commoner head-count, distinct from the named NPC roster.
    pub population: u32,
    /// Food stores in granary units. Never negative.
    pub granary: i64,
    pub morale: f64,
    pub abandoned: Option<TickId>,
}

impl Village {
    pub fn location(&self) -> LocationRef {
        LocationRef::Village(self.id)
    }

    pub fn is_active(&self) -> bool {
        self.abandoned.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
}

/// An active infection on one NPC, tied back to its outbreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infection {
    pub outbreak_id: u64,
    pub weeks_infected: u32,
}

/// A named inhabitant. Family relations are integer handles into the NPC
/// arena; the game rules keep them acyclic (no self-marriage, children are
/// always new records), but consumers still guard with `WorldState::is_ancestor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    pub id: u64,
    pub name: String,
    pub village_id: u64,
    pub sex: Sex,
    pub born_year: u32,
    pub spouse: Option<u64>,
    pub mother: Option<u64>,
    pub father: Option<u64>,
    /// Tick of the NPC's most recent childbirth, for the reproduction cooldown.
    pub last_birth_tick: Option<TickId>,
    pub infection: Option<Infection>,
    /// Outbreaks this NPC has recovered from; recovery confers immunity.
    #[serde(default)]
    pub immune: Vec<u64>,
    /// Tick the NPC died on. Dead NPCs stay in the arena.
    pub died: Option<TickId>,
}

impl Npc {
    pub fn is_alive(&self) -> bool {
        self.died.is_none()
    }

    pub fn age_in(&self, current_year: u32) -> u32 {
        current_year.saturating_sub(self.born_year)
    }
}

/// A disease outbreak anchored to a location. Aggregate counts are updated
/// by the disease handler each tick; status only moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbreak {
    pub id: u64,
    pub name: String,
    pub location: LocationRef,
    pub status: OutbreakStatus,
    /// Per-contact weekly transmission probability scale.
    pub spread_rate: f64,
    /// Weekly death probability per infected NPC.
    pub mortality_rate: f64,
    /// Weekly recovery probability per infected NPC.
    pub recovery_rate: f64,
    pub infected: u32,
    pub recovered: u32,
    pub deaths: u32,
    pub started_tick: TickId,
    pub ended_tick: Option<TickId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub npc_id: u64,
    /// Real-world declaration timestamp (unix seconds). Ties in an election
    /// are broken in favor of the earliest declaration.
    pub declared_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter_npc_id: u64,
    pub candidate_npc_id: u64,
}

/// A scheduled election for a titled seat. Ballots are cast by gameplay
/// outside the simulation; the election handler only opens, tallies, and
/// resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Election {
    pub id: u64,
    /// The role the winner is appointed to.
    pub seat_role_id: u64,
    pub location: LocationRef,
    pub status: EventStatus,
    pub voting_starts_tick: TickId,
    pub voting_ends_tick: TickId,
    pub quorum_required: u32,
    pub candidates: Vec<Candidate>,
    pub ballots: Vec<Ballot>,
    pub winner_npc_id: Option<u64>,
    pub decided_tick: Option<TickId>,
}

/// A salaried title (mayor, sheriff, bishop, …) paid from its location's
/// treasury once per season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRole {
    pub id: u64,
    pub title: String,
    pub location: LocationRef,
    pub holder_npc_id: Option<u64>,
    pub salary: i64,
    pub active: bool,
}

/// One disbursement. At most one row may exist per (role, period) — the
/// structural guard against double-pay on tick retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryPayment {
    pub role_id: u64,
    pub period: TickId,
    pub amount: i64,
}

/// Tax revenue accrued by gameplay, waiting for the treasury handler to
/// sweep it into the location's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCollection {
    pub id: u64,
    pub location: LocationRef,
    pub amount: i64,
    pub accrued_tick: TickId,
    pub collected: bool,
}

/// A location's coffers. `allow_negative` marks treasuries permitted to run
/// a war debt; everyone else fails the commit post-condition at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    pub location: LocationRef,
    pub balance: i64,
    pub allow_negative: bool,
}

/// A party to a balance mutation. `External` is the designated source/sink
/// for flows entering or leaving the closed economy (tax collection in, war
/// losses out) and is exempt from conservation accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Account {
    Treasury { location: LocationRef },
    Wallet { holder_npc_id: u64 },
    External,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Account::Treasury { location } => write!(f, "treasury of {location}"),
            Account::Wallet { holder_npc_id } => write!(f, "wallet of npc {holder_npc_id}"),
            Account::External => f.write_str("external"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Army {
    pub id: u64,
    pub name: String,
    /// The fief that raised and commands this army.
    pub owner: LocationRef,
    pub strength: u32,
    pub morale: f64,
    pub disbanded: Option<TickId>,
}

impl Army {
    pub fn is_fielded(&self) -> bool {
        self.disbanded.is_none()
    }
}

/// A siege laid against a village. Resolution follows the scheduled-event
/// DAG: `Completed` means the village fell, `Failed` means the siege was
/// lifted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Siege {
    pub id: u64,
    pub army_id: u64,
    pub target_village_id: u64,
    pub status: EventStatus,
    pub started_tick: TickId,
    /// Weeks of food the defenders have left. The village falls at zero.
    pub supplies_weeks: u32,
    pub resolved_tick: Option<TickId>,
}
