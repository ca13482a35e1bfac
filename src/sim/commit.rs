use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ConsistencyViolation, HandlerError, JournalError};
use crate::model::{
    Account, EventStatus, LogEntry, Mutation, Npc, OutbreakStatus, TickId, TickRecord, TickStatus,
    WorldDate, WorldState,
};

use super::handler::HandlerOutput;

/// Durable sink for committed tick records and their audit entries, written
/// before in-memory state mutates so a crash never leaves an applied-but-
/// unjournaled handler behind.
pub trait Journal {
    fn append(&mut self, record: &TickRecord, entries: &[LogEntry]) -> Result<(), JournalError>;
}

/// Journal that accepts everything. Default for worlds that only checkpoint.
#[derive(Debug, Default)]
pub struct NullJournal;

impl Journal for NullJournal {
    fn append(&mut self, _record: &TickRecord, _entries: &[LogEntry]) -> Result<(), JournalError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Mutations applied and the record marked committed.
    Applied { mutations: usize },
    /// A committed record already existed; nothing was reapplied.
    Skipped,
}

/// Atomically apply one handler's output for one tick.
///
/// Order of operations is validate → journal → apply → record, so a failure
/// at any step leaves the world untouched. Re-invoking for an already
/// committed (tick, handler) returns `Skipped` without side effects.
pub fn commit(
    world: &mut WorldState,
    journal: &mut dyn Journal,
    handler: &str,
    tick: TickId,
    output: HandlerOutput,
    transient_retries: u32,
    now: i64,
) -> Result<CommitOutcome, HandlerError> {
    if let Some(record) = world.record(tick, handler)
        && record.status == TickStatus::Committed
    {
        return Ok(CommitOutcome::Skipped);
    }

    validate(world, &output.mutations).map_err(HandlerError::Consistency)?;

    let started_at = world
        .record(tick, handler)
        .map(|r| r.started_at)
        .unwrap_or(now);
    let record = TickRecord {
        tick,
        handler: handler.to_string(),
        status: TickStatus::Committed,
        started_at,
        completed_at: Some(now),
        error: None,
    };

    // Durability first: journal before any in-memory mutation.
    let mut attempt = 0;
    loop {
        match journal.append(&record, &output.log) {
            Ok(()) => break,
            Err(err) if err.transient && attempt < transient_retries => {
                attempt += 1;
                tracing::warn!(handler, tick, attempt, "transient journal failure, retrying");
            }
            Err(err) => return Err(HandlerError::Infra(err)),
        }
    }

    let applied = output.mutations.len();
    for mutation in output.mutations {
        apply(world, tick, mutation);
    }
    world.audit_log.extend(output.log);
    world.put_record(record);

    Ok(CommitOutcome::Applied { mutations: applied })
}

/// Check every mutation in the batch against the current state plus the
/// batch's own earlier effects. Nothing is applied here; a single violation
/// rejects the whole batch.
fn validate(world: &WorldState, mutations: &[Mutation]) -> Result<(), ConsistencyViolation> {
    // Scratch state threaded through the batch so chained mutations
    // (Open -> Closed -> Completed in one output) validate correctly.
    let mut balances: BTreeMap<Account, i64> = BTreeMap::new();
    let mut stores: BTreeMap<u64, i64> = BTreeMap::new(); // village granaries
    let mut populations: BTreeMap<u64, i64> = BTreeMap::new();
    let mut strengths: BTreeMap<u64, i64> = BTreeMap::new();
    let mut election_status: BTreeMap<u64, EventStatus> = BTreeMap::new();
    let mut siege_status: BTreeMap<u64, EventStatus> = BTreeMap::new();
    let mut outbreak_status: BTreeMap<u64, OutbreakStatus> = BTreeMap::new();
    let mut salaries: BTreeSet<(u64, TickId)> = BTreeSet::new();
    let mut collected: BTreeSet<u64> = BTreeSet::new();
    let mut killed: BTreeSet<u64> = BTreeSet::new();
    let mut infected: BTreeSet<u64> = BTreeSet::new();
    let mut recovered: BTreeSet<u64> = BTreeSet::new();
    let mut date = world.date;

    let unknown = |what: &str, id: u64| {
        Err(ConsistencyViolation::UnknownEntity(format!(
            "{what} {id} does not exist"
        )))
    };

    for mutation in mutations {
        match mutation {
            Mutation::SetDate { to } => {
                if *to <= date {
                    return Err(ConsistencyViolation::DateRegression {
                        from: date.to_string(),
                        to: to.to_string(),
                    });
                }
                date = *to;
            }

            Mutation::AdjustBalance { account, delta } => {
                let Some(current) = world.balance(account) else {
                    return Err(ConsistencyViolation::UnknownEntity(format!(
                        "{account} does not exist"
                    )));
                };
                let pending = balances.entry(*account).or_insert(0);
                *pending += delta;
                let result = current + *pending;
                if result < 0 && !world.allows_negative(account) {
                    return Err(ConsistencyViolation::NegativeBalance {
                        account: *account,
                        delta: *delta,
                        result,
                    });
                }
            }

            Mutation::MarkTaxCollected { collection_id } => {
                let Some(tax) = world.tax_collections.get(collection_id) else {
                    return unknown("tax collection", *collection_id);
                };
                if tax.collected || !collected.insert(*collection_id) {
                    return Err(ConsistencyViolation::InvalidMutation(format!(
                        "tax collection {collection_id} already collected"
                    )));
                }
            }

            Mutation::RecordSalaryPayment { role_id, period, .. } => {
                if world.roles.get(role_id).is_none() {
                    return unknown("role", *role_id);
                }
                if world.salary_paid(*role_id, *period) || !salaries.insert((*role_id, *period)) {
                    return Err(ConsistencyViolation::DuplicateSalary {
                        role_id: *role_id,
                        period: *period,
                    });
                }
            }

            Mutation::SetElectionStatus { election_id, to } => {
                let Some(election) = world.elections.get(election_id) else {
                    return unknown("election", *election_id);
                };
                let from = election_status
                    .get(election_id)
                    .copied()
                    .unwrap_or(election.status);
                if !from.can_advance_to(*to) {
                    return Err(ConsistencyViolation::IllegalTransition {
                        entity: format!("election {election_id}"),
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
                election_status.insert(*election_id, *to);
            }

            Mutation::SetElectionWinner { election_id, npc_id } => {
                if world.elections.get(election_id).is_none() {
                    return unknown("election", *election_id);
                }
                if world.npcs.get(npc_id).is_none() {
                    return unknown("npc", *npc_id);
                }
            }

            Mutation::AppointRoleHolder { role_id, npc_id } => {
                if world.roles.get(role_id).is_none() {
                    return unknown("role", *role_id);
                }
                if world.npcs.get(npc_id).is_none() {
                    return unknown("npc", *npc_id);
                }
            }

            Mutation::SpawnNpc { seed } => {
                if world.villages.get(&seed.village_id).is_none() {
                    return unknown("village", seed.village_id);
                }
                for parent in [seed.mother, seed.father].into_iter().flatten() {
                    if world.npcs.get(&parent).is_none() {
                        return unknown("npc", parent);
                    }
                }
                if let (Some(m), Some(f)) = (seed.mother, seed.father)
                    && m == f
                {
                    return Err(ConsistencyViolation::InvalidMutation(format!(
                        "npc {m} cannot be both parents of one child"
                    )));
                }
            }

            Mutation::KillNpc { npc_id, .. } => {
                let Some(npc) = world.npcs.get(npc_id) else {
                    return unknown("npc", *npc_id);
                };
                if !npc.is_alive() || !killed.insert(*npc_id) {
                    return Err(ConsistencyViolation::InvalidMutation(format!(
                        "npc {npc_id} is already dead"
                    )));
                }
            }

            Mutation::SetNpcLastBirth { npc_id, .. } => {
                if world.npcs.get(npc_id).is_none() {
                    return unknown("npc", *npc_id);
                }
            }

            Mutation::InfectNpc { npc_id, outbreak_id } => {
                let Some(npc) = world.npcs.get(npc_id) else {
                    return unknown("npc", *npc_id);
                };
                if world.outbreaks.get(outbreak_id).is_none() {
                    return unknown("outbreak", *outbreak_id);
                }
                if npc.infection.is_some() || !infected.insert(*npc_id) {
                    return Err(ConsistencyViolation::InvalidMutation(format!(
                        "npc {npc_id} is already infected"
                    )));
                }
            }

            Mutation::ProgressInfection { npc_id } | Mutation::RecoverNpc { npc_id } => {
                let Some(npc) = world.npcs.get(npc_id) else {
                    return unknown("npc", *npc_id);
                };
                if npc.infection.is_none() && !infected.contains(npc_id) {
                    return Err(ConsistencyViolation::InvalidMutation(format!(
                        "npc {npc_id} is not infected"
                    )));
                }
                if matches!(mutation, Mutation::RecoverNpc { .. }) && !recovered.insert(*npc_id) {
                    return Err(ConsistencyViolation::InvalidMutation(format!(
                        "npc {npc_id} already recovered this tick"
                    )));
                }
            }

            Mutation::SetOutbreakCounts { outbreak_id, .. } => {
                if world.outbreaks.get(outbreak_id).is_none() {
                    return unknown("outbreak", *outbreak_id);
                }
            }

            Mutation::SetOutbreakStatus { outbreak_id, to } => {
                let Some(outbreak) = world.outbreaks.get(outbreak_id) else {
                    return unknown("outbreak", *outbreak_id);
                };
                let from = outbreak_status
                    .get(outbreak_id)
                    .copied()
                    .unwrap_or(outbreak.status);
                if !from.can_advance_to(*to) {
                    return Err(ConsistencyViolation::IllegalTransition {
                        entity: format!("outbreak {outbreak_id}"),
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
                outbreak_status.insert(*outbreak_id, *to);
            }

            Mutation::AdjustVillagePopulation { village_id, delta } => {
                let Some(village) = world.villages.get(village_id) else {
                    return unknown("village", *village_id);
                };
                let pending = populations.entry(*village_id).or_insert(0);
                *pending += delta;
                if village.population as i64 + *pending < 0 {
                    return Err(ConsistencyViolation::InvalidMutation(format!(
                        "village {village_id} population would go negative"
                    )));
                }
            }

            Mutation::AdjustGranary { village_id, delta } => {
                let Some(village) = world.villages.get(village_id) else {
                    return unknown("village", *village_id);
                };
                let pending = stores.entry(*village_id).or_insert(0);
                *pending += delta;
                if village.granary + *pending < 0 {
                    return Err(ConsistencyViolation::InvalidMutation(format!(
                        "village {village_id} granary would go negative"
                    )));
                }
            }

            Mutation::SetVillageAbandoned { village_id }
            | Mutation::SetVillageLiege { village_id, .. } => {
                if world.villages.get(village_id).is_none() {
                    return unknown("village", *village_id);
                }
            }

            Mutation::AdjustArmyStrength { army_id, delta } => {
                let Some(army) = world.armies.get(army_id) else {
                    return unknown("army", *army_id);
                };
                let pending = strengths.entry(*army_id).or_insert(0);
                *pending += delta;
                if army.strength as i64 + *pending < 0 {
                    return Err(ConsistencyViolation::InvalidMutation(format!(
                        "army {army_id} strength would go negative"
                    )));
                }
            }

            Mutation::SetArmyDisbanded { army_id } => {
                if world.armies.get(army_id).is_none() {
                    return unknown("army", *army_id);
                }
            }

            Mutation::SetSiegeStatus { siege_id, to } => {
                let Some(siege) = world.sieges.get(siege_id) else {
                    return unknown("siege", *siege_id);
                };
                let from = siege_status.get(siege_id).copied().unwrap_or(siege.status);
                if !from.can_advance_to(*to) {
                    return Err(ConsistencyViolation::IllegalTransition {
                        entity: format!("siege {siege_id}"),
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
                siege_status.insert(*siege_id, *to);
            }

            Mutation::SetSiegeSupplies { siege_id, .. } => {
                if world.sieges.get(siege_id).is_none() {
                    return unknown("siege", *siege_id);
                }
            }
        }
    }

    Ok(())
}

/// Apply one validated mutation. Infallible by construction: every lookup
/// was checked by `validate` against the same batch.
fn apply(world: &mut WorldState, tick: TickId, mutation: Mutation) {
    match mutation {
        Mutation::SetDate { to } => world.date = to,

        Mutation::AdjustBalance { account, delta } => world.apply_balance_delta(&account, delta),

        Mutation::MarkTaxCollected { collection_id } => {
            if let Some(tax) = world.tax_collections.get_mut(&collection_id) {
                tax.collected = true;
            }
        }

        Mutation::RecordSalaryPayment {
            role_id,
            period,
            amount,
        } => world.salary_payments.push(crate::model::SalaryPayment {
            role_id,
            period,
            amount,
        }),

        Mutation::SetElectionStatus { election_id, to } => {
            if let Some(election) = world.elections.get_mut(&election_id) {
                election.status = to;
                if to.is_terminal() {
                    election.decided_tick = Some(tick);
                }
            }
        }

        Mutation::SetElectionWinner { election_id, npc_id } => {
            if let Some(election) = world.elections.get_mut(&election_id) {
                election.winner_npc_id = Some(npc_id);
            }
        }

        Mutation::AppointRoleHolder { role_id, npc_id } => {
            if let Some(role) = world.roles.get_mut(&role_id) {
                role.holder_npc_id = Some(npc_id);
            }
        }

        Mutation::SpawnNpc { seed } => {
            let id = world.next_id();
            world.npcs.insert(
                id,
                Npc {
                    id,
                    name: seed.name,
                    village_id: seed.village_id,
                    sex: seed.sex,
                    born_year: seed.born_year,
                    spouse: None,
                    mother: seed.mother,
                    father: seed.father,
                    last_birth_tick: None,
                    infection: None,
                    immune: Vec::new(),
                    died: None,
                },
            );
        }

        Mutation::KillNpc { npc_id, .. } => {
            if let Some(npc) = world.npcs.get_mut(&npc_id) {
                npc.died = Some(tick);
                npc.infection = None;
            }
        }

        Mutation::SetNpcLastBirth { npc_id, tick: birth_tick } => {
            if let Some(npc) = world.npcs.get_mut(&npc_id) {
                npc.last_birth_tick = Some(birth_tick);
            }
        }

        Mutation::InfectNpc { npc_id, outbreak_id } => {
            if let Some(npc) = world.npcs.get_mut(&npc_id) {
                npc.infection = Some(crate::model::Infection {
                    outbreak_id,
                    weeks_infected: 0,
                });
            }
        }

        Mutation::ProgressInfection { npc_id } => {
            if let Some(npc) = world.npcs.get_mut(&npc_id)
                && let Some(infection) = npc.infection.as_mut()
            {
                infection.weeks_infected += 1;
            }
        }

        Mutation::RecoverNpc { npc_id } => {
            if let Some(npc) = world.npcs.get_mut(&npc_id)
                && let Some(infection) = npc.infection.take()
            {
                // Surviving a disease confers immunity to that outbreak.
                npc.immune.push(infection.outbreak_id);
            }
        }

        Mutation::SetOutbreakCounts {
            outbreak_id,
            infected,
            recovered,
            deaths,
        } => {
            if let Some(outbreak) = world.outbreaks.get_mut(&outbreak_id) {
                outbreak.infected = infected;
                outbreak.recovered = recovered;
                outbreak.deaths = deaths;
            }
        }

        Mutation::SetOutbreakStatus { outbreak_id, to } => {
            if let Some(outbreak) = world.outbreaks.get_mut(&outbreak_id) {
                outbreak.status = to;
                if to == OutbreakStatus::Ended {
                    outbreak.ended_tick = Some(tick);
                }
            }
        }

        Mutation::AdjustVillagePopulation { village_id, delta } => {
            if let Some(village) = world.villages.get_mut(&village_id) {
                village.population = (village.population as i64 + delta).max(0) as u32;
            }
        }

        Mutation::AdjustGranary { village_id, delta } => {
            if let Some(village) = world.villages.get_mut(&village_id) {
                village.granary += delta;
            }
        }

        Mutation::SetVillageAbandoned { village_id } => {
            if let Some(village) = world.villages.get_mut(&village_id) {
                village.abandoned = Some(tick);
            }
        }

        Mutation::SetVillageLiege { village_id, liege } => {
            if let Some(village) = world.villages.get_mut(&village_id) {
                village.liege = Some(liege);
            }
        }

        Mutation::AdjustArmyStrength { army_id, delta } => {
            if let Some(army) = world.armies.get_mut(&army_id) {
                army.strength = (army.strength as i64 + delta).max(0) as u32;
            }
        }

        Mutation::SetArmyDisbanded { army_id } => {
            if let Some(army) = world.armies.get_mut(&army_id) {
                army.disbanded = Some(tick);
            }
        }

        Mutation::SetSiegeStatus { siege_id, to } => {
            if let Some(siege) = world.sieges.get_mut(&siege_id) {
                siege.status = to;
                if to.is_terminal() {
                    siege.resolved_tick = Some(tick);
                }
            }
        }

        Mutation::SetSiegeSupplies { siege_id, weeks } => {
            if let Some(siege) = world.sieges.get_mut(&siege_id) {
                siege.supplies_weeks = weeks;
            }
        }
    }
}
