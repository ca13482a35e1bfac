use serde_json::json;

use crate::error::HandlerError;
use crate::model::{Election, EventStatus, LogEntry, Mutation, TickId, WorldState};

use super::context::HandlerContext;
use super::handler::{Domain, HandlerOutput, TickHandler};

/// Opens pending elections when their voting window starts and tallies open
/// ones when it ends. A tally that misses quorum fails the election and
/// leaves the seat as it was.
pub struct ElectionHandler;

pub const NAME: &str = "elections";

impl TickHandler for ElectionHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reads(&self) -> &'static [Domain] {
        &[Domain::Elections, Domain::Npcs, Domain::Roles]
    }

    fn writes(&self) -> &'static [Domain] {
        &[Domain::Elections, Domain::Roles]
    }

    fn after(&self) -> &'static [&'static str] {
        &[super::lifecycle::NAME]
    }

    fn handle(
        &self,
        tick: TickId,
        world: &WorldState,
        _ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let mut output = HandlerOutput::new();

        for election in world.elections.values() {
            match election.status {
                EventStatus::Pending if tick >= election.voting_starts_tick => {
                    output.mutations.push(Mutation::SetElectionStatus {
                        election_id: election.id,
                        to: EventStatus::Open,
                    });
                    output.log.push(LogEntry::with_data(
                        tick,
                        NAME,
                        format!("voting opens for {}", election.location),
                        json!({ "type": "election_opened", "election_id": election.id }),
                    ));
                }
                EventStatus::Open if tick >= election.voting_ends_tick => {
                    tally(tick, world, election, &mut output);
                }
                _ => {}
            }
        }

        Ok(output)
    }
}

fn tally(tick: TickId, world: &WorldState, election: &Election, output: &mut HandlerOutput) {
    // Ballots only count toward declared candidates.
    let valid: Vec<u64> = election
        .ballots
        .iter()
        .map(|b| b.candidate_npc_id)
        .filter(|id| election.candidates.iter().any(|c| c.npc_id == *id))
        .collect();

    output.mutations.push(Mutation::SetElectionStatus {
        election_id: election.id,
        to: EventStatus::Closed,
    });

    if (valid.len() as u32) < election.quorum_required {
        output.mutations.push(Mutation::SetElectionStatus {
            election_id: election.id,
            to: EventStatus::Failed,
        });
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!(
                "election for {} fails quorum ({} of {} ballots)",
                election.location,
                valid.len(),
                election.quorum_required
            ),
            json!({
                "type": "election_failed",
                "election_id": election.id,
                "ballots": valid.len(),
                "quorum": election.quorum_required,
            }),
        ));
        return;
    }

    // Plurality; ties go to the candidate who declared earliest, then to
    // the lower npc id so the outcome never depends on map iteration.
    let winner = election
        .candidates
        .iter()
        .map(|c| {
            let votes = valid.iter().filter(|&&id| id == c.npc_id).count();
            (votes, c)
        })
        .max_by(|(va, ca), (vb, cb)| {
            va.cmp(vb)
                .then(cb.declared_at.cmp(&ca.declared_at))
                .then(cb.npc_id.cmp(&ca.npc_id))
        })
        .map(|(_, c)| c);

    let Some(winner) = winner else {
        // No candidates at all; quorum of zero let us get here.
        output.mutations.push(Mutation::SetElectionStatus {
            election_id: election.id,
            to: EventStatus::Failed,
        });
        return;
    };

    output.mutations.push(Mutation::SetElectionWinner {
        election_id: election.id,
        npc_id: winner.npc_id,
    });
    output.mutations.push(Mutation::AppointRoleHolder {
        role_id: election.seat_role_id,
        npc_id: winner.npc_id,
    });
    output.mutations.push(Mutation::SetElectionStatus {
        election_id: election.id,
        to: EventStatus::Completed,
    });
    let name = world
        .npcs
        .get(&winner.npc_id)
        .map(|n| n.name.as_str())
        .unwrap_or("unknown");
    output.log.push(LogEntry::with_data(
        tick,
        NAME,
        format!("{} wins the election for {}", name, election.location),
        json!({
            "type": "election_decided",
            "election_id": election.id,
            "winner": winner.npc_id,
        }),
    ));
}
