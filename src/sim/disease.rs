use rand::Rng;
use serde_json::json;

use crate::error::HandlerError;
use crate::model::{LogEntry, Mutation, Npc, Outbreak, OutbreakStatus, TickId, WorldState};

use super::context::HandlerContext;
use super::handler::{Domain, HandlerOutput, TickHandler};

/// Progresses active outbreaks one week: infected residents roll mortality
/// then recovery, susceptible residents roll infection, and the outbreak's
/// status moves forward along Emerging -> Active -> Declining -> Ended.
pub struct DiseaseHandler;

pub const NAME: &str = "disease";

impl TickHandler for DiseaseHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reads(&self) -> &'static [Domain] {
        &[Domain::Npcs, Domain::Outbreaks, Domain::Villages]
    }

    fn writes(&self) -> &'static [Domain] {
        &[Domain::Npcs, Domain::Outbreaks]
    }

    fn after(&self) -> &'static [&'static str] {
        &[super::calendar::NAME]
    }

    fn handle(
        &self,
        tick: TickId,
        world: &WorldState,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let mut output = HandlerOutput::new();
        for outbreak in world.outbreaks.values() {
            if outbreak.status != OutbreakStatus::Ended {
                progress_outbreak(tick, world, ctx, outbreak, &mut output);
            }
        }
        Ok(output)
    }
}

fn progress_outbreak(
    tick: TickId,
    world: &WorldState,
    ctx: &HandlerContext,
    outbreak: &Outbreak,
    output: &mut HandlerOutput,
) {
    let residents = world.living_npcs_at(outbreak.location);
    let population = residents.len();
    let (carriers, susceptible): (Vec<&Npc>, Vec<&Npc>) = residents
        .into_iter()
        .partition(|npc| matches!(&npc.infection, Some(i) if i.outbreak_id == outbreak.id));
    // Carriers of some other disease and the recovered-immune are out of
    // the susceptible pool.
    let susceptible: Vec<&Npc> = susceptible
        .into_iter()
        .filter(|npc| npc.infection.is_none() && !npc.immune.contains(&outbreak.id))
        .collect();

    let mut deaths = 0u32;
    let mut recovered = 0u32;
    for npc in &carriers {
        let mut rng = ctx.entity_rng(tick, npc.id);
        if rng.random_bool(outbreak.mortality_rate.clamp(0.0, 1.0)) {
            deaths += 1;
            output.mutations.push(Mutation::KillNpc {
                npc_id: npc.id,
                cause: outbreak.name.clone(),
            });
            output.log.push(LogEntry::with_data(
                tick,
                NAME,
                format!("{} dies of {}", npc.name, outbreak.name),
                json!({ "type": "plague_death", "npc_id": npc.id, "outbreak_id": outbreak.id }),
            ));
        } else if rng.random_bool(outbreak.recovery_rate.clamp(0.0, 1.0)) {
            recovered += 1;
            output.mutations.push(Mutation::RecoverNpc { npc_id: npc.id });
        } else {
            output
                .mutations
                .push(Mutation::ProgressInfection { npc_id: npc.id });
        }
    }

    let mut new_infections = 0u32;
    if population > 0 && !carriers.is_empty() {
        let pressure =
            (outbreak.spread_rate * carriers.len() as f64 / population as f64).clamp(0.0, 1.0);
        for npc in &susceptible {
            let mut rng = ctx.entity_rng(tick, npc.id);
            if rng.random_bool(pressure) {
                new_infections += 1;
                output.mutations.push(Mutation::InfectNpc {
                    npc_id: npc.id,
                    outbreak_id: outbreak.id,
                });
            }
        }
    }

    let active_after = carriers.len() as u32 - deaths - recovered + new_infections;
    if deaths > 0 || recovered > 0 || new_infections > 0 {
        output.mutations.push(Mutation::SetOutbreakCounts {
            outbreak_id: outbreak.id,
            infected: active_after,
            recovered: outbreak.recovered + recovered,
            deaths: outbreak.deaths + deaths,
        });
    }

    let next_status = if active_after == 0 {
        OutbreakStatus::Ended
    } else if active_after >= ctx.config.disease.active_threshold {
        OutbreakStatus::Active
    } else if outbreak.status >= OutbreakStatus::Active
        && active_after <= ctx.config.disease.declining_threshold
    {
        OutbreakStatus::Declining
    } else {
        outbreak.status
    };
    if outbreak.status.can_advance_to(next_status) {
        output.mutations.push(Mutation::SetOutbreakStatus {
            outbreak_id: outbreak.id,
            to: next_status,
        });
        if next_status == OutbreakStatus::Ended {
            output.log.push(LogEntry::with_data(
                tick,
                NAME,
                format!("{} burns out in {}", outbreak.name, outbreak.location),
                json!({ "type": "outbreak_ended", "outbreak_id": outbreak.id }),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::model::{Infection, LocationRef, Sex, Village};

    fn village_world(population: usize) -> WorldState {
        let mut world = WorldState::new(99);
        world.villages.insert(
            1,
            Village {
                id: 1,
                name: "Thornmead".to_string(),
                liege: None,
                population: population as u32,
                granary: 1000,
                morale: 0.5,
                abandoned: None,
            },
        );
        for i in 0..population {
            let id = world.next_id();
            world.npcs.insert(
                id,
                Npc {
                    id,
                    name: format!("npc-{i}"),
                    village_id: 1,
                    sex: if i % 2 == 0 { Sex::Female } else { Sex::Male },
                    born_year: 0,
                    spouse: None,
                    mother: None,
                    father: None,
                    last_birth_tick: None,
                    infection: None,
                    immune: Vec::new(),
                    died: None,
                },
            );
        }
        world
    }

    fn outbreak(status: OutbreakStatus) -> Outbreak {
        Outbreak {
            id: 50,
            name: "grey fever".to_string(),
            location: LocationRef::Village(1),
            status,
            spread_rate: 0.8,
            mortality_rate: 0.1,
            recovery_rate: 0.2,
            infected: 0,
            recovered: 0,
            deaths: 0,
            started_tick: 1,
            ended_tick: None,
        }
    }

    fn infect(world: &mut WorldState, count: usize) {
        let ids: Vec<u64> = world.npcs.keys().copied().take(count).collect();
        for id in ids {
            world.npcs.get_mut(&id).unwrap().infection = Some(Infection {
                outbreak_id: 50,
                weeks_infected: 1,
            });
        }
    }

    fn run(world: &WorldState, tick: TickId) -> HandlerOutput {
        let config = SimConfig::default();
        let ctx = HandlerContext {
            config: &config,
            seed: world.seed,
        };
        DiseaseHandler.handle(tick, world, &ctx).unwrap()
    }

    #[test]
    fn ended_outbreak_is_inert() {
        let mut world = village_world(10);
        world.outbreaks.insert(50, outbreak(OutbreakStatus::Ended));
        infect(&mut world, 0);
        assert!(run(&world, 5).is_empty());
    }

    #[test]
    fn every_carrier_gets_exactly_one_roll_outcome() {
        let mut world = village_world(20);
        world.outbreaks.insert(50, outbreak(OutbreakStatus::Active));
        infect(&mut world, 8);
        let output = run(&world, 5);
        let per_carrier = output
            .mutations
            .iter()
            .filter(|m| {
                matches!(
                    m,
                    Mutation::KillNpc { .. }
                        | Mutation::RecoverNpc { .. }
                        | Mutation::ProgressInfection { .. }
                )
            })
            .count();
        assert_eq!(per_carrier, 8);
    }

    #[test]
    fn no_carriers_means_no_spread() {
        let mut world = village_world(20);
        world.outbreaks.insert(50, outbreak(OutbreakStatus::Emerging));
        let output = run(&world, 5);
        assert!(!output
            .mutations
            .iter()
            .any(|m| matches!(m, Mutation::InfectNpc { .. })));
    }

    #[test]
    fn outbreak_with_certain_mortality_ends_when_last_carrier_dies() {
        let mut world = village_world(3);
        let mut o = outbreak(OutbreakStatus::Declining);
        o.mortality_rate = 1.0;
        o.spread_rate = 0.0;
        world.outbreaks.insert(50, o);
        infect(&mut world, 3);
        let output = run(&world, 5);
        assert!(output.mutations.contains(&Mutation::SetOutbreakStatus {
            outbreak_id: 50,
            to: OutbreakStatus::Ended,
        }));
        assert_eq!(
            output
                .mutations
                .iter()
                .filter(|m| matches!(m, Mutation::KillNpc { .. }))
                .count(),
            3
        );
    }

    #[test]
    fn recovered_npcs_are_immune_to_reinfection() {
        let mut world = village_world(10);
        let mut o = outbreak(OutbreakStatus::Active);
        o.spread_rate = 10.0; // certain infection for anyone susceptible
        world.outbreaks.insert(50, o);
        infect(&mut world, 2);
        for npc in world.npcs.values_mut().skip(2) {
            npc.immune.push(50);
        }
        let output = run(&world, 5);
        assert!(!output
            .mutations
            .iter()
            .any(|m| matches!(m, Mutation::InfectNpc { .. })));
    }

    #[test]
    fn rerun_of_same_tick_is_identical() {
        let mut world = village_world(30);
        world.outbreaks.insert(50, outbreak(OutbreakStatus::Active));
        infect(&mut world, 12);
        let a = run(&world, 7);
        let b = run(&world, 7);
        assert_eq!(a.mutations, b.mutations);
    }

    #[test]
    fn status_never_moves_backward() {
        let mut world = village_world(30);
        let mut o = outbreak(OutbreakStatus::Declining);
        // Sterile but persistent: carriers neither die nor recover.
        o.mortality_rate = 0.0;
        o.recovery_rate = 0.0;
        o.spread_rate = 10.0;
        world.outbreaks.insert(50, o);
        infect(&mut world, 12);
        let output = run(&world, 7);
        assert!(!output.mutations.iter().any(|m| matches!(
            m,
            Mutation::SetOutbreakStatus {
                to: OutbreakStatus::Active,
                ..
            }
        )));
    }
}
