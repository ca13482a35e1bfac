use serde_json::json;

use crate::error::HandlerError;
use crate::model::{EventStatus, LogEntry, Mutation, Siege, TickId, WorldState};

use super::context::HandlerContext;
use super::handler::{Domain, HandlerOutput, TickHandler};

/// Grinds active sieges forward one week: attacker attrition, defender
/// losses, and the supply countdown. A siege ends when the town's supplies
/// run out (it falls to the attacker) or the besieging army wastes away
/// below fighting strength (the siege lifts).
pub struct SiegeHandler;

pub const NAME: &str = "siege";

impl TickHandler for SiegeHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reads(&self) -> &'static [Domain] {
        &[Domain::Sieges, Domain::Armies, Domain::Villages]
    }

    fn writes(&self) -> &'static [Domain] {
        &[Domain::Sieges, Domain::Armies, Domain::Villages]
    }

    fn after(&self) -> &'static [&'static str] {
        &[super::lifecycle::NAME]
    }

    fn handle(
        &self,
        tick: TickId,
        world: &WorldState,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let mut output = HandlerOutput::new();
        for siege in world.sieges.values() {
            match siege.status {
                EventStatus::Pending if tick >= siege.started_tick => {
                    output.mutations.push(Mutation::SetSiegeStatus {
                        siege_id: siege.id,
                        to: EventStatus::Open,
                    });
                    output.log.push(LogEntry::with_data(
                        tick,
                        NAME,
                        format!("siege laid against village {}", siege.target_village_id),
                        json!({ "type": "siege_begun", "siege_id": siege.id }),
                    ));
                }
                EventStatus::Open => grind(tick, world, ctx, siege, &mut output),
                _ => {}
            }
        }
        Ok(output)
    }
}

fn grind(
    tick: TickId,
    world: &WorldState,
    ctx: &HandlerContext,
    siege: &Siege,
    output: &mut HandlerOutput,
) {
    let cfg = &ctx.config.siege;
    let army = world.armies.get(&siege.army_id).filter(|a| a.disbanded.is_none());

    // The besieging army is gone: the siege lifts by default.
    let Some(army) = army else {
        close(siege.id, EventStatus::Failed, output);
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!("siege {} collapses, the army is gone", siege.id),
            json!({ "type": "siege_lifted", "siege_id": siege.id }),
        ));
        return;
    };

    let attacker_loss =
        ((army.strength as f64 * cfg.attacker_attrition).ceil() as u32).min(army.strength);
    if attacker_loss > 0 {
        output.mutations.push(Mutation::AdjustArmyStrength {
            army_id: army.id,
            delta: -(attacker_loss as i64),
        });
    }
    let strength_after = army.strength - attacker_loss;

    if let Some(village) = world.villages.get(&siege.target_village_id) {
        let defender_loss = ((village.population as f64 * cfg.defender_pop_loss).ceil() as u32)
            .min(village.population);
        if defender_loss > 0 {
            output.mutations.push(Mutation::AdjustVillagePopulation {
                village_id: village.id,
                delta: -(defender_loss as i64),
            });
        }
    }

    let supplies_after = siege.supplies_weeks.saturating_sub(1);
    output.mutations.push(Mutation::SetSiegeSupplies {
        siege_id: siege.id,
        weeks: supplies_after,
    });

    if supplies_after == 0 {
        // Starved out: the settlement yields and changes hands.
        close(siege.id, EventStatus::Completed, output);
        output.mutations.push(Mutation::SetVillageLiege {
            village_id: siege.target_village_id,
            liege: army.owner,
        });
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!("village {} falls to {}", siege.target_village_id, army.name),
            json!({ "type": "siege_fallen", "siege_id": siege.id, "new_liege": army.owner.to_string() }),
        ));
    } else if strength_after <= cfg.lift_strength {
        close(siege.id, EventStatus::Failed, output);
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!("{} breaks off the siege of village {}", army.name, siege.target_village_id),
            json!({ "type": "siege_lifted", "siege_id": siege.id }),
        ));
    }

    if strength_after == 0 {
        output.mutations.push(Mutation::SetArmyDisbanded { army_id: army.id });
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!("{} disbands", army.name),
            json!({ "type": "army_disbanded", "army_id": army.id }),
        ));
    }
}

fn close(siege_id: u64, outcome: EventStatus, output: &mut HandlerOutput) {
    output.mutations.push(Mutation::SetSiegeStatus {
        siege_id,
        to: EventStatus::Closed,
    });
    output.mutations.push(Mutation::SetSiegeStatus {
        siege_id,
        to: outcome,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::model::{Army, LocationRef, Village};

    fn world_with_siege(strength: u32, supplies: u32) -> WorldState {
        let mut world = WorldState::new(0);
        world.villages.insert(
            1,
            Village {
                id: 1,
                name: "Thornmead".to_string(),
                liege: Some(LocationRef::Barony(3)),
                population: 100,
                granary: 500,
                morale: 0.5,
                abandoned: None,
            },
        );
        world.armies.insert(
            20,
            Army {
                id: 20,
                name: "Host of the Red Duke".to_string(),
                owner: LocationRef::Duchy(9),
                strength,
                morale: 0.7,
                disbanded: None,
            },
        );
        world.sieges.insert(
            30,
            Siege {
                id: 30,
                army_id: 20,
                target_village_id: 1,
                status: EventStatus::Open,
                started_tick: 1,
                supplies_weeks: supplies,
                resolved_tick: None,
            },
        );
        world
    }

    fn run(world: &WorldState, tick: TickId) -> HandlerOutput {
        let config = SimConfig::default();
        let ctx = HandlerContext {
            config: &config,
            seed: world.seed,
        };
        SiegeHandler.handle(tick, world, &ctx).unwrap()
    }

    #[test]
    fn pending_siege_opens() {
        let mut world = world_with_siege(500, 10);
        world.sieges.get_mut(&30).unwrap().status = EventStatus::Pending;
        let output = run(&world, 2);
        assert!(output.mutations.contains(&Mutation::SetSiegeStatus {
            siege_id: 30,
            to: EventStatus::Open,
        }));
    }

    #[test]
    fn weekly_grind_wears_both_sides() {
        let world = world_with_siege(500, 10);
        let output = run(&world, 2);
        // ceil(500 * 0.03) = 15 attackers, ceil(100 * 0.02) = 2 defenders.
        assert!(output.mutations.contains(&Mutation::AdjustArmyStrength {
            army_id: 20,
            delta: -15,
        }));
        assert!(output.mutations.contains(&Mutation::AdjustVillagePopulation {
            village_id: 1,
            delta: -2,
        }));
        assert!(output.mutations.contains(&Mutation::SetSiegeSupplies {
            siege_id: 30,
            weeks: 9,
        }));
        assert!(!output
            .mutations
            .iter()
            .any(|m| matches!(m, Mutation::SetSiegeStatus { .. })));
    }

    #[test]
    fn starved_village_falls_and_changes_liege() {
        let world = world_with_siege(500, 1);
        let output = run(&world, 2);
        assert!(output.mutations.contains(&Mutation::SetSiegeStatus {
            siege_id: 30,
            to: EventStatus::Completed,
        }));
        assert!(output.mutations.contains(&Mutation::SetVillageLiege {
            village_id: 1,
            liege: LocationRef::Duchy(9),
        }));
    }

    #[test]
    fn weakened_army_lifts_the_siege() {
        // 103 - ceil(103 * 0.03) = 99, at or under the default lift
        // strength of 100.
        let world = world_with_siege(103, 10);
        let output = run(&world, 2);
        assert!(output.mutations.contains(&Mutation::SetSiegeStatus {
            siege_id: 30,
            to: EventStatus::Failed,
        }));
        assert!(!output
            .mutations
            .iter()
            .any(|m| matches!(m, Mutation::SetVillageLiege { .. })));
    }

    #[test]
    fn missing_army_fails_the_siege() {
        let mut world = world_with_siege(500, 10);
        world.armies.get_mut(&20).unwrap().disbanded = Some(1);
        let output = run(&world, 2);
        assert!(output.mutations.contains(&Mutation::SetSiegeStatus {
            siege_id: 30,
            to: EventStatus::Failed,
        }));
    }

    #[test]
    fn resolved_sieges_are_inert() {
        let mut world = world_with_siege(500, 10);
        world.sieges.get_mut(&30).unwrap().status = EventStatus::Completed;
        assert!(run(&world, 2).is_empty());
    }
}
