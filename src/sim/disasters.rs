use rand::Rng;
use serde_json::json;

use crate::error::HandlerError;
use crate::model::{LogEntry, Mutation, Season, TickId, Village, WorldState};

use super::calendar::season_began;
use super::context::HandlerContext;
use super::handler::{Domain, HandlerOutput, TickHandler};

/// Seasonal events for settlements: the autumn harvest, winter storms, and
/// the week-to-week chance of fire or flood. A village knocked below the
/// abandonment threshold empties out and stops ticking.
pub struct DisasterHandler;

pub const NAME: &str = "disasters";

impl TickHandler for DisasterHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reads(&self) -> &'static [Domain] {
        &[Domain::Calendar, Domain::Villages]
    }

    fn writes(&self) -> &'static [Domain] {
        &[Domain::Villages]
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
        let harvest_week = season_began(world, tick, Season::Autumn);
        for village in world.villages.values() {
            if village.is_active() {
                tick_village(tick, world, ctx, village, harvest_week, &mut output);
            }
        }
        Ok(output)
    }
}

fn tick_village(
    tick: TickId,
    world: &WorldState,
    ctx: &HandlerContext,
    village: &Village,
    harvest_week: bool,
    output: &mut HandlerOutput,
) {
    let cfg = &ctx.config.disaster;

    if harvest_week {
        let yield_total = village.population as i64 * cfg.harvest_yield_per_pop;
        if yield_total > 0 {
            output.mutations.push(Mutation::AdjustGranary {
                village_id: village.id,
                delta: yield_total,
            });
            output.log.push(LogEntry::with_data(
                tick,
                NAME,
                format!("{} brings in a harvest of {}", village.name, yield_total),
                json!({ "type": "harvest", "village_id": village.id, "amount": yield_total }),
            ));
        }
    }

    let mut rng = ctx.entity_rng(tick, village.id);
    let winter = world.date.season() == Season::Winter;
    let mut pop_loss = 0u32;

    if winter && rng.random_bool(cfg.winter_storm_chance.clamp(0.0, 1.0)) {
        let spoiled = spoilage(village.granary, cfg.flood_granary_loss);
        if spoiled > 0 {
            output.mutations.push(Mutation::AdjustGranary {
                village_id: village.id,
                delta: -spoiled,
            });
        }
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!("a storm buries {} in snow", village.name),
            json!({ "type": "winter_storm", "village_id": village.id, "spoiled": spoiled }),
        ));
    } else if rng.random_bool(cfg.base_chance.clamp(0.0, 1.0)) {
        if rng.random_bool(0.5) {
            // Fire.
            pop_loss = ((village.population as f64 * cfg.fire_pop_loss).ceil() as u32)
                .min(village.population);
            if pop_loss > 0 {
                output.mutations.push(Mutation::AdjustVillagePopulation {
                    village_id: village.id,
                    delta: -(pop_loss as i64),
                });
            }
            output.log.push(LogEntry::with_data(
                tick,
                NAME,
                format!("fire sweeps through {}, {} dead", village.name, pop_loss),
                json!({ "type": "fire", "village_id": village.id, "dead": pop_loss }),
            ));
        } else {
            let spoiled = spoilage(village.granary, cfg.flood_granary_loss);
            if spoiled > 0 {
                output.mutations.push(Mutation::AdjustGranary {
                    village_id: village.id,
                    delta: -spoiled,
                });
            }
            output.log.push(LogEntry::with_data(
                tick,
                NAME,
                format!("flood waters ruin {}'s stores", village.name),
                json!({ "type": "flood", "village_id": village.id, "spoiled": spoiled }),
            ));
        }
    }

    if village.population - pop_loss <= cfg.abandon_threshold {
        output.mutations.push(Mutation::SetVillageAbandoned {
            village_id: village.id,
        });
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!("the last families leave {}", village.name),
            json!({ "type": "village_abandoned", "village_id": village.id }),
        ));
    }
}

fn spoilage(granary: i64, fraction: f64) -> i64 {
    ((granary as f64 * fraction.clamp(0.0, 1.0)).floor() as i64).clamp(0, granary)
}
