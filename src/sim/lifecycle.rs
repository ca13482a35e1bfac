use rand::Rng;
use serde_json::json;

use crate::config::LifecycleConfig;
use crate::error::HandlerError;
use crate::model::{LogEntry, Mutation, Npc, NpcSeed, Sex, TickId, Village, WorldState};

use super::context::HandlerContext;
use super::handler::{Domain, HandlerOutput, TickHandler};

/// Weekly births, deaths, and granary consumption. Runs after disease and
/// disasters so its mortality rolls see the week's plague deaths and ruined
/// granaries.
pub struct LifecycleHandler;

pub const NAME: &str = "lifecycle";

impl TickHandler for LifecycleHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reads(&self) -> &'static [Domain] {
        &[Domain::Calendar, Domain::Villages, Domain::Npcs]
    }

    fn writes(&self) -> &'static [Domain] {
        &[Domain::Npcs, Domain::Villages]
    }

    fn after(&self) -> &'static [&'static str] {
        &[super::disease::NAME, super::disasters::NAME]
    }

    fn handle(
        &self,
        tick: TickId,
        world: &WorldState,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let mut output = HandlerOutput::new();
        for village in world.villages.values() {
            if village.is_active() {
                tick_village(tick, world, ctx, village, &mut output);
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
    output: &mut HandlerOutput,
) {
    let cfg = &ctx.config.lifecycle;
    let residents: Vec<&Npc> = world.living_npcs_in(village.id).collect();

    // --- food ---
    let need = village.population as i64 * cfg.food_per_npc;
    let consumed = need.min(village.granary);
    if consumed > 0 {
        output.mutations.push(Mutation::AdjustGranary {
            village_id: village.id,
            delta: -consumed,
        });
    }
    let starving = village.granary < need;
    if starving {
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!("{} goes hungry", village.name),
            json!({ "type": "famine_week", "village_id": village.id }),
        ));
    }

    // --- deaths and births ---
    // One stream per resident, death roll first so a dead mother cannot
    // also bear a child in the same week.
    let year = world.date.year();
    for npc in &residents {
        let mut rng = ctx.entity_rng(tick, npc.id);
        let age = npc.age_in(year);
        let mut chance = cfg.base_death_chance;
        if age > cfg.elder_age {
            chance += (age - cfg.elder_age) as f64 * cfg.elder_death_chance_per_year;
        }
        let cause = if starving && rng.random_bool(cfg.starvation_death_chance) {
            Some("starvation")
        } else if rng.random_bool(chance.clamp(0.0, 1.0)) {
            Some(if age > cfg.elder_age { "old age" } else { "misfortune" })
        } else {
            None
        };
        if let Some(cause) = cause {
            output.mutations.push(Mutation::KillNpc {
                npc_id: npc.id,
                cause: cause.to_string(),
            });
            output.log.push(LogEntry::with_data(
                tick,
                NAME,
                format!("{} of {} dies of {}", npc.name, village.name, cause),
                json!({ "type": "death", "npc_id": npc.id, "cause": cause }),
            ));
            continue;
        }

        if npc.sex != Sex::Female
            || age < cfg.fertility_min_age
            || age > cfg.fertility_max_age
        {
            continue;
        }
        if let Some(last) = npc.last_birth_tick
            && tick.saturating_sub(last) < cfg.birth_cooldown_weeks
        {
            continue;
        }
        let father = npc
            .spouse
            .and_then(|id| world.npcs.get(&id))
            .filter(|f| f.is_alive());
        let Some(father) = father else {
            continue;
        };
        if !rng.random_bool(cfg.birth_chance.clamp(0.0, 1.0)) {
            continue;
        }
        let sex = if rng.random_bool(0.5) { Sex::Female } else { Sex::Male };
        output.mutations.push(Mutation::SpawnNpc {
            seed: NpcSeed {
                name: child_name(&mut rng, sex),
                village_id: village.id,
                sex,
                born_year: year,
                mother: Some(npc.id),
                father: Some(father.id),
            },
        });
        output.mutations.push(Mutation::SetNpcLastBirth {
            npc_id: npc.id,
            tick,
        });
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!("a child is born to {} in {}", npc.name, village.name),
            json!({ "type": "birth", "mother": npc.id, "father": father.id }),
        ));
    }
}

const FEMALE_NAMES: &[&str] = &[
    "Aelith", "Berta", "Clover", "Edda", "Giselle", "Hilde", "Maren", "Ottilie", "Sable", "Wren",
];
const MALE_NAMES: &[&str] = &[
    "Aldric", "Bram", "Cedric", "Dunstan", "Garrick", "Hob", "Osric", "Rowan", "Tam", "Wilmot",
];

fn child_name(rng: &mut impl Rng, sex: Sex) -> String {
    let pool = match sex {
        Sex::Female => FEMALE_NAMES,
        Sex::Male => MALE_NAMES,
    };
    pool[rng.random_range(0..pool.len())].to_string()
}
