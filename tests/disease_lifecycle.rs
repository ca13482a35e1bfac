use realm_tick::model::{LocationRef, OutbreakStatus, Sex};
use realm_tick::scenario::ScenarioBuilder;
use realm_tick::testutil::{advance_to, anchor, standard_scheduler};
use realm_tick::SimConfig;

/// One village, one outbreak seeded into a handful of residents.
fn plague_village(seed: u64, residents: u32, initial_cases: u32) -> realm_tick::WorldState {
    let mut b = ScenarioBuilder::new(seed);
    let village = b.village("Caerwick", None, residents, 100_000);
    let mut npcs = Vec::new();
    for i in 0..residents {
        let sex = if i % 2 == 0 { Sex::Female } else { Sex::Male };
        npcs.push(b.npc(&format!("resident-{i}"), village, sex, 0));
    }
    let outbreak = b.outbreak("red pox", LocationRef::Village(village), 0.9, 0.08, 0.15);
    for &npc in npcs.iter().take(initial_cases as usize) {
        b.infect(npc, outbreak);
    }
    b.build()
}

#[test]
fn outbreak_runs_its_course_and_ends() {
    let config = SimConfig::default();
    let mut scheduler = standard_scheduler(config.clone());
    let mut world = plague_village(21, 60, 5);
    anchor(&mut scheduler, &mut world);

    // Two in-game years is far beyond any plausible epidemic length at
    // these rates; every carrier has long since died or recovered.
    let mut tick = 0;
    while tick < 96 {
        tick += config.max_ticks_per_call as u64;
        advance_to(&mut scheduler, &mut world, &config, tick);
    }

    let outbreak = world.outbreaks.values().next().unwrap();
    assert_eq!(outbreak.status, OutbreakStatus::Ended);
    assert!(outbreak.ended_tick.is_some());
    assert_eq!(outbreak.infected, 0);
    assert!(world.npcs.values().all(|n| n.infection.is_none()));
    // The aggregate counters reconcile with the roster.
    let dead = world.npcs.values().filter(|n| !n.is_alive()).count() as u32;
    assert!(outbreak.deaths <= dead, "plague deaths exceed total deaths");
    assert!(outbreak.deaths + outbreak.recovered >= 5, "initial cases unresolved");
}

#[test]
fn dead_carriers_never_keep_spreading() {
    let config = SimConfig::default();
    let mut scheduler = standard_scheduler(config.clone());
    let mut world = plague_village(22, 30, 3);
    anchor(&mut scheduler, &mut world);
    advance_to(&mut scheduler, &mut world, &config, 12);

    for npc in world.npcs.values() {
        if !npc.is_alive() {
            assert!(npc.infection.is_none(), "dead npc still marked infected");
        }
    }
}

#[test]
fn ended_outbreak_stays_ended() {
    let config = SimConfig::default();
    let mut scheduler = standard_scheduler(config.clone());
    let mut world = plague_village(23, 20, 2);
    anchor(&mut scheduler, &mut world);

    let mut tick = 0;
    while tick < 96 {
        tick += config.max_ticks_per_call as u64;
        advance_to(&mut scheduler, &mut world, &config, tick);
    }
    let ended_at = world.outbreaks.values().next().unwrap().ended_tick;
    assert!(ended_at.is_some());

    advance_to(&mut scheduler, &mut world, &config, 120);
    assert_eq!(world.outbreaks.values().next().unwrap().ended_tick, ended_at);
}
