use realm_tick::model::{EventStatus, LocationRef, Sex, WorldState};
use realm_tick::scenario::ScenarioBuilder;
use realm_tick::testutil::{advance_to, anchor, standard_scheduler};
use realm_tick::SimConfig;

struct Seat {
    world: WorldState,
    election: u64,
    role: u64,
    alice: u64,
    bern: u64,
}

/// A village seat with two candidates. Bern declared before Alice, so ties
/// fall to him. `votes` maps each ballot to 'a' or 'b'.
fn seat(quorum: u32, votes: &str) -> Seat {
    let mut b = ScenarioBuilder::new(3);
    let village = b.village("Millbrook", None, 200, 2_000);
    let location = LocationRef::Village(village);
    b.treasury(location, 500);
    let alice = b.npc("Alice", village, Sex::Female, 0);
    let bern = b.npc("Bern", village, Sex::Male, 0);
    let role = b.role("Reeve", location, 15);
    let election = b.election(role, location, 2, 5, quorum);
    b.candidate(election, alice, 500);
    b.candidate(election, bern, 200);
    for vote in votes.chars() {
        let voter = b.npc("voter", village, Sex::Female, 0);
        let candidate = if vote == 'a' { alice } else { bern };
        b.ballot(election, voter, candidate);
    }
    Seat {
        world: b.build(),
        election,
        role,
        alice,
        bern,
    }
}

fn run_to_decision(seat: &mut Seat) {
    let config = SimConfig::default();
    let mut scheduler = standard_scheduler(config.clone());
    anchor(&mut scheduler, &mut seat.world);
    advance_to(&mut scheduler, &mut seat.world, &config, 6);
}

#[test]
fn election_opens_then_completes_with_plurality_winner() {
    let mut seat = seat(2, "aab");
    run_to_decision(&mut seat);

    let election = &seat.world.elections[&seat.election];
    assert_eq!(election.status, EventStatus::Completed);
    assert_eq!(election.winner_npc_id, Some(seat.alice));
    assert!(election.decided_tick.is_some());
    assert_eq!(seat.world.roles[&seat.role].holder_npc_id, Some(seat.alice));
}

#[test]
fn tie_breaks_by_earliest_declaration() {
    let mut seat = seat(2, "ab");
    run_to_decision(&mut seat);

    // One vote each; Bern declared earlier and takes the seat.
    let election = &seat.world.elections[&seat.election];
    assert_eq!(election.winner_npc_id, Some(seat.bern));
    assert_eq!(seat.world.roles[&seat.role].holder_npc_id, Some(seat.bern));
}

#[test]
fn quorum_failure_leaves_the_seat_vacant() {
    let mut seat = seat(3, "a");
    run_to_decision(&mut seat);

    let election = &seat.world.elections[&seat.election];
    assert_eq!(election.status, EventStatus::Failed);
    assert_eq!(election.winner_npc_id, None);
    assert!(election.decided_tick.is_some());
    assert_eq!(seat.world.roles[&seat.role].holder_npc_id, None);
    // A vacant seat pays nobody.
    assert!(seat.world.salary_payments.is_empty());
}

#[test]
fn decided_election_is_never_retallied() {
    let mut seat = seat(2, "ab");
    run_to_decision(&mut seat);
    assert_eq!(
        seat.world.elections[&seat.election].winner_npc_id,
        Some(seat.bern)
    );

    // Late ballots after the decision change nothing on later ticks.
    let alice = seat.alice;
    let election = seat.world.elections.get_mut(&seat.election).unwrap();
    for _ in 0..5 {
        election.ballots.push(realm_tick::model::Ballot {
            voter_npc_id: alice,
            candidate_npc_id: alice,
        });
    }
    let config = SimConfig::default();
    let mut scheduler = standard_scheduler(config.clone());
    // Fresh scheduler over the same world: records carry the history.
    let now_world = &mut seat.world;
    let outcome = scheduler
        .advance_clock(now_world, realm_tick::testutil::at_tick(&config, 12), None)
        .unwrap();
    assert!(outcome.failures.is_empty());
    assert_eq!(
        seat.world.elections[&seat.election].winner_npc_id,
        Some(seat.bern)
    );
}
