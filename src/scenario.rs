//! Hand-built starting worlds for the binary and the integration tests.

use crate::model::{
    Army, Ballot, Candidate, Election, EventStatus, LocationRef, Npc, Outbreak, OutbreakStatus,
    PlayerRole, Sex, Siege, TaxCollection, TickId, Treasury, Village, WorldDate, WorldState,
};

/// Thin construction layer over `WorldState`. Every method hands back the
/// new entity's ID so scenarios can wire relations as they go.
pub struct ScenarioBuilder {
    world: WorldState,
}

impl ScenarioBuilder {
    pub fn new(seed: u64) -> Self {
        Self {
            world: WorldState::new(seed),
        }
    }

    pub fn starting_date(mut self, date: WorldDate) -> Self {
        self.world.date = date;
        self
    }

    pub fn village(
        &mut self,
        name: &str,
        liege: Option<LocationRef>,
        population: u32,
        granary: i64,
    ) -> u64 {
        let id = self.world.next_id();
        self.world.villages.insert(
            id,
            Village {
                id,
                name: name.to_string(),
                liege,
                population,
                granary,
                morale: 0.5,
                abandoned: None,
            },
        );
        id
    }

    pub fn npc(&mut self, name: &str, village_id: u64, sex: Sex, born_year: u32) -> u64 {
        let id = self.world.next_id();
        self.world.npcs.insert(
            id,
            Npc {
                id,
                name: name.to_string(),
                village_id,
                sex,
                born_year,
                spouse: None,
                mother: None,
                father: None,
                last_birth_tick: None,
                infection: None,
                immune: Vec::new(),
                died: None,
            },
        );
        id
    }

    pub fn married_pair(
        &mut self,
        wife_name: &str,
        husband_name: &str,
        village_id: u64,
        born_year: u32,
    ) -> (u64, u64) {
        let wife = self.npc(wife_name, village_id, Sex::Female, born_year);
        let husband = self.npc(husband_name, village_id, Sex::Male, born_year);
        self.world.npcs.get_mut(&wife).unwrap().spouse = Some(husband);
        self.world.npcs.get_mut(&husband).unwrap().spouse = Some(wife);
        (wife, husband)
    }

    pub fn treasury(&mut self, location: LocationRef, balance: i64) {
        self.world.treasuries.insert(
            location,
            Treasury {
                location,
                balance,
                allow_negative: false,
            },
        );
    }

    /// A treasury permitted to run a war debt.
    pub fn war_treasury(&mut self, location: LocationRef, balance: i64) {
        self.world.treasuries.insert(
            location,
            Treasury {
                location,
                balance,
                allow_negative: true,
            },
        );
    }

    pub fn role(&mut self, title: &str, location: LocationRef, salary: i64) -> u64 {
        let id = self.world.next_id();
        self.world.roles.insert(
            id,
            PlayerRole {
                id,
                title: title.to_string(),
                location,
                holder_npc_id: None,
                salary,
                active: true,
            },
        );
        id
    }

    pub fn election(
        &mut self,
        seat_role_id: u64,
        location: LocationRef,
        voting_starts_tick: TickId,
        voting_ends_tick: TickId,
        quorum_required: u32,
    ) -> u64 {
        let id = self.world.next_id();
        self.world.elections.insert(
            id,
            Election {
                id,
                seat_role_id,
                location,
                status: EventStatus::Pending,
                voting_starts_tick,
                voting_ends_tick,
                quorum_required,
                candidates: Vec::new(),
                ballots: Vec::new(),
                winner_npc_id: None,
                decided_tick: None,
            },
        );
        id
    }

    pub fn candidate(&mut self, election_id: u64, npc_id: u64, declared_at: i64) {
        if let Some(election) = self.world.elections.get_mut(&election_id) {
            election.candidates.push(Candidate { npc_id, declared_at });
        }
    }

    pub fn ballot(&mut self, election_id: u64, voter_npc_id: u64, candidate_npc_id: u64) {
        if let Some(election) = self.world.elections.get_mut(&election_id) {
            election.ballots.push(Ballot {
                voter_npc_id,
                candidate_npc_id,
            });
        }
    }

    pub fn outbreak(
        &mut self,
        name: &str,
        location: LocationRef,
        spread_rate: f64,
        mortality_rate: f64,
        recovery_rate: f64,
    ) -> u64 {
        let id = self.world.next_id();
        self.world.outbreaks.insert(
            id,
            Outbreak {
                id,
                name: name.to_string(),
                location,
                status: OutbreakStatus::Emerging,
                spread_rate,
                mortality_rate,
                recovery_rate,
                infected: 0,
                recovered: 0,
                deaths: 0,
                started_tick: 0,
                ended_tick: None,
            },
        );
        id
    }

    pub fn infect(&mut self, npc_id: u64, outbreak_id: u64) {
        if let Some(npc) = self.world.npcs.get_mut(&npc_id) {
            npc.infection = Some(crate::model::Infection {
                outbreak_id,
                weeks_infected: 0,
            });
        }
    }

    pub fn army(&mut self, name: &str, owner: LocationRef, strength: u32) -> u64 {
        let id = self.world.next_id();
        self.world.armies.insert(
            id,
            Army {
                id,
                name: name.to_string(),
                owner,
                strength,
                morale: 0.7,
                disbanded: None,
            },
        );
        id
    }

    pub fn siege(&mut self, army_id: u64, target_village_id: u64, supplies_weeks: u32) -> u64 {
        let id = self.world.next_id();
        self.world.sieges.insert(
            id,
            Siege {
                id,
                army_id,
                target_village_id,
                status: EventStatus::Pending,
                started_tick: 1,
                supplies_weeks,
                resolved_tick: None,
            },
        );
        id
    }

    pub fn accrue_tax(&mut self, location: LocationRef, amount: i64, accrued_tick: TickId) -> u64 {
        let id = self.world.next_id();
        self.world.tax_collections.insert(
            id,
            TaxCollection {
                id,
                location,
                amount,
                accrued_tick,
                collected: false,
            },
        );
        id
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn build(self) -> WorldState {
        self.world
    }
}

/// A small barony used by the binary when no checkpoint exists yet: two
/// villages under one barony, a salaried mayor seat with a scheduled
/// election, an emerging outbreak, and a besieging army at the gates.
pub fn demo_world(seed: u64) -> WorldState {
    let mut b = ScenarioBuilder::new(seed);
    let barony = LocationRef::Barony(1);

    let thornmead = b.village("Thornmead", Some(barony), 240, 900);
    let ashford = b.village("Ashford", Some(barony), 130, 400);
    b.treasury(barony, 1_000);
    b.treasury(LocationRef::Village(thornmead), 250);

    let (edda, _bram) = b.married_pair("Edda", "Bram", thornmead, 0);
    let (maren, _osric) = b.married_pair("Maren", "Osric", thornmead, 0);
    let hilde = b.npc("Hilde", ashford, Sex::Female, 0);
    let garrick = b.npc("Garrick", ashford, Sex::Male, 0);

    let mayor = b.role("Mayor of Thornmead", LocationRef::Village(thornmead), 25);
    let election = b.election(mayor, LocationRef::Village(thornmead), 2, 6, 2);
    b.candidate(election, edda, 100);
    b.candidate(election, maren, 200);
    b.ballot(election, hilde, edda);
    b.ballot(election, garrick, edda);

    let fever = b.outbreak("grey fever", LocationRef::Village(ashford), 0.6, 0.05, 0.2);
    b.infect(hilde, fever);

    let host = b.army("Host of the Red Duke", LocationRef::Duchy(9), 400);
    b.siege(host, ashford, 20);

    b.accrue_tax(barony, 300, 0);
    b.build()
}
