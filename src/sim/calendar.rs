use serde_json::json;

use crate::error::HandlerError;
use crate::model::{LogEntry, Mutation, Season, TickId, WorldState};

use super::context::HandlerContext;
use super::handler::{Domain, HandlerOutput, TickHandler};

/// Advances the world date one week per tick. Runs first: downstream
/// handlers read the new date and the season-change entries it logs.
pub struct CalendarHandler;

pub const NAME: &str = "calendar";

impl TickHandler for CalendarHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reads(&self) -> &'static [Domain] {
        &[Domain::Calendar]
    }

    fn writes(&self) -> &'static [Domain] {
        &[Domain::Calendar]
    }

    fn handle(
        &self,
        tick: TickId,
        world: &WorldState,
        _ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let from = world.date;
        let to = from.next();
        let mut output = HandlerOutput::new();
        output.mutations.push(Mutation::SetDate { to });

        if to.season() != from.season() {
            output.log.push(LogEntry::with_data(
                tick,
                NAME,
                format!("{} begins", to.season().as_str()),
                json!({
                    "type": "season_changed",
                    "season": to.season().as_str(),
                    "year": to.year(),
                }),
            ));
        }
        if to.year() != from.year() {
            output.log.push(LogEntry::with_data(
                tick,
                NAME,
                format!("year {} begins", to.year()),
                json!({ "type": "year_turned", "year": to.year() }),
            ));
        }
        Ok(output)
    }
}

/// True if the calendar logged a change into `season` during `tick`.
pub fn season_began(world: &WorldState, tick: TickId, season: Season) -> bool {
    world.log_for_tick(tick).any(|entry| {
        entry.handler == NAME
            && entry.data_type() == Some("season_changed")
            && entry.data["season"] == season.as_str()
    })
}
