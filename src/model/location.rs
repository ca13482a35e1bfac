use std::fmt;

use serde::{Deserialize, Serialize};

/// Typed reference to a place in the feudal hierarchy.
///
/// Replaces the stringly-typed `location_type` + `location_id` pair: every
/// consumer matches exhaustively, so adding a tier is a compile error at
/// each use site instead of a silent fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LocationRef {
    Village(u64),
    Town(u64),
    Barony(u64),
    Duchy(u64),
    Kingdom(u64),
}

impl LocationRef {
    pub fn id(self) -> u64 {
        match self {
            LocationRef::Village(id)
            | LocationRef::Town(id)
            | LocationRef::Barony(id)
            | LocationRef::Duchy(id)
            | LocationRef::Kingdom(id) => id,
        }
    }

    pub fn kind_str(self) -> &'static str {
        match self {
            LocationRef::Village(_) => "village",
            LocationRef::Town(_) => "town",
            LocationRef::Barony(_) => "barony",
            LocationRef::Duchy(_) => "duchy",
            LocationRef::Kingdom(_) => "kingdom",
        }
    }

    /// True for the settlement tiers that hold resident populations.
    pub fn is_settlement(self) -> bool {
        matches!(self, LocationRef::Village(_) | LocationRef::Town(_))
    }
}

impl fmt::Display for LocationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind_str(), self.id())
    }
}
