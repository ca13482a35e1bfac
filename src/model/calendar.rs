use std::fmt;

use serde::{Deserialize, Serialize};

pub const WEEKS_PER_SEASON: u32 = 12;
pub const SEASONS_PER_YEAR: u32 = 4;
pub const WEEKS_PER_YEAR: u32 = WEEKS_PER_SEASON * SEASONS_PER_YEAR;

const WEEK_BITS: u32 = 4;
const SEASON_BITS: u32 = 2;
const SEASON_SHIFT: u32 = WEEK_BITS;
const YEAR_SHIFT: u32 = WEEK_BITS + SEASON_BITS;

const WEEK_MASK: u32 = (1 << WEEK_BITS) - 1;
const SEASON_MASK: u32 = (1 << SEASON_BITS) - 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    pub fn index(self) -> u32 {
        match self {
            Season::Spring => 0,
            Season::Summer => 1,
            Season::Autumn => 2,
            Season::Winter => 3,
        }
    }

    pub fn from_index(index: u32) -> Self {
        match index & SEASON_MASK {
            0 => Season::Spring,
            1 => Season::Summer,
            2 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    /// The following season; wraps winter back to spring.
    pub fn next(self) -> Self {
        Season::from_index((self.index() + 1) % SEASONS_PER_YEAR)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact in-game date encoding year/season/week in a single `u32`.
///
/// Bit layout: `[year:26][season:2][week:4]`
/// - bits 6-31: year (1–67,108,863)
/// - bits 4-5:  season (spring=0 … winter=3)
/// - bits 0-3:  week of season (1–12)
///
/// Natural `u32` ordering equals chronological ordering, so monotonicity
/// checks are plain integer comparisons.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "DateRepr", from = "DateRepr")]
pub struct WorldDate(u32);

#[derive(Serialize, Deserialize)]
struct DateRepr {
    year: u32,
    season: Season,
    week: u32,
}

impl From<WorldDate> for DateRepr {
    fn from(date: WorldDate) -> Self {
        DateRepr {
            year: date.year(),
            season: date.season(),
            week: date.week(),
        }
    }
}

impl From<DateRepr> for WorldDate {
    fn from(repr: DateRepr) -> Self {
        WorldDate::new(repr.year, repr.season, repr.week)
    }
}

impl WorldDate {
    /// Create a date from year (≥1), season, and week of season (1–12).
    pub fn new(year: u32, season: Season, week: u32) -> Self {
        assert!(year >= 1, "year out of range: {year}");
        assert!(
            (1..=WEEKS_PER_SEASON).contains(&week),
            "week out of range: {week}"
        );
        Self((year << YEAR_SHIFT) | (season.index() << SEASON_SHIFT) | week)
    }

    /// The first week of spring of the given year.
    pub fn start_of_year(year: u32) -> Self {
        Self::new(year, Season::Spring, 1)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn year(self) -> u32 {
        self.0 >> YEAR_SHIFT
    }

    pub fn season(self) -> Season {
        Season::from_index((self.0 >> SEASON_SHIFT) & SEASON_MASK)
    }

    pub fn week(self) -> u32 {
        self.0 & WEEK_MASK
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// The date one week later. Week 12 rolls into the next season; week 12
    /// of winter rolls into spring of the next year.
    pub fn next(self) -> Self {
        let week = self.week();
        if week < WEEKS_PER_SEASON {
            return Self::new(self.year(), self.season(), week + 1);
        }
        match self.season() {
            Season::Winter => Self::new(self.year() + 1, Season::Spring, 1),
            season => Self::new(self.year(), season.next(), 1),
        }
    }

    /// Whole in-game years between two dates, ignoring partial years.
    pub fn years_since(self, earlier: WorldDate) -> u32 {
        self.year().saturating_sub(earlier.year())
    }
}

impl Default for WorldDate {
    fn default() -> Self {
        Self::start_of_year(1)
    }
}

impl fmt::Display for WorldDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Y{} {} W{}", self.year(), self.season(), self.week())
    }
}
