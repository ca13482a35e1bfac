use serde::{Deserialize, Serialize};

/// Tuning knobs for the scheduler and every domain handler.
///
/// All stochastic rates and thresholds live here rather than as hard-coded
/// constants: the exact values are game content, tuned by design, and ship
/// as configuration. Every section has serde defaults so a partial config
/// file only overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Real seconds per simulation tick (one in-game week).
    pub tick_interval_secs: i64,
    /// Catch-up cap per `advance_clock` call; excess ticks are deferred to
    /// the next call, never dropped.
    pub max_ticks_per_call: u32,
    /// Per-handler wall-clock budget. A handler that exceeds it is treated
    /// as failed, not as a hang.
    pub handler_budget_ms: u64,
    /// Consecutive failures before a handler is escalated to the operator.
    pub max_consecutive_failures: u32,
    /// Local retries for transient journal failures before escalating.
    pub transient_retries: u32,

    pub disease: DiseaseConfig,
    pub lifecycle: LifecycleConfig,
    pub disaster: DisasterConfig,
    pub siege: SiegeConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 3600,
            max_ticks_per_call: 24,
            handler_budget_ms: 5_000,
            max_consecutive_failures: 3,
            transient_retries: 2,
            disease: DiseaseConfig::default(),
            lifecycle: LifecycleConfig::default(),
            disaster: DisasterConfig::default(),
            siege: SiegeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiseaseConfig {
    /// Infected count at or above which an emerging outbreak becomes active.
    pub active_threshold: u32,
    /// Infected count at or below which an active outbreak starts declining.
    pub declining_threshold: u32,
}

impl Default for DiseaseConfig {
    fn default() -> Self {
        Self {
            active_threshold: 10,
            declining_threshold: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Weekly death chance for any living NPC.
    pub base_death_chance: f64,
    /// Age (years) past which the elder death chance applies.
    pub elder_age: u32,
    /// Additional weekly death chance per year past `elder_age`.
    pub elder_death_chance_per_year: f64,
    /// Weekly death chance added while the NPC's village granary is empty.
    pub starvation_death_chance: f64,
    /// Inclusive fertility window (years).
    pub fertility_min_age: u32,
    pub fertility_max_age: u32,
    /// Ticks (weeks) a mother must wait between births.
    pub birth_cooldown_weeks: u64,
    /// Weekly birth chance for an eligible married pair.
    pub birth_chance: f64,
    /// Granary units consumed per living NPC per week.
    pub food_per_npc: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            base_death_chance: 0.0004,
            elder_age: 60,
            elder_death_chance_per_year: 0.002,
            starvation_death_chance: 0.02,
            fertility_min_age: 16,
            fertility_max_age: 45,
            birth_cooldown_weeks: 48,
            birth_chance: 0.03,
            food_per_npc: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisasterConfig {
    /// Weekly chance of a disaster striking a village.
    pub base_chance: f64,
    /// Extra weekly chance during winter (storm season).
    pub winter_storm_chance: f64,
    /// Fraction of population lost to a fire.
    pub fire_pop_loss: f64,
    /// Fraction of granary stores lost to a flood.
    pub flood_granary_loss: f64,
    /// Population at or below which a struck village is abandoned.
    pub abandon_threshold: u32,
    /// Granary units gained per head of population at the autumn harvest.
    pub harvest_yield_per_pop: i64,
}

impl Default for DisasterConfig {
    fn default() -> Self {
        Self {
            base_chance: 0.01,
            winter_storm_chance: 0.03,
            fire_pop_loss: 0.05,
            flood_granary_loss: 0.25,
            abandon_threshold: 10,
            harvest_yield_per_pop: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiegeConfig {
    /// Fraction of besieging army strength lost per week.
    pub attacker_attrition: f64,
    /// Fraction of defending population lost per week under siege.
    pub defender_pop_loss: f64,
    /// Army strength at or below which a siege is lifted.
    pub lift_strength: u32,
}

impl Default for SiegeConfig {
    fn default() -> Self {
        Self {
            attacker_attrition: 0.03,
            defender_pop_loss: 0.02,
            lift_strength: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = SimConfig::default();
        assert!(config.tick_interval_secs > 0);
        assert!(config.max_ticks_per_call > 0);
        assert!(config.lifecycle.fertility_min_age < config.lifecycle.fertility_max_age);
        assert!(config.disease.declining_threshold < config.disease.active_threshold);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{"max_ticks_per_call": 4, "disease": {"active_threshold": 25}}"#)
                .unwrap();
        assert_eq!(config.max_ticks_per_call, 4);
        assert_eq!(config.disease.active_threshold, 25);
        // Untouched sections keep their defaults
        assert_eq!(config.tick_interval_secs, 3600);
        assert_eq!(config.disease.declining_threshold, 4);
    }

    #[test]
    fn round_trips_through_json() {
        let config = SimConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_ticks_per_call, config.max_ticks_per_call);
        assert_eq!(back.siege.lift_strength, config.siege.lift_strength);
    }
}
