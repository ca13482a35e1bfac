use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::config::SimConfig;
use crate::model::TickId;

/// Read-only context passed to each handler.
///
/// Bundled so fields can be added later without touching the `TickHandler`
/// signature.
pub struct HandlerContext<'a> {
    pub config: &'a SimConfig,
    /// World seed; combined with tick and entity IDs for random streams.
    pub seed: u64,
}

impl HandlerContext<'_> {
    /// Deterministic random stream for one entity in one tick.
    ///
    /// Re-running a tick (after a crash before commit) reproduces every roll
    /// exactly, and no entity's stream depends on iteration order over any
    /// other entity.
    pub fn entity_rng(&self, tick: TickId, entity_id: u64) -> SmallRng {
        SmallRng::seed_from_u64(mix(self.seed, tick, entity_id))
    }
}

/// splitmix64-style finalizer over the three seed components.
fn mix(seed: u64, tick: u64, entity_id: u64) -> u64 {
    let mut x = seed
        .wrapping_add(tick.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(entity_id.wrapping_mul(0xBF58_476D_1CE4_E5B9));
    x ^= x >> 30;
    x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}
