use serde::{Deserialize, Serialize};

/// Monotonic ID generator shared across all entity types.
/// Guarantees globally unique IDs — no two objects of any type share an ID.
/// Serialized with the world so a restored checkpoint never reissues an ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn starting_from(start: u64) -> Self {
        Self { next: start }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The next ID that would be issued (used by the checkpoint writer).
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
