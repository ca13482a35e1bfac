pub mod jsonl;

pub use jsonl::{
    FlushError, JsonlJournal, load_checkpoint, load_health, save_checkpoint, save_health,
};
