//! Catch-up runner: load the checkpoint, advance the clock to wall time,
//! write the checkpoint back. Meant to be invoked from cron or a systemd
//! timer; overlapping invocations are safe because the watermark only moves
//! on fully committed ticks.

use std::error::Error;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use realm_tick::flush::{
    JsonlJournal, load_checkpoint, load_health, save_checkpoint, save_health,
};
use realm_tick::scenario::demo_world;
use realm_tick::sim::{Scheduler, standard_registry};
use realm_tick::SimConfig;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let dir: PathBuf = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "world".to_string())
        .into();

    let config: SimConfig = match std::fs::read_to_string(dir.join("config.json")) {
        Ok(text) => serde_json::from_str(&text)?,
        Err(_) => SimConfig::default(),
    };

    let mut world = if dir.join("meta.json").exists() {
        load_checkpoint(&dir)?
    } else {
        tracing::info!(dir = %dir.display(), "no checkpoint found, seeding demo world");
        std::fs::create_dir_all(&dir)?;
        demo_world(42)
    };

    let journal = JsonlJournal::new(dir.join("journal.jsonl"));
    let mut scheduler = Scheduler::new(standard_registry()?, config, Box::new(journal));
    // Health lives beside the checkpoint; without restoring it every run
    // would start with a clean failure count.
    scheduler.restore_health(load_health(&dir)?);

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
    let outcome = scheduler.advance_clock(&mut world, now, None)?;

    save_checkpoint(&world, &dir)?;
    save_health(&dir, &scheduler.health())?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.failures.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
