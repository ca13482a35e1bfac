use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::JournalError;
use crate::id::IdGenerator;
use crate::model::{
    Army, Election, LogEntry, Npc, Outbreak, PlayerRole, SalaryPayment, Siege, TaxCollection,
    TickRecord, Treasury, Village, WorldClock, WorldDate, WorldState,
};
use crate::sim::{HandlerHealth, Journal};

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("checkpoint io: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint encoding: {0}")]
    Json(#[from] serde_json::Error),
}

/// One line per row, one file per table. Append-friendly and greppable,
/// which matters more here than compactness.
fn write_jsonl<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), FlushError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut writer, &row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FlushError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            rows.push(serde_json::from_str(&line)?);
        }
    }
    Ok(rows)
}

#[derive(Serialize, Deserialize)]
struct Meta {
    clock: Option<WorldClock>,
    date: WorldDate,
    seed: u64,
    id_gen: IdGenerator,
}

#[derive(Serialize, Deserialize)]
struct WalletRow {
    holder_npc_id: u64,
    balance: i64,
}

/// Write the whole world under `dir`, one file per table plus `meta.json`.
pub fn save_checkpoint(world: &WorldState, dir: &Path) -> Result<(), FlushError> {
    fs::create_dir_all(dir)?;
    let meta = Meta {
        clock: world.clock,
        date: world.date,
        seed: world.seed,
        id_gen: world.id_gen.clone(),
    };
    serde_json::to_writer_pretty(BufWriter::new(File::create(dir.join("meta.json"))?), &meta)?;

    write_jsonl(&dir.join("villages.jsonl"), world.villages.values())?;
    write_jsonl(&dir.join("npcs.jsonl"), world.npcs.values())?;
    write_jsonl(&dir.join("outbreaks.jsonl"), world.outbreaks.values())?;
    write_jsonl(&dir.join("elections.jsonl"), world.elections.values())?;
    write_jsonl(&dir.join("roles.jsonl"), world.roles.values())?;
    write_jsonl(&dir.join("treasuries.jsonl"), world.treasuries.values())?;
    write_jsonl(
        &dir.join("wallets.jsonl"),
        world.wallets.iter().map(|(&holder_npc_id, &balance)| WalletRow {
            holder_npc_id,
            balance,
        }),
    )?;
    write_jsonl(&dir.join("salary_payments.jsonl"), world.salary_payments.iter())?;
    write_jsonl(&dir.join("tax_collections.jsonl"), world.tax_collections.values())?;
    write_jsonl(&dir.join("armies.jsonl"), world.armies.values())?;
    write_jsonl(&dir.join("sieges.jsonl"), world.sieges.values())?;
    write_jsonl(&dir.join("tick_records.jsonl"), world.tick_records.values())?;
    write_jsonl(&dir.join("audit_log.jsonl"), world.audit_log.iter())?;
    Ok(())
}

/// Rebuild a world from `save_checkpoint` output. Missing table files load
/// as empty tables, so older checkpoints stay readable.
pub fn load_checkpoint(dir: &Path) -> Result<WorldState, FlushError> {
    let meta: Meta = serde_json::from_reader(BufReader::new(File::open(dir.join("meta.json"))?))?;
    let mut world = WorldState::new(meta.seed);
    world.clock = meta.clock;
    world.date = meta.date;
    world.id_gen = meta.id_gen;

    for v in read_jsonl::<Village>(&dir.join("villages.jsonl"))? {
        world.villages.insert(v.id, v);
    }
    for n in read_jsonl::<Npc>(&dir.join("npcs.jsonl"))? {
        world.npcs.insert(n.id, n);
    }
    for o in read_jsonl::<Outbreak>(&dir.join("outbreaks.jsonl"))? {
        world.outbreaks.insert(o.id, o);
    }
    for e in read_jsonl::<Election>(&dir.join("elections.jsonl"))? {
        world.elections.insert(e.id, e);
    }
    for r in read_jsonl::<PlayerRole>(&dir.join("roles.jsonl"))? {
        world.roles.insert(r.id, r);
    }
    for t in read_jsonl::<Treasury>(&dir.join("treasuries.jsonl"))? {
        world.treasuries.insert(t.location, t);
    }
    for w in read_jsonl::<WalletRow>(&dir.join("wallets.jsonl"))? {
        world.wallets.insert(w.holder_npc_id, w.balance);
    }
    world.salary_payments = read_jsonl(&dir.join("salary_payments.jsonl"))?;
    for t in read_jsonl::<TaxCollection>(&dir.join("tax_collections.jsonl"))? {
        world.tax_collections.insert(t.id, t);
    }
    for a in read_jsonl::<Army>(&dir.join("armies.jsonl"))? {
        world.armies.insert(a.id, a);
    }
    for s in read_jsonl::<Siege>(&dir.join("sieges.jsonl"))? {
        world.sieges.insert(s.id, s);
    }
    for r in read_jsonl::<TickRecord>(&dir.join("tick_records.jsonl"))? {
        world.put_record(r);
    }
    world.audit_log = read_jsonl(&dir.join("audit_log.jsonl"))?;
    Ok(world)
}

/// Persist handler health next to the checkpoint. Without it a fresh
/// process forgets consecutive failures and acknowledged escalations, so a
/// cron deployment could never actually escalate.
pub fn save_health(
    dir: &Path,
    health: &std::collections::BTreeMap<String, HandlerHealth>,
) -> Result<(), FlushError> {
    fs::create_dir_all(dir)?;
    serde_json::to_writer_pretty(
        BufWriter::new(File::create(dir.join("health.json"))?),
        health,
    )?;
    Ok(())
}

/// Missing file means every handler is healthy (first run, or a checkpoint
/// from before health was persisted).
pub fn load_health(
    dir: &Path,
) -> Result<std::collections::BTreeMap<String, HandlerHealth>, FlushError> {
    let path = dir.join("health.json");
    if !path.exists() {
        return Ok(std::collections::BTreeMap::new());
    }
    Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
}

#[derive(Serialize)]
struct JournalLine<'a> {
    record: &'a TickRecord,
    log: &'a [LogEntry],
}

/// Append-only journal file, one commit per line. Failures report as
/// transient: a full disk or permission hiccup is worth retrying.
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Journal for JsonlJournal {
    fn append(&mut self, record: &TickRecord, entries: &[LogEntry]) -> Result<(), JournalError> {
        let line = serde_json::to_string(&JournalLine {
            record,
            log: entries,
        })
        .map_err(|e| JournalError::permanent(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| JournalError::transient(e.to_string()))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_data())
            .map_err(|e| JournalError::transient(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocationRef, Season, TickStatus};

    #[test]
    fn checkpoint_round_trips_core_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = WorldState::new(77);
        world.date = WorldDate::new(4, Season::Winter, 9);
        world.clock = Some(WorldClock {
            last_tick_id: 12,
            last_tick_at: 99_000,
            version: 13,
        });
        world.villages.insert(
            1,
            Village {
                id: 1,
                name: "Thornmead".to_string(),
                liege: Some(LocationRef::Barony(2)),
                population: 80,
                granary: 310,
                morale: 0.4,
                abandoned: None,
            },
        );
        world.wallets.insert(9, 55);
        world.put_record(TickRecord {
            tick: 12,
            handler: "calendar".to_string(),
            status: TickStatus::Committed,
            started_at: 98_000,
            completed_at: Some(98_001),
            error: None,
        });
        world.audit_log.push(LogEntry::new(12, "calendar", "week advances"));

        save_checkpoint(&world, dir.path()).unwrap();
        let loaded = load_checkpoint(dir.path()).unwrap();

        assert_eq!(loaded.date, world.date);
        assert_eq!(loaded.clock, world.clock);
        assert_eq!(loaded.seed, 77);
        assert_eq!(loaded.villages[&1].name, "Thornmead");
        assert_eq!(loaded.wallets[&9], 55);
        assert_eq!(
            loaded.record(12, "calendar").unwrap().status,
            TickStatus::Committed
        );
        assert_eq!(loaded.audit_log.len(), 1);
    }

    #[test]
    fn missing_tables_load_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let world = WorldState::new(1);
        save_checkpoint(&world, dir.path()).unwrap();
        fs::remove_file(dir.path().join("armies.jsonl")).unwrap();
        let loaded = load_checkpoint(dir.path()).unwrap();
        assert!(loaded.armies.is_empty());
    }

    #[test]
    fn health_round_trips_and_defaults_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_health(dir.path()).unwrap().is_empty());

        let mut health = std::collections::BTreeMap::new();
        health.insert(
            "siege".to_string(),
            HandlerHealth {
                consecutive_failures: 3,
                escalated: true,
                acknowledged: true,
            },
        );
        save_health(dir.path(), &health).unwrap();
        assert_eq!(load_health(dir.path()).unwrap(), health);
    }

    #[test]
    fn journal_appends_one_line_per_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let mut journal = JsonlJournal::new(&path);
        let record = TickRecord {
            tick: 1,
            handler: "calendar".to_string(),
            status: TickStatus::Committed,
            started_at: 0,
            completed_at: Some(1),
            error: None,
        };
        journal.append(&record, &[]).unwrap();
        journal
            .append(&record, &[LogEntry::new(1, "calendar", "week advances")])
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        let parsed: serde_json::Value = serde_json::from_str(text.lines().nth(1).unwrap()).unwrap();
        assert_eq!(parsed["record"]["handler"], "calendar");
        assert_eq!(parsed["log"][0]["message"], "week advances");
    }
}
