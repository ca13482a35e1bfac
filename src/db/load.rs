use serde::Serialize;
use sqlx::PgPool;

use crate::model::WorldState;

/// Load a world snapshot into Postgres using COPY FROM STDIN (text format).
///
/// Order respects FK constraints: villages before npcs. The clock is a
/// single upserted row rather than a COPY.
pub async fn load_world(pool: &PgPool, world: &WorldState) -> Result<(), sqlx::Error> {
    if let Some(clock) = &world.clock {
        sqlx::query(
            "INSERT INTO world_clock (id, last_tick_id, last_tick_at, version)
             VALUES (1, $1, $2, $3)
             ON CONFLICT (id) DO UPDATE
             SET last_tick_id = EXCLUDED.last_tick_id,
                 last_tick_at = EXCLUDED.last_tick_at,
                 version = EXCLUDED.version",
        )
        .bind(clock.last_tick_id as i64)
        .bind(clock.last_tick_at)
        .bind(clock.version as i64)
        .execute(pool)
        .await?;
    }

    // Villages (before npcs due to FK)
    {
        let mut buf = String::new();
        for v in world.villages.values() {
            buf.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                v.id,
                escape(&v.name),
                v.liege
                    .map(|l| escape(&l.to_string()))
                    .unwrap_or_else(null),
                v.population,
                v.granary,
                v.morale,
                opt_u64(v.abandoned),
            ));
        }
        copy_in(pool, include_str!("../../sql/copy_villages.sql"), &buf).await?;
    }

    // NPCs
    {
        let mut buf = String::new();
        for n in world.npcs.values() {
            buf.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                n.id,
                escape(&n.name),
                n.village_id,
                escape(&enum_str(&n.sex)),
                n.born_year,
                opt_u64(n.spouse),
                opt_u64(n.mother),
                opt_u64(n.father),
                opt_u64(n.died),
            ));
        }
        copy_in(pool, include_str!("../../sql/copy_npcs.sql"), &buf).await?;
    }

    // Treasuries
    {
        let mut buf = String::new();
        for t in world.treasuries.values() {
            buf.push_str(&format!(
                "{}\t{}\t{}\n",
                escape(&t.location.to_string()),
                t.balance,
                t.allow_negative,
            ));
        }
        copy_in(pool, include_str!("../../sql/copy_treasuries.sql"), &buf).await?;
    }

    // Wallets
    {
        let mut buf = String::new();
        for (holder, balance) in &world.wallets {
            buf.push_str(&format!("{holder}\t{balance}\n"));
        }
        copy_in(pool, include_str!("../../sql/copy_wallets.sql"), &buf).await?;
    }

    // Salary payments
    {
        let mut buf = String::new();
        for p in &world.salary_payments {
            buf.push_str(&format!("{}\t{}\t{}\n", p.role_id, p.period, p.amount));
        }
        copy_in(pool, include_str!("../../sql/copy_salary_payments.sql"), &buf).await?;
    }

    // Tick records
    {
        let mut buf = String::new();
        for r in world.tick_records.values() {
            buf.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\n",
                r.tick,
                escape(&r.handler),
                escape(&enum_str(&r.status)),
                r.started_at,
                opt_i64(r.completed_at),
                r.error.as_deref().map(escape).unwrap_or_else(null),
            ));
        }
        copy_in(pool, include_str!("../../sql/copy_tick_records.sql"), &buf).await?;
    }

    // Audit log
    {
        let mut buf = String::new();
        for e in &world.audit_log {
            let data = if e.data.is_null() {
                null()
            } else {
                escape(&e.data.to_string())
            };
            buf.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                e.tick,
                escape(&e.handler),
                escape(&e.message),
                data,
            ));
        }
        copy_in(pool, include_str!("../../sql/copy_audit_log.sql"), &buf).await?;
    }

    Ok(())
}

/// Execute a COPY FROM STDIN with the given text-format payload.
async fn copy_in(pool: &PgPool, statement: &str, data: &str) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let mut copy = conn.copy_in_raw(statement).await?;
    copy.send(data.as_bytes()).await?;
    copy.finish().await?;
    Ok(())
}

/// Escape a string for Postgres COPY text format.
/// Backslash must be escaped first, then the special whitespace characters.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn null() -> String {
    "\\N".to_string()
}

/// Render an optional integer as a COPY text value (`\N` for NULL).
fn opt_u64(v: Option<u64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(null)
}

fn opt_i64(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(null)
}

/// Serialize a serde enum variant to its snake_case string (strips JSON quotes).
fn enum_str<T: Serialize>(val: &T) -> String {
    let json = serde_json::to_string(val).expect("enum serialization");
    // serde_json wraps string enums in quotes: "\"value\""
    json[1..json.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_copy_specials() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("tab\there"), "tab\\there");
        assert_eq!(escape("back\\slash"), "back\\\\slash");
        assert_eq!(escape("line\nbreak"), "line\\nbreak");
    }

    #[test]
    fn optional_columns_render_null_marker() {
        assert_eq!(opt_u64(None), "\\N");
        assert_eq!(opt_u64(Some(7)), "7");
        assert_eq!(opt_i64(Some(-3)), "-3");
    }

    #[test]
    fn enum_str_strips_quotes() {
        assert_eq!(enum_str(&crate::model::TickStatus::Committed), "committed");
        assert_eq!(enum_str(&crate::model::Sex::Female), "female");
    }
}
