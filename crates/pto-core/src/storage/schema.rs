//! Schema lifecycle and dimension upserts
//!
//! Free functions over `&Connection` so they run equally inside a
//! `Transaction` (which derefs to `Connection`) or in autocommit mode.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::Result;
use crate::model::Dimension;

const CREATE_TABLES: &str = "
    -- Condition dimension (shared, immutable)
    CREATE TABLE IF NOT EXISTS conditions (
        id    INTEGER PRIMARY KEY AUTOINCREMENT,
        name  TEXT NOT NULL UNIQUE
    );

    -- Path dimension (shared, immutable)
    CREATE TABLE IF NOT EXISTS paths (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        string  TEXT NOT NULL UNIQUE
    );

    -- Observation sets; sources is a JSON array, metadata a JSON object
    CREATE TABLE IF NOT EXISTS observation_sets (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        sources   TEXT NOT NULL,
        analyzer  TEXT NOT NULL,
        metadata  TEXT NOT NULL DEFAULT '{}'
    );

    CREATE TABLE IF NOT EXISTS observations (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        set_id        INTEGER NOT NULL REFERENCES observation_sets(id),
        time_start    TEXT NOT NULL,
        time_end      TEXT NOT NULL,
        path_id       INTEGER NOT NULL REFERENCES paths(id),
        condition_id  INTEGER NOT NULL REFERENCES conditions(id),
        value         INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_observations_set
        ON observations(set_id);
    CREATE INDEX IF NOT EXISTS idx_observations_condition
        ON observations(condition_id, time_start);

    -- Declared conditions per set
    CREATE TABLE IF NOT EXISTS observation_set_to_conditions (
        set_id        INTEGER NOT NULL REFERENCES observation_sets(id),
        condition_id  INTEGER NOT NULL REFERENCES conditions(id),
        PRIMARY KEY (set_id, condition_id)
    );
";

// Reverse dependency order
const DROP_TABLES: &str = "
    DROP TABLE IF EXISTS observations;
    DROP TABLE IF EXISTS observation_set_to_conditions;
    DROP TABLE IF EXISTS observation_sets;
    DROP TABLE IF EXISTS conditions;
    DROP TABLE IF EXISTS paths;
";

/// Create all tables and indices. Idempotent.
pub fn create_tables(conn: &Connection) -> Result<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    tx.execute_batch(CREATE_TABLES)?;
    tx.commit()?;
    tracing::info!("Observation schema ready");
    Ok(())
}

/// Drop all tables. Idempotent. Use for tests and teardown only.
pub fn drop_tables(conn: &Connection) -> Result<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    tx.execute_batch(DROP_TABLES)?;
    tx.commit()?;
    tracing::info!("Observation schema dropped");
    Ok(())
}

/// Give `dim` its row id, inserting the row if its key is new.
///
/// A single `INSERT … ON CONFLICT … RETURNING` statement, so concurrent
/// callers racing on the same key all get the same id and never create a
/// duplicate. A dimension that already has an id is left alone.
pub fn insert_once<D: Dimension>(conn: &Connection, dim: &mut D) -> Result<i64> {
    if let Some(id) = dim.id() {
        return Ok(id);
    }

    let sql = format!(
        "INSERT INTO {table} ({key}) VALUES (?1)
         ON CONFLICT({key}) DO UPDATE SET {key} = excluded.{key}
         RETURNING id",
        table = D::TABLE,
        key = D::KEY_COLUMN,
    );
    let id: i64 = conn
        .prepare_cached(&sql)?
        .query_row([dim.key()], |row| row.get(0))?;

    tracing::debug!("{} {:?} -> {}", D::TABLE, dim.key(), id);
    dim.assign_id(id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Condition, Path};

    fn table_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
             AND name IN ('conditions', 'paths', 'observation_sets', 'observations',
                          'observation_set_to_conditions')",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_create_and_drop_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
        assert_eq!(table_count(&conn), 5);

        drop_tables(&conn).unwrap();
        drop_tables(&conn).unwrap();
        assert_eq!(table_count(&conn), 0);
    }

    #[test]
    fn test_insert_once_deduplicates() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let mut first = Path::new("192.0.2.0/24 * 198.51.100.7");
        let mut second = Path::new("192.0.2.0/24 * 198.51.100.7");
        let mut other = Path::new("203.0.113.9");

        let a = insert_once(&conn, &mut first).unwrap();
        let b = insert_once(&conn, &mut second).unwrap();
        let c = insert_once(&conn, &mut other).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(second.id, Some(a));

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM paths", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_insert_once_skips_resolved() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let mut known = Condition::with_id(77, "ecn.ect_zero.seen");
        assert_eq!(insert_once(&conn, &mut known).unwrap(), 77);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM conditions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }
}
