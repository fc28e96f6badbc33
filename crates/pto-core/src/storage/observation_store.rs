//! ObservationStore - SQLite persistence for observation sets
//!
//! One store wraps one connection; open one per concurrent caller and share
//! a single [`ConditionCache`] between them.
//!
//! - WAL mode: concurrent readers, serialized writers
//! - Dimensions (conditions, paths): atomic upsert, committed eagerly
//! - Sets and observations: immediate transactions, ids assigned in memory
//!   only after commit

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::schema;
use crate::cache::ConditionCache;
use crate::config::PtoConfig;
use crate::error::{PtoError, Result};
use crate::model::{Condition, Dimension, Observation, ObservationSet, Path as NetPath};

/// Row counts reported by [`ObservationStore::stats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub observation_sets: i64,
    pub observations: i64,
    pub conditions: i64,
    pub paths: i64,
}

/// SQLite store for conditions, paths, observation sets and observations
#[derive(Debug)]
pub struct ObservationStore {
    pub(super) conn: Connection,
    pub(super) cache: Arc<ConditionCache>,
    pub(super) batch_size: usize,
}

impl ObservationStore {
    /// Open (or create) the database named by `config` and ensure the schema.
    pub fn open(config: &PtoConfig, cache: Arc<ConditionCache>) -> Result<Self> {
        config.validate()?;
        let path = config.database.as_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::configure(conn, config, cache)
    }

    /// Private in-memory store with default settings
    pub fn open_in_memory(cache: Arc<ConditionCache>) -> Result<Self> {
        let config = PtoConfig::default().with_database(":memory:");
        Self::configure(Connection::open_in_memory()?, &config, cache)
    }

    /// Open a store at `path` with default settings
    pub fn open_path(path: impl AsRef<Path>, cache: Arc<ConditionCache>) -> Result<Self> {
        let config = PtoConfig::default().with_database(path.as_ref());
        Self::open(&config, cache)
    }

    fn configure(conn: Connection, config: &PtoConfig, cache: Arc<ConditionCache>) -> Result<Self> {
        // WAL: concurrent reads, serialized writes
        let journal = if config.wal { "WAL" } else { "DELETE" };
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {journal};
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {};",
            config.busy_timeout_ms
        ))?;

        let store = Self {
            conn,
            cache,
            batch_size: config.batch_size.max(1),
        };
        schema::create_tables(&store.conn)?;
        Ok(store)
    }

    /// The shared condition cache
    pub fn cache(&self) -> &Arc<ConditionCache> {
        &self.cache
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Schema
    // ─────────────────────────────────────────────────────────────────────────

    /// Create all tables. Idempotent; `open` already does this.
    pub fn create_tables(&self) -> Result<()> {
        schema::create_tables(&self.conn)
    }

    /// Drop all tables and empty the shared condition cache.
    pub fn drop_tables(&self) -> Result<()> {
        schema::drop_tables(&self.conn)?;
        self.cache.clear();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dimensions and conditions
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve a condition or path to its row id, creating the row if new
    pub fn insert_once<D: Dimension>(&self, dim: &mut D) -> Result<i64> {
        schema::insert_once(&self.conn, dim)
    }

    /// Resolve every declared condition of `set` through the shared cache
    pub fn resolve_all_in_set(&self, set: &mut ObservationSet) -> Result<()> {
        self.cache.resolve_all_in_set(&self.conn, set)
    }

    /// Exact or `prefix.*` condition lookup through the shared cache
    pub fn conditions_by_name(&self, pattern: &str) -> Result<Vec<Condition>> {
        self.cache.lookup_by_name(&self.conn, pattern)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sets and observations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist `set` and its declared-condition associations atomically.
    ///
    /// With `force`, the set's id is cleared first so it is inserted again.
    /// Without it, a set that already has an id is left untouched.
    pub fn insert_set(&mut self, set: &mut ObservationSet, force: bool) -> Result<()> {
        if force {
            set.reset_identity();
        }
        if set.id.is_some() {
            return Ok(());
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = write_set_row(&tx, set)?;
        tx.commit()?;

        set.id = Some(id);
        tracing::info!(
            "Observation set {} inserted ({}, {} conditions)",
            id,
            set.analyzer,
            set.conditions.len()
        );
        Ok(())
    }

    /// Persist one observation into `set`, inserting the set first if needed.
    ///
    /// The observation's condition must be one the set declared; otherwise
    /// this fails with [`PtoError::UndeclaredCondition`] before touching the
    /// store. On success the observation's ids and `set_id` are filled in.
    pub fn insert_observation_in_set(
        &mut self,
        obs: &mut Observation,
        set: &mut ObservationSet,
    ) -> Result<()> {
        let condition_id = declared_condition_id(set, obs)?;
        obs.condition.id = Some(condition_id);

        warn_on_advisory_mismatch(obs, set);

        schema::insert_once(&self.conn, &mut obs.path)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (set_id, created) = match set.id {
            Some(id) => (id, false),
            None => (write_set_row(&tx, set)?, true),
        };
        let obs_id = write_observation_row(&tx, set_id, obs)?;
        tx.commit()?;

        if created {
            set.id = Some(set_id);
            tracing::info!("Observation set {} inserted with first observation", set_id);
        }
        obs.set_id = Some(set_id);
        obs.id = Some(obs_id);
        Ok(())
    }

    /// Number of observations in `set`.
    ///
    /// Queried once per set instance and cached on it; an unpersisted set
    /// has zero observations.
    pub fn count_observations(&self, set: &mut ObservationSet) -> Result<u64> {
        if let Some(count) = set.cached_count() {
            return Ok(count);
        }
        let Some(id) = set.id else {
            return Ok(0);
        };

        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM observations WHERE set_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let count = u64::try_from(count).unwrap_or(0);
        set.cache_count(count);
        Ok(count)
    }

    /// Load a set and its declared conditions by id
    pub fn select_set(&self, id: i64) -> Result<Option<ObservationSet>> {
        let row = self
            .conn
            .query_row(
                "SELECT sources, analyzer, metadata FROM observation_sets WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        json_column::<Vec<String>>(row, 0)?,
                        row.get::<_, String>(1)?,
                        json_column::<BTreeMap<String, String>>(row, 2)?,
                    ))
                },
            )
            .optional()?;

        let Some((sources, analyzer, metadata)) = row else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare_cached(
            "SELECT c.id, c.name
             FROM observation_set_to_conditions a
             JOIN conditions c ON c.id = a.condition_id
             WHERE a.set_id = ?1
             ORDER BY a.rowid",
        )?;
        let conditions = stmt
            .query_map(params![id], |row| Ok(Condition::with_id(row.get(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut set = ObservationSet::new(analyzer);
        set.id = Some(id);
        set.sources = sources;
        set.metadata = metadata;
        set.conditions = conditions;
        Ok(Some(set))
    }

    /// Rewrite sources, analyzer and metadata of a persisted set.
    /// Declared conditions are immutable and are not touched.
    pub fn update_set(&self, set: &ObservationSet) -> Result<()> {
        let id = set.id.ok_or(PtoError::SetNotPersisted)?;
        let updated = self.conn.execute(
            "UPDATE observation_sets SET sources = ?1, analyzer = ?2, metadata = ?3 WHERE id = ?4",
            params![
                serde_json::to_string(&set.sources)?,
                set.analyzer,
                serde_json::to_string(&set.metadata)?,
                id
            ],
        )?;
        if updated == 0 {
            return Err(PtoError::SetNotPersisted);
        }
        Ok(())
    }

    /// Every observation in a set, with path and condition filled in
    pub fn observations_in_set(&self, set_id: i64) -> Result<Vec<Observation>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT o.id, o.time_start, o.time_end, p.id, p.string, c.id, c.name, o.value
             FROM observations o
             JOIN paths p ON p.id = o.path_id
             JOIN conditions c ON c.id = o.condition_id
             WHERE o.set_id = ?1
             ORDER BY o.id",
        )?;
        let rows = stmt
            .query_map(params![set_id], |row| {
                Ok(Observation {
                    id: Some(row.get(0)?),
                    set_id: Some(set_id),
                    start: row.get::<_, DateTime<Utc>>(1)?,
                    end: row.get::<_, DateTime<Utc>>(2)?,
                    path: NetPath {
                        id: Some(row.get(3)?),
                        string: row.get(4)?,
                    },
                    condition: Condition::with_id(row.get(5)?, row.get::<_, String>(6)?),
                    value: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Ids of all persisted sets, ascending
    pub fn set_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM observation_sets ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Ids of sets carrying metadata `key`, optionally with exactly `value`
    pub fn sets_by_metadata(&self, key: &str, value: Option<&str>) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT s.id
             FROM observation_sets s, json_each(s.metadata) m
             WHERE m.key = ?1 AND (?2 IS NULL OR m.value = ?2)
             ORDER BY s.id",
        )?;
        let ids = stmt
            .query_map(params![key, value], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Rows written by this connection since it was opened
    pub fn total_changes(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT total_changes()", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };
        Ok(StoreStats {
            observation_sets: count("observation_sets")?,
            observations: count("observations")?,
            conditions: count("conditions")?,
            paths: count("paths")?,
        })
    }
}

/// Id of the declared condition `obs` refers to, or an undeclared-condition error
pub(super) fn declared_condition_id(set: &mut ObservationSet, obs: &Observation) -> Result<i64> {
    let set_id = set.id;
    let declared = set.declared_index()?;
    match declared.get(&obs.condition.name) {
        Some(&id) if obs.condition.id.map_or(true, |own| own == id) => Ok(id),
        _ => Err(PtoError::UndeclaredCondition {
            condition: obs.condition.name.clone(),
            set_id,
        }),
    }
}

/// Log when an observation's advisory set id disagrees with the set it is
/// going into. Returns true on a mismatch; the parent set's id always wins.
pub(super) fn warn_on_advisory_mismatch(obs: &Observation, set: &ObservationSet) -> bool {
    match (obs.set_id, set.id) {
        (Some(advisory), Some(actual)) if advisory != actual => {
            tracing::warn!(
                "Observation names set {} but is being inserted into set {}",
                advisory,
                actual
            );
            true
        }
        _ => false,
    }
}

/// Decode a JSON text column. Bad stored JSON is a store fault, not a
/// client one.
fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Insert the set row and its associations; returns the new id.
/// Every declared condition must already be resolved.
pub(super) fn write_set_row(conn: &Connection, set: &ObservationSet) -> Result<i64> {
    if let Some(unresolved) = set.conditions.iter().find(|c| c.id.is_none()) {
        return Err(PtoError::UnresolvedCondition(unresolved.name.clone()));
    }

    conn.execute(
        "INSERT INTO observation_sets (sources, analyzer, metadata) VALUES (?1, ?2, ?3)",
        params![
            serde_json::to_string(&set.sources)?,
            set.analyzer,
            serde_json::to_string(&set.metadata)?
        ],
    )?;
    let id = conn.last_insert_rowid();

    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO observation_set_to_conditions (set_id, condition_id) VALUES (?1, ?2)",
    )?;
    for condition in set.conditions.iter().filter_map(|c| c.id) {
        stmt.execute(params![id, condition])?;
    }
    Ok(id)
}

/// Insert one observation row with resolved path and condition ids
pub(super) fn write_observation_row(conn: &Connection, set_id: i64, obs: &Observation) -> Result<i64> {
    let path_id = obs
        .path
        .id
        .ok_or_else(|| PtoError::UnresolvedPath(obs.path.string.clone()))?;
    let condition_id = obs
        .condition
        .id
        .ok_or_else(|| PtoError::UnresolvedCondition(obs.condition.name.clone()))?;

    conn.prepare_cached(
        "INSERT INTO observations (set_id, time_start, time_end, path_id, condition_id, value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?
    .execute(params![set_id, obs.start, obs.end, path_id, condition_id, obs.value])?;
    Ok(conn.last_insert_rowid())
}
