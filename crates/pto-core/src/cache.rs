//! Condition cache - process-wide name → id memoization
//!
//! One cache is shared (behind an `Arc`) by every store connection in the
//! process. Reads take a shared lock; misses and reloads take the write lock
//! only to merge results. The store stays the source of truth for uniqueness:
//! a stale cache heals on the next miss or reload.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rusqlite::Connection;

use crate::error::{PtoError, Result};
use crate::model::{Condition, ObservationSet};
use crate::storage::schema::insert_once;

/// Suffix marking a prefix query, e.g. `ecn.*`
pub const WILDCARD_SUFFIX: &str = ".*";

/// Shared condition name → id map
#[derive(Debug, Default)]
pub struct ConditionCache {
    ids: RwLock<HashMap<String, i64>>,
    reloads: AtomicU64,
}

impl ConditionCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache primed with every condition in the store
    pub fn load(conn: &Connection) -> Result<Self> {
        let cache = Self::new();
        cache.reload(conn)?;
        Ok(cache)
    }

    /// Cached id for `name`, without touching the store
    pub fn get(&self, name: &str) -> Option<i64> {
        self.ids.read().get(name).copied()
    }

    /// Number of cached conditions
    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }

    /// How many times the cache has been refreshed from the store
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    /// Forget every cached id. Required whenever the conditions table is
    /// dropped, since row ids restart afterwards.
    pub fn clear(&self) {
        self.ids.write().clear();
        tracing::debug!("Condition cache cleared");
    }

    /// Ensure `condition` carries its store id, creating the row if needed.
    pub fn resolve(&self, conn: &Connection, condition: &mut Condition) -> Result<i64> {
        if let Some(id) = self.get(&condition.name) {
            condition.id = Some(id);
            return Ok(id);
        }

        tracing::debug!("Condition cache miss: {}", condition.name);
        let id = insert_once(conn, condition)?;
        self.ids.write().insert(condition.name.clone(), id);
        Ok(id)
    }

    /// Resolve every declared condition of `set`, in declaration order.
    ///
    /// Stops at the first failure; the set is then partially resolved and
    /// must not be persisted.
    pub fn resolve_all_in_set(&self, conn: &Connection, set: &mut ObservationSet) -> Result<()> {
        for condition in set.conditions.iter_mut() {
            self.resolve(conn, condition)?;
        }
        Ok(())
    }

    /// Merge every condition row into the cache. Existing entries are
    /// overwritten, never dropped.
    pub fn reload(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare("SELECT id, name FROM conditions")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        self.reloads.fetch_add(1, Ordering::Relaxed);
        let mut ids = self.ids.write();
        for (id, name) in rows {
            ids.insert(name, id);
        }
        tracing::debug!("Condition cache reloaded: {} conditions", ids.len());
        Ok(())
    }

    /// Look up conditions by exact name or by a `prefix.*` wildcard.
    ///
    /// A wildcard always reloads first and may return an empty list. An
    /// exact name reloads at most once and fails with
    /// [`PtoError::UnknownCondition`] if still absent.
    pub fn lookup_by_name(&self, conn: &Connection, pattern: &str) -> Result<Vec<Condition>> {
        if pattern.ends_with(WILDCARD_SUFFIX) {
            self.reload(conn)?;
            let prefix = &pattern[..pattern.len() - 1];
            let ids = self.ids.read();
            return Ok(ids
                .iter()
                .filter(|(name, _)| name.starts_with(prefix))
                .map(|(name, &id)| Condition::with_id(id, name.clone()))
                .collect());
        }

        if self.get(pattern).is_none() {
            self.reload(conn)?;
        }
        self.get(pattern)
            .map(|id| vec![Condition::with_id(id, pattern)])
            .ok_or_else(|| PtoError::UnknownCondition(pattern.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::create_tables;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    fn seed(conn: &Connection, names: &[&str]) {
        for name in names {
            conn.execute("INSERT INTO conditions (name) VALUES (?1)", [name])
                .unwrap();
        }
    }

    #[test]
    fn test_resolve_inserts_once_then_hits() {
        let conn = conn();
        let cache = ConditionCache::new();

        let mut a = Condition::named("ecn.negotiated");
        let id = cache.resolve(&conn, &mut a).unwrap();
        assert_eq!(a.id, Some(id));

        let mut b = Condition::named("ecn.negotiated");
        assert_eq!(cache.resolve(&conn, &mut b).unwrap(), id);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM conditions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(cache.reload_count(), 0);
    }

    #[test]
    fn test_resolve_picks_up_rows_created_elsewhere() {
        let conn = conn();
        seed(&conn, &["tcp.syn.lost"]);
        let existing: i64 = conn
            .query_row("SELECT id FROM conditions WHERE name = 'tcp.syn.lost'", [], |r| {
                r.get(0)
            })
            .unwrap();

        let cache = ConditionCache::new();
        let mut c = Condition::named("tcp.syn.lost");
        assert_eq!(cache.resolve(&conn, &mut c).unwrap(), existing);
    }

    #[test]
    fn test_wildcard_lookup_matches_prefix() {
        let conn = conn();
        seed(&conn, &["http.get", "http.post", "ftp.get"]);
        let cache = ConditionCache::new();

        let mut names: Vec<String> = cache
            .lookup_by_name(&conn, "http.*")
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["http.get", "http.post"]);
        assert_eq!(cache.reload_count(), 1);

        assert!(cache.lookup_by_name(&conn, "smtp.*").unwrap().is_empty());
        assert_eq!(cache.reload_count(), 2);
    }

    #[test]
    fn test_exact_lookup_reloads_once_on_miss() {
        let conn = conn();
        seed(&conn, &["http.get"]);
        let cache = ConditionCache::new();

        let found = cache.lookup_by_name(&conn, "http.get").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "http.get");
        assert!(found[0].id.is_some());
        assert_eq!(cache.reload_count(), 1);

        // now cached: no further reload
        cache.lookup_by_name(&conn, "http.get").unwrap();
        assert_eq!(cache.reload_count(), 1);
    }

    #[test]
    fn test_exact_lookup_not_found_after_one_reload() {
        let conn = conn();
        let cache = ConditionCache::new();

        let err = cache.lookup_by_name(&conn, "nope").unwrap_err();
        assert!(matches!(err, PtoError::UnknownCondition(ref n) if n == "nope"));
        assert_eq!(cache.reload_count(), 1);
    }

    #[test]
    fn test_wildcard_is_prefix_not_glob() {
        let conn = conn();
        seed(&conn, &["http.get", "httpx.get", "http"]);
        let cache = ConditionCache::new();

        let found = cache.lookup_by_name(&conn, "http.*").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "http.get");
    }

    #[test]
    fn test_resolve_all_in_set_keeps_order() {
        let conn = conn();
        let cache = ConditionCache::new();
        let mut set = ObservationSet::new("a")
            .with_condition("c.one")
            .with_condition("c.two");

        cache.resolve_all_in_set(&conn, &mut set).unwrap();
        assert!(set.conditions_resolved());
        assert_eq!(set.conditions[0].name, "c.one");
        assert_ne!(set.conditions[0].id, set.conditions[1].id);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clear_forgets_ids() {
        let conn = conn();
        let cache = ConditionCache::new();
        cache.resolve(&conn, &mut Condition::named("x.one")).unwrap();
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("x.one"), None);
    }
}
