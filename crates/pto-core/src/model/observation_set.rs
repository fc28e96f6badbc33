//! Observation sets: a batch of observations sharing provenance metadata
//! and a closed list of declared conditions.

use std::collections::{BTreeMap, HashMap};

use url::Url;

use super::Condition;
use crate::error::{PtoError, Result};

/// Canonical resource link of a set and its data sub-resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLinks {
    /// `<base>/obs/<id as 16 hex digits>`
    pub link: String,
    /// `<link>/data`
    pub data: String,
}

/// Process-local values derived from a set. Never persisted.
#[derive(Debug, Clone, Default)]
struct Derived {
    links: Option<SetLinks>,
    count: Option<u64>,
    declared: Option<HashMap<String, i64>>,
}

/// A batch of observations from the same sources and analyzer
#[derive(Debug, Clone, Default)]
pub struct ObservationSet {
    /// Row id, assigned by the store on first insert
    pub id: Option<i64>,
    /// Where the raw data came from, in order
    pub sources: Vec<String>,
    /// Analyzer that produced the observations
    pub analyzer: String,
    /// Conditions observations in this set may reference
    pub conditions: Vec<Condition>,
    /// Free-form metadata
    pub metadata: BTreeMap<String, String>,
    derived: Derived,
}

impl ObservationSet {
    /// Create an empty set for the given analyzer
    pub fn new(analyzer: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.into(),
            ..Self::default()
        }
    }

    /// Append a source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Declare a condition by name
    pub fn with_condition(mut self, name: impl Into<String>) -> Self {
        self.conditions.push(Condition::named(name));
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Names of the declared conditions, in declaration order
    pub fn condition_names(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.name.as_str())
    }

    /// True once every declared condition carries a store id
    pub fn conditions_resolved(&self) -> bool {
        self.conditions.iter().all(|c| c.id.is_some())
    }

    /// Forget the store identity and everything derived from it
    pub fn reset_identity(&mut self) {
        self.id = None;
        self.derived.links = None;
        self.derived.count = None;
    }

    /// Links computed by [`ObservationSet::derive_links`], if any
    pub fn links(&self) -> Option<&SetLinks> {
        self.derived.links.as_ref()
    }

    /// Observation count cached by the store, if it has been computed
    pub fn cached_count(&self) -> Option<u64> {
        self.derived.count
    }

    pub(crate) fn cache_count(&mut self, count: u64) {
        self.derived.count = Some(count);
    }

    /// Compute the resource and data links for this set against `base`.
    ///
    /// Computed once per instance; later calls return the cached links even
    /// if `base` differs.
    pub fn derive_links(&mut self, base: &Url) -> Result<&SetLinks> {
        if self.derived.links.is_none() {
            let id = self.id.ok_or(PtoError::SetNotPersisted)?;
            let link = link_for_set_id(base, id)?;
            let data = format!("{}/data", link);
            self.derived.links = Some(SetLinks { link, data });
        }
        self.derived
            .links
            .as_ref()
            .ok_or(PtoError::SetNotPersisted)
    }

    /// Name → id index of the declared conditions, built once per instance.
    ///
    /// Fails if any declared condition is still unresolved.
    pub(crate) fn declared_index(&mut self) -> Result<&HashMap<String, i64>> {
        if self.derived.declared.is_none() {
            let mut index = HashMap::with_capacity(self.conditions.len());
            for condition in &self.conditions {
                let id = condition
                    .id
                    .ok_or_else(|| PtoError::UnresolvedCondition(condition.name.clone()))?;
                index.insert(condition.name.clone(), id);
            }
            self.derived.declared = Some(index);
        }
        self.derived
            .declared
            .as_ref()
            .ok_or(PtoError::SetNotPersisted)
    }
}

/// Resource link for a set id: `obs/` followed by the id in 16 hex digits,
/// resolved against `base`.
pub fn link_for_set_id(base: &Url, set_id: i64) -> Result<String> {
    base.join(&format!("obs/{:016x}", set_id))
        .map(String::from)
        .map_err(|e| PtoError::Config(format!("cannot derive link from base URL {}: {}", base, e)))
}

impl PartialEq for ObservationSet {
    /// Derived fields do not take part in equality.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.sources == other.sources
            && self.analyzer == other.analyzer
            && self.conditions == other.conditions
            && self.metadata == other.metadata
    }
}

impl Eq for ObservationSet {}
