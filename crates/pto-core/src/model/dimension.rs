//! Shared dimension values: conditions and paths
//!
//! Both are store-owned rows with a unique text key. Observations reference
//! them by id; nothing in memory owns them.

use serde::{Deserialize, Serialize};

/// A row in a table keyed by a unique text column.
///
/// The store deduplicates implementors with a single upsert on
/// [`Dimension::KEY_COLUMN`].
pub trait Dimension {
    /// Table holding the rows
    const TABLE: &'static str;

    /// Unique text column
    const KEY_COLUMN: &'static str;

    /// Value of the unique column
    fn key(&self) -> &str;

    /// Row id, `None` until resolved against the store
    fn id(&self) -> Option<i64>;

    /// Record the row id assigned by the store
    fn assign_id(&mut self, id: i64);
}

/// A named measurable property of a path, e.g. `ecn.connectivity.broken`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub id: Option<i64>,
    pub name: String,
}

impl Condition {
    /// Placeholder condition with no id
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Condition with a known id
    pub fn with_id(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }
}

impl Dimension for Condition {
    const TABLE: &'static str = "conditions";
    const KEY_COLUMN: &'static str = "name";

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// Identifier of a network path under observation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    pub id: Option<i64>,
    pub string: String,
}

impl Path {
    /// Placeholder path with no id
    pub fn new(string: impl Into<String>) -> Self {
        Self {
            id: None,
            string: string.into(),
        }
    }
}

impl Dimension for Path {
    const TABLE: &'static str = "paths";
    const KEY_COLUMN: &'static str = "string";

    fn key(&self) -> &str {
        &self.string
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}
