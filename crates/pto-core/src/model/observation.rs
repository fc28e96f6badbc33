//! A single measurement: a condition's value on a path over a time window.

use chrono::{DateTime, Utc};

use super::{Condition, Path};

/// One observation, belonging to exactly one observation set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Row id, assigned on insert
    pub id: Option<i64>,
    /// Parent set id. Advisory after decode; overwritten at insert time.
    pub set_id: Option<i64>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub path: Path,
    pub condition: Condition,
    pub value: i64,
}

impl Observation {
    /// New unpersisted observation with a zero value
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        path: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            set_id: None,
            start,
            end,
            path: Path::new(path),
            condition: Condition::named(condition),
            value: 0,
        }
    }

    /// Set the measured value
    pub fn with_value(mut self, value: i64) -> Self {
        self.value = value;
        self
    }

    /// Resolved path row id
    pub fn path_id(&self) -> Option<i64> {
        self.path.id
    }

    /// Resolved condition row id
    pub fn condition_id(&self) -> Option<i64> {
        self.condition.id
    }

    /// Whether the time window is well-formed. Not enforced on insert.
    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}
