//! Wire codec
//!
//! Translates between the entity model and the JSON shapes clients speak.
//! The wire format is deliberately distinct from the storage schema:
//!
//! - an observation set is a JSON **object** with `_`-prefixed reserved keys,
//!   `__`-prefixed computed keys and free-form metadata;
//! - an observation is a positional JSON **array**
//!   `[set_id, start, end, path, condition, value?]`.
//!
//! Timestamps are always RFC 3339 in UTC with a trailing `Z`.

pub mod observation;
pub mod set;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::ValidationError;

pub use observation::{decode_observation, encode_observation};
pub use set::{decode_set, encode_set};

/// Render a timestamp in the canonical wire form.
///
/// Whole seconds carry no fraction; sub-second instants keep their precision.
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a canonical wire timestamp. Explicit offsets are rejected.
pub fn parse_timestamp(field: &'static str, text: &str) -> Result<DateTime<Utc>, ValidationError> {
    let bad = || ValidationError::BadTimestamp {
        field,
        value: text.to_string(),
    };
    if !text.ends_with('Z') {
        return Err(bad());
    }
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| bad())
}

pub(crate) fn parse_json(bytes: &[u8]) -> Result<Value, ValidationError> {
    serde_json::from_slice(bytes).map_err(|e| ValidationError::MalformedJson(e.to_string()))
}

/// Integer carried either as a JSON number or as decimal text
pub(crate) fn integer_field(field: &'static str, value: &Value) -> Result<i64, ValidationError> {
    let bad = || ValidationError::BadInteger {
        field,
        value: value.to_string(),
    };
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(bad),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| bad()),
        _ => Err(bad()),
    }
}
