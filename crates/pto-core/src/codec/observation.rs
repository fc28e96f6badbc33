//! Observation lines: compact positional arrays
//!
//! `[set_id, start, end, path, condition, value?]` with the value omitted
//! when it is zero.

use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;

use super::{format_timestamp, integer_field, parse_json, parse_timestamp};
use crate::error::{Result, ValidationError};
use crate::model::{Condition, Observation, Path};

const MIN_ELEMENTS: usize = 5;

impl Serialize for Observation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.value != 0 { 6 } else { MIN_ELEMENTS };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.set_id.unwrap_or(0).to_string())?;
        seq.serialize_element(&format_timestamp(&self.start))?;
        seq.serialize_element(&format_timestamp(&self.end))?;
        seq.serialize_element(&self.path.string)?;
        seq.serialize_element(&self.condition.name)?;
        if self.value != 0 {
            seq.serialize_element(&self.value)?;
        }
        seq.end()
    }
}

/// Encode an observation as a single JSON array
pub fn encode_observation(obs: &Observation) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(obs)?)
}

/// Decode a JSON array into an unpersisted observation with placeholder
/// path and condition.
pub fn decode_observation(bytes: &[u8]) -> Result<Observation> {
    Ok(observation_from_value(parse_json(bytes)?)?)
}

pub(crate) fn observation_from_value(value: Value) -> std::result::Result<Observation, ValidationError> {
    let Value::Array(items) = value else {
        return Err(ValidationError::WrongShape { expected: "array" });
    };
    if items.len() < MIN_ELEMENTS {
        return Err(ValidationError::TooFewElements(items.len()));
    }

    let set_id = match integer_field("set id", &items[0])? {
        0 => None,
        id if id > 0 => Some(id),
        _ => {
            return Err(ValidationError::BadInteger {
                field: "set id",
                value: items[0].to_string(),
            })
        }
    };

    let start = parse_timestamp("start", text_element("start", &items[1])?)?;
    let end = parse_timestamp("end", text_element("end", &items[2])?)?;
    let path = text_element("path", &items[3])?;
    let condition = text_element("condition", &items[4])?;

    let value = match items.get(5) {
        Some(v) => integer_field("value", v)?,
        None => 0,
    };

    Ok(Observation {
        id: None,
        set_id,
        start,
        end,
        path: Path::new(path),
        condition: Condition::named(condition),
        value,
    })
}

fn text_element<'a>(field: &str, value: &'a Value) -> std::result::Result<&'a str, ValidationError> {
    value.as_str().ok_or_else(|| ValidationError::WrongType {
        field: field.to_string(),
        expected: "a string",
    })
}
