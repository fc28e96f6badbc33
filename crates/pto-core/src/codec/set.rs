//! Observation set metadata objects

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::{Result, ValidationError};
use crate::model::{Condition, ObservationSet};

/// Ordered list of raw data sources
pub const SOURCES_KEY: &str = "_sources";
/// Analyzer identifier
pub const ANALYZER_KEY: &str = "_analyzer";
/// Declared condition names
pub const CONDITIONS_KEY: &str = "_conditions";
/// Computed resource link
pub const LINK_KEY: &str = "__link";
/// Computed data sub-resource link
pub const DATA_KEY: &str = "__data";
/// Computed observation count
pub const COUNT_KEY: &str = "__obs_count";

fn is_reserved(key: &str) -> bool {
    key == SOURCES_KEY || key == ANALYZER_KEY || key == CONDITIONS_KEY || key.starts_with("__")
}

impl Serialize for ObservationSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(SOURCES_KEY, &self.sources)?;
        map.serialize_entry(ANALYZER_KEY, &self.analyzer)?;
        let names: Vec<&str> = self.condition_names().collect();
        map.serialize_entry(CONDITIONS_KEY, &names)?;

        if let Some(links) = self.links() {
            map.serialize_entry(LINK_KEY, &links.link)?;
            map.serialize_entry(DATA_KEY, &links.data)?;
        }
        if let Some(count) = self.cached_count().filter(|&n| n != 0) {
            map.serialize_entry(COUNT_KEY, &count)?;
        }

        for (key, value) in self.metadata.iter().filter(|(k, _)| !is_reserved(k)) {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Encode a set as a JSON metadata object
pub fn encode_set(set: &ObservationSet) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(set)?)
}

/// Decode a JSON metadata object into an unpersisted set.
///
/// Conditions come back as placeholders with no id. Any `__` keys are
/// ignored; any incoming id is discarded.
pub fn decode_set(bytes: &[u8]) -> Result<ObservationSet> {
    Ok(set_from_value(super::parse_json(bytes)?)?)
}

pub(crate) fn set_from_value(value: Value) -> std::result::Result<ObservationSet, ValidationError> {
    let Value::Object(object) = value else {
        return Err(ValidationError::WrongShape { expected: "object" });
    };
    set_from_object(object)
}

fn set_from_object(object: Map<String, Value>) -> std::result::Result<ObservationSet, ValidationError> {
    let mut set = ObservationSet::default();
    let mut sources = None;
    let mut analyzer = None;
    let mut conditions = None;

    for (key, value) in object {
        match key.as_str() {
            SOURCES_KEY => sources = Some(string_array(SOURCES_KEY, value)?),
            ANALYZER_KEY => match value {
                Value::String(s) => analyzer = Some(s),
                _ => {
                    return Err(ValidationError::WrongType {
                        field: ANALYZER_KEY.to_string(),
                        expected: "a string",
                    })
                }
            },
            CONDITIONS_KEY => conditions = Some(string_array(CONDITIONS_KEY, value)?),
            k if k.starts_with("__") => {}
            _ => {
                let value = metadata_value(&key, value)?;
                set.metadata.insert(key, value);
            }
        }
    }

    set.sources = non_empty(SOURCES_KEY, sources)?;
    set.analyzer = match analyzer {
        None => return Err(ValidationError::MissingField(ANALYZER_KEY)),
        Some(a) if a.is_empty() => return Err(ValidationError::EmptyField(ANALYZER_KEY)),
        Some(a) => a,
    };
    set.conditions = non_empty(CONDITIONS_KEY, conditions)?
        .into_iter()
        .map(Condition::named)
        .collect();

    Ok(set)
}

fn non_empty(
    field: &'static str,
    values: Option<Vec<String>>,
) -> std::result::Result<Vec<String>, ValidationError> {
    match values {
        None => Err(ValidationError::MissingField(field)),
        Some(v) if v.is_empty() => Err(ValidationError::EmptyField(field)),
        Some(v) => Ok(v),
    }
}

fn string_array(field: &'static str, value: Value) -> std::result::Result<Vec<String>, ValidationError> {
    let wrong = || ValidationError::WrongType {
        field: field.to_string(),
        expected: "an array of strings",
    };
    let Value::Array(items) = value else {
        return Err(wrong());
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            _ => Err(wrong()),
        })
        .collect()
}

fn metadata_value(key: &str, value: Value) -> std::result::Result<String, ValidationError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ValidationError::WrongType {
            field: key.to_string(),
            expected: "a string, number or boolean",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PtoError;

    fn validation(bytes: &str) -> ValidationError {
        match decode_set(bytes.as_bytes()) {
            Err(PtoError::Validation(v)) => v,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_minimal_set() {
        let set = decode_set(
            br#"{"_sources":["agentA"],"_analyzer":"pto-basic","_conditions":["icmp.unreachable"]}"#,
        )
        .unwrap();

        assert_eq!(set.id, None);
        assert_eq!(set.sources, vec!["agentA"]);
        assert_eq!(set.analyzer, "pto-basic");
        assert_eq!(set.conditions, vec![Condition::named("icmp.unreachable")]);
        assert!(set.metadata.is_empty());
    }

    #[test]
    fn test_decode_splits_metadata_and_ignores_computed_keys() {
        let set = decode_set(
            br#"{
                "_sources": ["a", "b"],
                "_analyzer": "ecn-v2",
                "_conditions": ["ecn.connectivity.works", "ecn.connectivity.broken"],
                "__link": "http://example/obs/0000000000000001",
                "__obs_count": 17,
                "_id": 99,
                "campaign": "2017-09",
                "vantage_points": 12,
                "ipv6": false
            }"#,
        )
        .unwrap();

        assert_eq!(set.id, None);
        assert_eq!(set.sources, vec!["a", "b"]);
        assert_eq!(
            set.condition_names().collect::<Vec<_>>(),
            vec!["ecn.connectivity.works", "ecn.connectivity.broken"]
        );
        assert_eq!(set.metadata.get("campaign").map(String::as_str), Some("2017-09"));
        assert_eq!(set.metadata.get("vantage_points").map(String::as_str), Some("12"));
        assert_eq!(set.metadata.get("ipv6").map(String::as_str), Some("false"));
        assert_eq!(set.metadata.get("_id").map(String::as_str), Some("99"));
        assert!(!set.metadata.contains_key("__link"));
        assert!(set.links().is_none());
    }

    #[test]
    fn test_decode_rejects_missing_and_mistyped_fields() {
        assert_eq!(
            validation(r#"{"_analyzer":"a","_conditions":["c"]}"#),
            ValidationError::MissingField(SOURCES_KEY)
        );
        assert_eq!(
            validation(r#"{"_sources":["s"],"_conditions":["c"]}"#),
            ValidationError::MissingField(ANALYZER_KEY)
        );
        assert_eq!(
            validation(r#"{"_sources":["s"],"_analyzer":"a"}"#),
            ValidationError::MissingField(CONDITIONS_KEY)
        );
        assert_eq!(
            validation(r#"{"_sources":[],"_analyzer":"a","_conditions":["c"]}"#),
            ValidationError::EmptyField(SOURCES_KEY)
        );
        assert_eq!(
            validation(r#"{"_sources":["s"],"_analyzer":"","_conditions":["c"]}"#),
            ValidationError::EmptyField(ANALYZER_KEY)
        );
        assert_eq!(
            validation(r#"{"_sources":["s"],"_analyzer":"a","_conditions":[]}"#),
            ValidationError::EmptyField(CONDITIONS_KEY)
        );
        assert!(matches!(
            validation(r#"{"_sources":"s","_analyzer":"a","_conditions":["c"]}"#),
            ValidationError::WrongType { .. }
        ));
        assert!(matches!(
            validation(r#"{"_sources":["s", 4],"_analyzer":"a","_conditions":["c"]}"#),
            ValidationError::WrongType { .. }
        ));
        assert!(matches!(
            validation(r#"{"_sources":["s"],"_analyzer":7,"_conditions":["c"]}"#),
            ValidationError::WrongType { .. }
        ));
        assert!(matches!(
            validation(r#"{"_sources":["s"],"_analyzer":"a","_conditions":["c"],"nested":{"x":1}}"#),
            ValidationError::WrongType { .. }
        ));
        assert_eq!(
            validation(r#"["not", "an", "object"]"#),
            ValidationError::WrongShape { expected: "object" }
        );
        assert!(matches!(validation("{"), ValidationError::MalformedJson(_)));
    }

    #[test]
    fn test_encode_emits_computed_keys_only_when_known() {
        let mut set = ObservationSet::new("pto-basic")
            .with_source("agentA")
            .with_condition("icmp.unreachable")
            .with_metadata("campaign", "test");

        let plain: Value = serde_json::from_slice(&encode_set(&set).unwrap()).unwrap();
        assert_eq!(plain["_sources"], serde_json::json!(["agentA"]));
        assert_eq!(plain["_conditions"], serde_json::json!(["icmp.unreachable"]));
        assert_eq!(plain["campaign"], "test");
        assert!(plain.get(LINK_KEY).is_none());
        assert!(plain.get(COUNT_KEY).is_none());

        set.id = Some(1);
        set.cache_count(0);
        set.derive_links(&url::Url::parse("http://pto.example/").unwrap())
            .unwrap();
        let full: Value = serde_json::from_slice(&encode_set(&set).unwrap()).unwrap();
        assert_eq!(full[LINK_KEY], "http://pto.example/obs/0000000000000001");
        assert_eq!(full[DATA_KEY], "http://pto.example/obs/0000000000000001/data");
        assert!(full.get(COUNT_KEY).is_none(), "zero count is omitted");

        set.cache_count(3);
        let counted: Value = serde_json::from_slice(&encode_set(&set).unwrap()).unwrap();
        assert_eq!(counted[COUNT_KEY], 3);
    }

    #[test]
    fn test_reserved_metadata_keys_are_not_emitted() {
        let mut set = ObservationSet::new("a").with_source("s").with_condition("c");
        set.metadata.insert("__link".into(), "forged".into());
        set.metadata.insert(ANALYZER_KEY.into(), "forged".into());

        let out: Value = serde_json::from_slice(&encode_set(&set).unwrap()).unwrap();
        assert_eq!(out[ANALYZER_KEY], "a");
        assert!(out.get("__link").is_none());
    }
}
