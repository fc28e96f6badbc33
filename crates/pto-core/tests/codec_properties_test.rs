//! Property tests for the wire codec

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use pto_core::{
    decode_observation, decode_set, encode_observation, encode_set, Observation, ObservationSet,
};

fn arb_set() -> impl Strategy<Value = ObservationSet> {
    (
        prop::collection::vec("[a-zA-Z0-9:/._-]{1,24}", 1..4),
        "[a-z][a-z0-9-]{0,15}",
        prop::collection::vec("[a-z]{1,8}(\\.[a-z_]{1,8}){0,3}", 1..6),
        prop::collection::btree_map("[a-z][a-z0-9_.]{0,12}", "\\PC{0,16}", 0..5),
    )
        .prop_map(|(sources, analyzer, conditions, metadata)| {
            let mut set = ObservationSet::new(analyzer);
            for source in sources {
                set = set.with_source(source);
            }
            for condition in conditions {
                set = set.with_condition(condition);
            }
            set.metadata = metadata;
            set
        })
}

fn arb_observation() -> impl Strategy<Value = Observation> {
    (
        prop::option::of(1i64..i64::MAX),
        0i64..4_000_000_000,
        0u32..1_000_000_000,
        0i64..86_400,
        "\\PC{1,40}",
        "[a-z]{1,8}(\\.[a-z_]{1,8}){0,3}",
        any::<i64>(),
    )
        .prop_map(|(set_id, secs, nanos, span, path, condition, value)| {
            let start = Utc.timestamp_opt(secs, nanos).unwrap();
            let end = Utc.timestamp_opt(secs + span, 0).unwrap();
            let mut obs = Observation::new(start, end, path, condition).with_value(value);
            obs.set_id = set_id;
            obs
        })
}

proptest! {
    #[test]
    fn set_survives_encode_decode(set in arb_set()) {
        let decoded = decode_set(&encode_set(&set).unwrap()).unwrap();
        prop_assert_eq!(decoded, set);
    }

    #[test]
    fn observation_survives_encode_decode(obs in arb_observation()) {
        let decoded = decode_observation(&encode_observation(&obs).unwrap()).unwrap();
        prop_assert_eq!(decoded, obs);
    }
}
