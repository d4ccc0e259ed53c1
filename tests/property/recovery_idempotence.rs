//! Recovery is a pure function and re-recovering accepted output is a no-op.

use proptest::prelude::*;
use quarry::recovery::{recover, RecoveryOutcome};
use serde_json::{Map, Value};

const REQUIRED: [&str; 2] = ["short_description", "description"];

fn field_value() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 .'-]{0,40}"
}

fn record() -> impl Strategy<Value = Map<String, Value>> {
    (field_value(), field_value(), prop::option::of(field_value())).prop_map(
        |(short, description, notes)| {
            let mut map = Map::new();
            map.insert("short_description".to_string(), Value::from(short));
            map.insert("description".to_string(), Value::from(description));
            if let Some(notes) = notes {
                map.insert("work_notes".to_string(), Value::from(notes));
            }
            map
        },
    )
}

/// Accepted output serialized back to JSON recovers to the same object
#[test]
fn test_recovery_idempotence_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&record(), |map| {
            let text = serde_json::to_string(&map).unwrap();
            let first = match recover(&text, &REQUIRED) {
                RecoveryOutcome::Accepted(first) => first,
                other => panic!("clean JSON rejected: {:?}", other),
            };
            prop_assert_eq!(&first, &map);

            let again = serde_json::to_string(&first).unwrap();
            prop_assert_eq!(recover(&again, &REQUIRED), RecoveryOutcome::Accepted(map));
            Ok(())
        })
        .unwrap();
}

/// Fences, prose and pretty-printing do not change what is recovered
#[test]
fn test_wrapping_does_not_change_result_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(record(), "[A-Za-z ]{0,30}"), |(map, preamble)| {
            let pretty = serde_json::to_string_pretty(&map).unwrap();
            let wrapped = format!("{}\n```json\n{}\n```", preamble, pretty);
            let direct = recover(&serde_json::to_string(&map).unwrap(), &REQUIRED);
            prop_assert_eq!(recover(&wrapped, &REQUIRED), direct);
            Ok(())
        })
        .unwrap();
}

/// Arbitrary input never panics and always yields the same outcome
#[test]
fn test_recovery_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<String>(), |text| {
            prop_assert_eq!(recover(&text, &REQUIRED), recover(&text, &REQUIRED));
            Ok(())
        })
        .unwrap();
}
