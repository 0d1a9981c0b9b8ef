//! Property tests for the encoder.
//!
//! Ensures the feature-index contract holds for arbitrary logs:
//! - feature_indices is a strict bijection onto [0, vector_width)
//! - encoding is deterministic, padding included
//! - the prefix-generation rule fixes the example count exactly
//! - labels always fall inside the schema's class vocabulary

use chrono::{TimeZone, Utc};
use destilar::encode::{build_schema, encode, EncodeParams};
use destilar::log::{Column, EventTable, ACTIVITY, CASE_ID, TIMESTAMP};
use proptest::collection::vec;
use proptest::prelude::*;

const ACTIVITIES: [&str; 4] = ["A", "B", "C", "D"];

// =============================================================================
// Strategy Helpers
// =============================================================================

/// A trace as activity indices into `ACTIVITIES`.
fn trace(max_len: usize) -> impl Strategy<Value = Vec<usize>> {
    vec(0..ACTIVITIES.len(), 1..=max_len)
}

/// A log as a set of traces.
fn log(max_cases: usize, max_len: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    vec(trace(max_len), 1..=max_cases)
}

/// Materialize traces into an event table with sequential timestamps.
fn table_from(traces: &[Vec<usize>]) -> EventTable {
    let mut case_ids = Vec::new();
    let mut activities = Vec::new();
    let mut stamps = Vec::new();
    let mut tick = 0i64;
    for (case, steps) in traces.iter().enumerate() {
        for &step in steps {
            case_ids.push(format!("case{case}"));
            activities.push(ACTIVITIES[step].to_string());
            stamps.push(Utc.timestamp_opt(tick, 0).single().expect("valid timestamp"));
            tick += 1;
        }
    }
    EventTable::new()
        .with_column(CASE_ID, Column::Categorical(case_ids))
        .expect("case_id column")
        .with_column(ACTIVITY, Column::Categorical(activities))
        .expect("activity column")
        .with_column(TIMESTAMP, Column::Timestamp(stamps))
        .expect("timestamp column")
}

fn all_train(prefix_length: usize) -> EncodeParams {
    EncodeParams {
        test_size: 0.0,
        prefix_length,
        shuffle: false,
        seed: None,
    }
}

// =============================================================================
// Schema Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_feature_indices_bijection(
        traces in log(5, 6),
        prefix_length in 1usize..6,
    ) {
        let table = table_from(&traces);
        let schema = build_schema(&table, &[], &[], prefix_length).unwrap();

        let mut offsets: Vec<usize> = schema.feature_indices.values().copied().collect();
        offsets.sort_unstable();
        let expected: Vec<usize> = (0..schema.vector_width()).collect();
        prop_assert_eq!(offsets, expected);

        for (i, name) in schema.feature_names.iter().enumerate() {
            prop_assert_eq!(schema.feature_indices[name], i);
        }
    }

    #[test]
    fn prop_schema_is_byte_identical(
        traces in log(5, 6),
        prefix_length in 1usize..6,
    ) {
        let table = table_from(&traces);
        let a = build_schema(&table, &[], &[], prefix_length).unwrap();
        let b = build_schema(&table, &[], &[], prefix_length).unwrap();
        prop_assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn prop_pad_is_last_class(traces in log(5, 6)) {
        let table = table_from(&traces);
        let schema = build_schema(&table, &[], &[], 2).unwrap();
        prop_assert_eq!(schema.class_names.last().unwrap().as_str(), "<PAD>");
        let activities: Vec<_> = schema.class_names[..schema.class_names.len() - 1].to_vec();
        let mut sorted = activities.clone();
        sorted.sort();
        prop_assert_eq!(activities, sorted);
    }
}

// =============================================================================
// Encoding Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_example_count_follows_prefix_rule(
        traces in log(5, 6),
        prefix_length in 1usize..6,
    ) {
        let table = table_from(&traces);
        let schema = build_schema(&table, &[], &[], prefix_length).unwrap();
        let data = encode(&table, &schema, &all_train(prefix_length)).unwrap();

        // One example per prefix length 1..=min(trace_len, prefix_length).
        let expected: usize = traces.iter().map(|t| t.len().min(prefix_length)).sum();
        prop_assert_eq!(data.x_train.nrows(), expected);
        prop_assert_eq!(data.y_train.nrows(), expected);
        prop_assert_eq!(data.x_test.nrows(), 0);
    }

    #[test]
    fn prop_encoding_is_deterministic(
        traces in log(4, 5),
        prefix_length in 1usize..5,
    ) {
        let table = table_from(&traces);
        let schema = build_schema(&table, &[], &[], prefix_length).unwrap();
        let a = encode(&table, &schema, &all_train(prefix_length)).unwrap();
        let b = encode(&table, &schema, &all_train(prefix_length)).unwrap();
        prop_assert_eq!(a.x_train, b.x_train);
        prop_assert_eq!(a.y_train, b.y_train);
    }

    #[test]
    fn prop_labels_in_class_range(
        traces in log(5, 6),
        prefix_length in 1usize..6,
    ) {
        let table = table_from(&traces);
        let schema = build_schema(&table, &[], &[], prefix_length).unwrap();
        let data = encode(&table, &schema, &all_train(prefix_length)).unwrap();
        for label in data.train_labels() {
            prop_assert!(label < schema.n_classes());
        }
    }

    #[test]
    fn prop_activity_features_in_class_range(
        traces in log(4, 5),
        prefix_length in 1usize..5,
    ) {
        let table = table_from(&traces);
        let schema = build_schema(&table, &[], &[], prefix_length).unwrap();
        let data = encode(&table, &schema, &all_train(prefix_length)).unwrap();

        // Every activity column holds a valid class index (padding included).
        for row in data.x_train.rows() {
            for pos in 0..prefix_length {
                let value = row[schema.activity_offset(pos)];
                prop_assert!(value >= 0.0);
                prop_assert!((value as usize) < schema.n_classes());
                prop_assert_eq!(value.fract(), 0.0);
            }
        }
    }

    #[test]
    fn prop_split_partitions_examples(
        traces in log(6, 5),
        test_size in 0.0f64..0.9,
    ) {
        let table = table_from(&traces);
        let schema = build_schema(&table, &[], &[], 3).unwrap();
        let all = encode(&table, &schema, &all_train(3)).unwrap();
        let split = encode(
            &table,
            &schema,
            &EncodeParams { test_size, prefix_length: 3, shuffle: false, seed: None },
        )
        .unwrap();

        // Case-scoped split never invents or drops examples.
        prop_assert_eq!(
            split.x_train.nrows() + split.x_test.nrows(),
            all.x_train.nrows()
        );
    }
}
