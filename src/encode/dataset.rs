//! Prefix example generation and case-scoped train/test splitting.

use super::schema::FeatureSchema;
use crate::error::{DestilarError, Result};
use crate::log::EventTable;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Encoding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeParams {
    /// Fraction of cases assigned to the test partition.
    pub test_size: f64,
    /// Prefix positions per example; must match the schema it is used with.
    pub prefix_length: usize,
    /// Randomize case assignment before the split.
    pub shuffle: bool,
    /// Seed for the shuffle; OS entropy when absent.
    pub seed: Option<u64>,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            test_size: 0.3,
            prefix_length: 3,
            shuffle: false,
            seed: None,
        }
    }
}

/// Encoded training and test matrices, row-aligned with one-hot labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedDataset {
    pub x_train: Array2<f32>,
    pub y_train: Array2<f32>,
    pub x_test: Array2<f32>,
    pub y_test: Array2<f32>,
}

impl EncodedDataset {
    /// Hard integer labels for the training partition.
    pub fn train_labels(&self) -> Vec<usize> {
        argmax_rows(&self.y_train)
    }

    /// Hard integer labels for the test partition.
    pub fn test_labels(&self) -> Vec<usize> {
        argmax_rows(&self.y_test)
    }
}

/// One-hot encode integer labels over `n_classes` columns.
pub fn one_hot(labels: &[usize], n_classes: usize) -> Array2<f32> {
    let mut y = Array2::zeros((labels.len(), n_classes));
    for (row, &label) in labels.iter().enumerate() {
        y[[row, label]] = 1.0;
    }
    y
}

/// Row-wise arg-max: soft predictions or one-hot labels → hard class indices.
///
/// Ties resolve to the lowest class index.
pub fn argmax_rows(y: &Array2<f32>) -> Vec<usize> {
    y.rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_val = f32::NEG_INFINITY;
            for (i, &v) in row.iter().enumerate() {
                if v > best_val {
                    best_val = v;
                    best = i;
                }
            }
            best
        })
        .collect()
}

/// One case's event rows, ordered by timestamp.
struct CaseTrace {
    rows: Vec<usize>,
}

/// Encode the event table into prefix examples and split by case identity.
///
/// Each case contributes one example per prefix length
/// `1..=min(trace_len, prefix_length)`; the label is the next activity, or
/// the padding class when the prefix covers the whole trace. No case
/// contributes to both partitions. With `shuffle=false` the first-seen case
/// order is preserved, which keeps evaluation reproducible across runs.
///
/// # Errors
///
/// `InvalidParam` for an out-of-range `test_size` or a `prefix_length`
/// disagreeing with the schema; `SchemaMismatch` when the table holds an
/// activity or attribute value the schema has never seen (stale schema).
pub fn encode(
    table: &EventTable,
    schema: &FeatureSchema,
    params: &EncodeParams,
) -> Result<EncodedDataset> {
    if !(0.0..1.0).contains(&params.test_size) {
        return Err(DestilarError::InvalidParam {
            param: "test_size".into(),
            message: format!("must be in [0, 1), got {}", params.test_size),
        });
    }
    if params.prefix_length != schema.prefix_length {
        return Err(DestilarError::InvalidParam {
            param: "prefix_length".into(),
            message: format!(
                "schema was built with prefix_length {}, got {}",
                schema.prefix_length, params.prefix_length
            ),
        });
    }

    let case_ids = table.case_ids()?;
    if case_ids.is_empty() {
        return Err(DestilarError::EmptyTable);
    }
    let activities = table.activities()?;
    let timestamps = table.timestamps()?;

    let cat_attrs: Vec<&String> = schema.attribute_pools.keys().collect();
    let mut cat_columns = Vec::with_capacity(cat_attrs.len());
    for attr in &cat_attrs {
        cat_columns.push(table.categorical(attr)?);
    }
    let mut num_columns = Vec::with_capacity(schema.numerical_attrs.len());
    for attr in &schema.numerical_attrs {
        num_columns.push(table.numerical(attr)?);
    }

    // Group rows by case in first-appearance order, each trace sorted by
    // timestamp (stable, so simultaneous events keep their log order).
    let mut case_order: Vec<&String> = Vec::new();
    let mut traces: Vec<CaseTrace> = Vec::new();
    for (row, case) in case_ids.iter().enumerate() {
        match case_order.iter().position(|c| *c == case) {
            Some(i) => traces[i].rows.push(row),
            None => {
                case_order.push(case);
                traces.push(CaseTrace { rows: vec![row] });
            }
        }
    }
    for trace in &mut traces {
        trace.rows.sort_by_key(|&r| timestamps[r]);
    }

    let n_cases = traces.len();
    let mut order: Vec<usize> = (0..n_cases).collect();
    if params.shuffle {
        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        order.shuffle(&mut rng);
    }
    let n_test = ((n_cases as f64) * params.test_size).round() as usize;
    let n_train = n_cases - n_test.min(n_cases);

    let width = schema.vector_width();
    let n_classes = schema.n_classes();
    let mut partitions = [
        (Vec::<f32>::new(), Vec::<usize>::new()), // train
        (Vec::<f32>::new(), Vec::<usize>::new()), // test
    ];

    for (rank, &case_idx) in order.iter().enumerate() {
        let part = usize::from(rank >= n_train);
        let (x_flat, labels) = &mut partitions[part];
        let trace = &traces[case_idx];
        let len = trace.rows.len();

        for k in 1..=len.min(schema.prefix_length) {
            for pos in 0..schema.prefix_length {
                if pos < k {
                    let row = trace.rows[pos];
                    let activity = &activities[row];
                    let class = schema.class_index(activity).ok_or_else(|| {
                        DestilarError::schema(format!(
                            "activity '{activity}' not present in schema"
                        ))
                    })?;
                    x_flat.push(class as f32);
                    for (i, column) in cat_columns.iter().enumerate() {
                        let value = &column[row];
                        let pool_idx =
                            schema.pool_index(cat_attrs[i], value).ok_or_else(|| {
                                DestilarError::schema(format!(
                                    "value '{value}' of '{}' not present in schema",
                                    cat_attrs[i]
                                ))
                            })?;
                        x_flat.push((pool_idx + 1) as f32);
                    }
                    for column in &num_columns {
                        x_flat.push(column[row] as f32);
                    }
                } else {
                    // Beyond the prefix: padding class for the activity,
                    // zero sentinel for every attribute.
                    x_flat.push(schema.pad_index() as f32);
                    for _ in 0..cat_columns.len() + num_columns.len() {
                        x_flat.push(0.0);
                    }
                }
            }
            let label = if k < len {
                let next = &activities[trace.rows[k]];
                schema.class_index(next).ok_or_else(|| {
                    DestilarError::schema(format!("activity '{next}' not present in schema"))
                })?
            } else {
                schema.pad_index()
            };
            labels.push(label);
        }
    }

    let [(train_x, train_labels), (test_x, test_labels)] = partitions;
    let to_matrix = |flat: Vec<f32>, rows: usize| {
        Array2::from_shape_vec((rows, width), flat).map_err(|e| DestilarError::ShapeMismatch {
            context: format!("encoded matrix: {e}"),
            expected: vec![rows, width],
            actual: vec![],
        })
    };
    let n_train_rows = train_labels.len();
    let n_test_rows = test_labels.len();

    Ok(EncodedDataset {
        x_train: to_matrix(train_x, n_train_rows)?,
        y_train: one_hot(&train_labels, n_classes),
        x_test: to_matrix(test_x, n_test_rows)?,
        y_test: one_hot(&test_labels, n_classes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::schema::build_schema;
    use crate::log::{Column, ACTIVITY, CASE_ID, TIMESTAMP};
    use chrono::{TimeZone, Utc};

    fn two_case_table() -> EventTable {
        // Case c1: A -> B -> C, case c2: A -> C.
        let stamps: Vec<_> = (0..5)
            .map(|s| Utc.timestamp_opt(s, 0).single().expect("valid"))
            .collect();
        EventTable::new()
            .with_column(
                CASE_ID,
                Column::Categorical(vec![
                    "c1".into(),
                    "c1".into(),
                    "c1".into(),
                    "c2".into(),
                    "c2".into(),
                ]),
            )
            .unwrap()
            .with_column(
                ACTIVITY,
                Column::Categorical(vec![
                    "A".into(),
                    "B".into(),
                    "C".into(),
                    "A".into(),
                    "C".into(),
                ]),
            )
            .unwrap()
            .with_column(TIMESTAMP, Column::Timestamp(stamps))
            .unwrap()
    }

    fn no_split() -> EncodeParams {
        EncodeParams {
            test_size: 0.0,
            prefix_length: 2,
            shuffle: false,
            seed: None,
        }
    }

    #[test]
    fn test_prefix_generation_rule() {
        let table = two_case_table();
        let schema = build_schema(&table, &[], &[], 2).unwrap();
        assert_eq!(schema.class_names, vec!["A", "B", "C", "<PAD>"]);

        let data = encode(&table, &schema, &no_split()).unwrap();
        // One example per prefix length 1..=min(trace_len, 2) per case.
        assert_eq!(data.x_train.nrows(), 4);
        assert_eq!(data.x_test.nrows(), 0);

        // Labels: c1 -> [B, C], c2 -> [C, <PAD>].
        assert_eq!(data.train_labels(), vec![1, 2, 2, 3]);

        // First example: prefix [A], second position padded.
        assert_eq!(data.x_train[[0, 0]], 0.0); // class index of A
        assert_eq!(data.x_train[[0, 1]], schema.pad_index() as f32);
        // Second example: prefix [A, B].
        assert_eq!(data.x_train[[1, 0]], 0.0);
        assert_eq!(data.x_train[[1, 1]], 1.0);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let table = two_case_table();
        let schema = build_schema(&table, &[], &[], 2).unwrap();
        let a = encode(&table, &schema, &no_split()).unwrap();
        let b = encode(&table, &schema, &no_split()).unwrap();
        assert_eq!(a.x_train, b.x_train);
        assert_eq!(a.y_train, b.y_train);
    }

    #[test]
    fn test_case_scoped_split() {
        let table = two_case_table();
        let schema = build_schema(&table, &[], &[], 2).unwrap();
        let params = EncodeParams {
            test_size: 0.5,
            ..no_split()
        };
        let data = encode(&table, &schema, &params).unwrap();
        // One case each: c1 (2 examples) trains, c2 (2 examples) tests.
        assert_eq!(data.x_train.nrows(), 2);
        assert_eq!(data.x_test.nrows(), 2);
        assert_eq!(data.train_labels(), vec![1, 2]);
        assert_eq!(data.test_labels(), vec![2, 3]);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let table = two_case_table();
        let schema = build_schema(&table, &[], &[], 2).unwrap();
        let params = EncodeParams {
            test_size: 0.5,
            shuffle: true,
            seed: Some(7),
            ..no_split()
        };
        let a = encode(&table, &schema, &params).unwrap();
        let b = encode(&table, &schema, &params).unwrap();
        assert_eq!(a.x_train, b.x_train);
        assert_eq!(a.x_test, b.x_test);
    }

    #[test]
    fn test_stale_schema_rejected() {
        let table = two_case_table();
        let schema = build_schema(&table, &[], &[], 2).unwrap();

        let other = EventTable::new()
            .with_column(CASE_ID, Column::Categorical(vec!["c9".into()]))
            .unwrap()
            .with_column(ACTIVITY, Column::Categorical(vec!["Z".into()]))
            .unwrap()
            .with_column(
                TIMESTAMP,
                Column::Timestamp(vec![Utc.timestamp_opt(0, 0).single().expect("valid")]),
            )
            .unwrap();
        let err = encode(&other, &schema, &no_split()).unwrap_err();
        assert!(matches!(err, DestilarError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_prefix_length_must_match_schema() {
        let table = two_case_table();
        let schema = build_schema(&table, &[], &[], 2).unwrap();
        let params = EncodeParams {
            prefix_length: 3,
            ..no_split()
        };
        assert!(matches!(
            encode(&table, &schema, &params),
            Err(DestilarError::InvalidParam { .. })
        ));
    }

    #[test]
    fn test_one_hot_and_argmax_round_trip() {
        let labels = vec![0, 2, 1, 2];
        let y = one_hot(&labels, 3);
        assert_eq!(argmax_rows(&y), labels);
    }
}
