//! Feature schema: the class vocabulary and feature-index contract.
//!
//! The schema is produced once per session and bound to every downstream
//! artifact (encoded datasets, the surrogate tree, evaluation reports).
//! Identical input and parameters yield a byte-identical schema; tree
//! feature indices silently depend on this.

use crate::error::{DestilarError, Result};
use crate::log::{EventTable, ACTIVITY, CASE_ID, TIMESTAMP};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved padding label, always the last entry of `class_names`.
pub const PAD_LABEL: &str = "<PAD>";

/// The feature-index schema binding encoder, tree, and network together.
///
/// `feature_indices` is a strict bijection: every feature name maps to a
/// unique column offset, and the offsets cover `[0, vector_width)` exactly.
/// Per prefix position `k` (1-based) the layout is: the activity feature,
/// then one feature per categorical attribute (sorted by name), then one per
/// numerical attribute (sorted by name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Sorted unique activity labels with [`PAD_LABEL`] appended last.
    pub class_names: Vec<String>,
    /// Sorted distinct values per categorical attribute.
    pub attribute_pools: BTreeMap<String, Vec<String>>,
    /// Numerical attribute names, sorted.
    pub numerical_attrs: Vec<String>,
    /// Feature names in column order.
    pub feature_names: Vec<String>,
    /// Feature name → column offset bijection.
    pub feature_indices: BTreeMap<String, usize>,
    /// Number of prefix positions encoded per example.
    pub prefix_length: usize,
}

impl FeatureSchema {
    /// Width of an encoded feature vector.
    pub fn vector_width(&self) -> usize {
        self.feature_names.len()
    }

    /// Number of prediction classes, padding included.
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Class index of the padding label.
    pub fn pad_index(&self) -> usize {
        self.class_names.len() - 1
    }

    /// Class index of an activity label.
    pub fn class_index(&self, label: &str) -> Option<usize> {
        self.class_names.iter().position(|c| c == label)
    }

    /// Column offset of a feature name.
    pub fn feature_index(&self, name: &str) -> Result<usize> {
        self.feature_indices.get(name).copied().ok_or_else(|| {
            DestilarError::schema(format!("unknown feature '{name}'"))
        })
    }

    /// Features per prefix position.
    pub fn position_stride(&self) -> usize {
        1 + self.attribute_pools.len() + self.numerical_attrs.len()
    }

    /// Column offset of the activity feature at 0-based position `pos`.
    pub fn activity_offset(&self, pos: usize) -> usize {
        pos * self.position_stride()
    }

    /// Column offset of the `i`-th categorical attribute at position `pos`.
    ///
    /// `i` indexes `attribute_pools` in key order.
    pub fn categorical_offset(&self, pos: usize, i: usize) -> usize {
        pos * self.position_stride() + 1 + i
    }

    /// Column offset of the `j`-th numerical attribute at position `pos`.
    pub fn numerical_offset(&self, pos: usize, j: usize) -> usize {
        pos * self.position_stride() + 1 + self.attribute_pools.len() + j
    }

    /// Pool position of a categorical value, if observed at schema build time.
    pub fn pool_index(&self, attr: &str, value: &str) -> Option<usize> {
        self.attribute_pools
            .get(attr)
            .and_then(|pool| pool.iter().position(|v| v == value))
    }
}

/// Build the feature schema from a raw event table.
///
/// `class_names` are the sorted unique activity labels plus the reserved
/// padding label; attribute pools assign each categorical attribute's
/// distinct values a stable (sorted) order; feature names enumerate one
/// feature per attribute plus the activity itself for every prefix position.
///
/// # Errors
///
/// `MissingColumn` if a requested attribute (or a required column) is absent,
/// `InvalidParam` for a zero prefix length or an attribute name that shadows
/// a required column.
pub fn build_schema(
    table: &EventTable,
    categorical_attrs: &[String],
    numerical_attrs: &[String],
    prefix_length: usize,
) -> Result<FeatureSchema> {
    if prefix_length == 0 {
        return Err(DestilarError::InvalidParam {
            param: "prefix_length".into(),
            message: "must be at least 1".into(),
        });
    }
    for attr in categorical_attrs.iter().chain(numerical_attrs) {
        if attr == CASE_ID || attr == ACTIVITY || attr == TIMESTAMP {
            return Err(DestilarError::InvalidParam {
                param: "attributes".into(),
                message: format!("'{attr}' is a required column, not an attribute"),
            });
        }
    }

    let activities = table.activities()?;
    if activities.is_empty() {
        return Err(DestilarError::EmptyTable);
    }

    let mut class_names: Vec<String> = activities.to_vec();
    class_names.sort();
    class_names.dedup();
    class_names.push(PAD_LABEL.to_string());

    let mut attribute_pools = BTreeMap::new();
    for attr in categorical_attrs {
        let values = table.categorical(attr)?;
        let mut pool: Vec<String> = values.to_vec();
        pool.sort();
        pool.dedup();
        attribute_pools.insert(attr.clone(), pool);
    }

    let mut num_attrs: Vec<String> = numerical_attrs.to_vec();
    num_attrs.sort();
    num_attrs.dedup();
    for attr in &num_attrs {
        table.numerical(attr)?;
    }

    let mut feature_names = Vec::new();
    for pos in 1..=prefix_length {
        feature_names.push(format!("activity_{pos}"));
        for attr in attribute_pools.keys() {
            feature_names.push(format!("{attr}_{pos}"));
        }
        for attr in &num_attrs {
            feature_names.push(format!("{attr}_{pos}"));
        }
    }

    let feature_indices: BTreeMap<String, usize> = feature_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect();
    if feature_indices.len() != feature_names.len() {
        // A categorical and numerical attribute sharing a name, or an
        // attribute literally named "activity", would collapse the bijection.
        return Err(DestilarError::InvalidParam {
            param: "attributes".into(),
            message: "attribute names produce duplicate feature names".into(),
        });
    }

    Ok(FeatureSchema {
        class_names,
        attribute_pools,
        numerical_attrs: num_attrs,
        feature_names,
        feature_indices,
        prefix_length,
    })
}
