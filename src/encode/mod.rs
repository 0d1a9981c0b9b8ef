//! Prefix-based feature and label encoding.
//!
//! Turns variable-length event traces into fixed-width numeric vectors with a
//! stable feature-index schema:
//!
//! - [`FeatureSchema`]: class names, attribute pools, and the feature
//!   name→column bijection, built once per session and immutable afterward
//! - [`encode`]: prefix slicing, padding, one-hot labels, and the
//!   case-scoped train/test split

mod dataset;
mod schema;

pub use dataset::{argmax_rows, encode, one_hot, EncodeParams, EncodedDataset};
pub use schema::{build_schema, FeatureSchema, PAD_LABEL};
