//! # destilar
//!
//! Interactive decision-tree distillation for next-activity prediction over
//! process-event logs.
//!
//! An analyst loads an event log, trains a neural classifier that predicts
//! the next activity in a trace, distills it into an interpretable decision
//! tree, edits the tree's structure, and fine-tunes the network toward the
//! edited tree's behavior:
//!
//! - [`log`]: the column-oriented event table
//! - [`encode`]: feature schema and prefix-based example encoding
//! - [`network`]: the trainable classifier capability trait and the bundled
//!   feed-forward implementation
//! - [`tree`]: the editable decision-tree surrogate
//! - [`distill`]: network→tree distillation and tree→network fine-tuning
//! - [`eval`]: comparable classification metrics for both models
//! - [`store`]: session-keyed artifact persistence
//!
//! # Example
//!
//! ```no_run
//! use destilar::encode::{build_schema, encode, EncodeParams};
//! use destilar::distill::{distill, evaluate_tree};
//! use destilar::log::EventTable;
//! use destilar::network::{Model, MlpClassifier, NetworkParams, TrainParams};
//! use destilar::tree::TreeParams;
//!
//! # fn main() -> destilar::Result<()> {
//! let table = EventTable::from_csv("events.csv")?;
//! let schema = build_schema(&table, &[], &[], 3)?;
//! let data = encode(&table, &schema, &EncodeParams::default())?;
//!
//! let mut network =
//!     MlpClassifier::new(schema.vector_width(), schema.n_classes(), &NetworkParams::default())?;
//! network.train(&data.x_train, &data.y_train, &TrainParams::default())?;
//!
//! let mut tree = distill(&network, &data.x_train, &schema, &TreeParams::default())?;
//! tree.delete_branch(tree.root(), "auto".parse()?)?;
//! let report = evaluate_tree(&tree, &data.x_test, &data.y_test)?;
//! println!("tree accuracy after edit: {:.4}", report.accuracy);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod distill;
pub mod encode;
pub mod error;
pub mod eval;
pub mod log;
pub mod network;
pub mod store;
pub mod tree;

pub use error::{DestilarError, Result};
