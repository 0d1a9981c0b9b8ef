//! Mutable decision-tree surrogate.
//!
//! An arena-of-nodes decision tree distilled from the network's predictions,
//! supporting structural edits (branch removal, subtree retraining, split
//! modification) while preserving evaluability and the class/feature-index
//! contract produced by the encoder:
//!
//! - [`SurrogateTree`]: fit / predict / modify_node / delete_branch /
//!   delete_node, plus the serde round-trip that is its only persistence
//!   contract
//! - [`TreeParams`]: cost-complexity pruning and growth constraints
//! - [`PruneDirection`]: which side `delete_branch` removes

mod cart;
mod node;
mod surrogate;

pub use cart::TreeParams;
pub use node::{Node, NodeId, SerialNode, SerialTree};
pub use surrogate::{PruneDirection, SurrogateTree};
