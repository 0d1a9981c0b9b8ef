//! The editable surrogate tree.
//!
//! Nodes live in an arena indexed by integer id; edits rewrite indices
//! instead of performing pointer surgery, and excised slots are tombstoned
//! so a stale id fails with `NodeNotFound` instead of addressing a
//! recycled node. Ids are pre-order positions assigned at fit or load time;
//! the serialized nested form (the tree's only persistent identity) does not
//! carry ids, so a save/load cycle renumbers them.

use super::cart::{self, TreeParams};
use super::node::{Node, NodeId, SerialNode, SerialTree};
use crate::encode::FeatureSchema;
use crate::error::{DestilarError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use std::fmt;
use std::str::FromStr;

/// Which child subtree `delete_branch` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneDirection {
    Left,
    Right,
    /// Prune the child with the smaller subtree sample count (tie: left).
    Auto,
}

impl FromStr for PruneDirection {
    type Err = DestilarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "auto" => Ok(Self::Auto),
            other => Err(DestilarError::InvalidDirection {
                direction: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PruneDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Auto => "auto",
        };
        f.write_str(s)
    }
}

/// A fitted, editable decision tree bound to the encoder's feature schema.
#[derive(Debug, Clone)]
pub struct SurrogateTree {
    nodes: Vec<Option<Node>>,
    root: NodeId,
    schema: FeatureSchema,
    params: TreeParams,
}

impl SurrogateTree {
    /// Train a tree from scratch on hard integer labels.
    ///
    /// Binds the supplied schema to the result; `params` are retained for
    /// later subtree retraining by [`delete_node`](Self::delete_node).
    pub fn fit(
        x: &Array2<f32>,
        y: &[usize],
        schema: FeatureSchema,
        params: TreeParams,
    ) -> Result<Self> {
        validate_training_data(x, y, &schema)?;
        let nodes = cart::grow(x, y, schema.n_classes(), &params);
        Ok(Self {
            nodes: nodes.into_iter().map(Some).collect(),
            root: 0,
            schema,
            params,
        })
    }

    /// The bound feature schema.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// The hyperparameters the tree was fit with.
    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Root node id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(DestilarError::NodeNotFound { node_id: id })
    }

    /// Live node ids in pre-order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            ids.push(id);
            if let Some(Node::Branch { left, right, .. }) = self.nodes.get(id).and_then(Option::as_ref)
            {
                stack.push(*right);
                stack.push(*left);
            }
        }
        ids
    }

    /// Number of nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.node_ids().len()
    }

    /// Depth of the tree (a lone root leaf has depth 0).
    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Option<Node>], id: NodeId) -> usize {
            match nodes.get(id).and_then(Option::as_ref) {
                Some(Node::Branch { left, right, .. }) => {
                    1 + depth_of(nodes, *left).max(depth_of(nodes, *right))
                }
                _ => 0,
            }
        }
        depth_of(&self.nodes, self.root)
    }

    /// Predict the class index for one encoded row.
    pub fn predict_row(&self, row: ArrayView1<'_, f32>) -> Result<usize> {
        if row.len() != self.schema.vector_width() {
            return Err(DestilarError::ShapeMismatch {
                context: "predict row".into(),
                expected: vec![self.schema.vector_width()],
                actual: vec![row.len()],
            });
        }
        let mut id = self.root;
        loop {
            match self.node(id)? {
                Node::Leaf { class, .. } => return Ok(*class),
                Node::Branch {
                    feature_index,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    id = if f64::from(row[*feature_index]) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Predict class indices for a matrix of encoded rows.
    pub fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    /// Update an internal node's split in place without retraining.
    ///
    /// Only the decision boundary moves: the subtree structure and every
    /// descendant stay untouched, so predictions change but tree shape does
    /// not.
    pub fn modify_node(
        &mut self,
        node_id: NodeId,
        threshold: Option<f64>,
        feature_index: Option<usize>,
    ) -> Result<()> {
        if self.node(node_id)?.is_leaf() {
            return Err(DestilarError::InvalidNode {
                node_id,
                message: "leaf nodes have no split to modify".into(),
            });
        }
        let width = self.schema.vector_width();
        if let Some(f) = feature_index {
            if f >= width {
                return Err(DestilarError::schema(format!(
                    "feature index {f} out of range for vector width {width}"
                )));
            }
        }
        if let Some(Node::Branch {
            threshold: t,
            feature_index: f,
            ..
        }) = self.nodes.get_mut(node_id).and_then(Option::as_mut)
        {
            if let Some(new_t) = threshold {
                *t = new_t;
            }
            if let Some(new_f) = feature_index {
                *f = new_f;
            }
        }
        Ok(())
    }

    /// Remove one child subtree of an internal node and collapse the node
    /// into a leaf taking the surviving branch's dominant class.
    pub fn delete_branch(&mut self, node_id: NodeId, direction: PruneDirection) -> Result<()> {
        let (left, right) = match self.node(node_id)? {
            Node::Leaf { .. } => {
                return Err(DestilarError::InvalidNode {
                    node_id,
                    message: "cannot cut a branch of a leaf".into(),
                })
            }
            Node::Branch { left, right, .. } => (*left, *right),
        };

        let pruned = match direction {
            PruneDirection::Left => left,
            PruneDirection::Right => right,
            PruneDirection::Auto => {
                let left_samples = self.subtree_counts(left)?.iter().sum::<usize>();
                let right_samples = self.subtree_counts(right)?.iter().sum::<usize>();
                if left_samples <= right_samples {
                    left
                } else {
                    right
                }
            }
        };
        let survivor = if pruned == left { right } else { left };
        let counts = self.subtree_counts(survivor)?;
        let class = dominant_class(&counts);

        self.tombstone_subtree(left)?;
        self.tombstone_subtree(right)?;
        self.nodes[node_id] = Some(Node::Leaf { class, counts });
        Ok(())
    }

    /// Excise a node's entire subtree and re-fit a fresh subtree in its
    /// place from the training subset that reaches the node under the
    /// current tree, using the hyperparameters of the original fit.
    pub fn delete_node(&mut self, x: &Array2<f32>, y: &[usize], node_id: NodeId) -> Result<()> {
        validate_training_data(x, y, &self.schema)?;
        self.node(node_id)?;

        let path = self.path_to(node_id)?;
        let reaching: Vec<usize> = (0..x.nrows())
            .filter(|&r| {
                path.iter().all(|&(feature, threshold, goes_left)| {
                    (f64::from(x[[r, feature]]) <= threshold) == goes_left
                })
            })
            .collect();
        if reaching.is_empty() {
            return Err(DestilarError::DataMismatch { node_id });
        }

        let x_sub = x.select(Axis(0), &reaching);
        let y_sub: Vec<usize> = reaching.iter().map(|&r| y[r]).collect();
        let fresh = cart::grow(&x_sub, &y_sub, self.schema.n_classes(), &self.params);

        self.tombstone_subtree(node_id)?;
        self.graft(node_id, fresh);
        Ok(())
    }

    /// Serialize to the nested persistence form.
    pub fn to_serializable(&self) -> Result<SerialTree> {
        Ok(SerialTree {
            schema: self.schema.clone(),
            params: self.params.clone(),
            root: self.serialize_subtree(self.root)?,
        })
    }

    /// Rebuild a tree from its serialized form, reassigning pre-order ids.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` when a split's feature index or a leaf's class falls
    /// outside the carried schema: a serialized tree and schema from
    /// different sessions must not be combined.
    pub fn from_serializable(serial: SerialTree) -> Result<Self> {
        let SerialTree {
            schema,
            params,
            root,
        } = serial;
        let mut nodes = Vec::with_capacity(root.node_count());
        place_serial(&root, &schema, &mut nodes)?;
        Ok(Self {
            nodes: nodes.into_iter().map(Some).collect(),
            root: 0,
            schema,
            params,
        })
    }

    /// Indented text rendering with feature and class names resolved.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        self.render_node(self.root, 0, &mut out)?;
        Ok(out)
    }

    fn render_node(&self, id: NodeId, indent: usize, out: &mut String) -> Result<()> {
        let pad = "  ".repeat(indent);
        match self.node(id)? {
            Node::Leaf { class, counts } => {
                let name = &self.schema.class_names[*class];
                let n: usize = counts.iter().sum();
                out.push_str(&format!("{pad}[{id}] class={name} (n={n})\n"));
            }
            Node::Branch {
                feature_index,
                threshold,
                left,
                right,
                n_samples,
            } => {
                let feature = &self.schema.feature_names[*feature_index];
                out.push_str(&format!(
                    "{pad}[{id}] {feature} <= {threshold:.4} (n={n_samples})\n"
                ));
                self.render_node(*left, indent + 1, out)?;
                self.render_node(*right, indent + 1, out)?;
            }
        }
        Ok(())
    }

    /// Aggregated leaf counts over a subtree.
    fn subtree_counts(&self, id: NodeId) -> Result<Vec<usize>> {
        match self.node(id)? {
            Node::Leaf { counts, .. } => Ok(counts.clone()),
            Node::Branch { left, right, .. } => {
                let (left, right) = (*left, *right);
                let l = self.subtree_counts(left)?;
                let r = self.subtree_counts(right)?;
                Ok(l.iter().zip(&r).map(|(a, b)| a + b).collect())
            }
        }
    }

    /// Tombstone every slot of a subtree, the given node included.
    fn tombstone_subtree(&mut self, id: NodeId) -> Result<()> {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match self.nodes.get_mut(current).map(Option::take) {
                Some(Some(Node::Branch { left, right, .. })) => {
                    stack.push(left);
                    stack.push(right);
                }
                Some(Some(Node::Leaf { .. })) => {}
                _ => return Err(DestilarError::NodeNotFound { node_id: current }),
            }
        }
        Ok(())
    }

    /// Graft a compact pre-order subtree into the arena: its root takes the
    /// vacated `slot`, the remaining nodes append at the end.
    fn graft(&mut self, slot: NodeId, subtree: Vec<Node>) {
        let base = self.nodes.len();
        let map = |local: NodeId| if local == 0 { slot } else { base + local - 1 };
        for (local, node) in subtree.into_iter().enumerate() {
            let translated = match node {
                Node::Leaf { .. } => node,
                Node::Branch {
                    feature_index,
                    threshold,
                    left,
                    right,
                    n_samples,
                } => Node::Branch {
                    feature_index,
                    threshold,
                    left: map(left),
                    right: map(right),
                    n_samples,
                },
            };
            if local == 0 {
                self.nodes[slot] = Some(translated);
            } else {
                self.nodes.push(Some(translated));
            }
        }
    }

    /// Split conditions on the root→target path as
    /// `(feature_index, threshold, goes_left)` triples.
    fn path_to(&self, target: NodeId) -> Result<Vec<(usize, f64, bool)>> {
        fn search(
            tree: &SurrogateTree,
            id: NodeId,
            target: NodeId,
            path: &mut Vec<(usize, f64, bool)>,
        ) -> Result<bool> {
            if id == target {
                return Ok(true);
            }
            if let Node::Branch {
                feature_index,
                threshold,
                left,
                right,
                ..
            } = tree.node(id)?
            {
                let (feature_index, threshold) = (*feature_index, *threshold);
                let (left, right) = (*left, *right);
                path.push((feature_index, threshold, true));
                if search(tree, left, target, path)? {
                    return Ok(true);
                }
                path.pop();
                path.push((feature_index, threshold, false));
                if search(tree, right, target, path)? {
                    return Ok(true);
                }
                path.pop();
            }
            Ok(false)
        }

        let mut path = Vec::new();
        if search(self, self.root, target, &mut path)? {
            Ok(path)
        } else {
            Err(DestilarError::NodeNotFound { node_id: target })
        }
    }

    fn serialize_subtree(&self, id: NodeId) -> Result<SerialNode> {
        Ok(match self.node(id)? {
            Node::Leaf { class, counts } => SerialNode::Leaf {
                leaf_class: *class,
                counts: counts.clone(),
            },
            Node::Branch {
                feature_index,
                threshold,
                left,
                right,
                n_samples,
            } => SerialNode::Branch {
                feature_index: *feature_index,
                threshold: *threshold,
                left: Box::new(self.serialize_subtree(*left)?),
                right: Box::new(self.serialize_subtree(*right)?),
                n_samples: *n_samples,
            },
        })
    }
}

fn dominant_class(counts: &[usize]) -> usize {
    let mut best = 0;
    let mut best_count = 0;
    for (class, &count) in counts.iter().enumerate() {
        if count > best_count {
            best_count = count;
            best = class;
        }
    }
    best
}

fn place_serial(
    serial: &SerialNode,
    schema: &FeatureSchema,
    nodes: &mut Vec<Node>,
) -> Result<NodeId> {
    let id = nodes.len();
    match serial {
        SerialNode::Leaf { leaf_class, counts } => {
            if *leaf_class >= schema.n_classes() {
                return Err(DestilarError::schema(format!(
                    "leaf class {leaf_class} out of range for {} classes",
                    schema.n_classes()
                )));
            }
            nodes.push(Node::Leaf {
                class: *leaf_class,
                counts: counts.clone(),
            });
        }
        SerialNode::Branch {
            feature_index,
            threshold,
            left,
            right,
            n_samples,
        } => {
            if *feature_index >= schema.vector_width() {
                return Err(DestilarError::schema(format!(
                    "feature index {feature_index} out of range for vector width {}",
                    schema.vector_width()
                )));
            }
            nodes.push(Node::Leaf {
                class: 0,
                counts: Vec::new(),
            }); // placeholder until children are placed
            let left_id = place_serial(left, schema, nodes)?;
            let right_id = place_serial(right, schema, nodes)?;
            nodes[id] = Node::Branch {
                feature_index: *feature_index,
                threshold: *threshold,
                left: left_id,
                right: right_id,
                n_samples: *n_samples,
            };
        }
    }
    Ok(id)
}

fn validate_training_data(x: &Array2<f32>, y: &[usize], schema: &FeatureSchema) -> Result<()> {
    if x.nrows() == 0 {
        return Err(DestilarError::InvalidParam {
            param: "x".into(),
            message: "training set is empty".into(),
        });
    }
    if x.ncols() != schema.vector_width() {
        return Err(DestilarError::ShapeMismatch {
            context: "feature matrix".into(),
            expected: vec![x.nrows(), schema.vector_width()],
            actual: vec![x.nrows(), x.ncols()],
        });
    }
    if y.len() != x.nrows() {
        return Err(DestilarError::ShapeMismatch {
            context: "labels".into(),
            expected: vec![x.nrows()],
            actual: vec![y.len()],
        });
    }
    if let Some(&bad) = y.iter().find(|&&label| label >= schema.n_classes()) {
        return Err(DestilarError::schema(format!(
            "label {bad} out of range for {} classes",
            schema.n_classes()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{build_schema, PAD_LABEL};
    use crate::log::{Column, EventTable, ACTIVITY, CASE_ID, TIMESTAMP};
    use chrono::{TimeZone, Utc};
    use ndarray::array;

    fn schema_2d() -> FeatureSchema {
        // Two activity classes plus padding over a prefix of length 2.
        let stamps: Vec<_> = (0..2)
            .map(|s| Utc.timestamp_opt(s, 0).single().expect("valid"))
            .collect();
        let table = EventTable::new()
            .with_column(CASE_ID, Column::Categorical(vec!["c1".into(), "c1".into()]))
            .unwrap()
            .with_column(ACTIVITY, Column::Categorical(vec!["A".into(), "B".into()]))
            .unwrap()
            .with_column(TIMESTAMP, Column::Timestamp(stamps))
            .unwrap();
        build_schema(&table, &[], &[], 2).unwrap()
    }

    fn fitted() -> (SurrogateTree, Array2<f32>, Vec<usize>) {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = vec![0, 0, 1, 2];
        let tree = SurrogateTree::fit(
            &x,
            &y,
            schema_2d(),
            TreeParams::default().with_ccp_alpha(0.0),
        )
        .unwrap();
        (tree, x, y)
    }

    #[test]
    fn test_fit_and_predict_reproduce_training_labels() {
        let (tree, x, y) = fitted();
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_predict_row_width_checked() {
        let (tree, _, _) = fitted();
        let narrow = ndarray::Array1::zeros(1);
        assert!(matches!(
            tree.predict_row(narrow.view()),
            Err(DestilarError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_modify_node_moves_boundary_only() {
        let (mut tree, x, _) = fitted();
        let before = tree.node_count();
        tree.modify_node(tree.root(), Some(5.0), None).unwrap();
        assert_eq!(tree.node_count(), before);
        // Every row now satisfies the root test and flows into the left
        // subtree, which holds the class-0 samples.
        let preds = tree.predict(&x).unwrap();
        assert_eq!(preds, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_modify_node_rejects_leaf_and_unknown_id() {
        let (mut tree, _, _) = fitted();
        let leaf_id = *tree
            .node_ids()
            .iter()
            .find(|&&id| tree.node(id).unwrap().is_leaf())
            .unwrap();
        assert!(matches!(
            tree.modify_node(leaf_id, Some(1.0), None),
            Err(DestilarError::InvalidNode { .. })
        ));
        assert!(matches!(
            tree.modify_node(999, Some(1.0), None),
            Err(DestilarError::NodeNotFound { node_id: 999 })
        ));
    }

    #[test]
    fn test_modify_node_rejects_out_of_range_feature() {
        let (mut tree, _, _) = fitted();
        assert!(matches!(
            tree.modify_node(tree.root(), None, Some(99)),
            Err(DestilarError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_delete_branch_collapses_to_survivor_class() {
        let (mut tree, _, _) = fitted();
        let root = tree.root();
        tree.delete_branch(root, PruneDirection::Right).unwrap();
        let node = tree.node(root).unwrap();
        match node {
            Node::Leaf { class, counts } => {
                // Left subtree held the two class-0 samples.
                assert_eq!(*class, 0);
                assert_eq!(counts.iter().sum::<usize>(), 2);
            }
            Node::Branch { .. } => panic!("expected collapsed leaf"),
        }
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_delete_branch_twice_is_invalid() {
        let (mut tree, _, _) = fitted();
        let root = tree.root();
        tree.delete_branch(root, PruneDirection::Left).unwrap();
        assert!(matches!(
            tree.delete_branch(root, PruneDirection::Right),
            Err(DestilarError::InvalidNode { .. })
        ));
    }

    #[test]
    fn test_delete_branch_tombstones_stale_ids() {
        let (mut tree, _, _) = fitted();
        let stale: Vec<NodeId> = tree.node_ids().into_iter().skip(1).collect();
        tree.delete_branch(tree.root(), PruneDirection::Auto).unwrap();
        for id in stale {
            assert!(matches!(
                tree.node(id),
                Err(DestilarError::NodeNotFound { .. })
            ));
        }
    }

    #[test]
    fn test_auto_prunes_smaller_side() {
        // Left: 1 sample, right: 3 samples. Auto prunes left; the survivor
        // dominates the collapsed leaf.
        let x = array![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 2.0]];
        let y = vec![0, 1, 1, 1];
        let mut tree = SurrogateTree::fit(
            &x,
            &y,
            schema_2d(),
            TreeParams::default().with_ccp_alpha(0.0),
        )
        .unwrap();
        tree.delete_branch(tree.root(), PruneDirection::Auto).unwrap();
        match tree.node(tree.root()).unwrap() {
            Node::Leaf { class, .. } => assert_eq!(*class, 1),
            Node::Branch { .. } => panic!("expected leaf"),
        }
    }

    #[test]
    fn test_delete_node_retrains_subtree() {
        let (mut tree, x, y) = fitted();
        let root = tree.root();
        tree.delete_node(&x, &y, root).unwrap();
        // Root refit sees every training row and reproduces the labels.
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_delete_node_with_unreached_subset() {
        let (mut tree, _, _) = fitted();
        // Find a non-root child; feed data that all flows the other way.
        let child = match tree.node(tree.root()).unwrap() {
            Node::Branch { right, .. } => *right,
            Node::Leaf { .. } => panic!("expected branch root"),
        };
        // Root splits on some feature at some threshold; rows of zeros all
        // satisfy <=, flowing left, so nothing reaches the right child.
        let x = Array2::zeros((3, 2));
        let y = vec![0, 0, 0];
        assert!(matches!(
            tree.delete_node(&x, &y, child),
            Err(DestilarError::DataMismatch { .. })
        ));
    }

    #[test]
    fn test_round_trip_preserves_predictions() {
        let (mut tree, x, y) = fitted();
        tree.delete_branch(tree.root(), PruneDirection::Auto).unwrap();
        tree.delete_node(&x, &y, tree.root()).unwrap();

        let serial = tree.to_serializable().unwrap();
        let json = serde_json::to_string(&serial).unwrap();
        let back: SerialTree = serde_json::from_str(&json).unwrap();
        let reloaded = SurrogateTree::from_serializable(back).unwrap();

        assert_eq!(reloaded.predict(&x).unwrap(), tree.predict(&x).unwrap());
        assert_eq!(reloaded.node_count(), tree.node_count());
    }

    #[test]
    fn test_from_serializable_rejects_foreign_schema() {
        let (tree, _, _) = fitted();
        let mut serial = tree.to_serializable().unwrap();
        serial.root = SerialNode::Branch {
            feature_index: 42, // outside the schema's width of 2
            threshold: 0.0,
            left: Box::new(SerialNode::Leaf {
                leaf_class: 0,
                counts: vec![1, 0, 0],
            }),
            right: Box::new(SerialNode::Leaf {
                leaf_class: 1,
                counts: vec![0, 1, 0],
            }),
            n_samples: 2,
        };
        assert!(matches!(
            SurrogateTree::from_serializable(serial),
            Err(DestilarError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_prune_direction_parsing() {
        assert_eq!("left".parse::<PruneDirection>().unwrap(), PruneDirection::Left);
        assert_eq!("auto".parse::<PruneDirection>().unwrap(), PruneDirection::Auto);
        assert!(matches!(
            "up".parse::<PruneDirection>(),
            Err(DestilarError::InvalidDirection { direction }) if direction == "up"
        ));
    }

    #[test]
    fn test_render_uses_schema_names() {
        let (tree, _, _) = fitted();
        let rendered = tree.render().unwrap();
        assert!(rendered.contains("activity_"));
        assert!(rendered.contains("class="));
        assert!(!rendered.contains(PAD_LABEL)); // no padding leaves here
    }
}
