//! CART growth and minimal cost-complexity pruning.
//!
//! Gini-impurity splitting with an exhaustive midpoint threshold scan and
//! deterministic tie-breaking (lowest feature index, then lowest threshold),
//! followed by weakest-link pruning at `ccp_alpha`. Leaves predict the
//! majority class, ties resolving to the lowest class index, which is the
//! same rule prediction relies on.

use super::node::{Node, NodeId};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Tree-fitting hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    /// Cost-complexity pruning strength; 0 disables pruning.
    pub ccp_alpha: f64,
    /// Maximum tree depth; unlimited when absent.
    pub max_depth: Option<usize>,
    /// Minimum samples required to attempt a split.
    pub min_samples_split: usize,
    /// Minimum samples required on each side of a split.
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            ccp_alpha: 0.001,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl TreeParams {
    /// Set the pruning strength.
    pub fn with_ccp_alpha(mut self, ccp_alpha: f64) -> Self {
        self.ccp_alpha = ccp_alpha;
        self
    }

    /// Cap the tree depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Set the split threshold on node size.
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the per-child sample floor.
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }
}

/// Grow a tree on integer labels and return it as a compact pre-order arena.
///
/// Caller guarantees `x.nrows() == y.len() > 0` and every label `< n_classes`.
pub(crate) fn grow(
    x: &Array2<f32>,
    y: &[usize],
    n_classes: usize,
    params: &TreeParams,
) -> Vec<Node> {
    let rows: Vec<usize> = (0..y.len()).collect();
    let mut nodes = Vec::new();
    build(&mut nodes, x, y, n_classes, params, rows, 0);
    if params.ccp_alpha > 0.0 {
        prune(&mut nodes, y.len() as f64, params.ccp_alpha);
        nodes = compact(&nodes, 0);
    }
    nodes
}

/// Rebuild a pre-order arena containing only nodes reachable from `root`.
pub(crate) fn compact(nodes: &[Node], root: NodeId) -> Vec<Node> {
    let mut out = Vec::new();
    copy_subtree(nodes, root, &mut out);
    out
}

fn copy_subtree(nodes: &[Node], id: NodeId, out: &mut Vec<Node>) -> NodeId {
    let new_id = out.len();
    match &nodes[id] {
        Node::Leaf { class, counts } => {
            out.push(Node::Leaf {
                class: *class,
                counts: counts.clone(),
            });
        }
        Node::Branch {
            feature_index,
            threshold,
            left,
            right,
            n_samples,
        } => {
            out.push(Node::Leaf {
                class: 0,
                counts: Vec::new(),
            }); // placeholder until children are placed
            let (feature_index, threshold, n_samples) = (*feature_index, *threshold, *n_samples);
            let new_left = copy_subtree(nodes, *left, out);
            let new_right = copy_subtree(nodes, *right, out);
            out[new_id] = Node::Branch {
                feature_index,
                threshold,
                left: new_left,
                right: new_right,
                n_samples,
            };
        }
    }
    new_id
}

fn class_counts(y: &[usize], rows: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &r in rows {
        counts[y[r]] += 1;
    }
    counts
}

/// Majority class; ties resolve to the lowest class index.
fn majority(counts: &[usize]) -> usize {
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

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / t;
            p * p
        })
        .sum::<f64>()
}

struct Split {
    feature_index: usize,
    threshold: f64,
    left_rows: Vec<usize>,
    right_rows: Vec<usize>,
}

/// Exhaustive scan over midpoints of consecutive distinct feature values.
///
/// The first strictly-better candidate wins, so ties break to the lowest
/// feature index and then the lowest threshold; the fit is deterministic.
fn best_split(
    x: &Array2<f32>,
    y: &[usize],
    rows: &[usize],
    n_classes: usize,
    params: &TreeParams,
) -> Option<Split> {
    let n = rows.len();
    let node_counts = class_counts(y, rows, n_classes);
    let node_impurity = gini(&node_counts, n);
    if node_impurity == 0.0 {
        return None;
    }

    let mut best: Option<(f64, usize, f64)> = None; // (impurity, feature, threshold)
    for feature in 0..x.ncols() {
        let mut ordered: Vec<(f32, usize)> = rows.iter().map(|&r| (x[[r, feature]], y[r])).collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_counts = vec![0usize; n_classes];
        let mut right_counts = node_counts.clone();
        for i in 0..n - 1 {
            let (value, label) = ordered[i];
            left_counts[label] += 1;
            right_counts[label] -= 1;
            if ordered[i + 1].0 <= value {
                continue; // not a boundary between distinct values
            }
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                continue;
            }
            let weighted = (n_left as f64 * gini(&left_counts, n_left)
                + n_right as f64 * gini(&right_counts, n_right))
                / n as f64;
            if weighted + 1e-12 >= node_impurity {
                continue; // no impurity decrease
            }
            let threshold = f64::from(value) + (f64::from(ordered[i + 1].0) - f64::from(value)) / 2.0;
            if best.is_none_or(|(b, _, _)| weighted < b) {
                best = Some((weighted, feature, threshold));
            }
        }
    }

    best.map(|(_, feature_index, threshold)| {
        let (left_rows, right_rows) = rows
            .iter()
            .copied()
            .partition(|&r| f64::from(x[[r, feature_index]]) <= threshold);
        Split {
            feature_index,
            threshold,
            left_rows,
            right_rows,
        }
    })
}

fn build(
    nodes: &mut Vec<Node>,
    x: &Array2<f32>,
    y: &[usize],
    n_classes: usize,
    params: &TreeParams,
    rows: Vec<usize>,
    depth: usize,
) -> NodeId {
    let counts = class_counts(y, &rows, n_classes);
    let at_depth_limit = params.max_depth.is_some_and(|d| depth >= d);
    let splittable = rows.len() >= params.min_samples_split && !at_depth_limit;

    let split = if splittable {
        best_split(x, y, &rows, n_classes, params)
    } else {
        None
    };

    let id = nodes.len();
    match split {
        None => {
            nodes.push(Node::Leaf {
                class: majority(&counts),
                counts,
            });
        }
        Some(split) => {
            nodes.push(Node::Leaf {
                class: 0,
                counts: Vec::new(),
            }); // placeholder until children exist
            let n_samples = rows.len();
            let left = build(nodes, x, y, n_classes, params, split.left_rows, depth + 1);
            let right = build(nodes, x, y, n_classes, params, split.right_rows, depth + 1);
            nodes[id] = Node::Branch {
                feature_index: split.feature_index,
                threshold: split.threshold,
                left,
                right,
                n_samples,
            };
        }
    }
    id
}

/// Subtree statistics for pruning: aggregated counts, resubstitution risk of
/// the subtree's leaves, and leaf count.
struct SubtreeStats {
    counts: Vec<usize>,
    risk: f64,
    leaves: usize,
}

fn subtree_stats(nodes: &[Node], id: NodeId, total: f64) -> SubtreeStats {
    match &nodes[id] {
        Node::Leaf { counts, .. } => {
            let n: usize = counts.iter().sum();
            let misclassified = n - counts.iter().max().copied().unwrap_or(0);
            SubtreeStats {
                counts: counts.clone(),
                risk: misclassified as f64 / total,
                leaves: 1,
            }
        }
        Node::Branch { left, right, .. } => {
            let l = subtree_stats(nodes, *left, total);
            let r = subtree_stats(nodes, *right, total);
            let counts: Vec<usize> = l
                .counts
                .iter()
                .zip(&r.counts)
                .map(|(a, b)| a + b)
                .collect();
            SubtreeStats {
                counts,
                risk: l.risk + r.risk,
                leaves: l.leaves + r.leaves,
            }
        }
    }
}

/// Find the weakest link: the internal node with the smallest effective
/// alpha `g(t) = (R(t) - R(T_t)) / (|leaves(T_t)| - 1)`.
fn weakest_link(nodes: &[Node], id: NodeId, total: f64, best: &mut Option<(f64, NodeId)>) {
    if let Node::Branch { left, right, .. } = &nodes[id] {
        let stats = subtree_stats(nodes, id, total);
        let n: usize = stats.counts.iter().sum();
        let collapsed_risk =
            (n - stats.counts.iter().max().copied().unwrap_or(0)) as f64 / total;
        let g = (collapsed_risk - stats.risk) / (stats.leaves - 1) as f64;
        if best.is_none_or(|(b, _)| g < b) {
            *best = Some((g, id));
        }
        weakest_link(nodes, *left, total, best);
        weakest_link(nodes, *right, total, best);
    }
}

/// Minimal cost-complexity pruning: repeatedly collapse the weakest link
/// while its effective alpha does not exceed `ccp_alpha`. Collapsed nodes
/// become leaves over their aggregated counts; orphaned descendants are
/// dropped by the compaction pass that follows.
fn prune(nodes: &mut [Node], total: f64, ccp_alpha: f64) {
    loop {
        let mut best = None;
        weakest_link(nodes, 0, total, &mut best);
        match best {
            Some((g, id)) if g <= ccp_alpha + 1e-12 => {
                let stats = subtree_stats(nodes, id, total);
                nodes[id] = Node::Leaf {
                    class: majority(&stats.counts),
                    counts: stats.counts,
                };
            }
            _ => break,
        }
    }
}
