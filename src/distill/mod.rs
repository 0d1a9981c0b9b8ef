//! Distillation and fine-tuning orchestration.
//!
//! Drives the two directions of the interactive loop:
//!
//! - network → tree: fit the surrogate on the network's arg-max predictions,
//!   producing an interpretable approximation of the network's decision
//!   boundary (not of the task itself)
//! - tree → network: blend ground truth, originally-distilled labels, and
//!   edited-tree labels into one retraining signal under a selectable
//!   [`FinetuneMode`], then fine-tune the network on it
//!
//! Failures from the encoder or the tree are non-retriable for the request;
//! nothing here retries or recovers silently.

use crate::encode::{argmax_rows, one_hot, FeatureSchema};
use crate::error::{DestilarError, Result};
use crate::eval::{evaluate, Evaluation};
use crate::network::{Model, TrainParams, TrainReport};
use crate::tree::{SurrogateTree, TreeParams};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the three label sources are blended into one retraining signal.
///
/// Every mode is a deterministic, total function of the three index-aligned
/// label arrays; inputs are never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinetuneMode {
    /// Replace all labels with the edited tree's current predictions.
    ChangedComplete,
    /// Edited-tree labels where the edited tree disagrees with the original
    /// distillation; ground truth where they agree.
    ChangedGroundTruth,
    /// Plain retraining on ground truth.
    GroundTruth,
}

impl FromStr for FinetuneMode {
    type Err = DestilarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "changed_complete" => Ok(Self::ChangedComplete),
            "changed_ground_truth" => Ok(Self::ChangedGroundTruth),
            "ground_truth" => Ok(Self::GroundTruth),
            other => Err(DestilarError::UnknownMode {
                mode: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for FinetuneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ChangedComplete => "changed_complete",
            Self::ChangedGroundTruth => "changed_ground_truth",
            Self::GroundTruth => "ground_truth",
        };
        f.write_str(s)
    }
}

/// Fine-tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinetuneParams {
    pub epochs: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub mode: FinetuneMode,
    /// Seed for batch shuffling; OS entropy when absent.
    pub seed: Option<u64>,
}

impl Default for FinetuneParams {
    fn default() -> Self {
        Self {
            epochs: 10,
            learning_rate: 1e-4,
            batch_size: 32,
            mode: FinetuneMode::ChangedComplete,
            seed: None,
        }
    }
}

/// Distill the network into a decision-tree surrogate.
///
/// The tree is fit on the arg-max of `model.predict(x_train)` and bound to
/// the encoder's schema, so its labels are a deterministic function of the
/// network's current weights.
pub fn distill(
    model: &dyn Model,
    x_train: &Array2<f32>,
    schema: &FeatureSchema,
    params: &TreeParams,
) -> Result<SurrogateTree> {
    let soft = model.predict(x_train);
    if soft.nrows() != x_train.nrows() || soft.ncols() != schema.n_classes() {
        return Err(DestilarError::ShapeMismatch {
            context: "network predictions".into(),
            expected: vec![x_train.nrows(), schema.n_classes()],
            actual: vec![soft.nrows(), soft.ncols()],
        });
    }
    let hard = argmax_rows(&soft);
    SurrogateTree::fit(x_train, &hard, schema.clone(), params.clone())
}

/// One-hot tree predictions over the schema's full class vocabulary.
///
/// Even when the edited tree predicts a strict subset of classes the result
/// stays full-width and index-aligned with `x`.
pub fn tree_labels(tree: &SurrogateTree, x: &Array2<f32>) -> Result<Array2<f32>> {
    let hard = tree.predict(x)?;
    Ok(one_hot(&hard, tree.schema().n_classes()))
}

/// Blend the three label sources into one supervision matrix.
///
/// Pure: inputs are unchanged, output length equals input length, and the
/// result depends only on `(mode, y_true, y_distilled, y_tree)`.
pub fn blend_labels(
    mode: FinetuneMode,
    y_true: &Array2<f32>,
    y_distilled: &Array2<f32>,
    y_tree: &Array2<f32>,
) -> Result<Array2<f32>> {
    for (name, y) in [("y_distilled", y_distilled), ("y_tree", y_tree)] {
        if y.dim() != y_true.dim() {
            return Err(DestilarError::ShapeMismatch {
                context: format!("label source {name}"),
                expected: vec![y_true.nrows(), y_true.ncols()],
                actual: vec![y.nrows(), y.ncols()],
            });
        }
    }

    Ok(match mode {
        FinetuneMode::ChangedComplete => y_tree.clone(),
        FinetuneMode::GroundTruth => y_true.clone(),
        FinetuneMode::ChangedGroundTruth => {
            let distilled_hard = argmax_rows(y_distilled);
            let tree_hard = argmax_rows(y_tree);
            let mut blended = y_true.clone();
            for (row, (d, t)) in distilled_hard.iter().zip(&tree_hard).enumerate() {
                if d != t {
                    blended.row_mut(row).assign(&y_tree.row(row));
                }
            }
            blended
        }
    })
}

/// Fine-tune the network on the blended supervision signal.
pub fn finetune(
    model: &mut dyn Model,
    x_train: &Array2<f32>,
    y_true: &Array2<f32>,
    y_distilled: &Array2<f32>,
    y_tree: &Array2<f32>,
    params: &FinetuneParams,
) -> Result<TrainReport> {
    let blended = blend_labels(params.mode, y_true, y_distilled, y_tree)?;
    model.train(
        x_train,
        &blended,
        &TrainParams {
            epochs: params.epochs,
            learning_rate: params.learning_rate,
            batch_size: params.batch_size,
            seed: params.seed,
        },
    )
}

/// Evaluate the network against one-hot ground truth.
pub fn evaluate_model(
    model: &dyn Model,
    x: &Array2<f32>,
    y: &Array2<f32>,
    class_names: &[String],
) -> Result<Evaluation> {
    let y_pred = argmax_rows(&model.predict(x));
    let y_true = argmax_rows(y);
    evaluate(&y_pred, &y_true, class_names)
}

/// Evaluate the surrogate tree against one-hot ground truth.
pub fn evaluate_tree(tree: &SurrogateTree, x: &Array2<f32>, y: &Array2<f32>) -> Result<Evaluation> {
    let y_pred = tree.predict(x)?;
    let y_true = argmax_rows(y);
    evaluate(&y_pred, &y_true, &tree.schema().class_names)
}
