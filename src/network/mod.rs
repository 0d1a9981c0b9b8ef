//! Black-box classifier capability interface and the bundled network.
//!
//! The orchestration logic only ever sees the [`Model`] trait (train on a
//! soft-label matrix, predict a probability row per example), so it can be
//! exercised with deterministic stub models in tests. [`MlpClassifier`] is
//! the crate's bundled implementation.

mod mlp;

pub use mlp::MlpClassifier;

use crate::error::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Architecture parameters for the bundled network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    /// Hidden layer widths, input to output.
    pub hidden_units: Vec<usize>,
    /// Seed for weight initialization; OS entropy when absent.
    pub seed: Option<u64>,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            hidden_units: vec![512, 256, 128, 64],
            seed: None,
        }
    }
}

/// Optimization parameters for one training (or fine-tuning) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    pub epochs: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    /// Seed for batch shuffling; OS entropy when absent.
    pub seed: Option<u64>,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            epochs: 10,
            learning_rate: 0.001,
            batch_size: 32,
            seed: None,
        }
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    /// Epochs actually run.
    pub epochs: usize,
    /// Mean loss per epoch, in order.
    pub losses: Vec<f32>,
}

impl TrainReport {
    /// Loss of the final epoch.
    pub fn final_loss(&self) -> Option<f32> {
        self.losses.last().copied()
    }
}

/// A trainable soft classifier.
///
/// `predict` returns one probability row per input example, aligned with the
/// schema's class vocabulary; `train` consumes a soft (or one-hot) label
/// matrix of the same width.
pub trait Model {
    /// Soft predictions, one row per example, rows summing to 1.
    fn predict(&self, x: &Array2<f32>) -> Array2<f32>;

    /// Train in place on a soft-label matrix.
    fn train(&mut self, x: &Array2<f32>, y: &Array2<f32>, params: &TrainParams)
        -> Result<TrainReport>;
}
