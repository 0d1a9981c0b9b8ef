//! Classification metrics.
//!
//! One code path evaluates both the network and the surrogate tree so their
//! numbers are directly comparable: accuracy, per-class precision/recall/F1
//! with support, macro and support-weighted averages, and the confusion
//! matrix, all bound to the schema's class names and serializable as a
//! per-stage artifact.

use crate::error::{DestilarError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confusion matrix sized by the schema's class vocabulary.
///
/// `matrix[true_class][predicted_class]` counts examples; classes the
/// predictions never touch keep their zero rows, so a tree predicting a
/// strict subset of `class_names` still evaluates cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    n_classes: usize,
}

impl ConfusionMatrix {
    /// Tally predictions against ground truth over `n_classes` classes.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when the slices differ in length, `SchemaMismatch`
    /// when a label falls outside `[0, n_classes)`.
    pub fn from_predictions(y_pred: &[usize], y_true: &[usize], n_classes: usize) -> Result<Self> {
        if y_pred.len() != y_true.len() {
            return Err(DestilarError::ShapeMismatch {
                context: "evaluation labels".into(),
                expected: vec![y_true.len()],
                actual: vec![y_pred.len()],
            });
        }
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        for (&pred, &truth) in y_pred.iter().zip(y_true) {
            if pred >= n_classes || truth >= n_classes {
                return Err(DestilarError::schema(format!(
                    "label {} out of range for {n_classes} classes",
                    pred.max(truth)
                )));
            }
            matrix[truth][pred] += 1;
        }
        Ok(Self { matrix, n_classes })
    }

    /// Count at `[true_class][predicted_class]`.
    pub fn get(&self, true_class: usize, predicted_class: usize) -> usize {
        self.matrix[true_class][predicted_class]
    }

    /// Number of classes.
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Total examples tallied.
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// True instances of a class.
    pub fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    fn true_positives(&self, class: usize) -> usize {
        self.matrix[class][class]
    }

    fn predicted(&self, class: usize) -> usize {
        (0..self.n_classes).map(|i| self.matrix[i][class]).sum()
    }

    /// Fraction of correctly classified examples (0 on an empty matrix).
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.n_classes).map(|c| self.matrix[c][c]).sum();
        correct as f64 / total as f64
    }

    /// Consume into the raw count rows.
    pub fn into_rows(self) -> Vec<Vec<usize>> {
        self.matrix
    }
}

/// Per-class metrics row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Full evaluation artifact for one model at one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub classes: Vec<ClassMetrics>,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub confusion: Vec<Vec<usize>>,
}

impl Evaluation {
    /// Support-weighted mean of a per-class metric.
    fn weighted(classes: &[ClassMetrics], value: impl Fn(&ClassMetrics) -> f64) -> f64 {
        let total: usize = classes.iter().map(|c| c.support).sum();
        if total == 0 {
            return 0.0;
        }
        classes
            .iter()
            .map(|c| value(c) * c.support as f64)
            .sum::<f64>()
            / total as f64
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for class in &self.classes {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                class.name, class.precision, class.recall, class.f1, class.support
            )?;
        }
        writeln!(
            f,
            "{:>14} {:>10.2} {:>10.2} {:>10.2}",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1
        )?;
        writeln!(f, "accuracy: {:.4}", self.accuracy)
    }
}

/// Evaluate hard predictions against ground truth over the schema's class
/// vocabulary.
pub fn evaluate(y_pred: &[usize], y_true: &[usize], class_names: &[String]) -> Result<Evaluation> {
    let n_classes = class_names.len();
    let cm = ConfusionMatrix::from_predictions(y_pred, y_true, n_classes)?;

    let mut classes = Vec::with_capacity(n_classes);
    for (idx, name) in class_names.iter().enumerate() {
        let tp = cm.true_positives(idx) as f64;
        let predicted = cm.predicted(idx) as f64;
        let support = cm.support(idx);

        let precision = if predicted > 0.0 { tp / predicted } else { 0.0 };
        let recall = if support > 0 { tp / support as f64 } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        classes.push(ClassMetrics {
            name: name.clone(),
            precision,
            recall,
            f1,
            support,
        });
    }

    let n = classes.len().max(1) as f64;
    let macro_precision = classes.iter().map(|c| c.precision).sum::<f64>() / n;
    let macro_recall = classes.iter().map(|c| c.recall).sum::<f64>() / n;
    let macro_f1 = classes.iter().map(|c| c.f1).sum::<f64>() / n;
    let weighted_f1 = Evaluation::weighted(&classes, |c| c.f1);

    Ok(Evaluation {
        accuracy: cm.accuracy(),
        classes,
        macro_precision,
        macro_recall,
        macro_f1,
        weighted_f1,
        confusion: cm.into_rows(),
    })
}
