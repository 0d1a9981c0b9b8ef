//! Bundled feed-forward softmax classifier.
//!
//! ReLU hidden stack, softmax output, trained with mini-batch Adam on
//! cross-entropy. Weights are Xavier-uniform initialized from a seedable
//! RNG so training runs are reproducible end to end.

use super::{Model, NetworkParams, TrainParams, TrainReport};
use crate::error::{DestilarError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-8;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DenseLayer {
    w: Array2<f32>,
    b: Array1<f32>,
}

impl DenseLayer {
    /// Xavier uniform: U(-√(6/(fan_in+fan_out)), +√(6/(fan_in+fan_out))).
    fn new(fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Self {
        let scale = (6.0 / (fan_in + fan_out) as f32).sqrt();
        let w = Array2::from_shape_fn((fan_in, fan_out), |_| {
            (rng.random::<f32>() * 2.0 - 1.0) * scale
        });
        Self {
            w,
            b: Array1::zeros(fan_out),
        }
    }
}

/// Feed-forward next-activity classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpClassifier {
    layers: Vec<DenseLayer>,
    n_inputs: usize,
    n_classes: usize,
}

impl MlpClassifier {
    /// Build an untrained network for `n_inputs` features and `n_classes`
    /// output classes.
    pub fn new(n_inputs: usize, n_classes: usize, params: &NetworkParams) -> Result<Self> {
        if n_inputs == 0 || n_classes < 2 {
            return Err(DestilarError::InvalidParam {
                param: "network".into(),
                message: format!(
                    "need at least 1 input and 2 classes, got {n_inputs} and {n_classes}"
                ),
            });
        }
        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut widths = vec![n_inputs];
        widths.extend(params.hidden_units.iter().copied());
        widths.push(n_classes);

        let layers = widths
            .windows(2)
            .map(|pair| DenseLayer::new(pair[0], pair[1], &mut rng))
            .collect();
        Ok(Self {
            layers,
            n_inputs,
            n_classes,
        })
    }

    /// Input width the network was built for.
    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    /// Output class count.
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Trainable parameter count.
    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.w.len() + l.b.len()).sum()
    }

    /// Forward pass keeping post-activation outputs per layer for backprop.
    fn forward(&self, x: &Array2<f32>) -> Vec<Array2<f32>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(x.clone());
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let mut z = activations[i].dot(&layer.w) + &layer.b;
            if i == last {
                softmax_rows(&mut z);
            } else {
                z.mapv_inplace(|v| v.max(0.0));
            }
            activations.push(z);
        }
        activations
    }

    fn check_input(&self, x: &Array2<f32>) -> Result<()> {
        if x.ncols() != self.n_inputs {
            return Err(DestilarError::ShapeMismatch {
                context: "network input".into(),
                expected: vec![x.nrows(), self.n_inputs],
                actual: vec![x.nrows(), x.ncols()],
            });
        }
        Ok(())
    }
}

impl Model for MlpClassifier {
    fn predict(&self, x: &Array2<f32>) -> Array2<f32> {
        self.forward(x)
            .pop()
            .unwrap_or_else(|| Array2::zeros((x.nrows(), self.n_classes)))
    }

    fn train(
        &mut self,
        x: &Array2<f32>,
        y: &Array2<f32>,
        params: &TrainParams,
    ) -> Result<TrainReport> {
        self.check_input(x)?;
        if y.nrows() != x.nrows() || y.ncols() != self.n_classes {
            return Err(DestilarError::ShapeMismatch {
                context: "training labels".into(),
                expected: vec![x.nrows(), self.n_classes],
                actual: vec![y.nrows(), y.ncols()],
            });
        }
        if x.nrows() == 0 {
            return Err(DestilarError::InvalidParam {
                param: "x".into(),
                message: "training set is empty".into(),
            });
        }
        if params.epochs == 0 || params.batch_size == 0 || params.learning_rate <= 0.0 {
            return Err(DestilarError::InvalidParam {
                param: "train".into(),
                message: "epochs, batch_size and learning_rate must be positive".into(),
            });
        }

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut adam = AdamState::new(&self.layers);
        let mut order: Vec<usize> = (0..x.nrows()).collect();
        let mut losses = Vec::with_capacity(params.epochs);

        for _ in 0..params.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            let mut batches = 0;
            for chunk in order.chunks(params.batch_size.min(order.len())) {
                let xb = x.select(Axis(0), chunk);
                let yb = y.select(Axis(0), chunk);
                epoch_loss += self.train_batch(&xb, &yb, params.learning_rate, &mut adam);
                batches += 1;
            }
            losses.push(epoch_loss / batches as f32);
        }

        Ok(TrainReport {
            epochs: params.epochs,
            losses,
        })
    }
}

impl MlpClassifier {
    /// One forward/backward pass over a batch; returns the batch loss.
    fn train_batch(
        &mut self,
        xb: &Array2<f32>,
        yb: &Array2<f32>,
        lr: f32,
        adam: &mut AdamState,
    ) -> f32 {
        let activations = self.forward(xb);
        let probs = &activations[activations.len() - 1];
        let loss = cross_entropy(probs, yb);
        let batch = xb.nrows() as f32;

        // Softmax + cross-entropy gradient at the output.
        let mut delta = (probs - yb) / batch;
        adam.step();
        for i in (0..self.layers.len()).rev() {
            let a_prev = &activations[i];
            let grad_w = a_prev.t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));

            let delta_prev = if i > 0 {
                let mut back = delta.dot(&self.layers[i].w.t());
                // ReLU gate: activations are post-ReLU, zero means closed.
                back.zip_mut_with(&activations[i], |d, &a| {
                    if a <= 0.0 {
                        *d = 0.0;
                    }
                });
                Some(back)
            } else {
                None
            };

            adam.update(i, &mut self.layers[i], &grad_w, &grad_b, lr);
            if let Some(d) = delta_prev {
                delta = d;
            }
        }
        loss
    }
}

/// Per-layer Adam moments; fresh for every training run.
struct AdamState {
    m_w: Vec<Array2<f32>>,
    v_w: Vec<Array2<f32>>,
    m_b: Vec<Array1<f32>>,
    v_b: Vec<Array1<f32>>,
    t: i32,
}

impl AdamState {
    fn new(layers: &[DenseLayer]) -> Self {
        Self {
            m_w: layers.iter().map(|l| Array2::zeros(l.w.dim())).collect(),
            v_w: layers.iter().map(|l| Array2::zeros(l.w.dim())).collect(),
            m_b: layers.iter().map(|l| Array1::zeros(l.b.dim())).collect(),
            v_b: layers.iter().map(|l| Array1::zeros(l.b.dim())).collect(),
            t: 0,
        }
    }

    fn step(&mut self) {
        self.t += 1;
    }

    fn update(
        &mut self,
        i: usize,
        layer: &mut DenseLayer,
        grad_w: &Array2<f32>,
        grad_b: &Array1<f32>,
        lr: f32,
    ) {
        let bias1 = 1.0 - ADAM_BETA1.powi(self.t);
        let bias2 = 1.0 - ADAM_BETA2.powi(self.t);

        self.m_w[i].zip_mut_with(grad_w, |m, &g| *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g);
        self.v_w[i].zip_mut_with(grad_w, |v, &g| *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g);
        ndarray::Zip::from(&mut layer.w)
            .and(&self.m_w[i])
            .and(&self.v_w[i])
            .for_each(|w, &m, &v| {
                *w -= lr * (m / bias1) / ((v / bias2).sqrt() + ADAM_EPSILON);
            });

        self.m_b[i].zip_mut_with(grad_b, |m, &g| *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g);
        self.v_b[i].zip_mut_with(grad_b, |v, &g| *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g);
        ndarray::Zip::from(&mut layer.b)
            .and(&self.m_b[i])
            .and(&self.v_b[i])
            .for_each(|b, &m, &v| {
                *b -= lr * (m / bias1) / ((v / bias2).sqrt() + ADAM_EPSILON);
            });
    }
}

/// Row-wise softmax with max-shift for stability.
fn softmax_rows(z: &mut Array2<f32>) {
    for mut row in z.rows_mut() {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
}

/// Mean cross-entropy between predicted probabilities and soft targets.
fn cross_entropy(probs: &Array2<f32>, targets: &Array2<f32>) -> f32 {
    let n = probs.nrows().max(1) as f32;
    let mut loss = 0.0;
    ndarray::Zip::from(probs).and(targets).for_each(|&p, &t| {
        if t > 0.0 {
            loss -= t * (p.max(1e-12)).ln();
        }
    });
    loss / n
}
