//! Trainable parameter tensors and the shared gradient-descent loop.

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use forgecast_core::{EngineError, EngineResult};

use super::{Hyperparameters, Loss};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

/// Flat parameter tensor with its gradient and Adam moments.
#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub value: Vec<f64>,
    pub grad: Vec<f64>,
    m: Vec<f64>,
    v: Vec<f64>,
}

impl Param {
    pub fn zeros(len: usize) -> Self {
        Self::from_values(vec![0.0; len])
    }

    /// Uniform in `[-scale, scale]`.
    pub fn uniform(len: usize, scale: f64, rng: &mut StdRng) -> Self {
        Self::from_values((0..len).map(|_| rng.gen_range(-scale..=scale)).collect())
    }

    fn from_values(value: Vec<f64>) -> Self {
        let len = value.len();
        Self {
            value,
            grad: vec![0.0; len],
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad.iter_mut().for_each(|g| *g = 0.0);
    }

    fn grad_norm_sq(&self) -> f64 {
        self.grad.iter().map(|g| g * g).sum()
    }

    fn scale_grad(&mut self, factor: f64) {
        self.grad.iter_mut().for_each(|g| *g *= factor);
    }

    fn adam_step(&mut self, learning_rate: f64, step: i32) {
        let bias1 = 1.0 - BETA1.powi(step);
        let bias2 = 1.0 - BETA2.powi(step);
        for i in 0..self.value.len() {
            let g = self.grad[i];
            self.m[i] = BETA1 * self.m[i] + (1.0 - BETA1) * g;
            self.v[i] = BETA2 * self.v[i] + (1.0 - BETA2) * g * g;
            let m_hat = self.m[i] / bias1;
            let v_hat = self.v[i] / bias2;
            self.value[i] -= learning_rate * m_hat / (v_hat.sqrt() + EPSILON);
        }
    }
}

/// A network the gradient loop can drive.
pub(crate) trait Trainable {
    type Input;

    fn params_mut(&mut self) -> Vec<&mut Param>;

    /// Forward + backward for one sample; accumulates gradients and returns
    /// the sample loss.
    fn accumulate(&mut self, input: &Self::Input, target: &[f64], loss: Loss) -> f64;
}

/// Mini-batch Adam with global-norm gradient clipping.
///
/// Returns the mean loss of the final epoch.
pub(crate) fn fit<N: Trainable>(
    net: &mut N,
    samples: &[(N::Input, Vec<f64>)],
    hp: &Hyperparameters,
    rng: &mut StdRng,
) -> EngineResult<f64> {
    if samples.is_empty() {
        return Err(EngineError::insufficient_data("no training samples"));
    }

    let batch_size = hp.batch_size.max(1);
    let mut order: Vec<usize> = (0..samples.len()).collect();
    let mut step = 0i32;
    let mut epoch_loss = f64::NAN;

    for epoch in 0..hp.epochs.max(1) {
        order.shuffle(rng);
        let mut total = 0.0;

        for batch in order.chunks(batch_size) {
            for p in net.params_mut() {
                p.zero_grad();
            }
            for &idx in batch {
                let (input, target) = &samples[idx];
                total += net.accumulate(input, target, hp.loss);
            }

            let mut params = net.params_mut();
            let inv = 1.0 / batch.len() as f64;
            let mut norm_sq = 0.0;
            for p in params.iter_mut() {
                p.scale_grad(inv);
                norm_sq += p.grad_norm_sq();
            }
            let norm = norm_sq.sqrt();
            if !norm.is_finite() {
                return Err(EngineError::numeric(format!(
                    "non-finite gradient in epoch {epoch}"
                )));
            }
            if norm > hp.grad_clip {
                let factor = hp.grad_clip / norm;
                for p in params.iter_mut() {
                    p.scale_grad(factor);
                }
            }

            step = step.saturating_add(1);
            for p in params.iter_mut() {
                p.adam_step(hp.learning_rate, step);
            }
        }

        epoch_loss = total / samples.len() as f64;
        if !epoch_loss.is_finite() {
            return Err(EngineError::numeric(format!(
                "training loss diverged in epoch {epoch}"
            )));
        }
    }

    Ok(epoch_loss)
}
