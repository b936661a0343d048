use rand::rngs::StdRng;

use super::Loss;
use super::param::{Param, Trainable};

/// Fully connected layer, weights stored row-major (`outputs × inputs`).
#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Param,
    bias: Param,
    inputs: usize,
    outputs: usize,
}

impl DenseLayer {
    fn new(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        // He-style scale keeps ReLU activations from vanishing at start.
        let scale = (6.0 / (inputs.max(1) + outputs) as f64).sqrt();
        Self {
            weights: Param::uniform(inputs * outputs, scale, rng),
            bias: Param::zeros(outputs),
            inputs,
            outputs,
        }
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|o| {
                let row = &self.weights.value[o * self.inputs..(o + 1) * self.inputs];
                row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>() + self.bias.value[o]
            })
            .collect()
    }

    /// Accumulates parameter gradients; returns d(loss)/d(input).
    fn backward(&mut self, x: &[f64], grad_out: &[f64]) -> Vec<f64> {
        let mut grad_in = vec![0.0; self.inputs];
        for (o, g) in grad_out.iter().enumerate() {
            if *g == 0.0 {
                continue;
            }
            let base = o * self.inputs;
            for i in 0..self.inputs {
                self.weights.grad[base + i] += g * x[i];
                grad_in[i] += self.weights.value[base + i] * g;
            }
            self.bias.grad[o] += g;
        }
        grad_in
    }
}

/// Feed-forward regressor: ReLU hidden layers, linear output.
#[derive(Debug, Clone)]
pub(crate) struct DenseNetwork {
    layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    /// `sizes` = `[inputs, hidden.., outputs]`.
    pub fn new(sizes: &[usize], rng: &mut StdRng) -> Self {
        let layers = sizes
            .windows(2)
            .map(|w| DenseLayer::new(w[0], w[1], rng))
            .collect();
        Self { layers }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.inputs).unwrap_or(0)
    }

    pub fn predict(&self, x: &[f64]) -> Vec<f64> {
        self.trace(x).pop().unwrap_or_default()
    }

    /// Activations per layer boundary: `acts[0]` is the input, the last
    /// entry the output.
    pub fn trace(&self, x: &[f64]) -> Vec<Vec<f64>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(x.to_vec());
        let last = self.layers.len().saturating_sub(1);
        for (idx, layer) in self.layers.iter().enumerate() {
            let mut out = layer.forward(&acts[idx]);
            if idx < last {
                out.iter_mut().for_each(|v| *v = v.max(0.0));
            }
            acts.push(out);
        }
        acts
    }

    /// Backpropagates `grad_out` through a recorded trace; returns the
    /// gradient with respect to the network input.
    pub fn backward(&mut self, acts: &[Vec<f64>], grad_out: Vec<f64>) -> Vec<f64> {
        let last = self.layers.len().saturating_sub(1);
        let mut grad = grad_out;
        for idx in (0..self.layers.len()).rev() {
            if idx < last {
                // ReLU derivative on this layer's output.
                for (g, a) in grad.iter_mut().zip(&acts[idx + 1]) {
                    if *a <= 0.0 {
                        *g = 0.0;
                    }
                }
            }
            grad = self.layers[idx].backward(&acts[idx], &grad);
        }
        grad
    }

    pub(crate) fn params(&mut self) -> Vec<&mut Param> {
        self.layers
            .iter_mut()
            .flat_map(|l| [&mut l.weights, &mut l.bias])
            .collect()
    }
}

impl Trainable for DenseNetwork {
    type Input = Vec<f64>;

    fn params_mut(&mut self) -> Vec<&mut Param> {
        self.params()
    }

    fn accumulate(&mut self, input: &Vec<f64>, target: &[f64], loss: Loss) -> f64 {
        let acts = self.trace(input);
        let output = acts.last().map(Vec::as_slice).unwrap_or_default();
        let value = loss.value(output, target);
        let grad = loss.gradient(output, target);
        self.backward(&acts, grad);
        value
    }
}
