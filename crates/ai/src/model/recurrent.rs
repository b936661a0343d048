use rand::rngs::StdRng;

use super::Loss;
use super::dense::DenseNetwork;
use super::param::{Param, Trainable};

/// Elman recurrent network: `h_t = tanh(W_x x_t + W_h h_{t-1} + b)`, with a
/// linear head reading the final hidden state. Trained with full
/// backpropagation through time over the window.
#[derive(Debug, Clone)]
pub(crate) struct RecurrentNetwork {
    w_x: Param,
    w_h: Param,
    b: Param,
    head: DenseNetwork,
    inputs: usize,
    hidden: usize,
}

impl RecurrentNetwork {
    pub fn new(inputs: usize, hidden: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let hidden = hidden.max(1);
        let scale_x = (1.0 / inputs.max(1) as f64).sqrt();
        let scale_h = (1.0 / hidden as f64).sqrt();
        Self {
            w_x: Param::uniform(hidden * inputs, scale_x, rng),
            w_h: Param::uniform(hidden * hidden, scale_h, rng),
            b: Param::zeros(hidden),
            head: DenseNetwork::new(&[hidden, outputs], rng),
            inputs,
            hidden,
        }
    }

    pub fn input_size(&self) -> usize {
        self.inputs
    }

    /// Hidden states `h_0..=h_T` (`h_0` is zeros).
    fn states(&self, sequence: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let mut hs = Vec::with_capacity(sequence.len() + 1);
        hs.push(vec![0.0; self.hidden]);
        for x in sequence {
            let prev = &hs[hs.len() - 1];
            let next: Vec<f64> = (0..self.hidden)
                .map(|j| {
                    let wx = &self.w_x.value[j * self.inputs..(j + 1) * self.inputs];
                    let wh = &self.w_h.value[j * self.hidden..(j + 1) * self.hidden];
                    let z = wx.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
                        + wh.iter().zip(prev).map(|(w, v)| w * v).sum::<f64>()
                        + self.b.value[j];
                    z.tanh()
                })
                .collect();
            hs.push(next);
        }
        hs
    }

    pub fn predict(&self, sequence: &[Vec<f64>]) -> Vec<f64> {
        let hs = self.states(sequence);
        let last = hs.last().map(Vec::as_slice).unwrap_or_default();
        self.head.predict(last)
    }
}

impl Trainable for RecurrentNetwork {
    type Input = Vec<Vec<f64>>;

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = vec![&mut self.w_x, &mut self.w_h, &mut self.b];
        params.extend(self.head.params());
        params
    }

    fn accumulate(&mut self, sequence: &Vec<Vec<f64>>, target: &[f64], loss: Loss) -> f64 {
        let hs = self.states(sequence);
        let last = hs.last().cloned().unwrap_or_default();
        let acts = self.head.trace(&last);
        let output = acts.last().map(Vec::as_slice).unwrap_or_default();
        let value = loss.value(output, target);
        let grad_out = loss.gradient(output, target);

        let mut dh = self.head.backward(&acts, grad_out);

        for t in (1..hs.len()).rev() {
            let h = &hs[t];
            let h_prev = &hs[t - 1];
            let x = &sequence[t - 1];
            let dz: Vec<f64> = dh
                .iter()
                .zip(h)
                .map(|(d, hv)| d * (1.0 - hv * hv))
                .collect();

            let mut dh_prev = vec![0.0; self.hidden];
            for (j, g) in dz.iter().enumerate() {
                if *g == 0.0 {
                    continue;
                }
                let xo = j * self.inputs;
                for (i, xv) in x.iter().enumerate().take(self.inputs) {
                    self.w_x.grad[xo + i] += g * xv;
                }
                let ho = j * self.hidden;
                for k in 0..self.hidden {
                    self.w_h.grad[ho + k] += g * h_prev[k];
                    dh_prev[k] += self.w_h.value[ho + k] * g;
                }
                self.b.grad[j] += g;
            }
            dh = dh_prev;
        }

        value
    }
}
