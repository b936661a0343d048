use serde::{Deserialize, Serialize};

/// Training loss of a model family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Loss {
    MeanSquared,
    MeanAbsolute,
    /// Quadratic within `delta`, linear outside.
    Huber { delta: f64 },
}

impl Loss {
    /// Mean loss over one output vector.
    pub fn value(&self, predicted: &[f64], target: &[f64]) -> f64 {
        let n = predicted.len().max(1) as f64;
        let total: f64 = predicted
            .iter()
            .zip(target)
            .map(|(p, y)| {
                let r = p - y;
                match *self {
                    Loss::MeanSquared => r * r,
                    Loss::MeanAbsolute => r.abs(),
                    Loss::Huber { delta } => {
                        if r.abs() <= delta {
                            0.5 * r * r
                        } else {
                            delta * (r.abs() - 0.5 * delta)
                        }
                    }
                }
            })
            .sum();
        total / n
    }

    /// d(loss)/d(predicted).
    pub fn gradient(&self, predicted: &[f64], target: &[f64]) -> Vec<f64> {
        let n = predicted.len().max(1) as f64;
        predicted
            .iter()
            .zip(target)
            .map(|(p, y)| {
                let r = p - y;
                let g = match *self {
                    Loss::MeanSquared => 2.0 * r,
                    Loss::MeanAbsolute => sign(r),
                    Loss::Huber { delta } => {
                        if r.abs() <= delta {
                            r
                        } else {
                            delta * sign(r)
                        }
                    }
                };
                g / n
            })
            .collect()
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
