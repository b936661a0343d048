/// Z-score scaler for a single quantity.
///
/// Constant inputs (std ≈ 0) transform to zero and inverse-transform to the
/// fitted mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StandardScaler {
    mean: f64,
    std: f64,
}

impl StandardScaler {
    const EPSILON: f64 = 1e-10;

    pub fn fit<'a>(values: impl IntoIterator<Item = &'a f64>) -> Self {
        let mut n = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for v in values {
            n += 1;
            sum += v;
            sum_sq += v * v;
        }
        if n == 0 {
            return Self { mean: 0.0, std: 1.0 };
        }
        let mean = sum / n as f64;
        let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
        Self {
            mean,
            std: variance.sqrt(),
        }
    }

    pub fn transform(&self, v: f64) -> f64 {
        if self.std < Self::EPSILON {
            0.0
        } else {
            (v - self.mean) / self.std
        }
    }

    pub fn inverse(&self, v: f64) -> f64 {
        if self.std < Self::EPSILON {
            self.mean
        } else {
            v * self.std + self.mean
        }
    }
}

/// One [`StandardScaler`] per feature column.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnScaler {
    columns: Vec<StandardScaler>,
}

impl ColumnScaler {
    pub fn fit<'a>(rows: impl IntoIterator<Item = &'a [f64]> + Clone, width: usize) -> Self {
        let columns = (0..width)
            .map(|c| StandardScaler::fit(rows.clone().into_iter().filter_map(|r| r.get(c))))
            .collect();
        Self { columns }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.columns)
            .map(|(v, s)| s.transform(*v))
            .collect()
    }
}
