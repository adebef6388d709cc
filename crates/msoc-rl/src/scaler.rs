//! Per-feature standardisation (zero mean, unit variance)

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl StandardScaler {
    /// Fit on rows of equal width. Constant features get a scale of 1.
    pub fn fit<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        ensure!(!rows.is_empty(), "cannot fit a scaler on zero samples");
        let width = rows[0].as_ref().len();
        ensure!(
            rows.iter().all(|r| r.as_ref().len() == width),
            "all samples must have {width} features"
        );

        let n = rows.len() as f64;
        let mut mean = vec![0.0f64; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.as_ref()) {
                *m += f64::from(*v);
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0f64; width];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row.as_ref()).zip(&mean) {
                let d = f64::from(*v) - m;
                *acc += d * d;
            }
        }

        let scale = var
            .iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std > f64::EPSILON {
                    std as f32
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            scale,
        })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn scale(&self) -> &[f32] {
        &self.scale
    }

    pub fn transform(&self, row: &[f32]) -> Result<Vec<f32>> {
        ensure!(
            row.len() == self.width(),
            "scaler fitted on {} features, got {}",
            self.width(),
            row.len()
        );
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform_batch<R: AsRef<[f32]>>(&self, rows: &[R]) -> Result<Vec<Vec<f32>>> {
        rows.iter().map(|r| self.transform(r.as_ref())).collect()
    }

    pub fn fit_transform<R: AsRef<[f32]>>(rows: &[R]) -> Result<(Self, Vec<Vec<f32>>)> {
        let scaler = Self::fit(rows)?;
        let out = scaler.transform_batch(rows)?;
        Ok((scaler, out))
    }
}
