//! Dense feed-forward network trained with Adam
//!
//! Hidden layers use ReLU with optional inverted dropout; the output layer
//! is linear. Loss is mean squared error over every output.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, ensure, Context, Result};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-7;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    weights: Array2<f32>,
    bias: Array1<f32>,
    /// Drop probability applied to this layer's activations while training
    dropout: f32,
}

#[derive(Debug, Clone)]
struct AdamState {
    m_w: Array2<f32>,
    v_w: Array2<f32>,
    m_b: Array1<f32>,
    v_b: Array1<f32>,
}

impl AdamState {
    fn for_layer(layer: &Dense) -> Self {
        Self {
            m_w: Array2::zeros(layer.weights.raw_dim()),
            v_w: Array2::zeros(layer.weights.raw_dim()),
            m_b: Array1::zeros(layer.bias.raw_dim()),
            v_b: Array1::zeros(layer.bias.raw_dim()),
        }
    }
}

fn default_rng() -> StdRng {
    StdRng::seed_from_u64(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    layers: Vec<Dense>,
    learning_rate: f32,
    #[serde(skip)]
    adam: Vec<AdamState>,
    #[serde(skip)]
    step: i32,
    #[serde(skip, default = "default_rng")]
    rng: StdRng,
}

impl Mlp {
    /// `sizes` lists input, hidden and output widths. `dropout[i]` applies
    /// after hidden layer `i`; missing entries mean no dropout.
    pub fn new(sizes: &[usize], dropout: &[f32], learning_rate: f32, seed: u64) -> Result<Self> {
        ensure!(sizes.len() >= 2, "network needs an input and an output layer");
        ensure!(sizes.iter().all(|s| *s > 0), "layer widths must be positive");

        let mut rng = StdRng::seed_from_u64(seed);
        let hidden = sizes.len() - 2;
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                let weights =
                    Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit));
                let rate = if i < hidden {
                    dropout.get(i).copied().unwrap_or(0.0).clamp(0.0, 0.95)
                } else {
                    0.0
                };
                Dense {
                    weights,
                    bias: Array1::zeros(fan_out),
                    dropout: rate,
                }
            })
            .collect();

        Ok(Self {
            layers,
            learning_rate,
            adam: Vec::new(),
            step: 0,
            rng,
        })
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.weights.nrows())
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.weights.ncols())
    }

    /// Layer widths including input and output
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.input_size()];
        sizes.extend(self.layers.iter().map(|l| l.weights.ncols()));
        sizes
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }

    /// Inference pass over a batch (rows are samples). Dropout is inactive.
    pub fn forward(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        ensure!(
            inputs.ncols() == self.input_size(),
            "expected {} input features, got {}",
            self.input_size(),
            inputs.ncols()
        );
        let last = self.layers.len() - 1;
        let mut x = inputs.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            x = x.dot(&layer.weights) + &layer.bias;
            if i < last {
                x.mapv_inplace(|v| v.max(0.0));
            }
        }
        Ok(x)
    }

    pub fn predict(&self, input: &[f32]) -> Result<Vec<f32>> {
        let row = Array2::from_shape_vec((1, input.len()), input.to_vec())?;
        Ok(self.forward(&row)?.row(0).to_vec())
    }

    /// One gradient step on `(inputs, targets)`; returns the pre-step loss
    pub fn train_batch(&mut self, inputs: &Array2<f32>, targets: &Array2<f32>) -> Result<f32> {
        ensure!(
            inputs.ncols() == self.input_size(),
            "expected {} input features, got {}",
            self.input_size(),
            inputs.ncols()
        );
        ensure!(
            targets.ncols() == self.output_size() && targets.nrows() == inputs.nrows(),
            "target shape {:?} does not match batch of {} x {}",
            targets.shape(),
            inputs.nrows(),
            self.output_size()
        );
        ensure!(inputs.nrows() > 0, "empty training batch");

        // forward, keeping each layer's input and pre-activation
        let last = self.layers.len() - 1;
        let mut activations = vec![inputs.to_owned()];
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut masks: Vec<Option<Array2<f32>>> = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            let z = activations[i].dot(&layer.weights) + &layer.bias;
            if i < last {
                let mut a = z.mapv(|v| v.max(0.0));
                let mask = if layer.dropout > 0.0 {
                    let keep = 1.0 - layer.dropout;
                    let rng = &mut self.rng;
                    let mask = Array2::from_shape_fn(a.raw_dim(), |_| {
                        if rng.gen::<f32>() < keep {
                            1.0 / keep
                        } else {
                            0.0
                        }
                    });
                    a *= &mask;
                    Some(mask)
                } else {
                    None
                };
                masks.push(mask);
                activations.push(a);
            } else {
                masks.push(None);
                activations.push(z.clone());
            }
            pre_activations.push(z);
        }

        let output = &activations[last + 1];
        let diff = output - targets;
        let count = diff.len() as f32;
        let loss = diff.mapv(|d| d * d).sum() / count;

        let mut grads = Vec::with_capacity(self.layers.len());
        let mut delta = diff * (2.0 / count);
        for i in (0..self.layers.len()).rev() {
            let grad_w = activations[i].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            if i > 0 {
                let mut upstream = delta.dot(&self.layers[i].weights.t());
                if let Some(mask) = &masks[i - 1] {
                    upstream *= mask;
                }
                let relu_grad = pre_activations[i - 1].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                delta = upstream * relu_grad;
            }
            grads.push((i, grad_w, grad_b));
        }

        self.apply_adam(grads);
        Ok(loss)
    }

    fn apply_adam(&mut self, grads: Vec<(usize, Array2<f32>, Array1<f32>)>) {
        if self.adam.len() != self.layers.len() {
            self.adam = self.layers.iter().map(AdamState::for_layer).collect();
            self.step = 0;
        }
        self.step = self.step.saturating_add(1);
        let lr = self.learning_rate;
        let bc1 = 1.0 - BETA1.powi(self.step);
        let bc2 = 1.0 - BETA2.powi(self.step);

        for (i, grad_w, grad_b) in grads {
            let state = &mut self.adam[i];
            let layer = &mut self.layers[i];

            state.m_w = &state.m_w * BETA1 + &grad_w * (1.0 - BETA1);
            state.v_w = &state.v_w * BETA2 + &grad_w.mapv(|g| g * g) * (1.0 - BETA2);
            state.m_b = &state.m_b * BETA1 + &grad_b * (1.0 - BETA1);
            state.v_b = &state.v_b * BETA2 + &grad_b.mapv(|g| g * g) * (1.0 - BETA2);

            ndarray::Zip::from(&mut layer.weights)
                .and(&state.m_w)
                .and(&state.v_w)
                .for_each(|w, m, v| *w -= lr * (m / bc1) / ((v / bc2).sqrt() + ADAM_EPS));
            ndarray::Zip::from(&mut layer.bias)
                .and(&state.m_b)
                .and(&state.v_b)
                .for_each(|b, m, v| *b -= lr * (m / bc1) / ((v / bc2).sqrt() + ADAM_EPS));
        }
    }

    /// Overwrite this network's parameters with `other`'s
    pub fn copy_weights_from(&mut self, other: &Mlp) -> Result<()> {
        if self.sizes() != other.sizes() {
            return Err(anyhow!(
                "cannot copy weights between shapes {:?} and {:?}",
                other.sizes(),
                self.sizes()
            ));
        }
        for (dst, src) in self.layers.iter_mut().zip(&other.layers) {
            dst.weights.assign(&src.weights);
            dst.bias.assign(&src.bias);
        }
        Ok(())
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json).with_context(|| format!("writing network to {}", path.display()))
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading network from {}", path.display()))?;
        let mlp: Mlp = serde_json::from_str(&json)
            .with_context(|| format!("parsing network in {}", path.display()))?;
        mlp.check_shapes()?;
        Ok(mlp)
    }

    /// Every layer must feed the next one and carry a bias per output
    pub fn check_shapes(&self) -> Result<()> {
        ensure!(!self.layers.is_empty(), "network has no layers");
        for (i, layer) in self.layers.iter().enumerate() {
            ensure!(
                layer.bias.len() == layer.weights.ncols(),
                "layer {i} has {} biases for {} outputs",
                layer.bias.len(),
                layer.weights.ncols()
            );
            if let Some(next) = self.layers.get(i + 1) {
                ensure!(
                    layer.weights.ncols() == next.weights.nrows(),
                    "layer {i} outputs {} values but layer {} takes {}",
                    layer.weights.ncols(),
                    i + 1,
                    next.weights.nrows()
                );
            }
        }
        Ok(())
    }
}

/// Stack equal-length rows into a matrix
pub fn to_matrix(rows: &[&[f32]], width: usize) -> Result<Array2<f32>> {
    let mut data = Vec::with_capacity(rows.len() * width);
    for row in rows {
        ensure!(
            row.len() == width,
            "row has {} features, expected {width}",
            row.len()
        );
        data.extend_from_slice(row);
    }
    Ok(Array2::from_shape_vec((rows.len(), width), data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes() {
        let net = Mlp::new(&[7, 16, 8, 11], &[0.2], 1e-3, 0).unwrap();
        assert_eq!(net.input_size(), 7);
        assert_eq!(net.output_size(), 11);
        assert_eq!(net.sizes(), vec![7, 16, 8, 11]);
        assert_eq!(net.predict(&[0.0; 7]).unwrap().len(), 11);
        assert!(net.predict(&[0.0; 3]).is_err());
        assert!(Mlp::new(&[4], &[], 1e-3, 0).is_err());
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let a = Mlp::new(&[3, 5, 2], &[], 1e-3, 9).unwrap();
        let b = Mlp::new(&[3, 5, 2], &[], 1e-3, 9).unwrap();
        assert_eq!(a.predict(&[0.5, -1.0, 2.0]).unwrap(), b.predict(&[0.5, -1.0, 2.0]).unwrap());
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut net = Mlp::new(&[2, 16, 1], &[], 1e-2, 3).unwrap();
        let inputs = Array2::from_shape_vec(
            (4, 2),
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0],
        )
        .unwrap();
        let targets = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 1.0, 2.0]).unwrap();

        let first = net.train_batch(&inputs, &targets).unwrap();
        let mut last = first;
        for _ in 0..500 {
            last = net.train_batch(&inputs, &targets).unwrap();
        }
        assert!(last < first * 0.1, "loss went from {first} to {last}");
    }

    #[test]
    fn test_train_rejects_bad_targets() {
        let mut net = Mlp::new(&[2, 4, 3], &[], 1e-3, 0).unwrap();
        let inputs = Array2::zeros((2, 2));
        assert!(net.train_batch(&inputs, &Array2::zeros((2, 2))).is_err());
        assert!(net.train_batch(&inputs, &Array2::zeros((1, 3))).is_err());
    }

    #[test]
    fn test_copy_weights() {
        let a = Mlp::new(&[3, 4, 2], &[], 1e-3, 1).unwrap();
        let mut b = Mlp::new(&[3, 4, 2], &[], 1e-3, 2).unwrap();
        assert_ne!(a.predict(&[1.0, 1.0, 1.0]).unwrap(), b.predict(&[1.0, 1.0, 1.0]).unwrap());
        b.copy_weights_from(&a).unwrap();
        assert_eq!(a.predict(&[1.0, 1.0, 1.0]).unwrap(), b.predict(&[1.0, 1.0, 1.0]).unwrap());

        let mut c = Mlp::new(&[3, 5, 2], &[], 1e-3, 1).unwrap();
        assert!(c.copy_weights_from(&a).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.json");
        let net = Mlp::new(&[4, 6, 3], &[0.5], 1e-3, 5).unwrap();
        net.save_json(&path).unwrap();
        let loaded = Mlp::load_json(&path).unwrap();
        let x = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(net.predict(&x).unwrap(), loaded.predict(&x).unwrap());
        assert!(Mlp::load_json(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_load_rejects_mismatched_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.json");
        let net = Mlp::new(&[3, 4, 2], &[], 1e-3, 0).unwrap();
        let mut value = serde_json::to_value(&net).unwrap();
        // second layer expects 5 inputs while the first produces 4
        let wide = Mlp::new(&[5, 2], &[], 1e-3, 0).unwrap();
        value["layers"][1] = serde_json::to_value(&wide.layers[0]).unwrap();
        std::fs::write(&path, value.to_string()).unwrap();
        assert!(Mlp::load_json(&path).is_err());
    }

    #[test]
    fn test_to_matrix() {
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        let m = to_matrix(&[&a, &b], 2).unwrap();
        assert_eq!(m.shape(), &[2, 2]);
        assert!(to_matrix(&[&a, &[1.0][..]], 2).is_err());
    }
}
