//! Offline model validation against recorded experiences

use anyhow::{ensure, Result};
use msoc_core::Environment;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};

use crate::algorithm::{argmax, RLAlgorithm};
use crate::experience::Experience;
use crate::state::action_label;

/// Discount used when scoring bootstrapped Q estimates
pub const VALIDATION_GAMMA: f64 = 0.99;

const FEATURE_NAMES: [&str; 7] = [
    "PosX",
    "PosY",
    "NearbyTrees",
    "NearbyRocks",
    "NearbyBushes",
    "EnergyLevel",
    "InventoryLevel",
];

/// Population mean and standard deviation
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Pearson correlation; `None` when either side is constant
fn correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let (mx, sx) = mean_std(xs);
    let (my, sy) = mean_std(ys);
    if xs.len() != ys.len() || sx <= f64::EPSILON || sy <= f64::EPSILON {
        return None;
    }
    let cov = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mx) * (y - my))
        .sum::<f64>()
        / xs.len() as f64;
    Some(cov / (sx * sy))
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionAccuracy {
    pub action: usize,
    pub name: String,
    /// Share of samples with this label predicted correctly (recall)
    pub accuracy: f64,
    pub precision: f64,
    pub f1: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub accuracy: f64,
    pub per_action: Vec<ActionAccuracy>,
    /// `confusion[actual][predicted]`
    pub confusion: Vec<Vec<usize>>,
    pub predicted: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QValueReport {
    pub samples: usize,
    pub max_mean: f64,
    pub max_std: f64,
    pub min_mean: f64,
    pub min_std: f64,
    pub chosen_mean: f64,
    pub chosen_std: f64,
    pub reward_correlation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewardStats {
    pub action: usize,
    pub name: String,
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureStats {
    pub name: String,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyReport {
    pub rewards: Vec<f64>,
    pub mean_reward: f64,
    pub success_rate: f64,
}

/// Everything `validate` prints, in one serialisable bundle
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub model: String,
    pub samples: usize,
    pub actions: ActionReport,
    pub q_values: QValueReport,
    pub q_value_error: f64,
    pub rewards: Vec<RewardStats>,
    pub states: Vec<FeatureStats>,
}

pub struct ModelValidator<'a> {
    model: &'a dyn RLAlgorithm,
    data: &'a [Experience],
    rng: StdRng,
}

impl<'a> ModelValidator<'a> {
    pub fn new(model: &'a dyn RLAlgorithm, data: &'a [Experience]) -> Self {
        Self::with_seed(model, data, 0)
    }

    pub fn with_seed(model: &'a dyn RLAlgorithm, data: &'a [Experience], seed: u64) -> Self {
        Self {
            model,
            data,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn actions(&self) -> usize {
        self.model.action_size()
    }

    pub fn validate_actions(&self) -> Result<ActionReport> {
        ensure!(!self.data.is_empty(), "no samples to validate against");
        let size = self.actions();
        let mut confusion = vec![vec![0usize; size]; size];
        let mut predicted = Vec::with_capacity(self.data.len());
        let mut correct = 0usize;

        for exp in self.data {
            let guess = self.model.predict(&exp.state)?;
            predicted.push(guess);
            if guess == exp.action {
                correct += 1;
            }
            if exp.action < size && guess < size {
                confusion[exp.action][guess] += 1;
            }
        }

        let per_action = (0..size)
            .filter_map(|a| {
                let count: usize = confusion[a].iter().sum();
                if count == 0 {
                    return None;
                }
                let hits = confusion[a][a];
                let predicted_as: usize = confusion.iter().map(|row| row[a]).sum();
                let recall = hits as f64 / count as f64;
                let precision = if predicted_as == 0 {
                    0.0
                } else {
                    hits as f64 / predicted_as as f64
                };
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                Some(ActionAccuracy {
                    action: a,
                    name: action_label(a),
                    accuracy: recall,
                    precision,
                    f1,
                    count,
                })
            })
            .collect();

        Ok(ActionReport {
            accuracy: correct as f64 / self.data.len() as f64,
            per_action,
            confusion,
            predicted,
        })
    }

    /// Q statistics over up to `n` random samples
    pub fn analyze_q_values(&mut self, n: usize) -> Result<QValueReport> {
        let amount = n.min(self.data.len());
        let picks = index::sample(&mut self.rng, self.data.len(), amount).into_vec();

        let mut max_q = Vec::with_capacity(amount);
        let mut min_q = Vec::with_capacity(amount);
        let mut chosen_q = Vec::with_capacity(amount);
        let mut rewards = Vec::with_capacity(amount);
        for i in picks {
            let exp = &self.data[i];
            let q = self.model.q_values(&exp.state)?;
            max_q.push(q.iter().copied().fold(f64::NEG_INFINITY, f64::max));
            min_q.push(q.iter().copied().fold(f64::INFINITY, f64::min));
            chosen_q.push(q.get(exp.action).copied().unwrap_or(0.0));
            rewards.push(exp.reward);
        }

        let (max_mean, max_std) = mean_std(&max_q);
        let (min_mean, min_std) = mean_std(&min_q);
        let (chosen_mean, chosen_std) = mean_std(&chosen_q);
        Ok(QValueReport {
            samples: amount,
            max_mean,
            max_std,
            min_mean,
            min_std,
            chosen_mean,
            chosen_std,
            reward_correlation: correlation(&chosen_q, &rewards),
        })
    }

    pub fn reward_by_action(&self) -> Vec<RewardStats> {
        (0..self.actions())
            .filter_map(|a| {
                let rewards: Vec<f64> = self
                    .data
                    .iter()
                    .filter(|e| e.action == a)
                    .map(|e| e.reward)
                    .collect();
                if rewards.is_empty() {
                    return None;
                }
                let (mean, std) = mean_std(&rewards);
                Some(RewardStats {
                    action: a,
                    name: action_label(a),
                    mean,
                    std,
                    count: rewards.len(),
                })
            })
            .collect()
    }

    pub fn state_stats(&self) -> Vec<FeatureStats> {
        let width = self.data.first().map_or(0, |e| e.state.len());
        (0..width)
            .map(|i| {
                let column: Vec<f64> = self
                    .data
                    .iter()
                    .filter_map(|e| e.state.get(i).copied().map(f64::from))
                    .collect();
                let (mean, std) = mean_std(&column);
                let name = if width == FEATURE_NAMES.len() {
                    FEATURE_NAMES[i].to_string()
                } else {
                    format!("feature_{i}")
                };
                FeatureStats {
                    name,
                    mean,
                    std,
                    min: column.iter().copied().fold(f64::INFINITY, f64::min),
                    max: column.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                }
            })
            .collect()
    }

    /// Mean |Q(s,a) - (r + 0.99 max Q(s'))| over the first `n` samples
    pub fn q_value_error(&self, n: usize) -> Result<f64> {
        let samples = &self.data[..n.min(self.data.len())];
        if samples.is_empty() {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for exp in samples {
            let q = self.model.q_values(&exp.state)?;
            let target = if exp.next_state.is_empty() {
                exp.reward
            } else {
                let next = self.model.q_values(&exp.next_state)?;
                exp.reward + VALIDATION_GAMMA * next[argmax(&next)]
            };
            total += (q.get(exp.action).copied().unwrap_or(0.0) - target).abs();
        }
        Ok(total / samples.len() as f64)
    }

    /// Roll the model out in a live environment
    pub fn evaluate_policy(
        &mut self,
        env: &mut dyn Environment,
        episodes: usize,
        epsilon: f64,
    ) -> Result<PolicyReport> {
        let mut rewards = Vec::with_capacity(episodes);
        let mut successes = 0usize;
        let actions = env.action_size().max(1);

        for _ in 0..episodes {
            let mut observation = env.reset();
            let mut total = 0.0;
            loop {
                let action = if self.rng.gen::<f64>() < epsilon {
                    self.rng.gen_range(0..actions)
                } else {
                    self.model.predict(&observation)?
                };
                let transition = env.step(action)?;
                total += transition.reward;
                if transition.is_terminal() {
                    break;
                }
                observation = transition.observation;
            }
            if env.is_success() {
                successes += 1;
            }
            rewards.push(total);
        }

        let (mean_reward, _) = mean_std(&rewards);
        Ok(PolicyReport {
            rewards,
            mean_reward,
            success_rate: if episodes == 0 {
                0.0
            } else {
                successes as f64 / episodes as f64
            },
        })
    }

    /// Run every offline analysis
    pub fn full_report(&mut self, q_samples: usize) -> Result<ValidationReport> {
        info!(
            model = self.model.name(),
            samples = self.data.len(),
            "Starting model validation"
        );
        let actions = self.validate_actions()?;
        let q_values = self.analyze_q_values(q_samples)?;
        let q_value_error = self.q_value_error(100)?;
        info!(accuracy = actions.accuracy, "Validation complete");
        Ok(ValidationReport {
            model: self.model.name().to_string(),
            samples: self.data.len(),
            actions,
            q_values,
            q_value_error,
            rewards: self.reward_by_action(),
            states: self.state_stats(),
        })
    }
}

/// Accuracy of each model on the same data, best first. A model that fails
/// to evaluate scores 0.
pub fn compare_models(
    models: &[(String, &dyn RLAlgorithm)],
    data: &[Experience],
) -> Vec<(String, f64)> {
    let mut results: Vec<(String, f64)> = models
        .iter()
        .map(|(name, model)| {
            let accuracy = match ModelValidator::new(*model, data).validate_actions() {
                Ok(report) => report.accuracy,
                Err(e) => {
                    warn!(model = %name, error = %e, "Model evaluation failed");
                    0.0
                }
            };
            (name.clone(), accuracy)
        })
        .collect();
    results.sort_by(|a, b| b.1.total_cmp(&a.1));
    results
}
