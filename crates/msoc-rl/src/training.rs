//! Training drivers
//!
//! `OnlineTrainer` runs an engine against a live environment; `OfflineTrainer`
//! fits a DQN from previously collected experience records.

use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use msoc_core::Environment;
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::algorithm::{argmax, Dqn, DqnConfig, RLAlgorithm};
use crate::engine::RLEngine;
use crate::experience::{Experience, ExperienceBuffer};
use crate::scaler::StandardScaler;
use crate::state::Action;

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn mean_of_last(values: &[f64], n: usize) -> f64 {
    mean(&values[values.len().saturating_sub(n)..])
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    /// Hard cap per episode on top of the environment's own limit
    pub max_steps_per_episode: usize,
    /// Episodes between target-network syncs; 0 disables
    pub target_sync_episodes: usize,
    pub log_interval: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 200,
            max_steps_per_episode: 1_000,
            target_sync_episodes: 10,
            log_interval: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub episode: usize,
    pub reward: f64,
    pub steps: usize,
    pub success: bool,
    /// Epsilon after this episode's decay
    pub epsilon: f64,
    /// Mean loss over the train calls that ran this episode
    pub loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub environment: String,
    pub algorithm: String,
    pub episodes: Vec<EpisodeStats>,
    pub mean_reward: f64,
    pub best_reward: f64,
    pub success_rate: f64,
    pub final_epsilon: f64,
}

impl TrainingSummary {
    fn from_episodes(environment: &str, algorithm: &str, episodes: Vec<EpisodeStats>) -> Self {
        let rewards: Vec<f64> = episodes.iter().map(|e| e.reward).collect();
        let successes = episodes.iter().filter(|e| e.success).count();
        Self {
            environment: environment.to_string(),
            algorithm: algorithm.to_string(),
            mean_reward: mean(&rewards),
            best_reward: rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            success_rate: if episodes.is_empty() {
                0.0
            } else {
                successes as f64 / episodes.len() as f64
            },
            final_epsilon: episodes.last().map_or(0.0, |e| e.epsilon),
            episodes,
        }
    }

    /// Mean reward over the last `n` episodes
    pub fn recent_mean_reward(&self, n: usize) -> f64 {
        let rewards: Vec<f64> = self.episodes.iter().map(|e| e.reward).collect();
        mean_of_last(&rewards, n)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        write_json(self, path)
    }
}

/// Episode loop: act, step, record, train
pub struct OnlineTrainer {
    config: TrainingConfig,
}

impl OnlineTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, engine: &mut RLEngine, env: &mut dyn Environment) -> Result<TrainingSummary> {
        info!(
            environment = env.name(),
            algorithm = engine.active_algorithm(),
            episodes = self.config.episodes,
            "Starting online training"
        );

        let mut episodes = Vec::with_capacity(self.config.episodes);
        for episode in 0..self.config.episodes {
            let mut observation = env.reset();
            let mut total_reward = 0.0;
            let mut steps = 0;
            let mut losses = Vec::new();

            while steps < self.config.max_steps_per_episode {
                let action = engine.act(&observation)?;
                let transition = env.step(action)?;
                steps += 1;
                total_reward += transition.reward;

                engine.record_experience(Experience::new(
                    observation,
                    action,
                    transition.reward,
                    transition.observation.clone(),
                    transition.done,
                ));
                engine.update_reward(transition.reward)?;

                let loss = engine.train()?;
                if loss > 0.0 {
                    losses.push(loss);
                }

                let terminal = transition.is_terminal();
                observation = transition.observation;
                if terminal {
                    break;
                }
            }

            engine.decay_epsilon()?;
            let sync = self.config.target_sync_episodes;
            if sync > 0 && (episode + 1) % sync == 0 {
                engine.sync_target()?;
                debug!(episode, "Target network synced");
            }

            let stats = EpisodeStats {
                episode,
                reward: total_reward,
                steps,
                success: env.is_success(),
                epsilon: engine.stats().epsilon,
                loss: mean(&losses),
            };

            if self.config.log_interval > 0 && (episode + 1) % self.config.log_interval == 0 {
                let recent: Vec<f64> = episodes
                    .iter()
                    .map(|e: &EpisodeStats| e.reward)
                    .chain(std::iter::once(stats.reward))
                    .collect();
                info!(
                    "Episode {}: reward {:.2}, avg(last {}) {:.2}, epsilon {:.3}, loss {:.4}",
                    episode + 1,
                    stats.reward,
                    self.config.log_interval,
                    mean_of_last(&recent, self.config.log_interval),
                    stats.epsilon,
                    stats.loss
                );
            }
            episodes.push(stats);
        }

        let summary =
            TrainingSummary::from_episodes(env.name(), engine.active_algorithm(), episodes);
        info!(
            mean_reward = summary.mean_reward,
            success_rate = summary.success_rate,
            "Online training complete"
        );
        Ok(summary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    pub epochs: usize,
    /// Training samples pushed into replay memory per epoch
    pub samples_per_epoch: usize,
    pub target_sync_epochs: usize,
    pub log_interval: usize,
    pub validation_split: f64,
    pub split_seed: u64,
    /// Validation samples scored at the end
    pub validation_limit: usize,
    /// Fit a scaler on all states and bake it into the model
    pub normalize: bool,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            samples_per_epoch: 1_000,
            target_sync_epochs: 10,
            log_interval: 10,
            validation_split: 0.2,
            split_seed: 42,
            validation_limit: 1_000,
            normalize: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub timestamp: String,
    pub epochs: usize,
    pub training_samples: usize,
    pub validation_samples: usize,
    pub final_epsilon: f64,
    /// Mean of the last ten replay losses
    pub final_loss: f64,
    pub validation_loss: f64,
    pub data_file: String,
    pub state_size: usize,
    pub action_size: usize,
}

impl TrainingMetadata {
    pub fn save_json(&self, path: &Path) -> Result<()> {
        write_json(self, path)
    }
}

pub struct OfflineResult {
    pub model: Dqn,
    pub metadata: TrainingMetadata,
    /// One entry per replay that ran
    pub losses: Vec<f64>,
}

/// Fits a DQN from a fixed set of experiences
pub struct OfflineTrainer {
    config: OfflineConfig,
    dqn: DqnConfig,
}

impl OfflineTrainer {
    pub fn new(config: OfflineConfig, dqn: DqnConfig) -> Self {
        Self { config, dqn }
    }

    pub fn train(&self, data: &[Experience], data_file: &str) -> Result<OfflineResult> {
        ensure!(data.len() >= 2, "need at least two experiences to train");
        let state_size = data[0].state.len();
        let action_size = Action::action_space_size();

        let mut model = Dqn::new(state_size, action_size, self.dqn.clone())?;
        if self.config.normalize {
            let states: Vec<&[f32]> = data.iter().map(|e| e.state.as_slice()).collect();
            model.set_scaler(StandardScaler::fit(&states)?)?;
        }

        // seeded shuffle then split, validation share rounded up
        let mut order: Vec<usize> = (0..data.len()).collect();
        let mut split_rng = StdRng::seed_from_u64(self.config.split_seed);
        order.shuffle(&mut split_rng);
        let val_len = ((data.len() as f64 * self.config.validation_split - 1e-9).ceil() as usize)
            .min(data.len() - 1);
        let (val_idx, train_idx) = order.split_at(val_len);

        info!(
            training_samples = train_idx.len(),
            validation_samples = val_idx.len(),
            epochs = self.config.epochs,
            "Starting offline training"
        );

        let mut rng = StdRng::seed_from_u64(self.dqn.seed);
        let mut memory = ExperienceBuffer::new(self.dqn.memory_size);
        let mut losses = Vec::new();
        let per_epoch = self.config.samples_per_epoch.min(train_idx.len());

        for epoch in 0..self.config.epochs {
            for i in index::sample(&mut rng, train_idx.len(), per_epoch).into_iter() {
                memory.push(data[train_idx[i]].clone());
            }

            if memory.len() >= self.dqn.batch_size {
                let batch = memory.sample(self.dqn.batch_size, &mut rng);
                losses.push(model.train(&batch)?);
                model.decay_epsilon();
            }

            let sync = self.config.target_sync_epochs;
            if sync > 0 && epoch % sync == 0 {
                model.sync_target()?;
            }

            if self.config.log_interval > 0 && epoch % self.config.log_interval == 0 {
                info!(
                    "Epoch {}/{}, loss {:.4}, epsilon {:.3}",
                    epoch,
                    self.config.epochs,
                    mean_of_last(&losses, 100),
                    model.epsilon()
                );
            }
        }

        let limit = self.config.validation_limit.min(val_idx.len());
        let validation_loss = validation_loss(&model, data, &val_idx[..limit])?;
        info!(validation_loss, "Offline training complete");

        let metadata = TrainingMetadata {
            timestamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
            epochs: self.config.epochs,
            training_samples: train_idx.len(),
            validation_samples: val_idx.len(),
            final_epsilon: model.epsilon(),
            final_loss: mean_of_last(&losses, 10),
            validation_loss,
            data_file: data_file.to_string(),
            state_size,
            action_size,
        };

        Ok(OfflineResult {
            model,
            metadata,
            losses,
        })
    }
}

/// Mean squared TD error, bootstrapping from the target network
fn validation_loss(model: &Dqn, data: &[Experience], indices: &[usize]) -> Result<f64> {
    let gamma = model.config().gamma;
    let mut errors = Vec::with_capacity(indices.len());
    for &i in indices {
        let exp = &data[i];
        let predicted = model.q_values(&exp.state)?;
        let target = if exp.done || exp.next_state.is_empty() {
            exp.reward
        } else {
            let next = model.target_q_values(&exp.next_state)?;
            exp.reward + gamma * next[argmax(&next)]
        };
        let error = predicted.get(exp.action).copied().unwrap_or(0.0) - target;
        errors.push(error * error);
    }
    Ok(mean(&errors))
}
