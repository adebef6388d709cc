//! RL Engine - Coordinates acting, replay and training

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use msoc_core::STATE_SIZE;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::algorithm::{Dqn, DqnConfig, QLearning, QLearningConfig, RLAlgorithm};
use crate::experience::{Experience, ExperienceBuffer};
use crate::state::{Action, Reward};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub state_size: usize,
    pub action_size: usize,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    /// Train calls between target-network syncs; 0 disables automatic sync
    pub target_update_interval: u64,
    pub seed: u64,
    pub dqn: DqnConfig,
    pub q_learning: QLearningConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_size: STATE_SIZE,
            action_size: Action::action_space_size(),
            batch_size: 64,
            buffer_capacity: 10_000,
            target_update_interval: 100,
            seed: 42,
            dqn: DqnConfig::default(),
            q_learning: QLearningConfig::default(),
        }
    }
}

/// RL Engine for managing algorithms and training
pub struct RLEngine {
    algorithms: HashMap<String, Box<dyn RLAlgorithm>>,
    active_algorithm: String,
    experience_buffer: ExperienceBuffer,
    training_batch_size: usize,
    target_update_interval: u64,
    train_steps: u64,
    total_steps: u64,
    total_rewards: f64,
    rng: StdRng,
}

impl RLEngine {
    /// Create an engine with `q_learning` and `dqn` registered
    pub fn new(config: EngineConfig) -> Result<Self> {
        let mut algorithms: HashMap<String, Box<dyn RLAlgorithm>> = HashMap::new();

        let dqn_config = DqnConfig {
            seed: config.seed,
            batch_size: config.batch_size,
            memory_size: config.buffer_capacity,
            ..config.dqn.clone()
        };
        algorithms.insert(
            "q_learning".to_string(),
            Box::new(QLearning::with_actions(
                config.q_learning.clone(),
                config.action_size,
            )),
        );
        algorithms.insert(
            "dqn".to_string(),
            Box::new(Dqn::new(config.state_size, config.action_size, dqn_config)?),
        );

        Ok(Self {
            algorithms,
            active_algorithm: "q_learning".to_string(),
            experience_buffer: ExperienceBuffer::new(config.buffer_capacity),
            training_batch_size: config.batch_size.max(1),
            target_update_interval: config.target_update_interval,
            train_steps: 0,
            total_steps: 0,
            total_rewards: 0.0,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Set the active algorithm
    pub fn set_algorithm(&mut self, name: &str) -> Result<()> {
        if self.algorithms.contains_key(name) {
            self.active_algorithm = name.to_string();
            info!("Active algorithm set to: {}", name);
            Ok(())
        } else {
            Err(anyhow!("Unknown algorithm: {}", name))
        }
    }

    /// Get the active algorithm name
    pub fn active_algorithm(&self) -> &str {
        &self.active_algorithm
    }

    /// List available algorithms, sorted by name
    pub fn list_algorithms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.algorithms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Add or replace an algorithm under `name`
    pub fn register(&mut self, name: &str, algorithm: Box<dyn RLAlgorithm>) {
        self.algorithms.insert(name.to_string(), algorithm);
    }

    pub fn algorithm(&self) -> Result<&dyn RLAlgorithm> {
        self.algorithms
            .get(&self.active_algorithm)
            .map(|alg| &**alg)
            .ok_or_else(|| anyhow!("Active algorithm not found"))
    }

    fn algorithm_mut(&mut self) -> Result<&mut Box<dyn RLAlgorithm>> {
        self.algorithms
            .get_mut(&self.active_algorithm)
            .ok_or_else(|| anyhow!("Active algorithm not found"))
    }

    /// Record an experience
    pub fn record_experience(&mut self, experience: Experience) {
        self.experience_buffer.push(experience);
        self.total_steps += 1;
    }

    /// Epsilon-greedy action using the active algorithm's epsilon
    pub fn act(&mut self, state: &[f32]) -> Result<usize> {
        let epsilon = self.algorithm()?.epsilon();
        if self.rng.gen::<f64>() < epsilon {
            let size = self.algorithm()?.action_size().max(1);
            return Ok(self.rng.gen_range(0..size));
        }
        self.predict(state)
    }

    /// Greedy action for a state
    pub fn predict(&self, state: &[f32]) -> Result<usize> {
        self.algorithm()?.predict(state)
    }

    /// Train on a sampled batch of collected experiences
    pub fn train(&mut self) -> Result<f64> {
        if self.experience_buffer.len() < self.training_batch_size {
            return Ok(0.0);
        }

        let batch = self
            .experience_buffer
            .sample(self.training_batch_size, &mut self.rng);

        let interval = self.target_update_interval;
        let algorithm = self.algorithm_mut()?;
        let loss = algorithm.train(&batch)?;
        self.train_steps += 1;

        if interval > 0 && self.train_steps % interval == 0 {
            self.algorithm_mut()?.sync_target()?;
            debug!(step = self.train_steps, "Target network synced");
        }

        debug!("Training step complete, loss: {:.4}", loss);

        Ok(loss)
    }

    /// Update after receiving reward
    pub fn update_reward(&mut self, reward: Reward) -> Result<()> {
        self.total_rewards += reward;
        self.algorithm_mut()?.update(reward)
    }

    pub fn decay_epsilon(&mut self) -> Result<()> {
        self.algorithm_mut()?.decay_epsilon();
        Ok(())
    }

    pub fn sync_target(&mut self) -> Result<()> {
        self.algorithm_mut()?.sync_target()
    }

    /// Get statistics
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            total_steps: self.total_steps,
            total_rewards: self.total_rewards,
            average_reward: if self.total_steps > 0 {
                self.total_rewards / self.total_steps as f64
            } else {
                0.0
            },
            buffer_size: self.experience_buffer.len(),
            active_algorithm: self.active_algorithm.clone(),
            train_steps: self.train_steps,
            epsilon: self.algorithm().map_or(0.0, |a| a.epsilon()),
        }
    }

    /// Get algorithm parameters
    pub fn get_algorithm_params(&self) -> Value {
        self.algorithm().map_or(Value::Null, |alg| alg.get_params())
    }

    /// Set algorithm parameters
    pub fn set_algorithm_params(&mut self, params: Value) -> Result<()> {
        self.algorithm_mut()?.set_params(params)
    }

    /// Clear experience buffer
    pub fn clear_buffer(&mut self) {
        self.experience_buffer.clear();
    }

    /// Write the active algorithm as `{"algorithm": name, "model": ...}`
    pub fn save_model(&self, path: &Path) -> Result<()> {
        save_algorithm(self.algorithm()?, path)
    }

    /// Load a saved model into its registered algorithm and activate it
    pub fn load_model(&mut self, path: &Path) -> Result<()> {
        let (name, model) = read_model_file(path)?;
        let algorithm = self
            .algorithms
            .get_mut(&name)
            .ok_or_else(|| anyhow!("Unknown algorithm in model file: {}", name))?;
        algorithm.load_json(model)?;
        self.active_algorithm = name;
        info!(path = %path.display(), algorithm = %self.active_algorithm, "Model loaded");
        Ok(())
    }
}

/// Write any algorithm in the format `load_algorithm` reads
pub fn save_algorithm(algorithm: &dyn RLAlgorithm, path: &Path) -> Result<()> {
    let doc = serde_json::json!({
        "algorithm": algorithm.name(),
        "model": algorithm.to_json()?,
    });
    fs::write(path, serde_json::to_string(&doc)?)
        .with_context(|| format!("writing model to {}", path.display()))?;
    info!(path = %path.display(), algorithm = algorithm.name(), "Model saved");
    Ok(())
}

fn read_model_file(path: &Path) -> Result<(String, Value)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading model from {}", path.display()))?;
    let mut doc: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing model in {}", path.display()))?;
    let name = doc["algorithm"]
        .as_str()
        .ok_or_else(|| anyhow!("model file {} has no algorithm name", path.display()))?
        .to_string();
    Ok((name, doc["model"].take()))
}

/// Load a model file written by `RLEngine::save_model` without an engine
pub fn load_algorithm(path: &Path) -> Result<Box<dyn RLAlgorithm>> {
    let (name, model) = read_model_file(path)?;
    match name.as_str() {
        "q_learning" => Ok(Box::new(QLearning::from_json(model)?)),
        "dqn" => Ok(Box::new(Dqn::from_json(model)?)),
        other => Err(anyhow!("Unknown algorithm in model file: {}", other)),
    }
}

/// Engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_steps: u64,
    pub total_rewards: f64,
    pub average_reward: f64,
    pub buffer_size: usize,
    pub active_algorithm: String,
    pub train_steps: u64,
    pub epsilon: f64,
}
