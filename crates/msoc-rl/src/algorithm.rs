//! RL Algorithm trait and implementations

use std::collections::HashMap;

use anyhow::{bail, ensure, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::experience::Experience;
use crate::network::{to_matrix, Mlp};
use crate::scaler::StandardScaler;
use crate::state::{Action, Reward};

/// Index of the first maximum; 0 for an empty slice
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Trait for RL algorithms
pub trait RLAlgorithm: Send + Sync {
    /// Algorithm name
    fn name(&self) -> &str;

    /// Train on a batch of experiences, returning the batch loss
    fn train(&mut self, experiences: &[Experience]) -> Result<f64>;

    /// Action values for a feature vector
    fn q_values(&self, state: &[f32]) -> Result<Vec<f64>>;

    /// Greedy action index for a feature vector
    fn predict(&self, state: &[f32]) -> Result<usize> {
        Ok(argmax(&self.q_values(state)?))
    }

    /// Per-step hook after receiving reward
    fn update(&mut self, reward: Reward) -> Result<()>;

    fn epsilon(&self) -> f64;

    fn set_epsilon(&mut self, epsilon: f64);

    /// Apply one multiplicative epsilon decay, respecting the floor
    fn decay_epsilon(&mut self);

    /// Copy online weights into the bootstrap network, if there is one
    fn sync_target(&mut self) -> Result<()> {
        Ok(())
    }

    fn action_size(&self) -> usize;

    /// Get algorithm parameters as JSON
    fn get_params(&self) -> Value;

    /// Set algorithm parameters from JSON
    fn set_params(&mut self, params: Value) -> Result<()>;

    /// Full learned state as JSON
    fn to_json(&self) -> Result<Value>;

    /// Replace the learned state from `to_json` output
    fn load_json(&mut self, value: Value) -> Result<()>;
}

fn decayed(epsilon: f64, decay: f64, floor: f64) -> f64 {
    if epsilon > floor {
        (epsilon * decay).max(floor)
    } else {
        epsilon
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub epsilon: f64,
    /// 1.0 keeps epsilon fixed
    pub epsilon_decay: f64,
    pub epsilon_min: f64,
    /// Step-size multiplier for negative rewards
    pub negative_reward_scale: f64,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.9,
            epsilon: 0.1,
            epsilon_decay: 1.0,
            epsilon_min: 0.01,
            negative_reward_scale: 1.25,
        }
    }
}

/// Q-Learning implementation (tabular)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QLearning {
    config: QLearningConfig,
    q_table: HashMap<String, Vec<f64>>,
    epsilon: f64,
    action_space_size: usize,
}

impl QLearning {
    pub fn new(config: QLearningConfig) -> Self {
        Self::with_actions(config, Action::action_space_size())
    }

    /// Table over a custom discrete action space
    pub fn with_actions(config: QLearningConfig, action_space_size: usize) -> Self {
        Self {
            epsilon: config.epsilon,
            config,
            q_table: HashMap::new(),
            action_space_size: action_space_size.max(1),
        }
    }

    /// Features are rounded to integers, so discrete observations key exactly
    fn state_key(state: &[f32]) -> String {
        state
            .iter()
            .map(|v| (v.round() as i32).to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn row(&self, state: &[f32]) -> Vec<f64> {
        self.q_table
            .get(&Self::state_key(state))
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.action_space_size])
    }

    pub fn table_size(&self) -> usize {
        self.q_table.len()
    }

    /// Rebuild from `to_json` output; every row must span the action space
    pub fn from_json(value: Value) -> Result<Self> {
        let loaded: QLearning = serde_json::from_value(value)?;
        ensure!(loaded.action_space_size > 0, "q-table has no actions");
        if let Some((state, row)) = loaded
            .q_table
            .iter()
            .find(|(_, row)| row.len() != loaded.action_space_size)
        {
            bail!(
                "q-table row for state [{}] has {} values, expected {}",
                state,
                row.len(),
                loaded.action_space_size
            );
        }
        Ok(loaded)
    }

    pub fn config(&self) -> &QLearningConfig {
        &self.config
    }
}

impl RLAlgorithm for QLearning {
    fn name(&self) -> &str {
        "q_learning"
    }

    fn train(&mut self, experiences: &[Experience]) -> Result<f64> {
        if experiences.is_empty() {
            return Ok(0.0);
        }
        let mut total_loss = 0.0;

        for exp in experiences {
            ensure!(
                exp.action < self.action_space_size,
                "action index {} out of range",
                exp.action
            );

            let current_q = self.row(&exp.state)[exp.action];
            let target = if exp.done {
                exp.reward
            } else {
                let max_next_q = if exp.next_state.is_empty() {
                    0.0
                } else {
                    let next_q = self.row(&exp.next_state);
                    next_q[argmax(&next_q)]
                };
                exp.reward + self.config.discount_factor * max_next_q
            };

            let td_error = target - current_q;
            let scale = if exp.reward < 0.0 {
                self.config.negative_reward_scale
            } else {
                1.0
            };

            let size = self.action_space_size;
            let q_values = self
                .q_table
                .entry(Self::state_key(&exp.state))
                .or_insert_with(|| vec![0.0; size]);
            q_values[exp.action] = current_q + self.config.learning_rate * scale * td_error;

            total_loss += td_error.powi(2);
        }

        Ok(total_loss / experiences.len() as f64)
    }

    fn q_values(&self, state: &[f32]) -> Result<Vec<f64>> {
        Ok(self.row(state))
    }

    fn update(&mut self, _reward: Reward) -> Result<()> {
        self.decay_epsilon();
        Ok(())
    }

    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    fn decay_epsilon(&mut self) {
        self.epsilon = decayed(
            self.epsilon,
            self.config.epsilon_decay,
            self.config.epsilon_min,
        );
    }

    fn action_size(&self) -> usize {
        self.action_space_size
    }

    fn get_params(&self) -> Value {
        serde_json::json!({
            "learning_rate": self.config.learning_rate,
            "discount_factor": self.config.discount_factor,
            "epsilon": self.epsilon,
            "epsilon_decay": self.config.epsilon_decay,
            "epsilon_min": self.config.epsilon_min,
            "q_table_size": self.q_table.len()
        })
    }

    fn set_params(&mut self, params: Value) -> Result<()> {
        if let Some(lr) = params["learning_rate"].as_f64() {
            self.config.learning_rate = lr;
        }
        if let Some(df) = params["discount_factor"].as_f64() {
            self.config.discount_factor = df;
        }
        if let Some(eps) = params["epsilon"].as_f64() {
            self.set_epsilon(eps);
        }
        if let Some(decay) = params["epsilon_decay"].as_f64() {
            self.config.epsilon_decay = decay;
        }
        if let Some(min) = params["epsilon_min"].as_f64() {
            self.config.epsilon_min = min;
        }
        Ok(())
    }

    fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn load_json(&mut self, value: Value) -> Result<()> {
        *self = Self::from_json(value)?;
        Ok(())
    }
}

impl Default for QLearning {
    fn default() -> Self {
        Self::new(QLearningConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    pub hidden_layers: Vec<usize>,
    /// Dropout after each hidden layer, by position
    pub dropout: Vec<f32>,
    pub learning_rate: f32,
    pub gamma: f64,
    pub epsilon: f64,
    pub epsilon_min: f64,
    pub epsilon_decay: f64,
    pub batch_size: usize,
    pub memory_size: usize,
    pub seed: u64,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![128, 128, 64],
            dropout: vec![0.2, 0.2],
            learning_rate: 1e-3,
            gamma: 0.99,
            epsilon: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            batch_size: 64,
            memory_size: 10_000,
            seed: 0,
        }
    }
}

/// Deep Q-network with a separate bootstrap (target) network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dqn {
    config: DqnConfig,
    state_size: usize,
    action_size: usize,
    online: Mlp,
    target: Mlp,
    /// Applied to every state before it reaches either network
    scaler: Option<StandardScaler>,
    epsilon: f64,
    train_steps: u64,
}

impl Dqn {
    pub fn new(state_size: usize, action_size: usize, config: DqnConfig) -> Result<Self> {
        let mut sizes = vec![state_size];
        sizes.extend(&config.hidden_layers);
        sizes.push(action_size);
        let online = Mlp::new(&sizes, &config.dropout, config.learning_rate, config.seed)?;
        let target = online.clone();

        Ok(Self {
            epsilon: config.epsilon,
            config,
            state_size,
            action_size,
            online,
            target,
            scaler: None,
            train_steps: 0,
        })
    }

    pub fn with_scaler(mut self, scaler: StandardScaler) -> Result<Self> {
        self.set_scaler(scaler)?;
        Ok(self)
    }

    pub fn set_scaler(&mut self, scaler: StandardScaler) -> Result<()> {
        ensure!(
            scaler.width() == self.state_size,
            "scaler width {} does not match state size {}",
            scaler.width(),
            self.state_size
        );
        self.scaler = Some(scaler);
        Ok(())
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    pub fn train_steps(&self) -> u64 {
        self.train_steps
    }

    /// Rebuild from `to_json` output, checking both networks and the scaler
    /// against the declared sizes
    pub fn from_json(value: Value) -> Result<Self> {
        let loaded: Dqn = serde_json::from_value(value)?;
        loaded.online.check_shapes()?;
        loaded.target.check_shapes()?;
        ensure!(
            loaded.online.input_size() == loaded.state_size
                && loaded.online.output_size() == loaded.action_size,
            "network shape does not match declared state/action sizes"
        );
        ensure!(
            loaded.target.sizes() == loaded.online.sizes(),
            "target network shape {:?} differs from online {:?}",
            loaded.target.sizes(),
            loaded.online.sizes()
        );
        if let Some(scaler) = &loaded.scaler {
            ensure!(
                scaler.width() == loaded.state_size,
                "scaler width {} does not match state size {}",
                scaler.width(),
                loaded.state_size
            );
        }
        Ok(loaded)
    }

    fn prepare(&self, state: &[f32]) -> Result<Vec<f32>> {
        if state.len() != self.state_size {
            bail!(
                "state has {} features, model expects {}",
                state.len(),
                self.state_size
            );
        }
        match &self.scaler {
            Some(scaler) => scaler.transform(state),
            None => Ok(state.to_vec()),
        }
    }

    /// Values from the bootstrap network
    pub fn target_q_values(&self, state: &[f32]) -> Result<Vec<f64>> {
        let input = self.prepare(state)?;
        Ok(self
            .target
            .predict(&input)?
            .into_iter()
            .map(f64::from)
            .collect())
    }

    fn batch(&self, rows: &[&[f32]]) -> Result<Array2<f32>> {
        let prepared = rows
            .iter()
            .map(|r| self.prepare(r))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&[f32]> = prepared.iter().map(Vec::as_slice).collect();
        to_matrix(&refs, self.state_size)
    }
}

impl RLAlgorithm for Dqn {
    fn name(&self) -> &str {
        "dqn"
    }

    fn train(&mut self, experiences: &[Experience]) -> Result<f64> {
        if experiences.is_empty() {
            return Ok(0.0);
        }
        for exp in experiences {
            ensure!(
                exp.action < self.action_size,
                "action index {} out of range",
                exp.action
            );
        }

        let states: Vec<&[f32]> = experiences.iter().map(|e| e.state.as_slice()).collect();
        let inputs = self.batch(&states)?;
        let mut targets = self.online.forward(&inputs)?;

        // terminal rows and rows without a successor bootstrap from zero
        let bootstrap: Vec<usize> = experiences
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.done && !e.next_state.is_empty())
            .map(|(i, _)| i)
            .collect();
        let next_rows: Vec<&[f32]> = bootstrap
            .iter()
            .map(|&i| experiences[i].next_state.as_slice())
            .collect();
        let mut max_next = vec![0.0f64; experiences.len()];
        if !next_rows.is_empty() {
            let next_q = self.target.forward(&self.batch(&next_rows)?)?;
            for (row, &i) in bootstrap.iter().enumerate() {
                let values: Vec<f64> = next_q.row(row).iter().map(|v| f64::from(*v)).collect();
                max_next[i] = values[argmax(&values)];
            }
        }

        for (i, exp) in experiences.iter().enumerate() {
            let target = exp.reward + self.config.gamma * max_next[i];
            targets[[i, exp.action]] = target as f32;
        }

        let loss = self.online.train_batch(&inputs, &targets)?;
        self.train_steps += 1;
        Ok(f64::from(loss))
    }

    fn q_values(&self, state: &[f32]) -> Result<Vec<f64>> {
        let input = self.prepare(state)?;
        Ok(self
            .online
            .predict(&input)?
            .into_iter()
            .map(f64::from)
            .collect())
    }

    fn update(&mut self, _reward: Reward) -> Result<()> {
        Ok(())
    }

    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    fn decay_epsilon(&mut self) {
        self.epsilon = decayed(
            self.epsilon,
            self.config.epsilon_decay,
            self.config.epsilon_min,
        );
    }

    fn sync_target(&mut self) -> Result<()> {
        self.target.copy_weights_from(&self.online)
    }

    fn action_size(&self) -> usize {
        self.action_size
    }

    fn get_params(&self) -> Value {
        serde_json::json!({
            "state_size": self.state_size,
            "action_size": self.action_size,
            "hidden_layers": self.config.hidden_layers,
            "learning_rate": self.config.learning_rate,
            "gamma": self.config.gamma,
            "epsilon": self.epsilon,
            "epsilon_min": self.config.epsilon_min,
            "epsilon_decay": self.config.epsilon_decay,
            "batch_size": self.config.batch_size,
            "train_steps": self.train_steps,
            "scaled": self.scaler.is_some()
        })
    }

    fn set_params(&mut self, params: Value) -> Result<()> {
        if let Some(lr) = params["learning_rate"].as_f64() {
            self.config.learning_rate = lr as f32;
            self.online.set_learning_rate(lr as f32);
        }
        if let Some(gamma) = params["gamma"].as_f64() {
            self.config.gamma = gamma;
        }
        if let Some(eps) = params["epsilon"].as_f64() {
            self.set_epsilon(eps);
        }
        if let Some(min) = params["epsilon_min"].as_f64() {
            self.config.epsilon_min = min;
        }
        if let Some(decay) = params["epsilon_decay"].as_f64() {
            self.config.epsilon_decay = decay;
        }
        Ok(())
    }

    fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn load_json(&mut self, value: Value) -> Result<()> {
        *self = Self::from_json(value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_dqn(state_size: usize) -> Dqn {
        let config = DqnConfig {
            hidden_layers: vec![16, 16],
            dropout: Vec::new(),
            learning_rate: 1e-2,
            seed: 11,
            ..DqnConfig::default()
        };
        Dqn::new(state_size, 4, config).unwrap()
    }

    #[test]
    fn test_argmax_prefers_first() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(argmax(&[]), 0);
        assert_eq!(argmax(&[-5.0]), 0);
    }

    #[test]
    fn test_q_learning_update_rule() {
        let mut q = QLearning::default();
        let exp = Experience::new(vec![1.0, 2.0], 3, 10.0, vec![2.0, 2.0], false);
        let loss = q.train(&[exp]).unwrap();
        assert!((loss - 100.0).abs() < 1e-9);
        assert!((q.q_values(&[1.0, 2.0]).unwrap()[3] - 1.0).abs() < 1e-9);
        assert_eq!(q.predict(&[1.0, 2.0]).unwrap(), 3);
        // rounding shares keys between nearby observations
        assert_eq!(q.predict(&[1.2, 1.9]).unwrap(), 3);
    }

    #[test]
    fn test_q_learning_negative_reward_scaled() {
        let mut q = QLearning::default();
        let exp = Experience::new(vec![0.0], 0, -10.0, Vec::new(), false);
        q.train(&[exp]).unwrap();
        assert!((q.q_values(&[0.0]).unwrap()[0] + 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_q_learning_bootstraps_from_next_state() {
        let mut q = QLearning::default();
        q.train(&[Experience::new(vec![5.0], 1, 10.0, Vec::new(), true)])
            .unwrap();
        // Q(5)[1] = 1.0; now learn s=4 -> s'=5
        q.train(&[Experience::new(vec![4.0], 0, 0.0, vec![5.0], false)])
            .unwrap();
        assert!((q.q_values(&[4.0]).unwrap()[0] - 0.09).abs() < 1e-9);
        assert_eq!(q.table_size(), 2);
    }

    #[test]
    fn test_q_learning_params_and_epsilon() {
        let mut q = QLearning::new(QLearningConfig {
            epsilon: 0.5,
            epsilon_decay: 0.5,
            ..QLearningConfig::default()
        });
        q.update(1.0).unwrap();
        assert!((q.epsilon() - 0.25).abs() < 1e-12);
        for _ in 0..20 {
            q.decay_epsilon();
        }
        assert!((q.epsilon() - 0.01).abs() < 1e-12);

        q.set_params(serde_json::json!({"learning_rate": 0.5, "epsilon": 0.3}))
            .unwrap();
        let params = q.get_params();
        assert_eq!(params["learning_rate"], 0.5);
        assert_eq!(params["epsilon"], 0.3);
        assert!(q.train(&[Experience::new(vec![0.0], 42, 1.0, Vec::new(), true)]).is_err());
    }

    #[test]
    fn test_q_learning_json_roundtrip() {
        let mut q = QLearning::default();
        q.train(&[Experience::new(vec![1.0], 2, 3.0, Vec::new(), true)])
            .unwrap();
        let mut restored = QLearning::default();
        restored.load_json(q.to_json().unwrap()).unwrap();
        assert_eq!(restored.q_values(&[1.0]).unwrap(), q.q_values(&[1.0]).unwrap());
    }

    #[test]
    fn test_q_learning_rejects_short_rows() {
        let mut q = QLearning::default();
        q.train(&[Experience::new(vec![1.0], 2, 3.0, Vec::new(), true)])
            .unwrap();
        let mut value = q.to_json().unwrap();
        value["q_table"]["1"] = serde_json::json!([0.0]);

        assert!(QLearning::from_json(value.clone()).is_err());
        let mut restored = QLearning::default();
        assert!(restored.load_json(value).is_err());
        assert_eq!(restored.table_size(), 0);
    }

    #[test]
    fn test_dqn_from_json_checks_shapes() {
        let dqn = create_test_dqn(2);
        assert!(Dqn::from_json(dqn.to_json().unwrap()).is_ok());

        let mut bad_size = dqn.to_json().unwrap();
        bad_size["action_size"] = serde_json::json!(7);
        assert!(Dqn::from_json(bad_size).is_err());

        let mut bad_target = dqn.to_json().unwrap();
        bad_target["target"] = serde_json::to_value(&create_test_dqn(3).target).unwrap();
        assert!(Dqn::from_json(bad_target).is_err());

        let mut bad_scaler = dqn.to_json().unwrap();
        bad_scaler["scaler"] =
            serde_json::to_value(StandardScaler::fit(&[vec![1.0f32, 2.0, 3.0]]).unwrap())
                .unwrap();
        assert!(Dqn::from_json(bad_scaler).is_err());
    }

    #[test]
    fn test_dqn_shapes_and_mismatch() {
        let dqn = create_test_dqn(3);
        assert_eq!(dqn.name(), "dqn");
        assert_eq!(dqn.q_values(&[0.0, 1.0, 2.0]).unwrap().len(), 4);
        assert!(dqn.q_values(&[0.0, 1.0]).is_err());
        assert_eq!(dqn.epsilon(), 1.0);
    }

    #[test]
    fn test_dqn_learns_terminal_reward() {
        let mut dqn = create_test_dqn(2);
        let batch = vec![Experience::new(vec![1.0, 0.5], 2, 5.0, vec![0.0, 0.0], true)];
        for _ in 0..300 {
            dqn.train(&batch).unwrap();
        }
        let q = dqn.q_values(&[1.0, 0.5]).unwrap();
        assert!((q[2] - 5.0).abs() < 0.5, "q = {q:?}");
        assert_eq!(dqn.train_steps(), 300);
    }

    #[test]
    fn test_dqn_target_sync() {
        let mut dqn = create_test_dqn(2);
        let state = [0.3, -0.7];
        assert_eq!(dqn.q_values(&state).unwrap(), dqn.target_q_values(&state).unwrap());

        let batch = vec![Experience::new(state.to_vec(), 0, 1.0, state.to_vec(), false)];
        for _ in 0..10 {
            dqn.train(&batch).unwrap();
        }
        assert_ne!(dqn.q_values(&state).unwrap(), dqn.target_q_values(&state).unwrap());

        dqn.sync_target().unwrap();
        assert_eq!(dqn.q_values(&state).unwrap(), dqn.target_q_values(&state).unwrap());
    }

    #[test]
    fn test_dqn_epsilon_decay_floor() {
        let mut dqn = create_test_dqn(2);
        dqn.decay_epsilon();
        assert!((dqn.epsilon() - 0.995).abs() < 1e-12);
        for _ in 0..2000 {
            dqn.decay_epsilon();
        }
        assert!((dqn.epsilon() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_dqn_scaler_and_json() {
        let scaler = StandardScaler::fit(&[vec![0.0f32, 10.0], vec![2.0, 30.0]]).unwrap();
        let dqn = create_test_dqn(2).with_scaler(scaler).unwrap();
        assert!(create_test_dqn(3)
            .with_scaler(StandardScaler::fit(&[vec![1.0f32]]).unwrap())
            .is_err());

        let mut restored = create_test_dqn(2);
        restored.load_json(dqn.to_json().unwrap()).unwrap();
        assert!(restored.scaler().is_some());
        let x = [1.0, 20.0];
        assert_eq!(restored.q_values(&x).unwrap(), dqn.q_values(&x).unwrap());
    }
}
