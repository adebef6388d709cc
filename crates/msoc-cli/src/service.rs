//! Shared RL engine for concurrent world simulations
//!
//! Several worlds act through and learn into one engine, so access goes
//! through async locks.

use std::path::Path;

use anyhow::Result;
use msoc_rl::{EngineConfig, Experience, RLEngine};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// RL service wrapping the engine with async support
pub struct RLService {
    engine: RwLock<RLEngine>,
    train_interval: usize,
    experience_count: RwLock<usize>,
    last_training_loss: RwLock<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RLStats {
    pub algorithm: String,
    pub total_steps: u64,
    pub total_rewards: f64,
    pub average_reward: f64,
    pub buffer_size: usize,
    pub train_steps: u64,
    pub epsilon: f64,
    pub last_training_loss: f64,
    pub experience_count: usize,
}

impl RLService {
    pub fn new(config: EngineConfig, algorithm: &str, train_interval: usize) -> Result<Self> {
        let mut engine = RLEngine::new(config)?;
        engine.set_algorithm(algorithm)?;

        info!(
            "RL service initialized with algorithm: {}",
            engine.active_algorithm()
        );

        Ok(Self {
            engine: RwLock::new(engine),
            train_interval: train_interval.max(1),
            experience_count: RwLock::new(0),
            last_training_loss: RwLock::new(0.0),
        })
    }

    /// Epsilon-greedy action for a feature vector
    pub async fn act(&self, state: &[f32]) -> Result<usize> {
        let mut engine = self.engine.write().await;
        engine.act(state)
    }

    /// Record an experience and train every `train_interval` records
    pub async fn record_experience(&self, experience: Experience) -> Result<()> {
        {
            let mut engine = self.engine.write().await;
            let reward = experience.reward;
            engine.record_experience(experience);
            if let Err(e) = engine.update_reward(reward) {
                warn!("Failed to update reward: {}", e);
            }
        }

        let count = {
            let mut count = self.experience_count.write().await;
            *count += 1;
            *count
        };

        if count % self.train_interval == 0 {
            self.train().await?;
        }
        Ok(())
    }

    pub async fn train(&self) -> Result<f64> {
        let mut engine = self.engine.write().await;
        let loss = engine.train()?;

        if loss > 0.0 {
            *self.last_training_loss.write().await = loss;
            debug!("Training complete, loss: {:.4}", loss);
        }
        Ok(loss)
    }

    pub async fn stats(&self) -> RLStats {
        let engine = self.engine.read().await;
        let stats = engine.stats();

        RLStats {
            algorithm: stats.active_algorithm,
            total_steps: stats.total_steps,
            total_rewards: stats.total_rewards,
            average_reward: stats.average_reward,
            buffer_size: stats.buffer_size,
            train_steps: stats.train_steps,
            epsilon: stats.epsilon,
            last_training_loss: *self.last_training_loss.read().await,
            experience_count: *self.experience_count.read().await,
        }
    }

    pub async fn save_model(&self, path: &Path) -> Result<()> {
        self.engine.read().await.save_model(path)
    }

    pub async fn load_model(&self, path: &Path) -> Result<()> {
        self.engine.write().await.load_model(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn create_test_service() -> RLService {
        let config = EngineConfig {
            batch_size: 4,
            ..EngineConfig::default()
        };
        RLService::new(config, "q_learning", 2).unwrap()
    }

    fn create_test_experience(reward: f64) -> Experience {
        Experience::new(vec![1.0; 7], 2, reward, vec![2.0; 7], false)
    }

    #[tokio::test]
    async fn test_unknown_algorithm_is_rejected() {
        assert!(RLService::new(EngineConfig::default(), "ppo", 10).is_err());
        let service = RLService::new(EngineConfig::default(), "dqn", 10).unwrap();
        assert_eq!(service.stats().await.algorithm, "dqn");
    }

    #[tokio::test]
    async fn test_record_trains_on_interval() {
        let service = create_test_service();
        for i in 0..6 {
            service.record_experience(create_test_experience(f64::from(i))).await.unwrap();
        }
        let stats = service.stats().await;
        assert_eq!(stats.experience_count, 6);
        assert_eq!(stats.buffer_size, 6);
        assert_eq!(stats.total_rewards, 15.0);
        // trains at counts 2, 4, 6; only the last two have a full batch
        assert_eq!(stats.train_steps, 2);
        assert!(stats.last_training_loss > 0.0);
    }

    #[tokio::test]
    async fn test_concurrent_recording() {
        let service = Arc::new(create_test_service());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let action = service.act(&[0.0; 7]).await.unwrap();
                    assert!(action < 11);
                    service.record_experience(create_test_experience(1.0)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(service.stats().await.experience_count, 20);
    }

    #[tokio::test]
    async fn test_save_and_load_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let service = create_test_service();
        service.save_model(&path).await.unwrap();
        service.load_model(&path).await.unwrap();
        assert!(path.exists());
    }
}
