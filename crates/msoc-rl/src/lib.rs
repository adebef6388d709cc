//! MicroSociety RL - learning agents for NPC behaviour
//!
//! This crate provides the trainable action space, the replay buffer,
//! a tabular Q-learner, a small dense-network DQN, and the training and
//! validation drivers that run them against `msoc-core` environments.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::float_cmp)]
#![allow(clippy::similar_names)]

pub mod algorithm;
pub mod engine;
pub mod experience;
pub mod network;
pub mod scaler;
pub mod state;
pub mod training;
pub mod validation;

pub use algorithm::{Dqn, DqnConfig, QLearning, QLearningConfig, RLAlgorithm};
pub use engine::{load_algorithm, save_algorithm, EngineConfig, EngineStats, RLEngine};
pub use experience::{Experience, ExperienceBuffer};
pub use network::Mlp;
pub use scaler::StandardScaler;
pub use state::{Action, Reward};
pub use training::{
    EpisodeStats, OfflineConfig, OfflineResult, OfflineTrainer, OnlineTrainer, TrainingConfig,
    TrainingMetadata, TrainingSummary,
};
pub use validation::{compare_models, ModelValidator, ValidationReport};
