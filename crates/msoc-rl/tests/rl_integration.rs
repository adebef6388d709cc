//! Integration tests for the RL pipeline
//!
//! These tests drive the engine, trainers and validator against real
//! environments from `msoc-core`.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::float_cmp)]

use msoc_core::env::{EconomyEnv, SocietyEnv};
use msoc_core::{Environment, SimulationConfig, WorldConfig};
use msoc_rl::{
    compare_models, load_algorithm, DqnConfig, EngineConfig, Experience, ModelValidator,
    OfflineConfig, OfflineTrainer, OnlineTrainer, RLAlgorithm, RLEngine, TrainingConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn small_world() -> WorldConfig {
    WorldConfig {
        map_width: 10,
        map_height: 10,
        npc_count: 3,
        ..WorldConfig::default()
    }
}

fn small_dqn() -> DqnConfig {
    DqnConfig {
        hidden_layers: vec![32, 16],
        dropout: vec![0.2],
        batch_size: 16,
        ..DqnConfig::default()
    }
}

/// Random-policy rollouts recorded as experiences
fn collect_society_experiences(steps: usize, seed: u64) -> Vec<Experience> {
    let mut env = SocietyEnv::new(small_world(), SimulationConfig::default(), seed)
        .unwrap()
        .with_max_steps(50);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut observation = env.reset();
    let mut out = Vec::with_capacity(steps);
    while out.len() < steps {
        let action = rng.gen_range(0..env.action_size());
        let t = env.step(action).unwrap();
        out.push(Experience::new(
            observation,
            action,
            t.reward,
            t.observation.clone(),
            t.done,
        ));
        observation = if t.is_terminal() {
            env.reset()
        } else {
            t.observation
        };
    }
    out
}

#[test]
fn test_q_learning_finds_rewarding_action() {
    let mut engine = RLEngine::new(EngineConfig {
        state_size: 1,
        batch_size: 8,
        ..EngineConfig::default()
    })
    .unwrap();
    engine
        .set_algorithm_params(serde_json::json!({"epsilon": 1.0}))
        .unwrap();

    for _ in 0..500 {
        let action = engine.act(&[0.0]).unwrap();
        let reward = if action == 3 { 1.0 } else { 0.0 };
        engine.record_experience(Experience::new(vec![0.0], action, reward, Vec::new(), true));
        engine.update_reward(reward).unwrap();
        engine.train().unwrap();
    }

    assert_eq!(engine.predict(&[0.0]).unwrap(), 3);
    let stats = engine.stats();
    assert_eq!(stats.total_steps, 500);
    assert!(stats.train_steps > 400);
}

#[test]
fn test_online_training_in_society() {
    let mut engine = RLEngine::new(EngineConfig {
        batch_size: 16,
        dqn: small_dqn(),
        ..EngineConfig::default()
    })
    .unwrap();
    engine.set_algorithm("dqn").unwrap();

    let mut env = SocietyEnv::new(small_world(), SimulationConfig::default(), 5)
        .unwrap()
        .with_max_steps(40);
    let summary = OnlineTrainer::new(TrainingConfig {
        episodes: 4,
        target_sync_episodes: 2,
        ..TrainingConfig::default()
    })
    .run(&mut engine, &mut env)
    .unwrap();

    assert_eq!(summary.algorithm, "dqn");
    assert_eq!(summary.episodes.len(), 4);
    assert!(summary.episodes.iter().all(|e| e.steps <= 40));
    assert!(summary.final_epsilon < 1.0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("society_dqn.json");
    engine.save_model(&path).unwrap();
    let model = load_algorithm(&path).unwrap();
    let obs = env.reset();
    assert_eq!(
        model.q_values(&obs).unwrap(),
        engine.algorithm().unwrap().q_values(&obs).unwrap()
    );
}

#[test]
fn test_offline_training_then_validation() {
    let data = collect_society_experiences(300, 9);
    let result = OfflineTrainer::new(
        OfflineConfig {
            epochs: 20,
            samples_per_epoch: 100,
            log_interval: 5,
            ..OfflineConfig::default()
        },
        small_dqn(),
    )
    .train(&data, "society.json")
    .unwrap();

    assert_eq!(result.metadata.training_samples, 240);
    assert_eq!(result.metadata.validation_samples, 60);
    assert_eq!(result.metadata.state_size, 7);
    assert_eq!(result.losses.len(), 20);
    assert!(result.losses.iter().all(|l| l.is_finite()));

    let mut validator = ModelValidator::new(&result.model, &data);
    let report = validator.full_report(100).unwrap();
    assert_eq!(report.samples, 300);
    assert!((0.0..=1.0).contains(&report.actions.accuracy));
    assert_eq!(report.actions.confusion.len(), 11);
    assert_eq!(report.q_values.samples, 100);
    assert_eq!(report.states.len(), 7);
    assert_eq!(report.states[0].name, "PosX");
    assert!(report.q_value_error.is_finite());

    let total: usize = report.rewards.iter().map(|r| r.count).sum();
    assert_eq!(total, 300);
}

#[test]
fn test_compare_and_evaluate() {
    let data = collect_society_experiences(120, 4);
    let trained = OfflineTrainer::new(
        OfflineConfig {
            epochs: 5,
            ..OfflineConfig::default()
        },
        small_dqn(),
    )
    .train(&data, "society.json")
    .unwrap()
    .model;
    let blank = msoc_rl::QLearning::default();

    let ranked = compare_models(
        &[
            ("dqn".to_string(), &trained as &dyn RLAlgorithm),
            ("blank".to_string(), &blank as &dyn RLAlgorithm),
        ],
        &data,
    );
    assert_eq!(ranked.len(), 2);
    assert!(ranked[0].1 >= ranked[1].1);

    let policy = msoc_rl::QLearning::with_actions(Default::default(), 4);
    let mut env = EconomyEnv::new(3).with_max_steps(25);
    let report = ModelValidator::new(&policy, &data)
        .evaluate_policy(&mut env, 2, 0.2)
        .unwrap();
    assert_eq!(report.rewards.len(), 2);
}
