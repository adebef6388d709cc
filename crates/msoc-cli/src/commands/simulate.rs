//! Run society worlds side by side
//!
//! Each world steps on its own blocking thread. They share one RL service
//! and one data collector through async locks.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use msoc_core::{ActionType, State, World};
use msoc_data::DataCollector;
use msoc_rl::{Action, Experience};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::service::RLService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Policy {
    /// Hand-written survival rules
    Rule,
    /// Shared online Q-learning engine
    QLearning,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Ticks to run each world for
    #[arg(long, default_value_t = 1000)]
    pub ticks: usize,

    /// Seed of the first world; world i uses seed + i
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of worlds to run concurrently
    #[arg(long, default_value_t = 1)]
    pub worlds: usize,

    /// Seconds of simulated time per tick
    #[arg(long, default_value_t = 1.0)]
    pub dt: f32,

    #[arg(long, value_enum, default_value_t = Policy::Rule)]
    pub policy: Policy,

    /// Record every NPC transition to the data directory
    #[arg(long)]
    pub collect: bool,

    /// Model to load into the RL engine before running
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Where to save the RL engine's model afterwards
    #[arg(long)]
    pub save_model: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorldSummary {
    pub world: usize,
    pub seed: u64,
    pub npcs: usize,
    pub alive: usize,
    pub actions: usize,
    pub total_reward: f64,
    pub total_money: f64,
    pub earned: f64,
    pub spent: f64,
    pub day: u32,
    pub time: String,
}

struct WorldJob {
    index: usize,
    seed: u64,
    ticks: usize,
    dt: f32,
    policy: Policy,
    config: AppConfig,
    service: Arc<RLService>,
    collector: Option<Arc<Mutex<DataCollector>>>,
    handle: Handle,
}

pub async fn run(args: SimulateArgs, config: AppConfig) -> Result<()> {
    let service = Arc::new(RLService::new(
        config.rl.engine.clone(),
        &config.rl.algorithm,
        config.rl.train_interval,
    )?);
    if let Some(path) = &args.model {
        service.load_model(path).await?;
    }

    let collector = if args.collect {
        let mut collector = DataCollector::new(&config.data.output_dir)
            .with_context(|| {
                format!(
                    "creating data directory {}",
                    config.data.output_dir.display()
                )
            })?
            .with_max_per_file(config.data.max_per_file);
        collector.start_collection();
        Some(Arc::new(Mutex::new(collector)))
    } else {
        None
    };

    info!(
        worlds = args.worlds,
        ticks = args.ticks,
        policy = ?args.policy,
        "Starting simulation"
    );

    let mut jobs = JoinSet::new();
    for index in 0..args.worlds.max(1) {
        let job = WorldJob {
            index,
            seed: args.seed.wrapping_add(index as u64),
            ticks: args.ticks,
            dt: args.dt,
            policy: args.policy,
            config: config.clone(),
            service: Arc::clone(&service),
            collector: collector.clone(),
            handle: Handle::current(),
        };
        jobs.spawn_blocking(move || run_world(&job));
    }

    let mut summaries = Vec::new();
    while let Some(joined) = jobs.join_next().await {
        summaries.push(joined.context("world thread panicked")??);
    }
    summaries.sort_by_key(|s| s.world);

    println!("Simulation Summary");
    println!("==================\n");
    for s in &summaries {
        println!(
            "World {} (seed {}): {}/{} alive, day {} {}",
            s.world, s.seed, s.alive, s.npcs, s.day, s.time
        );
        println!(
            "  actions: {}  reward: {:.1}  money: {:.1}  earned: {:.1}  spent: {:.1}",
            s.actions, s.total_reward, s.total_money, s.earned, s.spent
        );
    }

    if args.policy == Policy::QLearning {
        let stats = service.stats().await;
        println!(
            "\nRL engine: {} steps, {} train steps, last loss {:.4}",
            stats.total_steps, stats.train_steps, stats.last_training_loss
        );
    }
    if let Some(path) = &args.save_model {
        service.save_model(path).await?;
        println!("Model saved to {}", path.display());
    }

    if let Some(collector) = collector {
        let mut collector = collector.lock().await;
        let stats = collector.statistics();
        let name = format!("{}.json", collector.session());
        let export = collector.export_json(&name)?;
        collector.stop_collection()?;
        println!(
            "\nCollected {} experiences (avg reward {:.2}, imbalance {:.2})",
            stats.session_records, stats.average_reward, stats.imbalance_ratio
        );
        println!("Exported pending batch to {}", export.display());
    }

    Ok(())
}

fn run_world(job: &WorldJob) -> Result<WorldSummary> {
    let mut world = World::generate(
        job.config.world.clone(),
        job.config.simulation.clone(),
        job.seed,
    )?;
    let mut actions = 0usize;
    let mut total_reward = 0.0f64;

    for tick in 0..job.ticks {
        for index in 0..world.npcs.len() {
            let npc = world.npc(index)?;
            if npc.is_dead() || !npc.ready() {
                continue;
            }
            let name = npc.name.clone();
            let state = world.observe(index)?;

            let (action, reward) = match job.policy {
                Policy::Rule => match world.auto_step(index)? {
                    Some((action, outcome)) => (action, outcome.reward),
                    None => continue,
                },
                Policy::QLearning => step_learned(job, &mut world, index, state)?,
            };

            let next_state = world.observe(index)?;
            let done = world.npc(index)?.is_dead();
            if let Some(collector) = &job.collector {
                job.handle.block_on(async {
                    collector
                        .lock()
                        .await
                        .record(state, action, reward, next_state, done, &name)
                })?;
            }
            actions += 1;
            total_reward += f64::from(reward);
        }

        world.tick(job.dt);
        if world.alive_count() == 0 {
            debug!(world = job.index, tick, "All NPCs dead");
            break;
        }
    }

    info!(
        world = job.index,
        alive = world.alive_count(),
        actions,
        "World finished"
    );

    Ok(WorldSummary {
        world: job.index,
        seed: job.seed,
        npcs: world.npcs.len(),
        alive: world.alive_count(),
        actions,
        total_reward,
        total_money: world.total_money(),
        earned: world.ledger.earned(),
        spent: world.ledger.spent(),
        day: world.time.day(),
        time: world.time.formatted_time(),
    })
}

/// Ask the shared engine for an action, perform it and feed the result back
fn step_learned(
    job: &WorldJob,
    world: &mut World,
    index: usize,
    state: State,
) -> Result<(ActionType, f32)> {
    let features = state.to_features();
    let choice = job.handle.block_on(job.service.act(&features))?;
    let action = Action::from_index(choice).map_or(ActionType::None, Action::action_type);
    let outcome = world.step_npc(index, action)?;

    let next = world.observe(index)?.to_features();
    let done = world.npc(index)?.is_dead();
    job.handle
        .block_on(job.service.record_experience(Experience::new(
            features.to_vec(),
            choice,
            f64::from(outcome.reward),
            next.to_vec(),
            done,
        )))?;
    Ok((action, outcome.reward))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.world.npc_count = 3;
        config.world.map_width = 12;
        config.world.map_height = 12;
        config.data.output_dir = dir.to_path_buf();
        config.rl.engine.batch_size = 8;
        config
    }

    fn create_test_args(policy: Policy) -> SimulateArgs {
        SimulateArgs {
            ticks: 40,
            seed: 7,
            worlds: 2,
            dt: 1.0,
            policy,
            collect: true,
            model: None,
            save_model: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rule_simulation_collects_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(dir.path());

        run(create_test_args(Policy::Rule), config).await.unwrap();

        let exports: Vec<_> = std::fs::read_dir(dir.path().join("exports"))
            .unwrap()
            .collect();
        assert_eq!(exports.len(), 1);
        assert!(dir.path().join("sessions").is_dir());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_learned_simulation_saves_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(dir.path());
        let model = dir.path().join("model.json");
        let mut args = create_test_args(Policy::QLearning);
        args.save_model = Some(model.clone());

        run(args, config).await.unwrap();

        assert!(model.exists());
        assert!(msoc_rl::load_algorithm(&model).is_ok());
    }
}
