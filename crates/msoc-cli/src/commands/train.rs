//! Online and offline training commands

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use msoc_core::env::{EconomyEnv, GatherEnv, GatherLayout, SocietyEnv};
use msoc_core::Environment;
use msoc_data::Dataset;
use msoc_rl::{save_algorithm, OfflineTrainer, OnlineTrainer, RLEngine};
use tracing::info;

use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnvKind {
    /// Controlled NPC in a full society world
    Society,
    /// Single forager on a resource grid
    Gather,
    /// Abstract survival economy
    Economy,
}

#[derive(Debug, Args)]
pub struct TrainArgs {
    #[arg(long, value_enum, default_value_t = EnvKind::Society)]
    pub env: EnvKind,

    /// Algorithm to train (dqn or q_learning); defaults to rl.algorithm
    #[arg(long)]
    pub algorithm: Option<String>,

    /// Episodes to run; defaults to rl.training.episodes
    #[arg(long)]
    pub episodes: Option<usize>,

    /// Directory for the model and training summary
    #[arg(long, default_value = "models")]
    pub output: PathBuf,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Args)]
pub struct TrainOfflineArgs {
    /// Collected experience file (export or session batch)
    #[arg(long)]
    pub data: PathBuf,

    /// Epochs to run; defaults to rl.offline.epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long, default_value = "models")]
    pub output: PathBuf,
}

fn build_env(kind: EnvKind, config: &AppConfig, seed: u64) -> Result<Box<dyn Environment>> {
    Ok(match kind {
        EnvKind::Society => Box::new(SocietyEnv::new(
            config.world.clone(),
            config.simulation.clone(),
            seed,
        )?),
        EnvKind::Gather => Box::new(GatherEnv::new(GatherLayout::default(), seed)?),
        EnvKind::Economy => Box::new(EconomyEnv::new(seed)),
    })
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
}

pub async fn run(args: TrainArgs, config: AppConfig) -> Result<()> {
    let mut env = build_env(args.env, &config, args.seed)?;
    let algorithm = args
        .algorithm
        .clone()
        .unwrap_or_else(|| config.rl.algorithm.clone());

    let mut engine_config = config.rl.engine.clone();
    engine_config.state_size = env.observation_size();
    engine_config.action_size = env.action_size();
    engine_config.seed = args.seed;
    let mut engine = RLEngine::new(engine_config)?;
    engine.set_algorithm(&algorithm)?;

    let mut training = config.rl.training.clone();
    if let Some(episodes) = args.episodes {
        training.episodes = episodes;
    }

    info!(
        env = env.name(),
        algorithm = %algorithm,
        episodes = training.episodes,
        "Starting online training"
    );

    let (engine, summary) = tokio::task::spawn_blocking(move || {
        let summary = OnlineTrainer::new(training).run(&mut engine, env.as_mut())?;
        anyhow::Ok((engine, summary))
    })
    .await
    .context("training thread panicked")??;

    ensure_dir(&args.output)?;
    let ts = timestamp();
    let stem = format!("{}_{}", summary.environment, summary.algorithm);
    let model_path = args.output.join(format!("{stem}_model_{ts}.json"));
    let summary_path = args.output.join(format!("{stem}_summary_{ts}.json"));
    engine.save_model(&model_path)?;
    summary.save_json(&summary_path)?;

    println!("Training Summary");
    println!("================\n");
    println!("Environment:    {}", summary.environment);
    println!("Algorithm:      {}", summary.algorithm);
    println!("Episodes:       {}", summary.episodes.len());
    println!("Mean reward:    {:.2}", summary.mean_reward);
    println!("Last 10 mean:   {:.2}", summary.recent_mean_reward(10));
    println!("Best reward:    {:.2}", summary.best_reward);
    println!("Success rate:   {:.1}%", summary.success_rate * 100.0);
    println!("Final epsilon:  {:.3}", summary.final_epsilon);
    println!("\nModel:   {}", model_path.display());
    println!("Summary: {}", summary_path.display());
    Ok(())
}

pub async fn run_offline(args: TrainOfflineArgs, config: AppConfig) -> Result<()> {
    let dataset = Dataset::load_json(&args.data)
        .with_context(|| format!("loading training data from {}", args.data.display()))?;
    info!(
        samples = dataset.len(),
        path = %args.data.display(),
        "Loaded training data"
    );

    let mut offline = config.rl.offline.clone();
    if let Some(epochs) = args.epochs {
        offline.epochs = epochs;
    }
    let trainer = OfflineTrainer::new(offline, config.rl.engine.dqn.clone());
    let data_file = args.data.display().to_string();
    let experiences = dataset.into_experiences();

    let result = tokio::task::spawn_blocking(move || trainer.train(&experiences, &data_file))
        .await
        .context("training thread panicked")??;

    ensure_dir(&args.output)?;
    let ts = &result.metadata.timestamp;
    let model_path = args.output.join(format!("npc_dqn_model_{ts}.json"));
    let latest_path = args.output.join("npc_dqn_model.json");
    let metadata_path = args.output.join(format!("training_metadata_{ts}.json"));
    save_algorithm(&result.model, &model_path)?;
    save_algorithm(&result.model, &latest_path)?;
    result.metadata.save_json(&metadata_path)?;

    let meta = &result.metadata;
    println!("Offline Training Summary");
    println!("========================\n");
    println!("Training samples:   {}", meta.training_samples);
    println!("Validation samples: {}", meta.validation_samples);
    println!("Epochs:             {}", meta.epochs);
    println!("Final loss:         {:.4}", meta.final_loss);
    println!("Validation loss:    {:.4}", meta.validation_loss);
    println!("Final epsilon:      {:.3}", meta.final_epsilon);
    println!("\nModel:    {}", model_path.display());
    println!("Latest:   {}", latest_path.display());
    println!("Metadata: {}", metadata_path.display());
    Ok(())
}
