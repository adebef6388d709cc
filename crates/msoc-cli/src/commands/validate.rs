//! Model validation against collected data

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use msoc_data::Dataset;
use msoc_rl::{compare_models, load_algorithm, ModelValidator, RLAlgorithm, ValidationReport};
use tracing::warn;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Saved model file
    #[arg(long)]
    pub model: PathBuf,

    /// Collected experience file to validate against
    #[arg(long)]
    pub data: PathBuf,

    /// Further model files to rank against the main one
    #[arg(long, num_args = 1..)]
    pub compare: Vec<PathBuf>,

    /// Samples used for Q-value statistics
    #[arg(long, default_value_t = 1000)]
    pub q_samples: usize,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ValidateArgs) -> Result<()> {
    let dataset = Dataset::load_json(&args.data)
        .with_context(|| format!("loading validation data from {}", args.data.display()))?;
    let model = load_algorithm(&args.model)?;
    let data = dataset.experiences();

    let report = ModelValidator::new(model.as_ref(), data).full_report(args.q_samples)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !args.compare.is_empty() {
        let ranking = rank_models(&args.model, model.as_ref(), &args.compare, data);
        println!("\nModel Comparison");
        println!("================");
        for (i, (name, accuracy)) in ranking.iter().enumerate() {
            println!("{:>2}. {:<40} {:.2}%", i + 1, name, accuracy * 100.0);
        }
    }
    Ok(())
}

/// Accuracy ranking of `main` plus every model in `others`
fn rank_models(
    main_path: &Path,
    main: &dyn RLAlgorithm,
    others: &[PathBuf],
    data: &[msoc_rl::Experience],
) -> Vec<(String, f64)> {
    let mut loaded = Vec::new();
    let mut failed = Vec::new();
    for path in others {
        match load_algorithm(path) {
            Ok(model) => loaded.push((path.display().to_string(), model)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load model");
                failed.push(path.display().to_string());
            }
        }
    }

    let mut models: Vec<(String, &dyn RLAlgorithm)> =
        vec![(main_path.display().to_string(), main)];
    models.extend(loaded.iter().map(|(name, m)| (name.clone(), m.as_ref())));

    let mut ranking = compare_models(&models, data);
    ranking.extend(failed.into_iter().map(|name| (name, 0.0)));
    ranking
}

fn print_report(report: &ValidationReport) {
    println!("Model Validation Report");
    println!("=======================\n");
    println!("Model:   {}", report.model);
    println!("Samples: {}", report.samples);

    println!("\nAction accuracy: {:.2}%", report.actions.accuracy * 100.0);
    println!(
        "  {:<20} {:>8} {:>10} {:>10} {:>8}",
        "action", "count", "recall", "precision", "f1"
    );
    for a in &report.actions.per_action {
        println!(
            "  {:<20} {:>8} {:>9.1}% {:>9.1}% {:>8.3}",
            a.name,
            a.count,
            a.accuracy * 100.0,
            a.precision * 100.0,
            a.f1
        );
    }

    let q = &report.q_values;
    println!("\nQ-values over {} samples", q.samples);
    println!("  max:    {:.3} +/- {:.3}", q.max_mean, q.max_std);
    println!("  min:    {:.3} +/- {:.3}", q.min_mean, q.min_std);
    println!("  chosen: {:.3} +/- {:.3}", q.chosen_mean, q.chosen_std);
    match q.reward_correlation {
        Some(r) => println!("  reward correlation: {r:.3}"),
        None => println!("  reward correlation: n/a"),
    }
    println!("  mean |Q - target|: {:.3}", report.q_value_error);

    println!("\nReward by action");
    for r in &report.rewards {
        println!(
            "  {:<20} {:>8.2} +/- {:<8.2} (n={})",
            r.name, r.mean, r.std, r.count
        );
    }

    println!("\nState features");
    for f in &report.states {
        println!(
            "  {:<16} mean {:>7.2} std {:>7.2} range [{:.1}, {:.1}]",
            f.name, f.mean, f.std, f.min, f.max
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msoc_rl::{save_algorithm, Experience, QLearning, QLearningConfig};

    fn create_test_data() -> Vec<Experience> {
        (0..20)
            .map(|i| {
                let state = vec![(i % 4) as f32, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0];
                Experience::new(state.clone(), (i % 4) as usize, 1.0, state, false)
            })
            .collect()
    }

    fn create_trained_model() -> QLearning {
        let mut model = QLearning::with_actions(QLearningConfig::default(), 11);
        let data = create_test_data();
        for _ in 0..20 {
            model.train(&data).unwrap();
        }
        model
    }

    #[test]
    fn test_rank_models_scores_unloadable_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("other.json");
        save_algorithm(&QLearning::with_actions(QLearningConfig::default(), 11), &other).unwrap();
        let missing = dir.path().join("missing.json");

        let model = create_trained_model();
        let data = create_test_data();
        let ranking = rank_models(
            Path::new("main.json"),
            &model,
            &[other, missing.clone()],
            &data,
        );

        assert_eq!(ranking.len(), 3);
        assert_eq!(ranking[0].0, "main.json");
        assert_eq!(ranking[2], (missing.display().to_string(), 0.0));
    }
}
