use chrono::Utc;
use clap::Args;
use fare_estimator::config::AppConfig;
use fare_estimator::error::AppError;
use fare_estimator::fares::{load_trip_history, train_bundle, RuleEngine, TrainingOutcome};
use fare_estimator::telemetry;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub(crate) struct TrainArgs {
    /// Historical trip export (CSV) to learn the residual from
    #[arg(long)]
    pub(crate) history: PathBuf,
    /// Where to write the bundle. Defaults to the configured model path.
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
    /// Override the number of ensemble members
    #[arg(long)]
    pub(crate) members: Option<usize>,
    /// Override the training seed
    #[arg(long)]
    pub(crate) seed: Option<u64>,
}

pub(crate) fn run_training(args: TrainArgs) -> Result<(), AppError> {
    let TrainArgs {
        history,
        output,
        members,
        seed,
    } = args;

    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    if let Some(members) = members {
        config.training.members = members;
        if config
            .training
            .weights
            .as_ref()
            .is_some_and(|weights| weights.len() != members)
        {
            config.training.weights = None;
        }
    }
    if let Some(seed) = seed {
        config.training.seed = seed;
    }

    let records = load_trip_history(&history)?;
    let rules = RuleEngine::default();
    let outcome = train_bundle(
        &records,
        &rules,
        &config.training.ensemble_config(),
        Utc::now(),
    )?;

    let output = output.unwrap_or(config.model.bundle_path);
    outcome.bundle.save(&output)?;
    render_summary(&outcome, &history, &output);

    Ok(())
}

fn render_summary(outcome: &TrainingOutcome, history: &Path, output: &Path) {
    let manifest = outcome.bundle.manifest();
    let split = outcome.bundle.split_model();

    println!("Fare model training");
    println!("- History: {}", history.display());
    println!(
        "- Model {} written to {}",
        manifest.model_version,
        output.display()
    );
    println!(
        "- {} trips accepted | {} excluded",
        outcome.report.accepted,
        outcome.report.excluded_total()
    );
    for (reason, count) in &outcome.report.excluded {
        println!("  - {}: {}", reason, count);
    }
    println!(
        "- {} ensemble members | training RMSE {:.3}",
        outcome.bundle.ensemble().members().len(),
        outcome.training_rmse
    );
    println!(
        "- Residual split: {} tip model | {} toll model",
        split.tip.kind(),
        split.tolls.kind()
    );
}
