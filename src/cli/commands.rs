//! Command implementations for the adsieve CLI.

use log::{error, info};

use crate::analysis::normalizer::normalize;
use crate::cli::args::*;
use crate::cli::output::*;
use crate::dataset::{Task, load_samples};
use crate::error::{AdsieveError, Result};
use crate::pipeline::{PipelineConfig, run_tasks};
use crate::predict::Predictor;

/// Execute a CLI command.
pub fn execute_command(args: AdsieveArgs) -> Result<()> {
    match &args.command {
        Command::Train(train_args) => train(train_args, &args),
        Command::Normalize(normalize_args) => normalize_texts(normalize_args, &args),
        Command::Predict(predict_args) => predict(predict_args, &args),
        Command::Inspect(inspect_args) => inspect(inspect_args, &args),
    }
}

/// Build the pipeline configuration from the config file and overrides.
fn pipeline_config(args: &TrainArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            PipelineConfig::load(path)?
        }
        None => PipelineConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.trainer.split_seed = seed;
        config.trainer.init_seed = seed;
    }
    if let Some(epochs) = args.epochs {
        config.trainer.epochs = epochs;
    }
    config.validate()?;
    Ok(config)
}

/// Train the selected tasks.
fn train(args: &TrainArgs, cli_args: &AdsieveArgs) -> Result<()> {
    let config = pipeline_config(args)?;
    let samples = load_samples(&args.data)?;
    let tasks = args.task.tasks();

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for (task, result) in run_tasks(&samples, &tasks, &config, &args.output) {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!("{task}: {e}");
                failures.push(TaskFailure {
                    task: task.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    let failed = failures.len();
    output_result(
        "Training finished",
        &TrainingSummary { reports, failures },
        cli_args,
    )?;

    if failed > 0 {
        return Err(AdsieveError::training(format!(
            "{failed} of {} tasks failed",
            tasks.len()
        )));
    }
    Ok(())
}

/// Normalize texts given on the command line.
fn normalize_texts(args: &NormalizeArgs, cli_args: &AdsieveArgs) -> Result<()> {
    let results: Vec<NormalizedText> = args
        .texts
        .iter()
        .map(|text| NormalizedText {
            input: text.clone(),
            normalized: normalize(text),
        })
        .collect();
    output_result("Normalized text", &results, cli_args)
}

/// Classify texts with a trained bundle.
fn predict(args: &PredictArgs, cli_args: &AdsieveArgs) -> Result<()> {
    let task = Task::from(args.task);
    let mut predictor = Predictor::load(&args.bundle, task)?;
    if let Some(threshold) = args.threshold {
        predictor = predictor.with_threshold(threshold);
    }

    let predictions = predictor.predict_batch(&args.texts)?;
    let results = PredictionResults {
        task: task.to_string(),
        threshold: (task == Task::Ad).then(|| predictor.threshold()),
        predictions: args
            .texts
            .iter()
            .cloned()
            .zip(predictions)
            .map(|(text, prediction)| TextPrediction { text, prediction })
            .collect(),
    };
    output_result("Predictions", &results, cli_args)
}

/// Describe a trained bundle.
fn inspect(args: &InspectArgs, cli_args: &AdsieveArgs) -> Result<()> {
    let predictor = Predictor::load(&args.bundle, Task::from(args.task))?;
    output_result(
        &format!("Bundle in {}", args.bundle.display()),
        &predictor.info(),
        cli_args,
    )
}
