//! Command line argument parsing for the adsieve CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::dataset::Task;

/// adsieve - train and inspect ad and topic classifiers for short messages
#[derive(Parser, Debug, Clone)]
#[command(name = "adsieve")]
#[command(about = "Train and inspect ad and topic classifiers for short messages")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct AdsieveArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl AdsieveArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Train classifiers from a labelled CSV and write their bundles
    Train(TrainArgs),

    /// Print the normalized form of each text
    Normalize(NormalizeArgs),

    /// Classify texts with a trained bundle
    Predict(PredictArgs),

    /// Show what a trained bundle contains
    Inspect(InspectArgs),
}

/// Arguments for training
#[derive(Parser, Debug, Clone)]
pub struct TrainArgs {
    /// CSV dataset with `text`, `label` and optional `topic` columns
    #[arg(short, long, value_name = "CSV")]
    pub data: PathBuf,

    /// Directory receiving the bundles
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Which classifiers to train
    #[arg(short, long, value_enum, default_value = "all")]
    pub task: TaskSelection,

    /// JSON pipeline configuration
    #[arg(short, long, value_name = "CONFIG_FILE", env = "ADSIEVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the split and initialization seeds
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the number of training epochs
    #[arg(long)]
    pub epochs: Option<usize>,
}

/// Arguments for normalization
#[derive(Parser, Debug, Clone)]
pub struct NormalizeArgs {
    /// Texts to normalize
    #[arg(value_name = "TEXT", required = true)]
    pub texts: Vec<String>,
}

/// Arguments for prediction
#[derive(Parser, Debug, Clone)]
pub struct PredictArgs {
    /// Directory holding the trained bundles
    #[arg(short, long, value_name = "DIR")]
    pub bundle: PathBuf,

    /// Which classifier to use
    #[arg(short, long, value_enum, default_value = "ad")]
    pub task: TaskArg,

    /// Probability of `ad` at which a message is flagged (ad task only)
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Texts to classify
    #[arg(value_name = "TEXT", required = true)]
    pub texts: Vec<String>,
}

/// Arguments for bundle inspection
#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    /// Directory holding the trained bundles
    #[arg(short, long, value_name = "DIR")]
    pub bundle: PathBuf,

    /// Which bundle to inspect
    #[arg(short, long, value_enum, default_value = "ad")]
    pub task: TaskArg,
}

/// A single classification task
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskArg {
    /// Advertisement vs. normal
    Ad,
    /// Topic category
    Topic,
}

impl From<TaskArg> for Task {
    fn from(arg: TaskArg) -> Self {
        match arg {
            TaskArg::Ad => Task::Ad,
            TaskArg::Topic => Task::Topic,
        }
    }
}

/// Tasks selected for training
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSelection {
    Ad,
    Topic,
    /// Both tasks, trained concurrently
    All,
}

impl TaskSelection {
    pub fn tasks(&self) -> Vec<Task> {
        match self {
            TaskSelection::Ad => vec![Task::Ad],
            TaskSelection::Topic => vec![Task::Topic],
            TaskSelection::All => Task::ALL.to_vec(),
        }
    }
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train() {
        let args = AdsieveArgs::try_parse_from([
            "adsieve", "train", "--data", "d.csv", "--output", "out", "--task", "topic", "-vv",
        ])
        .unwrap();
        assert_eq!(args.verbosity(), 2);
        match args.command {
            Command::Train(train) => {
                assert_eq!(train.data, PathBuf::from("d.csv"));
                assert_eq!(train.task.tasks(), vec![Task::Topic]);
                assert_eq!(train.seed, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_predict() {
        let args = AdsieveArgs::try_parse_from([
            "adsieve", "-f", "json", "predict", "-b", "out", "加微信", "hello",
        ])
        .unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
        match args.command {
            Command::Predict(predict) => {
                assert_eq!(Task::from(predict.task), Task::Ad);
                assert_eq!(predict.texts.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        let args = AdsieveArgs::try_parse_from(["adsieve", "-q", "-v", "normalize", "x"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_default_selection_is_all() {
        let args = AdsieveArgs::try_parse_from(["adsieve", "train", "-d", "a.csv", "-o", "o"]).unwrap();
        let Command::Train(train) = args.command else {
            panic!("expected train");
        };
        assert_eq!(train.task.tasks(), Task::ALL.to_vec());
    }
}
