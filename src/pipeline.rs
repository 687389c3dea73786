//! End-to-end training of the ad and topic classifiers.
//!
//! Each task runs normalize, split, fit, transform, train and export in
//! sequence and writes its bundle only once every step has succeeded. Bundle
//! files are written into a staging directory inside the output directory and
//! then renamed into place; if any of that fails, the files already moved are
//! removed again, so a failed task leaves no partial bundle. The two tasks
//! share nothing but the read-only samples and run concurrently.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::normalizer::normalize_opt;
use crate::dataset::{Sample, Task};
use crate::error::{AdsieveError, Result};
use crate::ml::classifier::accuracy;
use crate::ml::labels::LabelTable;
use crate::ml::mlp::{ClassifierTrainer, TrainerConfig};
use crate::ml::quantization::{ModelExporter, QuantizationMethod, QuantizedModel};
use crate::ml::split::stratified_split;
use crate::vectorize::codec::{self, VectorizerPaths};
use crate::vectorize::tfidf::{FittedVectorizer, TfIdfVectorizer, VectorizerConfig};

/// Export settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub quantization: QuantizationMethod,
    /// Decode the exported model and measure its test accuracy.
    pub verify_quantized: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            quantization: QuantizationMethod::Int8,
            verify_quantized: true,
        }
    }
}

/// Configuration of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub vectorizer: VectorizerConfig,
    pub trainer: TrainerConfig,
    pub export: ExportConfig,
}

impl PipelineConfig {
    /// Read a JSON config; absent fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vectorizer.max_features == 0 {
            return Err(AdsieveError::invalid_config("max_features must be positive"));
        }
        self.trainer.validate()
    }
}

/// Files of one task's artifact bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePaths {
    pub model: PathBuf,
    pub labels: PathBuf,
    pub vectorizer: VectorizerPaths,
}

impl BundlePaths {
    /// Every file of the bundle; the model and labels come last.
    pub fn files(&self) -> [&Path; 5] {
        [
            &self.vectorizer.vocabulary,
            &self.vectorizer.idf,
            &self.vectorizer.config,
            &self.model,
            &self.labels,
        ]
    }

    /// `<dir>/<task>_model.bin`, `<dir>/<task>_labels.txt` and the vectorizer files.
    pub fn for_task<P: AsRef<Path>>(dir: P, task: Task) -> Self {
        let dir = dir.as_ref();
        let prefix = task.prefix();
        Self {
            model: dir.join(format!("{prefix}_model.bin")),
            labels: dir.join(format!("{prefix}_labels.txt")),
            vectorizer: VectorizerPaths::with_prefix(dir, prefix),
        }
    }
}

/// Outcome of one task's training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub task: Task,
    pub samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub labels: Vec<String>,
    pub vocabulary_size: usize,
    /// Held-out accuracy of the float model.
    pub test_accuracy: f64,
    /// Held-out accuracy of the exported model, when verified.
    pub quantized_accuracy: Option<f64>,
    pub model_bytes: usize,
    pub duration_secs: f64,
    pub output_dir: PathBuf,
}

/// Training pipeline of a single task.
#[derive(Debug, Clone)]
pub struct TaskPipeline {
    task: Task,
    config: PipelineConfig,
}

impl TaskPipeline {
    pub fn new(task: Task, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { task, config })
    }

    pub fn task(&self) -> Task {
        self.task
    }

    /// Label table and per-sample class indices for this task.
    fn encode_labels(&self, samples: &[Sample]) -> Result<(LabelTable, Vec<usize>)> {
        match self.task {
            Task::Ad => {
                let table = LabelTable::ad();
                let labels: Vec<&str> = samples.iter().map(|s| s.label.as_str()).collect();
                let encoded = table.encode(&labels)?;
                Ok((table, encoded))
            }
            Task::Topic => {
                let topics = samples
                    .iter()
                    .enumerate()
                    .map(|(row, sample)| {
                        Task::Topic.label_of(sample).ok_or_else(|| {
                            AdsieveError::dataset(format!("row {}: missing topic", row + 1))
                        })
                    })
                    .collect::<Result<Vec<&str>>>()?;
                let table = LabelTable::from_observed(&topics)?;
                let encoded = table.encode(&topics)?;
                Ok((table, encoded))
            }
        }
    }

    /// Train on `samples` and write the bundle into `output_dir`.
    pub fn run<P: AsRef<Path>>(&self, samples: &[Sample], output_dir: P) -> Result<TrainingReport> {
        let started = Instant::now();
        let output_dir = output_dir.as_ref();
        let task = self.task;

        let (table, labels) = self.encode_labels(samples)?;
        info!("{task}: {} samples, {} classes {:?}", samples.len(), table.len(), table.labels());
        if table.len() < 2 {
            return Err(AdsieveError::precondition(format!(
                "{task}: need at least 2 classes, found {}",
                table.len()
            )));
        }

        let texts: Vec<String> = samples
            .par_iter()
            .map(|s| normalize_opt(s.text.as_deref()))
            .collect();

        let trainer_config = &self.config.trainer;
        let split = stratified_split(&labels, trainer_config.test_fraction, trainer_config.split_seed)?;
        let (train_texts, test_texts) = split.select(&texts);
        let (train_labels, test_labels) = split.select(&labels);
        info!(
            "{task}: split into {} train / {} test",
            train_texts.len(),
            test_texts.len()
        );

        let fitted = TfIdfVectorizer::new(self.config.vectorizer)?.fit(&train_texts)?;
        let train_features = fitted.transform_batch(&train_texts);
        let test_features = fitted.transform_batch(&test_texts);

        let trainer = ClassifierTrainer::new(trainer_config.clone())?;
        let (model, test_accuracy) = trainer.train_split(
            &train_features,
            &train_labels,
            &test_features,
            &test_labels,
            table.len(),
        )?;

        let bytes = ModelExporter::new(self.config.export.quantization).export(&model)?;
        let quantized_accuracy = if self.config.export.verify_quantized {
            let decoded = QuantizedModel::from_bytes(&bytes)?;
            let quantized = accuracy(&decoded, &test_features, &test_labels)?;
            if quantized + 0.05 < test_accuracy {
                warn!(
                    "{task}: exported model accuracy {quantized:.4} is well below float accuracy {test_accuracy:.4}"
                );
            }
            Some(quantized)
        } else {
            None
        };

        write_bundle(output_dir, task, &fitted, &bytes, &table)?;

        let report = TrainingReport {
            task,
            samples: samples.len(),
            train_samples: train_texts.len(),
            test_samples: test_texts.len(),
            labels: table.labels().to_vec(),
            vocabulary_size: fitted.vocabulary_size(),
            test_accuracy,
            quantized_accuracy,
            model_bytes: bytes.len(),
            duration_secs: started.elapsed().as_secs_f64(),
            output_dir: output_dir.to_path_buf(),
        };
        info!(
            "{task}: wrote bundle to {} (accuracy {:.4}, {} bytes)",
            output_dir.display(),
            report.test_accuracy,
            report.model_bytes
        );
        Ok(report)
    }
}

/// Write one task's bundle into `output_dir` through a staging directory.
fn write_bundle(
    output_dir: &Path,
    task: Task,
    fitted: &FittedVectorizer,
    model: &[u8],
    table: &LabelTable,
) -> Result<BundlePaths> {
    fs::create_dir_all(output_dir)?;
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{}-staging-", task.prefix()))
        .tempdir_in(output_dir)?;

    let staged = BundlePaths::for_task(staging.path(), task);
    codec::save(fitted, &staged.vectorizer)?;
    fs::write(&staged.model, model)?;
    table.save(&staged.labels)?;

    let paths = BundlePaths::for_task(output_dir, task);
    let moves = staged.files().into_iter().zip(paths.files());
    let mut placed: Vec<&Path> = Vec::new();
    for (from, to) in moves {
        if let Err(e) = fs::rename(from, to) {
            for path in placed {
                if let Err(cleanup) = fs::remove_file(path) {
                    warn!("{task}: could not remove {}: {cleanup}", path.display());
                }
            }
            return Err(e.into());
        }
        placed.push(to);
    }
    debug!("{task}: moved {} files from {}", placed.len(), staging.path().display());
    Ok(paths)
}

/// Run every task in `tasks`; two tasks run concurrently.
///
/// A failing task does not stop the others.
pub fn run_tasks<P: AsRef<Path> + Sync>(
    samples: &[Sample],
    tasks: &[Task],
    config: &PipelineConfig,
    output_dir: P,
) -> Vec<(Task, Result<TrainingReport>)> {
    let run = |task: Task| -> Result<TrainingReport> {
        TaskPipeline::new(task, config.clone())?.run(samples, output_dir.as_ref())
    };

    match tasks {
        [first, second] => {
            let (a, b) = rayon::join(|| run(*first), || run(*second));
            vec![(*first, a), (*second, b)]
        }
        _ => tasks.iter().map(|&task| (task, run(task))).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quick_config() -> PipelineConfig {
        PipelineConfig {
            trainer: TrainerConfig {
                hidden_layers: vec![16],
                dropout: vec![0.0],
                epochs: 5,
                batch_size: 4,
                ..TrainerConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn sample(text: &str, label: &str, topic: Option<&str>) -> Sample {
        Sample {
            text: Some(text.to_string()),
            label: label.to_string(),
            topic: topic.map(str::to_string),
        }
    }

    #[test]
    fn test_bundle_paths() {
        let paths = BundlePaths::for_task("/out", Task::Topic);
        assert_eq!(paths.model, PathBuf::from("/out/topic_model.bin"));
        assert_eq!(paths.labels, PathBuf::from("/out/topic_labels.txt"));
        assert_eq!(paths.vectorizer.idf, PathBuf::from("/out/topic_idf.txt"));
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"trainer": {"epochs": 3}, "export": {"quantization": "float32"}}"#)
                .unwrap();
        assert_eq!(config.trainer.epochs, 3);
        assert_eq!(config.trainer.batch_size, 32);
        assert_eq!(config.vectorizer.max_features, 8000);
        assert_eq!(config.export.quantization, QuantizationMethod::Float32);
        assert!(config.export.verify_quantized);
    }

    #[test]
    fn test_unknown_ad_label_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let samples = vec![
            sample("a", "ad", None),
            sample("b", "spam", None),
            sample("c", "normal", None),
        ];
        let pipeline = TaskPipeline::new(Task::Ad, quick_config()).unwrap();
        assert!(matches!(
            pipeline.run(&samples, dir.path()),
            Err(AdsieveError::Dataset(_))
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_topic() {
        let dir = TempDir::new().unwrap();
        let samples = vec![sample("a", "ad", Some("x")), sample("b", "normal", None)];
        let pipeline = TaskPipeline::new(Task::Topic, quick_config()).unwrap();
        let err = pipeline.run(&samples, dir.path()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    fn two_class_samples() -> Vec<Sample> {
        (0..10)
            .flat_map(|i| {
                [
                    sample(&format!("加微信 领彩金 {i}"), "ad", Some("promo")),
                    sample(&format!("明天 午饭 {i}"), "normal", Some("chat")),
                ]
            })
            .collect()
    }

    #[test]
    fn test_bundle_files_are_placed_together() {
        let dir = TempDir::new().unwrap();
        let pipeline = TaskPipeline::new(Task::Ad, quick_config()).unwrap();
        pipeline.run(&two_class_samples(), dir.path()).unwrap();

        let paths = BundlePaths::for_task(dir.path(), Task::Ad);
        assert!(paths.files().iter().all(|p| p.is_file()));
        // nothing but the five bundle files remains
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 5);
    }

    #[test]
    fn test_failed_placement_leaves_no_partial_bundle() {
        let dir = TempDir::new().unwrap();
        let paths = BundlePaths::for_task(dir.path(), Task::Ad);
        // a directory where the label file belongs makes the last rename fail
        fs::create_dir(&paths.labels).unwrap();
        fs::write(paths.labels.join("keep"), "x").unwrap();

        let pipeline = TaskPipeline::new(Task::Ad, quick_config()).unwrap();
        assert!(matches!(
            pipeline.run(&two_class_samples(), dir.path()),
            Err(AdsieveError::Io(_))
        ));

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("ad_labels.txt")]);
    }

    #[test]
    fn test_multiline_topic_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut samples = two_class_samples();
        for s in samples.iter_mut().filter(|s| s.label == "ad") {
            s.topic = Some("pro\nmo".to_string());
        }
        let pipeline = TaskPipeline::new(Task::Topic, quick_config()).unwrap();
        assert!(matches!(
            pipeline.run(&samples, dir.path()),
            Err(AdsieveError::Dataset(_))
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_singleton_class_is_precondition() {
        let dir = TempDir::new().unwrap();
        let mut samples: Vec<Sample> = (0..9).map(|i| sample(&format!("hi {i}"), "normal", None)).collect();
        samples.push(sample("buy", "ad", None));
        let pipeline = TaskPipeline::new(Task::Ad, quick_config()).unwrap();
        assert!(matches!(
            pipeline.run(&samples, dir.path()),
            Err(AdsieveError::Precondition(_))
        ));
    }
}
