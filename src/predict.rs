//! Inference over an exported bundle.
//!
//! [`Predictor`] loads the same files a deployment runtime would read and
//! classifies raw text with them, so a bundle can be checked end to end
//! without any training state.

use std::fs;
use std::path::Path;

use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::normalizer::normalize;
use crate::dataset::Task;
use crate::error::{AdsieveError, Result};
use crate::ml::classifier::{Scorer, argmax};
use crate::ml::labels::{AD_LABEL, LabelTable};
use crate::ml::quantization::{QuantizationMethod, QuantizedModel};
use crate::pipeline::BundlePaths;
use crate::vectorize::codec;
use crate::vectorize::tfidf::FittedVectorizer;

/// Probability of the `ad` class at or above which a message is flagged.
pub const DEFAULT_AD_THRESHOLD: f32 = 0.85;

/// Classification of one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Label of the most probable class.
    pub label: String,
    pub index: usize,
    /// Probability of the most probable class.
    pub confidence: f32,
    pub probabilities: Vec<f32>,
    /// Share of the message's n-grams found in the vocabulary.
    pub coverage: f32,
    pub matched_ngrams: usize,
    /// Ad task only: whether `P(ad)` reaches the threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ad: Option<bool>,
}

/// Summary of a loaded bundle.
#[derive(Debug, Clone, Serialize)]
pub struct BundleInfo {
    pub task: Task,
    pub labels: Vec<String>,
    pub vocabulary_size: usize,
    pub max_features: usize,
    pub ngram_range: [usize; 2],
    pub quantization: QuantizationMethod,
    pub layers: Vec<(usize, usize)>,
    pub model_bytes: usize,
}

/// A loaded bundle ready to classify text.
#[derive(Debug)]
pub struct Predictor {
    task: Task,
    vectorizer: FittedVectorizer,
    model: QuantizedModel,
    labels: LabelTable,
    model_bytes: usize,
    threshold: f32,
}

impl Predictor {
    /// Load the bundle of `task` from `dir` and check that its parts agree.
    pub fn load<P: AsRef<Path>>(dir: P, task: Task) -> Result<Self> {
        let paths = BundlePaths::for_task(dir, task);
        let vectorizer = codec::load(&paths.vectorizer)?;
        let bytes = fs::read(&paths.model)?;
        let model = QuantizedModel::from_bytes(&bytes)?;
        let labels = LabelTable::load(&paths.labels)?;

        if model.input_dim() != vectorizer.vocabulary_size() {
            return Err(AdsieveError::corrupt(format!(
                "model expects {} features but the vocabulary has {}",
                model.input_dim(),
                vectorizer.vocabulary_size()
            )));
        }
        if model.num_classes() != labels.len() {
            return Err(AdsieveError::corrupt(format!(
                "model has {} outputs but the label file lists {}",
                model.num_classes(),
                labels.len()
            )));
        }
        if task == Task::Ad && labels != LabelTable::ad() {
            return Err(AdsieveError::corrupt(format!(
                "ad label file must be [ad, normal], found {:?}",
                labels.labels()
            )));
        }

        debug!(
            "predict: loaded {task} bundle, {} features, {} classes",
            vectorizer.vocabulary_size(),
            labels.len()
        );
        Ok(Self {
            task,
            vectorizer,
            model,
            labels,
            model_bytes: bytes.len(),
            threshold: DEFAULT_AD_THRESHOLD,
        })
    }

    /// Set the ad threshold, clamped to `[0, 1]`.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = if threshold.is_nan() {
            DEFAULT_AD_THRESHOLD
        } else {
            threshold.clamp(0.0, 1.0)
        };
        self
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn vectorizer(&self) -> &FittedVectorizer {
        &self.vectorizer
    }

    pub fn info(&self) -> BundleInfo {
        let config = self.vectorizer.config();
        BundleInfo {
            task: self.task,
            labels: self.labels.labels().to_vec(),
            vocabulary_size: self.vectorizer.vocabulary_size(),
            max_features: config.max_features,
            ngram_range: [config.ngram_range.min_n(), config.ngram_range.max_n()],
            quantization: self.model.method(),
            layers: self.model.layer_shapes(),
            model_bytes: self.model_bytes,
        }
    }

    /// Classify raw, unnormalized text.
    pub fn predict(&self, text: &str) -> Result<Prediction> {
        let normalized = normalize(text);
        let features = self.vectorizer.transform(&normalized);
        let probabilities = self.model.predict_proba(&features)?;
        let index = argmax(&probabilities);
        let label = self
            .labels
            .label(index)
            .ok_or_else(|| AdsieveError::corrupt(format!("no label for class {index}")))?
            .to_string();

        let is_ad = match self.task {
            Task::Ad => {
                let ad = self.labels.index_of(AD_LABEL).unwrap_or(0);
                Some(probabilities[ad] >= self.threshold)
            }
            Task::Topic => None,
        };

        Ok(Prediction {
            label,
            index,
            confidence: probabilities[index],
            coverage: self.vectorizer.coverage(&normalized),
            matched_ngrams: self.vectorizer.matched_count(&normalized),
            probabilities,
            is_ad,
        })
    }

    pub fn predict_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Result<Vec<Prediction>> {
        texts.par_iter().map(|t| self.predict(t.as_ref())).collect()
    }
}
