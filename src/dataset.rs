//! Labelled message datasets.
//!
//! A dataset is a CSV file with a header row and the columns `text`, `label`
//! (`ad` or `normal`) and optionally `topic`. Column order does not matter and
//! extra columns are ignored.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{AdsieveError, Result};
use crate::ml::labels::{AD_LABEL, NORMAL_LABEL};

/// One labelled message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Raw message text; an empty cell reads as `None`.
    pub text: Option<String>,
    pub label: String,
    #[serde(default)]
    pub topic: Option<String>,
}

/// The two classification tasks trained from one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Ad,
    Topic,
}

impl Task {
    pub const ALL: [Task; 2] = [Task::Ad, Task::Topic];

    /// File name prefix of the task's artifacts.
    pub fn prefix(&self) -> &'static str {
        match self {
            Task::Ad => "ad",
            Task::Topic => "topic",
        }
    }

    /// The label of `sample` for this task; `None` when the sample has none.
    pub fn label_of<'a>(&self, sample: &'a Sample) -> Option<&'a str> {
        match self {
            Task::Ad => Some(sample.label.as_str()),
            Task::Topic => sample.topic.as_deref().filter(|t| !t.is_empty()),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Label counts of a loaded dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub total: usize,
    pub ad: usize,
    pub normal: usize,
    pub with_topic: usize,
}

impl DatasetSummary {
    pub fn of(samples: &[Sample]) -> Self {
        let mut summary = Self {
            total: samples.len(),
            ..Self::default()
        };
        for sample in samples {
            match sample.label.as_str() {
                AD_LABEL => summary.ad += 1,
                NORMAL_LABEL => summary.normal += 1,
                _ => {}
            }
            if Task::Topic.label_of(sample).is_some() {
                summary.with_topic += 1;
            }
        }
        summary
    }
}

/// Load samples from a CSV file.
pub fn load_samples<P: AsRef<Path>>(path: P) -> Result<Vec<Sample>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        AdsieveError::dataset(format!("cannot open {}: {e}", path.display()))
    })?;
    let samples = read_samples(file)?;
    let summary = DatasetSummary::of(&samples);
    info!(
        "dataset: {} samples from {} ({} ad, {} normal, {} with topic)",
        summary.total,
        path.display(),
        summary.ad,
        summary.normal,
        summary.with_topic
    );
    Ok(samples)
}

/// Read samples from CSV data with a header row.
pub fn read_samples<R: Read>(input: R) -> Result<Vec<Sample>> {
    let mut reader = ReaderBuilder::new().flexible(false).from_reader(input);

    let headers = reader.headers()?.clone();
    for required in ["text", "label"] {
        if !headers.iter().any(|h| h.trim() == required) {
            return Err(AdsieveError::dataset(format!(
                "missing required column {required:?} (found {:?})",
                headers.iter().collect::<Vec<_>>()
            )));
        }
    }
    let trimmed: csv::StringRecord = headers.iter().map(str::trim).collect();
    reader.set_headers(trimmed);

    let mut samples = Vec::new();
    for (row, record) in reader.deserialize::<Sample>().enumerate() {
        let mut sample = record.map_err(|e| {
            AdsieveError::dataset(format!("row {}: {e}", row + 1))
        })?;
        sample.label = sample.label.trim().to_string();
        sample.topic = sample
            .topic
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        samples.push(sample);
    }

    if samples.is_empty() {
        return Err(AdsieveError::dataset("dataset has no rows"));
    }
    Ok(samples)
}
