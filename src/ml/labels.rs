//! Label tables mapping classifier output indices to label strings.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdsieveError, Result};

/// Label of advertisement messages in the ad task.
pub const AD_LABEL: &str = "ad";
/// Label of ordinary messages in the ad task.
pub const NORMAL_LABEL: &str = "normal";

/// Ordered label strings; index `i` names output class `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// The fixed `[ad, normal]` table of the ad task.
    pub fn ad() -> Self {
        Self {
            labels: vec![AD_LABEL.to_string(), NORMAL_LABEL.to_string()],
        }
    }

    /// Distinct labels in first-seen order, validated like [`LabelTable::new`].
    pub fn from_observed<I, S>(observed: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut labels: Vec<String> = Vec::new();
        for label in observed {
            let label = label.as_ref();
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
        }
        Self::new(labels)
    }

    /// Build from an explicit list; labels must be non-empty, distinct and
    /// free of line breaks.
    pub fn new(labels: Vec<String>) -> Result<Self> {
        for (i, label) in labels.iter().enumerate() {
            if label.is_empty() || label.contains(['\n', '\r']) {
                return Err(AdsieveError::dataset(format!(
                    "label {i} ({label:?}) must be a non-empty single line"
                )));
            }
            if labels[..i].contains(label) {
                return Err(AdsieveError::dataset(format!("duplicate label {label:?}")));
            }
        }
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Map label strings to class indices; unknown labels are a dataset error.
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels
            .iter()
            .enumerate()
            .map(|(row, label)| {
                let label = label.as_ref();
                self.index_of(label).ok_or_else(|| {
                    AdsieveError::dataset(format!(
                        "row {}: unknown label {label:?}, expected one of {:?}",
                        row + 1,
                        self.labels
                    ))
                })
            })
            .collect()
    }

    /// One label per line, each terminated by `\n`.
    pub fn to_text(&self) -> String {
        self.labels.iter().map(|l| format!("{l}\n")).collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_text())?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let labels: Vec<String> = content.lines().map(str::to_string).collect();
        Self::new(labels)
            .map_err(|e| AdsieveError::corrupt(format!("{}: {e}", path.as_ref().display())))
    }
}
