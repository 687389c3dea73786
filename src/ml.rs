//! Classifier training and export.
//!
//! - [`split`]: stratified train/test partitioning
//! - [`mlp`]: the feed-forward network and its Adam trainer
//! - [`quantization`]: the compact binary model format
//! - [`labels`]: label tables written next to each model

pub mod classifier;
pub mod labels;
pub mod mlp;
pub mod quantization;
pub mod split;

pub use classifier::{Scorer, Trainer, accuracy, argmax};
pub use labels::{AD_LABEL, LabelTable, NORMAL_LABEL};
pub use mlp::{Activation, ClassifierTrainer, DenseLayer, MlpClassifier, TrainerConfig};
pub use quantization::{ModelExporter, QuantizationMethod, QuantizedModel};
pub use split::{Split, stratified_split};
