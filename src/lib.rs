//! # adsieve
//!
//! Training of advertisement and topic classifiers for short, noisy,
//! possibly obfuscated chat messages, exported as small framework-free bundles.
//!
//! ## Features
//!
//! - Confusable-character normalization of evasive spam text
//! - Word and CJK-character n-gram TF-IDF features with a portable text format
//! - A small feed-forward classifier trained with Adam
//! - Int8 model export with checksum validation
//! - A predictor that runs a bundle exactly as a deployment runtime would

pub mod analysis;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod ml;
pub mod pipeline;
pub mod predict;
pub mod vectorize;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
