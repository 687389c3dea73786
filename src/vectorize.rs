//! TF-IDF feature extraction and its portable artifact format.

pub mod codec;
pub mod tfidf;

pub use codec::{ArtifactConfig, VectorizerPaths};
pub use tfidf::{FittedVectorizer, TfIdfVectorizer, VectorizerConfig};
