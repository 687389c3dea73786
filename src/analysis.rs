//! Text analysis: normalization of obfuscated text, word tokenization and
//! n-gram extraction.

pub mod char_filter;
pub mod normalizer;
pub mod tokenizer;

pub use normalizer::{TextNormalizer, normalize, normalize_opt};
pub use tokenizer::{NGramRange, WordTokenizer};
