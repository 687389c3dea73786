//! N-gram TF-IDF vectorizer.
//!
//! Fitting and transforming are split across two types: [`TfIdfVectorizer`]
//! holds configuration only, and [`TfIdfVectorizer::fit`] returns a
//! [`FittedVectorizer`], the only type with a `transform`. A transform before
//! fit is therefore rejected at compile time.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::tokenizer::{NGramRange, WordTokenizer};
use crate::error::{AdsieveError, Result};

/// Default vocabulary cap.
pub const DEFAULT_MAX_FEATURES: usize = 8000;

/// Vectorizer hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    /// Upper bound on the vocabulary size.
    pub max_features: usize,
    /// N-gram lengths to extract, inclusive.
    pub ngram_range: NGramRange,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            ngram_range: NGramRange::default(),
        }
    }
}

/// Unfitted TF-IDF vectorizer.
#[derive(Debug, Clone, Default)]
pub struct TfIdfVectorizer {
    config: VectorizerConfig,
    tokenizer: WordTokenizer,
}

/// Per n-gram corpus statistics gathered while fitting.
#[derive(Debug, Default, Clone, Copy)]
struct TermStats {
    document_frequency: usize,
    term_frequency: usize,
}

impl TfIdfVectorizer {
    /// Create a vectorizer; `max_features` must be positive.
    pub fn new(config: VectorizerConfig) -> Result<Self> {
        if config.max_features == 0 {
            return Err(AdsieveError::invalid_config("max_features must be positive"));
        }
        Ok(Self {
            config,
            tokenizer: WordTokenizer::new(),
        })
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    /// Fit vocabulary and IDF weights on a corpus of normalized documents.
    ///
    /// N-grams are ranked by document frequency, then total occurrences, then
    /// lexicographically; the top `max_features` survive and receive indices
    /// in lexicographic order.
    pub fn fit<S: AsRef<str>>(&self, documents: &[S]) -> Result<FittedVectorizer> {
        if documents.is_empty() {
            return Err(AdsieveError::EmptyCorpus);
        }

        let mut stats: HashMap<String, TermStats> = HashMap::new();
        for doc in documents {
            let ngrams = ngrams_of(&self.tokenizer, self.config.ngram_range, doc.as_ref());
            let mut doc_counts: HashMap<String, usize> = HashMap::new();
            for ngram in ngrams {
                *doc_counts.entry(ngram).or_insert(0) += 1;
            }
            for (ngram, count) in doc_counts {
                let entry = stats.entry(ngram).or_default();
                entry.document_frequency += 1;
                entry.term_frequency += count;
            }
        }

        if stats.is_empty() {
            return Err(AdsieveError::EmptyVocabulary {
                documents: documents.len(),
            });
        }

        let candidates = stats.len();
        let mut ranked: Vec<(String, TermStats)> = stats.into_iter().collect();
        ranked.sort_by(|(a_term, a), (b_term, b)| {
            b.document_frequency
                .cmp(&a.document_frequency)
                .then(b.term_frequency.cmp(&a.term_frequency))
                .then_with(|| a_term.cmp(b_term))
        });
        ranked.truncate(self.config.max_features);
        ranked.sort_by(|(a, _), (b, _)| a.cmp(b));

        let n_documents = documents.len() as f64;
        let idf: Vec<f64> = ranked
            .iter()
            .map(|(_, s)| smoothed_idf(n_documents, s.document_frequency as f64))
            .collect();
        let terms: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();

        info!(
            "vectorizer: fitted {} documents, kept {} of {} n-grams",
            documents.len(),
            terms.len(),
            candidates
        );

        FittedVectorizer::from_parts(self.config, terms, idf)
    }
}

/// `ln((1 + N) / (1 + df)) + 1`
fn smoothed_idf(n_documents: f64, document_frequency: f64) -> f64 {
    ((1.0 + n_documents) / (1.0 + document_frequency)).ln() + 1.0
}

fn ngrams_of(tokenizer: &WordTokenizer, range: NGramRange, text: &str) -> Vec<String> {
    range.extract(&tokenizer.tokenize(text))
}

/// Vocabulary and IDF table frozen at fit time.
#[derive(Debug, Clone)]
pub struct FittedVectorizer {
    config: VectorizerConfig,
    tokenizer: WordTokenizer,
    terms: Vec<String>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl FittedVectorizer {
    /// Assemble a fitted vectorizer from index-aligned terms and IDF weights.
    ///
    /// Fails with a corrupt-artifact error when the two sequences differ in
    /// length, a term repeats, a term is empty, a weight is not finite, or the
    /// vocabulary exceeds `max_features`.
    pub fn from_parts(config: VectorizerConfig, terms: Vec<String>, idf: Vec<f64>) -> Result<Self> {
        if terms.len() != idf.len() {
            return Err(AdsieveError::corrupt(format!(
                "{} vocabulary entries but {} idf values",
                terms.len(),
                idf.len()
            )));
        }
        if terms.len() > config.max_features {
            return Err(AdsieveError::corrupt(format!(
                "vocabulary of {} exceeds max_features {}",
                terms.len(),
                config.max_features
            )));
        }
        if let Some(pos) = idf.iter().position(|w| !w.is_finite()) {
            return Err(AdsieveError::corrupt(format!(
                "idf value at index {pos} is not finite"
            )));
        }

        let mut vocabulary = HashMap::with_capacity(terms.len());
        for (idx, term) in terms.iter().enumerate() {
            if term.is_empty() {
                return Err(AdsieveError::corrupt(format!(
                    "empty vocabulary entry at index {idx}"
                )));
            }
            if vocabulary.insert(term.clone(), idx).is_some() {
                return Err(AdsieveError::corrupt(format!(
                    "duplicate vocabulary entry {term:?} at index {idx}"
                )));
            }
        }

        Ok(Self {
            config,
            tokenizer: WordTokenizer::new(),
            terms,
            vocabulary,
            idf,
        })
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    /// Number of features produced by [`transform`](Self::transform).
    pub fn vocabulary_size(&self) -> usize {
        self.terms.len()
    }

    /// Vocabulary terms in index order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// IDF weights in index order.
    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    /// Index of `term`, if it is in the vocabulary.
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }

    /// All n-grams of `text`, in extraction order.
    pub fn ngrams(&self, text: &str) -> Vec<String> {
        ngrams_of(&self.tokenizer, self.config.ngram_range, text)
    }

    /// Transform normalized text into an L2-normalized TF-IDF vector.
    ///
    /// Out-of-vocabulary n-grams are dropped. Text with no known n-gram
    /// yields the zero vector.
    pub fn transform(&self, text: &str) -> Vec<f32> {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for ngram in self.ngrams(text) {
            if let Some(&idx) = self.vocabulary.get(&ngram) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut features = vec![0.0f32; self.terms.len()];
        if counts.is_empty() {
            return features;
        }

        let weighted: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(idx, count)| (idx, count * self.idf[idx]))
            .collect();
        let norm = weighted.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (idx, w) in weighted {
                features[idx] = (w / norm) as f32;
            }
        }

        features
    }

    /// Transform many documents; row `i` corresponds to `documents[i]`.
    pub fn transform_batch<S: AsRef<str> + Sync>(&self, documents: &[S]) -> Vec<Vec<f32>> {
        debug!("vectorizer: transforming {} documents", documents.len());
        documents
            .par_iter()
            .map(|doc| self.transform(doc.as_ref()))
            .collect()
    }

    /// Number of the text's n-grams (with repetition) found in the vocabulary.
    pub fn matched_count(&self, text: &str) -> usize {
        self.ngrams(text)
            .iter()
            .filter(|ngram| self.vocabulary.contains_key(*ngram))
            .count()
    }

    /// Fraction of the text's n-grams found in the vocabulary, in `[0, 1]`.
    pub fn coverage(&self, text: &str) -> f32 {
        let ngrams = self.ngrams(text);
        if ngrams.is_empty() {
            return 0.0;
        }
        let matched = ngrams
            .iter()
            .filter(|ngram| self.vocabulary.contains_key(*ngram))
            .count();
        matched as f32 / ngrams.len() as f32
    }

    /// Distinct in-vocabulary n-grams of `text`.
    pub fn known_ngrams(&self, text: &str) -> HashSet<String> {
        self.ngrams(text)
            .into_iter()
            .filter(|ngram| self.vocabulary.contains_key(ngram))
            .collect()
    }
}
