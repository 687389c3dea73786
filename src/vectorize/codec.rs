//! Portable vectorizer artifacts.
//!
//! A fitted vectorizer is stored as three files that a runtime without any
//! training framework can parse:
//!
//! - vocabulary: one n-gram per line, UTF-8, line `i` holds index `i`
//! - IDF: one decimal float per line, aligned with the vocabulary
//! - config: JSON `{ "max_features", "ngram_range": [min, max], "vocab_size" }`
//!
//! `vocab_size` must equal the line count of both text files; [`load`]
//! refuses any bundle where it does not.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::analysis::tokenizer::NGramRange;
use crate::error::{AdsieveError, Result};
use crate::vectorize::tfidf::{FittedVectorizer, VectorizerConfig};

/// Locations of the three vectorizer files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorizerPaths {
    pub vocabulary: PathBuf,
    pub idf: PathBuf,
    pub config: PathBuf,
}

impl VectorizerPaths {
    /// `<dir>/<prefix>_vocabulary.txt`, `<dir>/<prefix>_idf.txt`,
    /// `<dir>/<prefix>_config.json`
    pub fn with_prefix<P: AsRef<Path>>(dir: P, prefix: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            vocabulary: dir.join(format!("{prefix}_vocabulary.txt")),
            idf: dir.join(format!("{prefix}_idf.txt")),
            config: dir.join(format!("{prefix}_config.json")),
        }
    }
}

/// The config record written next to vocabulary and IDF files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub max_features: usize,
    pub ngram_range: NGramRange,
    pub vocab_size: usize,
}

impl ArtifactConfig {
    pub fn of(fitted: &FittedVectorizer) -> Self {
        Self {
            max_features: fitted.config().max_features,
            ngram_range: fitted.config().ngram_range,
            vocab_size: fitted.vocabulary_size(),
        }
    }
}

/// Write `fitted` to `paths`.
pub fn save(fitted: &FittedVectorizer, paths: &VectorizerPaths) -> Result<ArtifactConfig> {
    let mut vocab = BufWriter::new(File::create(&paths.vocabulary)?);
    for term in fitted.terms() {
        writeln!(vocab, "{term}")?;
    }
    vocab.flush()?;

    let mut idf = BufWriter::new(File::create(&paths.idf)?);
    for weight in fitted.idf() {
        writeln!(idf, "{weight:?}")?;
    }
    idf.flush()?;

    let config = ArtifactConfig::of(fitted);
    fs::write(&paths.config, serde_json::to_string_pretty(&config)?)?;

    info!(
        "codec: wrote vocabulary of {} to {}",
        config.vocab_size,
        paths.vocabulary.display()
    );
    Ok(config)
}

/// Read a fitted vectorizer back from `paths`.
pub fn load(paths: &VectorizerPaths) -> Result<FittedVectorizer> {
    let config: ArtifactConfig = serde_json::from_str(&fs::read_to_string(&paths.config)?)
        .map_err(|e| AdsieveError::corrupt(format!("{}: {e}", paths.config.display())))?;

    let terms: Vec<String> = fs::read_to_string(&paths.vocabulary)?
        .lines()
        .map(str::to_string)
        .collect();

    let idf = fs::read_to_string(&paths.idf)?
        .lines()
        .enumerate()
        .map(|(line, value)| {
            value.trim().parse::<f64>().map_err(|e| {
                AdsieveError::corrupt(format!(
                    "{} line {}: {value:?}: {e}",
                    paths.idf.display(),
                    line + 1
                ))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    if terms.len() != config.vocab_size || idf.len() != config.vocab_size {
        return Err(AdsieveError::corrupt(format!(
            "config declares vocab_size {} but vocabulary has {} lines and idf has {} lines",
            config.vocab_size,
            terms.len(),
            idf.len()
        )));
    }

    FittedVectorizer::from_parts(
        VectorizerConfig {
            max_features: config.max_features,
            ngram_range: config.ngram_range,
        },
        terms,
        idf,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorize::tfidf::TfIdfVectorizer;
    use tempfile::TempDir;

    fn fitted() -> FittedVectorizer {
        TfIdfVectorizer::default()
            .fit(&["限时 充值 送 彩金", "see you at lunch", "充值 vx 8888"])
            .unwrap()
    }

    #[test]
    fn test_save_layout() {
        let dir = TempDir::new().unwrap();
        let paths = VectorizerPaths::with_prefix(dir.path(), "ad");
        let fitted = fitted();
        let config = save(&fitted, &paths).unwrap();

        let vocab = fs::read_to_string(&paths.vocabulary).unwrap();
        let idf = fs::read_to_string(&paths.idf).unwrap();
        assert_eq!(vocab.lines().count(), config.vocab_size);
        assert_eq!(idf.lines().count(), config.vocab_size);
        assert!(vocab.ends_with('\n'));

        for (i, (term, weight)) in vocab.lines().zip(idf.lines()).enumerate() {
            assert_eq!(term, fitted.terms()[i]);
            assert_eq!(weight.parse::<f64>().unwrap(), fitted.idf()[i]);
        }

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.config).unwrap()).unwrap();
        assert_eq!(json["max_features"], 8000);
        assert_eq!(json["ngram_range"], serde_json::json!([1, 3]));
        assert_eq!(json["vocab_size"], config.vocab_size);
    }

    #[test]
    fn test_load_restores_transform() {
        let dir = TempDir::new().unwrap();
        let paths = VectorizerPaths::with_prefix(dir.path(), "topic");
        let fitted = fitted();
        save(&fitted, &paths).unwrap();

        let loaded = load(&paths).unwrap();
        assert_eq!(loaded.terms(), fitted.terms());
        assert_eq!(loaded.idf(), fitted.idf());
        assert_eq!(loaded.config(), fitted.config());
        let text = "充值 送 彩金 lunch";
        assert_eq!(loaded.transform(text), fitted.transform(text));
    }

    #[test]
    fn test_load_rejects_line_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let paths = VectorizerPaths::with_prefix(dir.path(), "ad");
        save(&fitted(), &paths).unwrap();

        let idf = fs::read_to_string(&paths.idf).unwrap();
        let truncated: String = idf.lines().skip(1).map(|l| format!("{l}\n")).collect();
        fs::write(&paths.idf, truncated).unwrap();

        assert!(matches!(load(&paths), Err(AdsieveError::CorruptArtifact(_))));
    }

    #[test]
    fn test_load_rejects_bad_idf_value() {
        let dir = TempDir::new().unwrap();
        let paths = VectorizerPaths::with_prefix(dir.path(), "ad");
        save(&fitted(), &paths).unwrap();

        let mut idf = fs::read_to_string(&paths.idf).unwrap();
        idf.replace_range(0..1, "x");
        fs::write(&paths.idf, idf).unwrap();

        assert!(matches!(load(&paths), Err(AdsieveError::CorruptArtifact(_))));
    }

    #[test]
    fn test_load_rejects_wrong_vocab_size() {
        let dir = TempDir::new().unwrap();
        let paths = VectorizerPaths::with_prefix(dir.path(), "ad");
        let config = save(&fitted(), &paths).unwrap();

        let wrong = ArtifactConfig {
            vocab_size: config.vocab_size + 1,
            ..config
        };
        fs::write(&paths.config, serde_json::to_string(&wrong).unwrap()).unwrap();

        assert!(matches!(load(&paths), Err(AdsieveError::CorruptArtifact(_))));
    }
}
