//! Word tokenization and n-gram extraction.
//!
//! The word-boundary rule here is shared by vectorizer fitting, vectorizer
//! transform and any runtime that consumes exported artifacts:
//!
//! - every CJK unified ideograph in `U+4E00..=U+9FA5` is a token by itself
//! - any other maximal run of letters (general category `L*`) and decimal
//!   digits (`Nd`) from the Basic Multilingual Plane is a token, lowercased
//! - everything else separates tokens: whitespace, punctuation, symbols,
//!   combining marks, non-decimal numerals such as `①` or `²`, enclosed letters
//!   such as `Ⓓ`, and every character outside the BMP
//!
//! # Examples
//!
//! ```
//! use adsieve::analysis::tokenizer::{NGramRange, WordTokenizer};
//!
//! let tokenizer = WordTokenizer::new();
//! assert_eq!(tokenizer.tokenize("加微信VX123!"), vec!["加", "微", "信", "vx123"]);
//!
//! let ngrams = NGramRange::new(1, 2).unwrap().extract(&tokenizer.tokenize("a b c"));
//! assert_eq!(ngrams, vec!["a", "b", "c", "a b", "b c"]);
//! ```

use serde::{Deserialize, Serialize};
use unicode_general_category::{GeneralCategory, get_general_category};

use crate::error::{AdsieveError, Result};

/// Splits text into lowercase word tokens.
#[derive(Clone, Debug, Default)]
pub struct WordTokenizer;

impl WordTokenizer {
    /// Create a new word tokenizer.
    pub fn new() -> Self {
        WordTokenizer
    }

    fn is_cjk(c: char) -> bool {
        matches!(c, '\u{4E00}'..='\u{9FA5}')
    }

    fn is_word_char(c: char) -> bool {
        (c as u32) <= 0xFFFF
            && matches!(
                get_general_category(c),
                GeneralCategory::UppercaseLetter
                    | GeneralCategory::LowercaseLetter
                    | GeneralCategory::TitlecaseLetter
                    | GeneralCategory::ModifierLetter
                    | GeneralCategory::OtherLetter
                    | GeneralCategory::DecimalNumber
            )
    }

    /// Tokenize `text` according to the module-level rule.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut word_start: Option<usize> = None;

        for (offset, c) in text.char_indices() {
            if Self::is_cjk(c) {
                if let Some(start) = word_start.take() {
                    tokens.push(text[start..offset].to_lowercase());
                }
                tokens.push(c.to_string());
            } else if Self::is_word_char(c) {
                word_start.get_or_insert(offset);
            } else if let Some(start) = word_start.take() {
                tokens.push(text[start..offset].to_lowercase());
            }
        }

        if let Some(start) = word_start {
            tokens.push(text[start..].to_lowercase());
        }

        tokens
    }

    fn name(&self) -> &'static str {
        "word"
    }
}

impl std::fmt::Display for WordTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive n-gram length range, serialized as `[min_n, max_n]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[usize; 2]", into = "[usize; 2]")]
pub struct NGramRange {
    min_n: usize,
    max_n: usize,
}

impl NGramRange {
    /// Create a range; requires `1 <= min_n <= max_n`.
    pub fn new(min_n: usize, max_n: usize) -> Result<Self> {
        if min_n == 0 || min_n > max_n {
            return Err(AdsieveError::invalid_config(format!(
                "invalid ngram range [{min_n}, {max_n}]"
            )));
        }
        Ok(Self { min_n, max_n })
    }

    pub fn min_n(&self) -> usize {
        self.min_n
    }

    pub fn max_n(&self) -> usize {
        self.max_n
    }

    /// All contiguous n-grams of `tokens`, shortest first, each joined by a
    /// single space. Repeated n-grams are kept.
    pub fn extract(&self, tokens: &[String]) -> Vec<String> {
        let mut ngrams = Vec::new();
        for n in self.min_n..=self.max_n.min(tokens.len()) {
            ngrams.extend(tokens.windows(n).map(|window| window.join(" ")));
        }
        ngrams
    }
}

impl Default for NGramRange {
    fn default() -> Self {
        Self { min_n: 1, max_n: 3 }
    }
}

impl TryFrom<[usize; 2]> for NGramRange {
    type Error = AdsieveError;

    fn try_from(value: [usize; 2]) -> Result<Self> {
        NGramRange::new(value[0], value[1])
    }
}

impl From<NGramRange> for [usize; 2] {
    fn from(range: NGramRange) -> Self {
        [range.min_n, range.max_n]
    }
}
