use regex::Regex;

use super::CharFilter;
use crate::error::{AdsieveError, Result};

/// A char filter that replaces every match of a regex pattern.
///
/// With an empty replacement it removes the matched characters.
#[derive(Debug)]
pub struct PatternReplaceCharFilter {
    pattern: Regex,
    replacement: String,
}

impl PatternReplaceCharFilter {
    /// Create a new pattern replace char filter.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)
                .map_err(|e| AdsieveError::Anyhow(anyhow::Error::from(e)))?,
            replacement: replacement.to_string(),
        })
    }
}

impl CharFilter for PatternReplaceCharFilter {
    fn filter(&self, input: &str) -> (String, usize) {
        let mut output = String::with_capacity(input.len());
        let mut rewrites = 0;
        let mut last_match_end = 0;

        for m in self.pattern.find_iter(input) {
            output.push_str(&input[last_match_end..m.start()]);
            output.push_str(&self.replacement);
            rewrites += 1;
            last_match_end = m.end();
        }

        output.push_str(&input[last_match_end..]);

        (output, rewrites)
    }
}
