//! Substring substitution char filter.

use aho_corasick::{AhoCorasick, MatchKind};

use super::CharFilter;
use crate::error::{AdsieveError, Result};

/// Replaces every occurrence of a table key with its value.
///
/// Matching is exact, non-overlapping and leftmost-longest, scanning the input
/// once from left to right. Inserted replacements are never re-scanned.
pub struct MappingCharFilter {
    ac: AhoCorasick,
    replacements: Vec<String>,
}

impl std::fmt::Debug for MappingCharFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingCharFilter")
            .field("patterns", &self.ac.patterns_len())
            .finish()
    }
}

impl MappingCharFilter {
    /// Build a filter from `(key, replacement)` pairs.
    ///
    /// Empty or duplicate keys are rejected.
    pub fn new<K, V, I>(mapping: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut keys: Vec<String> = Vec::new();
        let mut replacements = Vec::new();

        for (k, v) in mapping {
            let key = k.into();
            if key.is_empty() {
                return Err(AdsieveError::invalid_argument(
                    "mapping keys must not be empty",
                ));
            }
            if keys.contains(&key) {
                return Err(AdsieveError::invalid_argument(format!(
                    "duplicate mapping key {key:?}"
                )));
            }
            keys.push(key);
            replacements.push(v.into());
        }

        let ac = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&keys)
            .map_err(|e| AdsieveError::Anyhow(anyhow::Error::from(e)))?;

        Ok(Self { ac, replacements })
    }
}

impl CharFilter for MappingCharFilter {
    fn filter(&self, input: &str) -> (String, usize) {
        let mut output = String::with_capacity(input.len());
        let mut rewrites = 0;
        let mut last_match_end = 0;

        for m in self.ac.find_iter(input) {
            output.push_str(&input[last_match_end..m.start()]);
            output.push_str(&self.replacements[m.pattern().as_usize()]);
            rewrites += 1;
            last_match_end = m.end();
        }

        output.push_str(&input[last_match_end..]);

        (output, rewrites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_char_filter() {
        let filter = MappingCharFilter::new([("ph", "f"), ("qu", "k")]).unwrap();
        let (output, rewrites) = filter.filter("phone queue");

        assert_eq!(output, "fone keue");
        assert_eq!(rewrites, 2);

        let (output, rewrites) = filter.filter("none");
        assert_eq!(output, "none");
        assert_eq!(rewrites, 0);
    }

    #[test]
    fn test_mapping_is_single_pass() {
        // "a" -> "b" and "b" -> "c" must not chain into "a" -> "c"
        let filter = MappingCharFilter::new([("a", "b"), ("b", "c")]).unwrap();
        let (output, _) = filter.filter("ab");
        assert_eq!(output, "bc");
    }

    #[test]
    fn test_mapping_overlap_prefers_longest() {
        let filter = MappingCharFilter::new([("ab", "1"), ("abc", "2")]).unwrap();
        let (output, rewrites) = filter.filter("abcab");
        assert_eq!(output, "21");
        assert_eq!(rewrites, 2);
    }

    #[test]
    fn test_mapping_multibyte() {
        let filter = MappingCharFilter::new([("薇", "微")]).unwrap();

        let (output, rewrites) = filter.filter("加薇信薇");
        assert_eq!(output, "加微信微");
        assert_eq!(rewrites, 2);
    }

    #[test]
    fn test_mapping_rejects_empty_and_duplicate_keys() {
        assert!(MappingCharFilter::new([("", "x")]).is_err());
        assert!(MappingCharFilter::new([("a", "x"), ("a", "y")]).is_err());
    }
}
