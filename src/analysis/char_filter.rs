//! Char filters that rewrite raw message text before tokenization.
//!
//! # Available Filters
//!
//! - [`mapping::MappingCharFilter`] - exact substring substitution table
//! - [`pattern_replace::PatternReplaceCharFilter`] - regex-based replacement or removal
//!
//! # Examples
//!
//! ```
//! use adsieve::analysis::char_filter::CharFilter;
//! use adsieve::analysis::char_filter::pattern_replace::PatternReplaceCharFilter;
//!
//! let filter = PatternReplaceCharFilter::new(r"-", "").unwrap();
//! let (output, rewrites) = filter.filter("a-b");
//! assert_eq!(output, "ab");
//! assert_eq!(rewrites, 1);
//! ```

/// Trait for character filters that transform text before tokenization.
pub trait CharFilter: Send + Sync {
    /// Apply this filter to the input text, returning the rewritten text and
    /// the number of spans that were rewritten.
    fn filter(&self, input: &str) -> (String, usize);
}

pub mod mapping;
pub mod pattern_replace;
