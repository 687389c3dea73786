//! Evasion-resistant text normalization.
//!
//! Spam senders dodge keyword filters with look-alike characters (`薇信` for
//! `微信`), punctuation inside keywords (`V.X`) and invisible zero-width code
//! points. [`TextNormalizer`] folds those back into a canonical form.
//!
//! The substitution table and the order of steps are part of the artifact
//! contract: any runtime consuming an exported bundle must normalize input the
//! same way, byte for byte, or its feature vectors drift away from the ones the
//! model was trained on.
//!
//! # Examples
//!
//! ```
//! use adsieve::analysis::normalizer::normalize;
//!
//! assert_eq!(normalize("薇信V.X"), "微信VX");
//! assert_eq!(normalize("加\u{200B}微"), "加微");
//! ```

use lazy_static::lazy_static;
use log::debug;

use crate::analysis::char_filter::CharFilter;
use crate::analysis::char_filter::mapping::MappingCharFilter;
use crate::analysis::char_filter::pattern_replace::PatternReplaceCharFilter;
use crate::error::Result;

/// Known visually-confusable substitutions, in table order.
pub const CONFUSABLE_TABLE: &[(&str, &str)] = &[
    ("薇", "微"),
    ("丄", "上"),
    ("沖", "冲"),
    ("値", "值"),
    ("玳", "代"),
    ("菠", "博"),
    ("菜", "彩"),
    ("Ⓑ", "B"),
    ("Ⓒ", "C"),
    ("v.x", "vx"),
    ("V.X", "VX"),
    ("V X", "VX"),
];

/// Zero-width space through right-to-left mark, plus the byte-order mark.
pub const INVISIBLE_PATTERN: &str = "[\u{200B}-\u{200F}\u{FEFF}]";

lazy_static! {
    static ref DEFAULT_NORMALIZER: TextNormalizer =
        TextNormalizer::new(CONFUSABLE_TABLE).expect("built-in normalization table is valid");
}

/// Normalize `text` with the built-in table.
pub fn normalize(text: &str) -> String {
    DEFAULT_NORMALIZER.normalize(text)
}

/// Normalize possibly-absent text with the built-in table; `None` maps to `""`.
pub fn normalize_opt(text: Option<&str>) -> String {
    DEFAULT_NORMALIZER.normalize_opt(text)
}

/// Canonicalizes raw message text.
///
/// Steps, in order:
///
/// 1. substitute confusables (leftmost-longest, single pass)
/// 2. remove zero-width and byte-order-mark characters
/// 3. if step 2 removed anything, substitute confusables once more, so that
///    `V.\u{200B}X` folds like `V.X` and the whole transform stays idempotent
#[derive(Debug)]
pub struct TextNormalizer {
    substitutions: MappingCharFilter,
    invisible: PatternReplaceCharFilter,
}

impl TextNormalizer {
    /// Build a normalizer over a custom substitution table.
    ///
    /// Idempotence only holds when no replacement value can combine with its
    /// neighbours into another key, which is true of [`CONFUSABLE_TABLE`].
    pub fn new(table: &[(&str, &str)]) -> Result<Self> {
        Ok(Self {
            substitutions: MappingCharFilter::new(table.iter().copied())?,
            invisible: PatternReplaceCharFilter::new(INVISIBLE_PATTERN, "")?,
        })
    }

    /// Normalize `text`.
    pub fn normalize(&self, text: &str) -> String {
        let (substituted, replaced) = self.substitutions.filter(text);
        let (visible, removed) = self.invisible.filter(&substituted);

        if removed == 0 {
            if replaced > 0 {
                debug!("normalizer: {replaced} substitutions");
            }
            return visible;
        }

        debug!("normalizer: {replaced} substitutions, {removed} invisible characters removed");
        self.substitutions.filter(&visible).0
    }

    /// Normalize possibly-absent text; `None` maps to the empty string.
    pub fn normalize_opt(&self, text: Option<&str>) -> String {
        text.map(|t| self.normalize(t)).unwrap_or_default()
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        TextNormalizer::new(CONFUSABLE_TABLE).expect("built-in normalization table is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusables_and_spacing_variant() {
        assert_eq!(normalize("薇信V.X"), "微信VX");
        assert_eq!(normalize("加v.x领取彩金"), "加vx领取彩金");
        assert_eq!(normalize("V X 丄分"), "VX 上分");
        assert_eq!(normalize("ⒷⒸ玳冲値"), "BC代冲值");
    }

    #[test]
    fn test_zero_width_removed() {
        assert_eq!(normalize("微\u{200B}信"), "微信");
        assert_eq!(normalize("\u{FEFF}hello\u{200D}world\u{200F}"), "helloworld");
        // U+2010 is outside the stripped range
        assert_eq!(normalize("a\u{2010}b"), "a\u{2010}b");
    }

    #[test]
    fn test_missing_input_is_empty() {
        assert_eq!(normalize_opt(None), "");
        assert_eq!(normalize_opt(Some("菜")), "彩");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_split_keyword_is_folded() {
        assert_eq!(normalize("V.\u{200B}X"), "VX");
        assert_eq!(normalize("V\u{200C} X"), "VX");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "薇信V.X",
            "V.\u{200B}X",
            "V.V.X",
            "V V X",
            "v.x.v.x",
            "plain text, nothing to do",
            "\u{200B}\u{200B}",
            "Ⓑ\u{FEFF}Ⓒ V\u{200E}.X 菠菜",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn test_deterministic() {
        let normalizer = TextNormalizer::default();
        let input = "限时沖値 V.X 薇信\u{200B}号";
        assert_eq!(normalizer.normalize(input), normalizer.normalize(input));
        assert_eq!(normalizer.normalize(input), normalize(input));
    }
}
