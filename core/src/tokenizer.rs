use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\b[a-zA-Z]+\b").expect("valid regex");
}

/// Tokens of this length or shorter are not index terms.
pub const SHORT_TOKEN_LEN: usize = 2;

/// Tokenize text into its set of index terms: lowercase ASCII-letter runs longer than two characters.
///
/// Words containing non-ASCII letters (e.g. "café") do not sit on ASCII word boundaries and are dropped whole.
pub fn tokenize(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.len() > SHORT_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

/// Whitespace-split token count of raw text; this is what `word_count` records.
pub fn raw_word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Hello, World! AB cat");
        let expected: HashSet<String> = ["hello", "world", "cat"].iter().map(|s| s.to_string()).collect();
        assert_eq!(t, expected);
    }

    #[test]
    fn raw_count_keeps_duplicates_and_punctuation() {
        assert_eq!(raw_word_count("the the  cat, sat\n on 42"), 6);
        assert_eq!(raw_word_count("   "), 0);
    }
}
