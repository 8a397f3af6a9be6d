//! Metadata extraction from document headers (`Title:`, `Author:`, `Language:` lines).

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TITLE: Regex = field_regex("title");
    static ref AUTHOR: Regex = field_regex("author");
    static ref LANGUAGE: Regex = field_regex("language");
}

fn field_regex(label: &str) -> Regex {
    Regex::new(&format!(r"(?im)^[ \t]*{label}:[ \t]*(.*)$")).expect("valid regex")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    pub title: String,
    pub author: String,
    pub language: String,
}

/// Extract header fields. The first matching line wins; a missing field is an empty string.
pub fn parse_header(header: &str) -> HeaderFields {
    HeaderFields {
        title: first_match(&TITLE, header),
        author: first_match(&AUTHOR, header),
        language: first_match(&LANGUAGE, header),
    }
}

fn first_match(re: &Regex, header: &str) -> String {
    re.captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}
