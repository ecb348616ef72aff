//! Case-insensitive highlighting of search terms.

use serde::{Deserialize, Serialize};

/// Markup placed around each highlighted occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightTags {
    #[serde(default = "default_open")]
    pub open: String,
    #[serde(default = "default_close")]
    pub close: String,
}

fn default_open() -> String {
    "<mark>".to_string()
}
fn default_close() -> String {
    "</mark>".to_string()
}

impl Default for HighlightTags {
    fn default() -> Self {
        Self {
            open: default_open(),
            close: default_close(),
        }
    }
}

/// Wrap every case-insensitive occurrence of `term` in `text` with `tags`.
///
/// Occurrences are found left to right and never overlap. The original
/// casing of `text` is preserved inside the markers. Returns `text`
/// unchanged when `term` is empty or absent.
pub fn highlight(text: &str, term: &str, tags: &HighlightTags) -> String {
    let needle: Vec<char> = term.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];
        if let Some(len) = match_len(rest, &needle) {
            out.push_str(&tags.open);
            out.push_str(&rest[..len]);
            out.push_str(&tags.close);
            i += len;
        } else if let Some(ch) = rest.chars().next() {
            out.push(ch);
            i += ch.len_utf8();
        } else {
            break;
        }
    }
    out
}

/// Byte length of the prefix of `haystack` whose lowercase form equals
/// `needle`, if any. A match must consume whole characters.
fn match_len(haystack: &str, needle: &[char]) -> Option<usize> {
    let mut expected = needle.iter();
    for (idx, ch) in haystack.char_indices() {
        for lower in ch.to_lowercase() {
            match expected.next() {
                Some(want) if *want == lower => {}
                _ => return None,
            }
        }
        if expected.len() == 0 {
            return Some(idx + ch.len_utf8());
        }
    }
    None
}
