//! Keyword filtering for displayed bodies
//!
//! Every body in the hierarchy shows a short keyword list. The filter keeps at
//! most [`MAX_KEYWORDS`] entries of at most [`MAX_KEYWORD_CHARS`] characters,
//! drops stop words and duplicates, and never fails.

use lazy_static::lazy_static;
use std::collections::HashSet;

/// Maximum number of keywords shown on one body
pub const MAX_KEYWORDS: usize = 3;

/// Maximum length of a single keyword, in characters
pub const MAX_KEYWORD_CHARS: usize = 6;

/// Keyword of last resort when neither the keywords nor the fallback text
/// yield anything displayable
pub const DEFAULT_KEYWORD: &str = "memo";

lazy_static! {
    static ref STOP_WORDS: HashSet<&'static str> = [
        "task", "tasks", "todo", "item", "thing", "stuff", "etc", "misc", "할일", "작업", "일정",
        "기타", "그리고", "하기",
    ]
    .into_iter()
    .collect();
}

/// Returns true when `word` is on the stop-list (case-insensitive)
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word.trim().to_lowercase().as_str())
}

/// Filters a raw keyword list down to the displayable set.
///
/// Entries are trimmed and cut to [`MAX_KEYWORD_CHARS`] characters; blanks,
/// stop words and case-insensitive duplicates are dropped. Order of first
/// appearance is preserved.
pub fn filter_keywords<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut filtered = Vec::new();

    for keyword in raw {
        if filtered.len() == MAX_KEYWORDS {
            break;
        }

        let trimmed = keyword.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }

        let cut: String = trimmed.chars().take(MAX_KEYWORD_CHARS).collect();
        let cut = cut.trim_end().to_string();
        let key = cut.to_lowercase();
        if cut.is_empty() || STOP_WORDS.contains(key.as_str()) {
            continue;
        }

        if seen.insert(key) {
            filtered.push(cut);
        }
    }

    filtered
}

/// Filters `raw`, substituting a keyword derived from `fallback_text` when the
/// filtered list would be empty.
///
/// The fallback is the first displayable whitespace token of `fallback_text`,
/// then [`DEFAULT_KEYWORD`]. The result is never empty.
pub fn keywords_or_fallback<S: AsRef<str>>(raw: &[S], fallback_text: &str) -> Vec<String> {
    let filtered = filter_keywords(raw);
    if !filtered.is_empty() {
        return filtered;
    }

    fallback_text
        .split_whitespace()
        .find_map(|token| filter_keywords(&[token]).into_iter().next())
        .map(|token| vec![token])
        .unwrap_or_else(|| vec![DEFAULT_KEYWORD.to_string()])
}
