//! Text normalization helpers shared by grouping, matching, and attachment.

use crate::constants::script::{
    KATAKANA_FOLD_END, KATAKANA_FOLD_START, KATAKANA_HIRAGANA_OFFSET,
};

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_inline_whitespace<T: AsRef<str>>(text: T) -> String {
    let mut normalized = String::new();
    let mut seen_space = false;
    for ch in text.as_ref().chars() {
        if ch.is_whitespace() {
            if !seen_space {
                normalized.push(' ');
                seen_space = true;
            }
        } else {
            normalized.push(ch);
            seen_space = false;
        }
    }
    normalized.trim().to_string()
}

/// Fold katakana to hiragana, leaving every other character untouched.
///
/// The long-vowel mark `ー` and the middle dot are not kana letters and pass
/// through unchanged.
pub fn fold_katakana<T: AsRef<str>>(text: T) -> String {
    text.as_ref().chars().map(fold_katakana_char).collect()
}

fn fold_katakana_char(ch: char) -> char {
    if (KATAKANA_FOLD_START..=KATAKANA_FOLD_END).contains(&ch) {
        char::from_u32(ch as u32 - KATAKANA_HIRAGANA_OFFSET).unwrap_or(ch)
    } else {
        ch
    }
}

/// Script-normalized form used for reading comparisons.
pub fn normalize_script<T: AsRef<str>>(text: T) -> String {
    fold_katakana(normalize_inline_whitespace(text))
}
