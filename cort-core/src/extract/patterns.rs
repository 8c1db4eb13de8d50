//! Enumerable-item extraction from prose.
//!
//! Used when the generator answers an "alternatives" prompt with prose
//! instead of a JSON array. Three shapes are recognised, in priority order:
//! numbered lists, quoted substrings, and blank-line separated paragraphs.
//! The first shape yielding at least two items wins.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Minimum number of items a pattern must yield to be accepted.
pub const MIN_PATTERN_ITEMS: usize = 2;

/// The prose shape alternatives were recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPattern {
    /// `1. ...`, `2) ...`, `3: ...` line prefixes.
    NumberedList,
    /// Text enclosed in matching quote characters.
    Quoted,
    /// Blocks separated by blank lines.
    Paragraphs,
}

impl std::fmt::Display for TextPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NumberedList => write!(f, "numbered_list"),
            Self::Quoted => write!(f, "quoted"),
            Self::Paragraphs => write!(f, "paragraphs"),
        }
    }
}

static NUMBERED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,3})[.):]\s+(\S.*)$").expect("invalid regex")
});

static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)"|“([^”]+)”"#).expect("invalid regex")
});

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\r?\n").expect("invalid regex"));

static LEADING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{1,3}[.):]|[-*•])\s+").expect("invalid regex")
});

/// Extract alternatives from prose, trying each [`TextPattern`] in order.
///
/// Returns `None` if no pattern yields [`MIN_PATTERN_ITEMS`] items.
pub fn extract_alternatives_from_text(text: &str) -> Option<(TextPattern, Vec<String>)> {
    [
        TextPattern::NumberedList,
        TextPattern::Quoted,
        TextPattern::Paragraphs,
    ]
    .into_iter()
    .find_map(|pattern| {
        let items = extract_with_pattern(text, pattern);
        (items.len() >= MIN_PATTERN_ITEMS).then_some((pattern, items))
    })
}

/// Extract items using a single pattern, without the minimum-count rule.
pub fn extract_with_pattern(text: &str, pattern: TextPattern) -> Vec<String> {
    let raw = match pattern {
        TextPattern::NumberedList => numbered_items(text),
        TextPattern::Quoted => QUOTED
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().to_string())
            .collect(),
        TextPattern::Paragraphs => PARAGRAPH_BREAK
            .split(text)
            .map(str::to_string)
            .collect(),
    };

    raw.iter()
        .map(|item| clean_item(item))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Numbered items, each running until the next numbered line or a blank line.
fn numbered_items(text: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut open = false;

    for line in text.lines() {
        if let Some(caps) = NUMBERED_LINE.captures(line) {
            items.push(caps[2].to_string());
            open = true;
        } else if line.trim().is_empty() {
            open = false;
        } else if open {
            if let Some(last) = items.last_mut() {
                last.push('\n');
                last.push_str(line.trim());
            }
        }
    }

    items
}

/// Trim whitespace, a leading list marker and surrounding quotes.
pub fn clean_item(item: &str) -> String {
    let item = item.trim();
    let item = LEADING_MARKER.replace(item, "");
    let item = item.trim();
    let item = strip_quotes(item);
    item.trim().to_string()
}

fn strip_quotes(s: &str) -> &str {
    for (open, close) in [('"', '"'), ('“', '”'), ('\'', '\'')] {
        if let Some(inner) = s
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_numbered_list() {
        let text = "Not a JSON but has alternatives:\n1. First alternative\n2. Second alternative";
        assert_eq!(
            extract_alternatives_from_text(text),
            Some((
                TextPattern::NumberedList,
                vec![
                    "First alternative".to_string(),
                    "Second alternative".to_string()
                ]
            ))
        );
    }

    #[test]
    fn test_numbered_list_continuation_lines() {
        let text = "1) Start here\n   and keep going\n2) \"Quoted second\"\n\nClosing remarks.";
        let (pattern, items) = extract_alternatives_from_text(text).unwrap();
        assert_eq!(pattern, TextPattern::NumberedList);
        assert_eq!(
            items,
            vec![
                "Start here\nand keep going".to_string(),
                "Quoted second".to_string()
            ]
        );
    }

    #[test]
    fn test_decimal_numbers_are_not_list_items() {
        let text = "Revenue grew 3.5 percent.\n4.2 is the ratio.";
        assert!(extract_with_pattern(text, TextPattern::NumberedList).is_empty());
    }

    #[test]
    fn test_quoted_items() {
        let text = r#"Option A is "Use a cache" and option B is “Batch the writes”."#;
        assert_eq!(
            extract_alternatives_from_text(text),
            Some((
                TextPattern::Quoted,
                vec!["Use a cache".to_string(), "Batch the writes".to_string()]
            ))
        );
    }

    #[test]
    fn test_paragraphs() {
        let text = "First idea spans\ntwo lines.\n\n  Second idea.  \n \nThird idea.";
        assert_eq!(
            extract_alternatives_from_text(text),
            Some((
                TextPattern::Paragraphs,
                vec![
                    "First idea spans\ntwo lines.".to_string(),
                    "Second idea.".to_string(),
                    "Third idea.".to_string()
                ]
            ))
        );
    }

    #[test]
    fn test_single_item_matches_nothing() {
        assert_eq!(extract_alternatives_from_text("Not a JSON response"), None);
        assert_eq!(extract_alternatives_from_text("1. Only one"), None);
    }

    #[test]
    fn test_single_numbered_item_falls_through_to_quotes() {
        let text = "1. \"alpha\" or \"beta\"";
        let (pattern, items) = extract_alternatives_from_text(text).unwrap();
        assert_eq!(pattern, TextPattern::Quoted);
        assert_eq!(items, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_clean_item() {
        assert_eq!(clean_item("  3. \"hello\"  "), "hello");
        assert_eq!(clean_item("- bullet"), "bullet");
        assert_eq!(clean_item("plain"), "plain");
    }
}
