//! Rich-text to plain-text conversion for work item fields.
//!
//! Regex based on purpose: fields are user-authored HTML fragments that are
//! frequently unbalanced, and the output only needs to be readable.

use std::sync::LazyLock;

use regex::Regex;

static BREAKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|tr|ul|ol)\s*>").expect("static regex")
});
static LIST_ITEMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<li(\s[^>]*)?>").expect("static regex"));
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("static regex"));

/// Strip tags, decode common entities and tidy whitespace.
pub fn strip_html(input: &str) -> String {
    let text = BREAKS.replace_all(input, "\n");
    let text = LIST_ITEMS.replace_all(&text, "\n- ");
    let text = TAGS.replace_all(&text, "");
    let text = decode_entities(&text);

    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = SPACES.replace_all(line, " ").trim().to_string();
        if line.is_empty() && lines.last().is_none_or(String::is_empty) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines.join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Cut `text` to at most `max` characters, marking the cut with "...".
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str("...");
    cut
}
