//! Text helpers shared by the session and sub-agent parsers

use regex::Regex;
use std::sync::LazyLock;

/// Blocks the CLI injects into user turns that are not part of what the human typed.
const INJECTED_TAGS: &[&str] = &[
    "local-command-caveat",
    "system-reminder",
    "command-name",
    "command-message",
    "command-args",
    "local-command-stdout",
];

static INJECTED_MARKUP: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    INJECTED_TAGS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?s)<{tag}>.*?</{tag}>")).expect("valid tag regex"))
        .collect()
});

/// Strip injected control markup from a user prompt and trim it.
pub fn clean_prompt(text: &str) -> String {
    let mut cleaned = text.to_string();
    for re in INJECTED_MARKUP.iter() {
        if re.is_match(&cleaned) {
            cleaned = re.replace_all(&cleaned, "").into_owned();
        }
    }
    cleaned.trim().to_string()
}

/// Keep at most `max` characters, appending `...` when anything was cut.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Keep at most `max` characters, without a marker.
pub fn clip(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
