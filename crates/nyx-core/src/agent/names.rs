//! Self-declared name detection

use regex::Regex;
use std::sync::OnceLock;

const MAX_NAME_CHARS: usize = 32;

/// Words that follow "call me" and friends without being a name
const NOT_NAMES: &[&str] = &[
    "a", "an", "the", "not", "no", "never", "just", "only", "maybe", "please", "again", "back",
    "later", "now", "soon", "today", "tonight", "tomorrow", "yesterday", "when", "whenever", "if",
    "after", "before", "once", "as", "at", "by", "in", "on", "for", "with", "about", "what",
    "whatever", "anything", "something", "nothing", "it", "that", "this", "so", "too", "and", "or",
    "but", "up", "out", "sometime", "asap", "secret", "unknown", "private", "irrelevant",
    "important", "actually", "really", "also", "still",
];

fn pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\b(?:my\s+name\s+is|call\s+me|i\s+go\s+by)\s+([\p{L}'\-]+)").ok())
        .as_ref()
}

/// Name a user asked to be called, e.g. "my name is Alex" → `Alex`
///
/// Recognises "my name is X", "call me X" and "i go by X" anywhere in the
/// text, case-insensitively. Only the first word is taken, as written, and
/// common function and time words ("call me back", "my name is not ...")
/// are rejected.
pub fn detect_declared_name(text: &str) -> Option<String> {
    let captures = pattern()?.captures(text)?;
    let name = captures.get(1)?.as_str().trim_matches(|c| c == '\'' || c == '-');

    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return None;
    }
    if NOT_NAMES.contains(&name.to_lowercase().as_str()) {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_declarations() {
        assert_eq!(detect_declared_name("my name is Alex").as_deref(), Some("Alex"));
        assert_eq!(detect_declared_name("Hey! MY NAME IS alex, nice to meet you").as_deref(), Some("alex"));
        assert_eq!(detect_declared_name("please call me Jean-Luc.").as_deref(), Some("Jean-Luc"));
        assert_eq!(detect_declared_name("I go by O'Neil").as_deref(), Some("O'Neil"));
        assert_eq!(detect_declared_name("ok, call me Zoë").as_deref(), Some("Zoë"));
    }

    #[test]
    fn test_ignores_other_text() {
        assert_eq!(detect_declared_name("what is my name?"), None);
        assert_eq!(detect_declared_name("my name is 1234"), None);
        assert_eq!(detect_declared_name("the enemy name is Bob"), None);
        assert_eq!(detect_declared_name(&format!("call me {}", "a".repeat(40))), None);
    }

    #[test]
    fn test_ignores_phrases_that_are_not_names() {
        assert_eq!(detect_declared_name("call me back later"), None);
        assert_eq!(detect_declared_name("can you call me tomorrow"), None);
        assert_eq!(detect_declared_name("my name is not important"), None);
        assert_eq!(detect_declared_name("Call me when it's done"), None);
        assert_eq!(detect_declared_name("call me a taxi"), None);
        assert_eq!(detect_declared_name("call me Maybe").as_deref(), None);
        assert_eq!(detect_declared_name("call me Sam later").as_deref(), Some("Sam"));
    }
}
