//! Expression tokenizer
//!
//! Splits a raw expression string into trimmed, non-empty tokens on a
//! separator pattern. Quoted substrings are replaced with unique
//! internal markers before the split and restored per-token afterwards,
//! so separators inside string literals are never treated as such.
//! Separator matches are kept as tokens of their own; the condition
//! parser relies on seeing `(`, `)` and operators as standalone tokens.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Default separators: parentheses and commas
    static ref DEFAULT_SEPARATORS: Regex = Regex::new(r"[(),]").unwrap();
    /// Single- or double-quoted string literal (no escapes in the grammar)
    static ref QUOTED: Regex = Regex::new(r#"'[^']*'|"[^"]*""#).unwrap();
    /// Internal marker standing in for a masked literal
    static ref MARKER: Regex = Regex::new("\u{2}q(\\d+)\u{2}").unwrap();
}

/// Tokenize with the default separator pattern (`(`, `)`, `,`).
pub fn tokenize(input: &str) -> Vec<String> {
    tokenize_with(input, &DEFAULT_SEPARATORS)
}

/// Tokenize with a caller-supplied separator pattern.
pub fn tokenize_with(input: &str, separators: &Regex) -> Vec<String> {
    let mut literals: Vec<String> = Vec::new();
    let masked = QUOTED.replace_all(input, |caps: &regex::Captures| {
        let marker = format!("\u{2}q{}\u{2}", literals.len());
        literals.push(caps[0].to_string());
        marker
    });

    let mut tokens = Vec::new();
    let mut last = 0;
    for m in separators.find_iter(&masked) {
        push_token(&mut tokens, &masked[last..m.start()], &literals);
        push_token(&mut tokens, m.as_str(), &literals);
        last = m.end();
    }
    push_token(&mut tokens, &masked[last..], &literals);
    tokens
}

fn push_token(tokens: &mut Vec<String>, raw: &str, literals: &[String]) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let restored = MARKER.replace_all(trimmed, |caps: &regex::Captures| {
        let idx: usize = caps[1].parse().unwrap_or(0);
        literals.get(idx).cloned().unwrap_or_default()
    });
    tokens.push(restored.into_owned());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_split() {
        let tokens = tokenize("@fetch(user, 'name')");
        assert_eq!(tokens, vec!["@fetch", "(", "user", ",", "'name'", ")"]);
    }

    #[test]
    fn test_quoted_separators_are_atomic() {
        let tokens = tokenize("'a, (b)', c");
        assert_eq!(tokens, vec!["'a, (b)'", ",", "c"]);
    }

    #[test]
    fn test_double_quotes() {
        let tokens = tokenize(r#""x,y", z"#);
        assert_eq!(tokens, vec![r#""x,y""#, ",", "z"]);
    }

    #[test]
    fn test_whitespace_and_empty_tokens_dropped() {
        let tokens = tokenize("  a ,  , b  ");
        assert_eq!(tokens, vec!["a", ",", ",", "b"]);
    }

    #[test]
    fn test_custom_separator_pattern() {
        let ops = Regex::new(r"&&|\|\||[()]").unwrap();
        let tokens = tokenize_with("a && (b || c)", &ops);
        assert_eq!(tokens, vec!["a", "&&", "(", "b", "||", "c", ")"]);
    }

    #[test]
    fn test_marker_restored_inside_token() {
        let tokens = tokenize("key='hello, world'");
        assert_eq!(tokens, vec!["key='hello, world'"]);
    }
}
