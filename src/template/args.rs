//! Directive argument extraction
//!
//! Given a directive's full text span (e.g. `$if(a && b) ... $endif`),
//! isolates the parenthesized argument expression by depth counting,
//! skipping over quoted string literals. Line numbers in errors are
//! relative to the directive's own starting line.

use crate::error::{FxError, Result};

/// 1-based line of a byte offset within `text`, starting at `base_line`.
pub fn line_at(text: &str, offset: usize, base_line: usize) -> usize {
    base_line + text[..offset].matches('\n').count()
}

/// Byte offsets of the opening and matching closing parenthesis of a
/// directive's argument. `keyword` is the tag name without the `$`
/// (empty for the `$(...)` shorthand).
pub fn argument_span(definition: &str, keyword: &str, base_line: usize) -> Result<(usize, usize)> {
    let prefix = format!("${}", keyword);
    let rest = definition.strip_prefix(&prefix).ok_or_else(|| {
        FxError::syntax(base_line, format!("expected directive '{prefix}'"))
    })?;
    let after_ws = rest.trim_start();
    if !after_ws.starts_with('(') {
        return Err(FxError::syntax(
            base_line,
            format!("expected '(' after '{prefix}'"),
        ));
    }
    let open = definition.len() - after_ws.len();
    let close = find_matching_paren(definition, open).ok_or_else(|| {
        FxError::syntax(
            line_at(definition, open, base_line),
            format!("unbalanced parenthesis in '{prefix}' argument"),
        )
    })?;
    Ok((open, close))
}

/// Extract the trimmed argument expression of a directive span.
pub fn extract_argument(definition: &str, keyword: &str, base_line: usize) -> Result<String> {
    let (open, close) = argument_span(definition, keyword, base_line)?;
    Ok(definition[open + 1..close].trim().to_string())
}

/// Find the byte offset of the `)` matching the `(` at `open`,
/// ignoring parentheses inside quoted string literals.
pub fn find_matching_paren(text: &str, open: usize) -> Option<usize> {
    debug_assert_eq!(&text[open..open + 1], "(");
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in text[open..].char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split an argument list on top-level commas, honoring quoted
/// literals and nested parentheses. Used for tool arguments, foreach
/// arguments and render locals, where a value may itself be a tool
/// call containing commas.
pub fn split_top_level(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (i, c) in input.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(input[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = input[start..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail.to_string());
    }
    parts.retain(|p| !p.is_empty());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple() {
        let arg = extract_argument("$if(a && b) x $endif", "if", 1).unwrap();
        assert_eq!(arg, "a && b");
    }

    #[test]
    fn test_extract_nested_parens() {
        let arg = extract_argument("$print(@join(a, b))", "print", 1).unwrap();
        assert_eq!(arg, "@join(a, b)");
    }

    #[test]
    fn test_extract_shorthand() {
        let arg = extract_argument("$(user.name)", "", 1).unwrap();
        assert_eq!(arg, "user.name");
    }

    #[test]
    fn test_paren_inside_quotes_ignored() {
        let arg = extract_argument("$print('a ) b')", "print", 1).unwrap();
        assert_eq!(arg, "'a ) b'");
    }

    #[test]
    fn test_missing_close_paren() {
        let err = extract_argument("$if(a && (b) x", "if", 4).unwrap_err();
        match err {
            crate::error::FxError::Syntax { line, message, .. } => {
                assert_eq!(line, 4);
                assert!(message.contains("unbalanced"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_open_paren() {
        assert!(extract_argument("$if a", "if", 1).is_err());
    }

    #[test]
    fn test_error_line_accounts_for_newlines() {
        let err = extract_argument("$if\n\n(a", "if", 10).unwrap_err();
        match err {
            crate::error::FxError::Syntax { line, .. } => assert_eq!(line, 12),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_split_top_level() {
        let parts = split_top_level("n, @pick(a, b), 'x, y'");
        assert_eq!(parts, vec!["n", "@pick(a, b)", "'x, y'"]);
    }

    #[test]
    fn test_split_single() {
        assert_eq!(split_top_level(" item "), vec!["item"]);
        assert!(split_top_level("  ").is_empty());
    }
}
