//! Tag scanner
//!
//! Finds top-level directive tags in a template, validates tag balance
//! and nesting with an explicit stack, and extracts each directive's
//! full text span and line number. Tags nested inside an open block
//! are not registered here: they are re-discovered when that block's
//! body is recursively parsed by the builder.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{FxError, Result};
use crate::template::args::{find_matching_paren, line_at};

lazy_static! {
    /// Union of all tag keywords. Closing tags come first so the
    /// alternation cannot stop at a shorter open-tag prefix, and the
    /// `$(` shorthand comes last.
    pub static ref TAG_RE: Regex = Regex::new(
        r"\$endif|\$endforeach|\$endrender|\$endreplace|\$if\s*\(|\$foreach\s*\(|\$render\s*\(|\$replace\s*\(|\$include\s*\(|\$print\s*\(|\$log\s*\(|\$place\s*\(|\$\("
    )
    .unwrap();
}

/// Kinds of directive a Statement can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    If,
    ForEach,
    Render,
    Include,
    Print,
    ShortPrint,
    Log,
    Place,
}

impl TagKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            TagKind::If => "if",
            TagKind::ForEach => "foreach",
            TagKind::Render => "render",
            TagKind::Include => "include",
            TagKind::Print => "print",
            TagKind::ShortPrint => "",
            TagKind::Log => "log",
            TagKind::Place => "place",
        }
    }
}

/// The scanner's raw capture of one directive occurrence
#[derive(Debug, Clone)]
pub struct Statement {
    /// Full text span, from the opening tag through the matching
    /// closing tag (or closing parenthesis for standalone tags)
    pub definition: String,
    pub kind: TagKind,
    /// 1-based line of the opening tag
    pub line: usize,
}

/// What one regex match turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawTag {
    OpenIf,
    OpenForEach,
    OpenRender,
    OpenReplace,
    CloseIf,
    CloseForEach,
    CloseRender,
    CloseReplace,
    Standalone(TagKind),
}

fn classify(matched: &str) -> RawTag {
    if matched.starts_with("$endif") {
        RawTag::CloseIf
    } else if matched.starts_with("$endforeach") {
        RawTag::CloseForEach
    } else if matched.starts_with("$endrender") {
        RawTag::CloseRender
    } else if matched.starts_with("$endreplace") {
        RawTag::CloseReplace
    } else if matched.starts_with("$if") {
        RawTag::OpenIf
    } else if matched.starts_with("$foreach") {
        RawTag::OpenForEach
    } else if matched.starts_with("$render") {
        RawTag::OpenRender
    } else if matched.starts_with("$replace") {
        RawTag::OpenReplace
    } else if matched.starts_with("$include") {
        RawTag::Standalone(TagKind::Include)
    } else if matched.starts_with("$print") {
        RawTag::Standalone(TagKind::Print)
    } else if matched.starts_with("$log") {
        RawTag::Standalone(TagKind::Log)
    } else if matched.starts_with("$place") {
        RawTag::Standalone(TagKind::Place)
    } else {
        RawTag::Standalone(TagKind::ShortPrint)
    }
}

fn tag_name(tag: RawTag) -> &'static str {
    match tag {
        RawTag::OpenIf => "$if",
        RawTag::OpenForEach => "$foreach",
        RawTag::OpenRender => "$render",
        RawTag::OpenReplace => "$replace",
        RawTag::CloseIf => "$endif",
        RawTag::CloseForEach => "$endforeach",
        RawTag::CloseRender => "$endrender",
        RawTag::CloseReplace => "$endreplace",
        RawTag::Standalone(TagKind::Include) => "$include",
        RawTag::Standalone(TagKind::Print) => "$print",
        RawTag::Standalone(TagKind::ShortPrint) => "$(",
        RawTag::Standalone(TagKind::Log) => "$log",
        RawTag::Standalone(TagKind::Place) => "$place",
        RawTag::Standalone(_) => "$?",
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    tag: RawTag,
    start: usize,
    line: usize,
}

/// Scan a template for its top-level Statements.
///
/// `base_line` offsets reported line numbers so that recursive scans
/// of block bodies still report absolute template lines.
/// `place_allowed` rejects top-level `$place` tags when the text being
/// scanned is an `$if`/`$foreach`/replacement body.
pub fn scan(template: &str, base_line: usize, place_allowed: bool) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();

    for m in TAG_RE.find_iter(template) {
        let line = line_at(template, m.start(), base_line);
        let tag = classify(m.as_str());
        match tag {
            RawTag::OpenIf | RawTag::OpenForEach | RawTag::OpenRender => {
                stack.push(OpenBlock {
                    tag,
                    start: m.start(),
                    line,
                });
            }
            RawTag::OpenReplace => {
                // only valid directly inside an open $render
                match stack.last() {
                    Some(top) if top.tag == RawTag::OpenRender => {
                        stack.push(OpenBlock {
                            tag,
                            start: m.start(),
                            line,
                        });
                    }
                    _ => {
                        return Err(FxError::syntax(line, "unexpected tag $replace"));
                    }
                }
            }
            RawTag::CloseIf | RawTag::CloseForEach | RawTag::CloseRender | RawTag::CloseReplace => {
                let expected = match tag {
                    RawTag::CloseIf => RawTag::OpenIf,
                    RawTag::CloseForEach => RawTag::OpenForEach,
                    RawTag::CloseRender => RawTag::OpenRender,
                    _ => RawTag::OpenReplace,
                };
                match stack.pop() {
                    Some(top) if top.tag == expected => {
                        if stack.is_empty() {
                            let kind = match top.tag {
                                RawTag::OpenIf => TagKind::If,
                                RawTag::OpenForEach => TagKind::ForEach,
                                _ => TagKind::Render,
                            };
                            statements.push(Statement {
                                definition: template[top.start..m.end()].to_string(),
                                kind,
                                line: top.line,
                            });
                        }
                    }
                    _ => {
                        return Err(FxError::syntax(
                            line,
                            format!("unexpected tag {}", tag_name(tag)),
                        ));
                    }
                }
            }
            RawTag::Standalone(kind) => {
                if !stack.is_empty() {
                    continue;
                }
                if kind == TagKind::Place && !place_allowed {
                    return Err(FxError::syntax(line, "unexpected tag $place"));
                }
                let open = m.start() + m.as_str().len() - 1;
                let close = find_matching_paren(template, open).ok_or_else(|| {
                    FxError::syntax(
                        line,
                        format!("unbalanced parenthesis in {}", tag_name(tag)),
                    )
                })?;
                statements.push(Statement {
                    definition: template[m.start()..=close].to_string(),
                    kind,
                    line,
                });
            }
        }
    }

    if let Some(top) = stack.last() {
        return Err(FxError::syntax(
            top.line,
            format!("unclosed tag {}", tag_name(top.tag)),
        ));
    }

    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_statements_in_scan_order() {
        let statements = scan("a $print(x) b $include('head') c $(y)", 1, true).unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].kind, TagKind::Print);
        assert_eq!(statements[0].definition, "$print(x)");
        assert_eq!(statements[1].kind, TagKind::Include);
        assert_eq!(statements[2].kind, TagKind::ShortPrint);
        assert_eq!(statements[2].definition, "$(y)");
    }

    #[test]
    fn test_block_statement_spans_whole_body() {
        let statements = scan("x $if(a) body $endif y", 1, true).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].kind, TagKind::If);
        assert_eq!(statements[0].definition, "$if(a) body $endif");
    }

    #[test]
    fn test_nested_same_kind_not_closed_early() {
        let tpl = "$if(a) $if(b) inner $endif outer $endif";
        let statements = scan(tpl, 1, true).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].definition, tpl);
    }

    #[test]
    fn test_standalone_inside_block_not_registered() {
        let statements = scan("$foreach(n, items) $print(n) $endforeach", 1, true).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].kind, TagKind::ForEach);
    }

    #[test]
    fn test_mixed_nesting() {
        let tpl = "$if(a) $foreach(n, items) $(n) $endforeach $endif $print(done)";
        let statements = scan(tpl, 1, true).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].kind, TagKind::If);
        assert_eq!(statements[1].kind, TagKind::Print);
    }

    #[test]
    fn test_unclosed_if_reports_line() {
        let err = scan("line one\n$if(a) body", 1, true).unwrap_err();
        match err {
            FxError::Syntax { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("unclosed tag $if"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_extra_endforeach() {
        let err = scan("$endforeach", 1, true).unwrap_err();
        match err {
            FxError::Syntax { message, .. } => {
                assert!(message.contains("unexpected tag $endforeach"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_improper_interleaving() {
        let err = scan("$if(a) $foreach(n, items) $endif $endforeach", 1, true).unwrap_err();
        assert!(matches!(err, FxError::Syntax { .. }));
    }

    #[test]
    fn test_replace_outside_render_is_error() {
        let err = scan("$replace('k') x $endreplace", 1, true).unwrap_err();
        match err {
            FxError::Syntax { message, .. } => {
                assert!(message.contains("unexpected tag $replace"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_replace_inside_if_inside_render_is_error() {
        let tpl = "$render('x') $if(a) $replace('k') $endreplace $endif $endrender";
        assert!(scan(tpl, 1, true).is_err());
    }

    #[test]
    fn test_replace_inside_render_accepted() {
        let tpl = "$render('x') $replace('k') body $endreplace $endrender";
        let statements = scan(tpl, 1, true).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].kind, TagKind::Render);
        assert_eq!(statements[0].definition, tpl);
    }

    #[test]
    fn test_place_rejected_when_not_allowed() {
        let err = scan("$place('content')", 1, false).unwrap_err();
        match err {
            FxError::Syntax { message, .. } => {
                assert!(message.contains("unexpected tag $place"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(scan("$place('content')", 1, true).is_ok());
    }

    #[test]
    fn test_line_numbers_with_base_offset() {
        let statements = scan("\n\n$print(x)", 5, true).unwrap();
        assert_eq!(statements[0].line, 7);
    }
}
