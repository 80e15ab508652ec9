//! Template/Node builder
//!
//! Converts tag spans into a typed Node tree. Comment blocks are
//! stripped first (replaced by an equal count of newlines so error
//! lines stay correct), the tag scanner extracts top-level Statements,
//! each Statement's span is replaced in the text by a unique
//! placeholder to form the "layout", and each Statement becomes a
//! typed Node, recursing into nested block bodies.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{FxError, Result};
use crate::template::args::{argument_span, extract_argument, find_matching_paren, line_at, split_top_level};
use crate::template::condition::{parse_condition, Condition};
use crate::template::descriptor::{quoted_inner, Descriptor};
use crate::template::scanner::{scan, Statement, TagKind, TAG_RE};

lazy_static! {
    static ref COMMENT_RE: Regex = Regex::new(r"\$endcomment|\$comment").unwrap();
    /// Tags relevant when splitting an $if span into branches
    static ref BRANCH_RE: Regex = Regex::new(
        r"\$endif|\$endforeach|\$endrender|\$elseif\s*\(|\$else|\$if\s*\(|\$foreach\s*\(|\$render\s*\("
    )
    .unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
    static ref COMPONENT_PATH_RE: Regex =
        Regex::new(r"^[A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*$").unwrap();
}

static PLACEHOLDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// A unique opaque token spliced into layout text where a Node's
/// rendered output will go. Uniqueness holds process-wide.
fn next_placeholder() -> String {
    format!("\u{0}fx:{}\u{0}", PLACEHOLDER_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// A parsed template fragment: layout text with placeholders, plus the
/// Nodes that fill them. An empty node list means the layout is pure
/// literal text.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub layout: String,
    pub nodes: Vec<Node>,
}

/// The parsed, typed AST element for one directive
#[derive(Debug, Clone)]
pub enum Node {
    If(IfNode),
    ForEach(ForEachNode),
    Render(RenderNode),
    Include(IncludeNode),
    Print(PrintNode),
    Log(LogNode),
    Place(PlaceNode),
}

impl Node {
    pub fn placeholder(&self) -> &str {
        match self {
            Node::If(n) => &n.placeholder,
            Node::ForEach(n) => &n.placeholder,
            Node::Render(n) => &n.placeholder,
            Node::Include(n) => &n.placeholder,
            Node::Print(n) => &n.placeholder,
            Node::Log(n) => &n.placeholder,
            Node::Place(n) => &n.placeholder,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Node::If(n) => n.line,
            Node::ForEach(n) => n.line,
            Node::Render(n) => n.line,
            Node::Include(n) => n.line,
            Node::Print(n) => n.line,
            Node::Log(n) => n.line,
            Node::Place(n) => n.line,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IfBranch {
    pub condition: Condition,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct IfNode {
    pub placeholder: String,
    pub line: usize,
    /// The `$if` branch followed by the `$elseif` branches, in order
    pub branches: Vec<IfBranch>,
    pub else_body: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct ForEachNode {
    pub placeholder: String,
    pub line: usize,
    pub item: String,
    pub index: Option<String>,
    pub collection: Descriptor,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct RenderNode {
    pub placeholder: String,
    pub line: usize,
    pub path: String,
    pub locals: Vec<(String, Descriptor)>,
    pub replacements: Vec<(String, Block)>,
}

#[derive(Debug, Clone)]
pub struct IncludeNode {
    pub placeholder: String,
    pub line: usize,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct PrintNode {
    pub placeholder: String,
    pub line: usize,
    pub value: Descriptor,
}

#[derive(Debug, Clone)]
pub struct LogNode {
    pub placeholder: String,
    pub line: usize,
    pub value: Descriptor,
}

#[derive(Debug, Clone)]
pub struct PlaceNode {
    pub placeholder: String,
    pub line: usize,
    pub key: String,
}

/// Build a template fragment into its layout and Node tree.
///
/// `place_allowed` is true at the top level of a component and false
/// inside block bodies, where `$place` cannot execute.
pub fn build(template: &str, base_line: usize, place_allowed: bool) -> Result<Block> {
    let stripped = strip_comments(template, base_line)?;
    let statements = scan(&stripped, base_line, place_allowed)?;
    let mut layout = stripped;
    let mut nodes = Vec::with_capacity(statements.len());
    for stmt in &statements {
        let placeholder = next_placeholder();
        layout = layout.replacen(&stmt.definition, &placeholder, 1);
        nodes.push(build_node(stmt, placeholder)?);
    }
    Ok(Block { layout, nodes })
}

/// Strip `$comment`...`$endcomment` spans, replacing each with an
/// equal count of newlines. Comments must be balanced and must not
/// nest.
pub fn strip_comments(template: &str, base_line: usize) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut cursor = 0usize;
    let mut open: Option<usize> = None;

    for m in COMMENT_RE.find_iter(template) {
        let is_open = m.as_str() == "$comment";
        match (is_open, open) {
            (true, None) => open = Some(m.start()),
            (true, Some(_)) => {
                return Err(FxError::syntax(
                    line_at(template, m.start(), base_line),
                    "unexpected tag $comment",
                ));
            }
            (false, Some(start)) => {
                result.push_str(&template[cursor..start]);
                let newlines = template[start..m.end()].matches('\n').count();
                for _ in 0..newlines {
                    result.push('\n');
                }
                cursor = m.end();
                open = None;
            }
            (false, None) => {
                return Err(FxError::syntax(
                    line_at(template, m.start(), base_line),
                    "unexpected tag $endcomment",
                ));
            }
        }
    }

    if let Some(start) = open {
        return Err(FxError::syntax(
            line_at(template, start, base_line),
            "unclosed tag $comment",
        ));
    }

    result.push_str(&template[cursor..]);
    Ok(result)
}

fn build_node(stmt: &Statement, placeholder: String) -> Result<Node> {
    match stmt.kind {
        TagKind::If => build_if(stmt, placeholder),
        TagKind::ForEach => build_foreach(stmt, placeholder),
        TagKind::Render => build_render(stmt, placeholder),
        TagKind::Include => {
            let arg = extract_argument(&stmt.definition, "include", stmt.line)?;
            Ok(Node::Include(IncludeNode {
                placeholder,
                line: stmt.line,
                path: parse_component_path(&arg, stmt.line)?,
            }))
        }
        TagKind::Print | TagKind::ShortPrint => {
            let arg = extract_argument(&stmt.definition, stmt.kind.keyword(), stmt.line)?;
            Ok(Node::Print(PrintNode {
                placeholder,
                line: stmt.line,
                value: Descriptor::parse(&arg, stmt.line)?,
            }))
        }
        TagKind::Log => {
            let arg = extract_argument(&stmt.definition, "log", stmt.line)?;
            Ok(Node::Log(LogNode {
                placeholder,
                line: stmt.line,
                value: Descriptor::parse(&arg, stmt.line)?,
            }))
        }
        TagKind::Place => {
            let arg = extract_argument(&stmt.definition, "place", stmt.line)?;
            let key = quoted_inner(&arg).ok_or_else(|| {
                FxError::syntax(stmt.line, format!("invalid place key '{arg}'"))
            })?;
            Ok(Node::Place(PlaceNode {
                placeholder,
                line: stmt.line,
                key: key.to_string(),
            }))
        }
    }
}

/// One `$elseif`/`$else` boundary found at depth 0 inside an if span
struct Boundary {
    tag_start: usize,
    body_start: usize,
    line: usize,
    condition: Option<String>,
}

fn build_if(stmt: &Statement, placeholder: String) -> Result<Node> {
    let def = &stmt.definition;
    let (open, close) = argument_span(def, "if", stmt.line)?;
    let first_condition = def[open + 1..close].trim().to_string();

    let body_start = close + 1;
    let body = &def[body_start..def.len() - "$endif".len()];
    let body_base = line_at(def, body_start, stmt.line);

    let mut boundaries: Vec<Boundary> = Vec::new();
    let mut depth = 0i32;
    for m in BRANCH_RE.find_iter(body) {
        let matched = m.as_str();
        if matched.starts_with("$endif")
            || matched.starts_with("$endforeach")
            || matched.starts_with("$endrender")
        {
            depth -= 1;
        } else if matched.starts_with("$elseif") {
            if depth == 0 {
                let line = line_at(body, m.start(), body_base);
                let paren = m.end() - 1;
                let close = find_matching_paren(body, paren).ok_or_else(|| {
                    FxError::syntax(line, "unbalanced parenthesis in $elseif argument")
                })?;
                boundaries.push(Boundary {
                    tag_start: m.start(),
                    body_start: close + 1,
                    line,
                    condition: Some(body[paren + 1..close].trim().to_string()),
                });
            }
        } else if matched.starts_with("$else") {
            if depth == 0 {
                boundaries.push(Boundary {
                    tag_start: m.start(),
                    body_start: m.end(),
                    line: line_at(body, m.start(), body_base),
                    condition: None,
                });
            }
        } else {
            depth += 1;
        }
    }

    // an $else can only be the final branch
    for (i, boundary) in boundaries.iter().enumerate() {
        if boundary.condition.is_none() && i != boundaries.len() - 1 {
            return Err(FxError::syntax(boundary.line, "unexpected tag after $else"));
        }
    }

    let mut branches = Vec::new();
    let mut else_body = None;

    let first_end = boundaries.first().map(|b| b.tag_start).unwrap_or(body.len());
    branches.push(IfBranch {
        condition: parse_condition(&first_condition, stmt.line)?,
        body: build(&body[..first_end], body_base, false)?,
    });

    for (i, boundary) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map(|b| b.tag_start)
            .unwrap_or(body.len());
        let branch_base = line_at(body, boundary.body_start, body_base);
        let block = build(&body[boundary.body_start..end], branch_base, false)?;
        match &boundary.condition {
            Some(expr) => branches.push(IfBranch {
                condition: parse_condition(expr, boundary.line)?,
                body: block,
            }),
            None => else_body = Some(block),
        }
    }

    Ok(Node::If(IfNode {
        placeholder,
        line: stmt.line,
        branches,
        else_body,
    }))
}

fn build_foreach(stmt: &Statement, placeholder: String) -> Result<Node> {
    let def = &stmt.definition;
    let (open, close) = argument_span(def, "foreach", stmt.line)?;
    let parts = split_top_level(&def[open + 1..close]);

    let (item, index, collection) = match parts.len() {
        2 => (parts[0].clone(), None, parts[1].clone()),
        3 => (parts[0].clone(), Some(parts[1].clone()), parts[2].clone()),
        _ => {
            return Err(FxError::syntax(
                stmt.line,
                "foreach expects 'item[, index], collection'",
            ));
        }
    };
    if !IDENT_RE.is_match(&item) {
        return Err(FxError::syntax(
            stmt.line,
            format!("invalid foreach item name '{item}'"),
        ));
    }
    if let Some(ix) = &index {
        if !IDENT_RE.is_match(ix) {
            return Err(FxError::syntax(
                stmt.line,
                format!("invalid foreach index name '{ix}'"),
            ));
        }
    }
    let collection = Descriptor::parse(&collection, stmt.line)?;
    if matches!(collection, Descriptor::Scalar(_)) {
        return Err(FxError::syntax(
            stmt.line,
            "foreach collection must be a reference, global or tool",
        ));
    }

    let body_start = close + 1;
    let body = &def[body_start..def.len() - "$endforeach".len()];
    let body_base = line_at(def, body_start, stmt.line);

    Ok(Node::ForEach(ForEachNode {
        placeholder,
        line: stmt.line,
        item,
        index,
        collection,
        body: build(body, body_base, false)?,
    }))
}

fn build_render(stmt: &Statement, placeholder: String) -> Result<Node> {
    let def = &stmt.definition;
    let (open, close) = argument_span(def, "render", stmt.line)?;
    let parts = split_top_level(&def[open + 1..close]);
    let Some(path_token) = parts.first() else {
        return Err(FxError::syntax(stmt.line, "render expects a component path"));
    };
    let path = parse_component_path(path_token, stmt.line)?;

    let mut locals = Vec::new();
    for part in &parts[1..] {
        let Some((key, value)) = part.split_once('=') else {
            return Err(FxError::syntax(
                stmt.line,
                format!("invalid render local '{part}', expected key=value"),
            ));
        };
        let key = key.trim();
        if !IDENT_RE.is_match(key) {
            return Err(FxError::syntax(
                stmt.line,
                format!("invalid render local name '{key}'"),
            ));
        }
        locals.push((key.to_string(), Descriptor::parse(value.trim(), stmt.line)?));
    }

    let body_start = close + 1;
    let body = &def[body_start..def.len() - "$endrender".len()];
    let body_base = line_at(def, body_start, stmt.line);
    let replacements = scan_replace_blocks(body, body_base)?;

    Ok(Node::Render(RenderNode {
        placeholder,
        line: stmt.line,
        path,
        locals,
        replacements,
    }))
}

/// Find balanced `$replace(key)...$endreplace` blocks at the top level
/// of a render span. Other content inside the span is ignored; it is
/// never evaluated.
fn scan_replace_blocks(body: &str, base_line: usize) -> Result<Vec<(String, Block)>> {
    let mut replacements = Vec::new();
    let mut depth = 0i32;
    let mut current: Option<(String, usize)> = None;

    for m in TAG_RE.find_iter(body) {
        let matched = m.as_str();
        if matched.starts_with("$endreplace") {
            if depth == 0 {
                let Some((key, start)) = current.take() else {
                    return Err(FxError::syntax(
                        line_at(body, m.start(), base_line),
                        "unexpected tag $endreplace",
                    ));
                };
                let block_base = line_at(body, start, base_line);
                let block = build(&body[start..m.start()], block_base, false)?;
                replacements.push((key, block));
            }
        } else if matched.starts_with("$replace") {
            if depth == 0 {
                if current.is_some() {
                    return Err(FxError::syntax(
                        line_at(body, m.start(), base_line),
                        "unexpected tag $replace",
                    ));
                }
                let line = line_at(body, m.start(), base_line);
                let paren = m.end() - 1;
                let close = find_matching_paren(body, paren).ok_or_else(|| {
                    FxError::syntax(line, "unbalanced parenthesis in $replace argument")
                })?;
                let arg = body[paren + 1..close].trim();
                let key = quoted_inner(arg).ok_or_else(|| {
                    FxError::syntax(line, format!("invalid replace key '{arg}'"))
                })?;
                current = Some((key.to_string(), close + 1));
            }
        } else if matched.starts_with("$endif")
            || matched.starts_with("$endforeach")
            || matched.starts_with("$endrender")
        {
            depth -= 1;
        } else if matched.starts_with("$if")
            || matched.starts_with("$foreach")
            || matched.starts_with("$render")
        {
            depth += 1;
        }
    }

    if let Some((key, start)) = current {
        return Err(FxError::syntax(
            line_at(body, start, base_line),
            format!("unclosed tag $replace('{key}')"),
        ));
    }

    Ok(replacements)
}

fn parse_component_path(token: &str, line: usize) -> Result<String> {
    let path = quoted_inner(token.trim())
        .filter(|p| COMPONENT_PATH_RE.is_match(p))
        .ok_or_else(|| {
            FxError::syntax(line, format!("invalid component path {token}"))
        })?;
    Ok(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::condition::BinaryOp;
    use crate::template::descriptor::PathSegment;

    /// Re-substituting each placeholder with its Statement text must
    /// reconstruct the comment-stripped template exactly.
    fn reassemble(block: &Block, statements: &[Statement]) -> String {
        let mut text = block.layout.clone();
        for (node, stmt) in block.nodes.iter().zip(statements) {
            text = text.replacen(node.placeholder(), &stmt.definition, 1);
        }
        text
    }

    #[test]
    fn test_layout_roundtrip() {
        let tpl = "a $print(x) b $if(c) d $endif e";
        let block = build(tpl, 1, true).unwrap();
        let statements = scan(tpl, 1, true).unwrap();
        assert_eq!(reassemble(&block, &statements), tpl);
    }

    #[test]
    fn test_placeholders_are_unique() {
        let block = build("$print(a) $print(a) $print(a)", 1, true).unwrap();
        let mut seen: Vec<&str> = block.nodes.iter().map(|n| n.placeholder()).collect();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_strip_comments_preserves_lines() {
        let tpl = "a\n$comment x\ny\n$endcomment\nb";
        let stripped = strip_comments(tpl, 1).unwrap();
        assert_eq!(stripped, "a\n\n\n\nb");
        assert_eq!(tpl.matches('\n').count(), stripped.matches('\n').count());
    }

    #[test]
    fn test_nested_comment_is_error() {
        let err = strip_comments("$comment $comment $endcomment", 1).unwrap_err();
        assert!(matches!(err, FxError::Syntax { .. }));
    }

    #[test]
    fn test_unbalanced_comment_is_error() {
        assert!(strip_comments("$comment forever", 1).is_err());
        assert!(strip_comments("text $endcomment", 1).is_err());
    }

    #[test]
    fn test_if_with_elseif_and_else() {
        let tpl = "$if(a) one $elseif(b) two $elseif(c) three $else four $endif";
        let block = build(tpl, 1, true).unwrap();
        let Node::If(node) = &block.nodes[0] else {
            panic!("expected if node");
        };
        assert_eq!(node.branches.len(), 3);
        assert_eq!(node.branches[0].body.layout, " one ");
        assert_eq!(node.branches[1].body.layout, " two ");
        assert_eq!(node.branches[2].body.layout, " three ");
        assert_eq!(node.else_body.as_ref().unwrap().layout, " four ");
    }

    #[test]
    fn test_nested_if_keeps_elseif_with_inner() {
        let tpl = "$if(a) $if(b) x $else y $endif $endif";
        let block = build(tpl, 1, true).unwrap();
        let Node::If(outer) = &block.nodes[0] else {
            panic!("expected if node");
        };
        assert!(outer.else_body.is_none());
        let Node::If(inner) = &outer.branches[0].body.nodes[0] else {
            panic!("expected nested if node");
        };
        assert!(inner.else_body.is_some());
    }

    #[test]
    fn test_foreach_with_index() {
        let block = build("$foreach(n, i, items) $(n) $endforeach", 1, true).unwrap();
        let Node::ForEach(node) = &block.nodes[0] else {
            panic!("expected foreach node");
        };
        assert_eq!(node.item, "n");
        assert_eq!(node.index.as_deref(), Some("i"));
        assert!(matches!(node.collection, Descriptor::Reference(_)));
        assert_eq!(node.body.nodes.len(), 1);
    }

    #[test]
    fn test_foreach_tool_collection_with_commas() {
        let block = build("$foreach(n, @range(1, 10)) $(n) $endforeach", 1, true).unwrap();
        let Node::ForEach(node) = &block.nodes[0] else {
            panic!("expected foreach node");
        };
        assert_eq!(node.item, "n");
        match &node.collection {
            Descriptor::Tool(t) => assert_eq!(t.args.len(), 2),
            other => panic!("unexpected collection: {other:?}"),
        }
    }

    #[test]
    fn test_foreach_scalar_collection_rejected() {
        assert!(build("$foreach(n, 'items') $endforeach", 1, true).is_err());
    }

    #[test]
    fn test_render_with_locals_and_replacements() {
        let tpl = "$render('widgets.card', title='Hi', user=@current().name) \
                   $replace('body') inner $(title) $endreplace $endrender";
        let block = build(tpl, 1, true).unwrap();
        let Node::Render(node) = &block.nodes[0] else {
            panic!("expected render node");
        };
        assert_eq!(node.path, "widgets.card");
        assert_eq!(node.locals.len(), 2);
        assert_eq!(node.locals[0].0, "title");
        match &node.locals[1].1 {
            Descriptor::Tool(t) => {
                assert_eq!(t.key, "current");
                assert_eq!(t.path, vec![PathSegment::Key("name".to_string())]);
            }
            other => panic!("unexpected local: {other:?}"),
        }
        assert_eq!(node.replacements.len(), 1);
        assert_eq!(node.replacements[0].0, "body");
        assert_eq!(node.replacements[0].1.nodes.len(), 1);
    }

    #[test]
    fn test_render_nested_render_replacements_stay_nested() {
        let tpl = "$render('outer') $replace('a') \
                   $render('inner') $replace('b') x $endreplace $endrender \
                   $endreplace $endrender";
        let block = build(tpl, 1, true).unwrap();
        let Node::Render(outer) = &block.nodes[0] else {
            panic!("expected render node");
        };
        assert_eq!(outer.replacements.len(), 1);
        assert_eq!(outer.replacements[0].0, "a");
        let inner_block = &outer.replacements[0].1;
        let Node::Render(inner) = &inner_block.nodes[0] else {
            panic!("expected nested render node");
        };
        assert_eq!(inner.replacements[0].0, "b");
    }

    #[test]
    fn test_include_path() {
        let block = build("$include('partials.header')", 1, true).unwrap();
        let Node::Include(node) = &block.nodes[0] else {
            panic!("expected include node");
        };
        assert_eq!(node.path, "partials.header");
    }

    #[test]
    fn test_include_unquoted_path_rejected() {
        assert!(build("$include(partials.header)", 1, true).is_err());
    }

    #[test]
    fn test_place_only_at_top_level() {
        assert!(build("$place('content')", 1, true).is_ok());
        assert!(build("$if(a) $place('content') $endif", 1, true).is_err());
    }

    #[test]
    fn test_condition_is_parsed() {
        let block = build("$if(a && b) x $endif", 1, true).unwrap();
        let Node::If(node) = &block.nodes[0] else {
            panic!("expected if node");
        };
        assert!(matches!(
            node.branches[0].condition,
            Condition::Binary { operator: BinaryOp::And, .. }
        ));
    }

    #[test]
    fn test_error_line_after_comment_block() {
        // the comment spans lines 1-3; the bad tag sits on line 4
        let tpl = "$comment\nnotes\n$endcomment\n$endif";
        let err = build(tpl, 1, true).unwrap_err();
        match err {
            FxError::Syntax { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_multiline_line_numbers() {
        let tpl = "line1\nline2\n$if(a)\n$print(x)\n$endif";
        let block = build(tpl, 1, true).unwrap();
        let Node::If(node) = &block.nodes[0] else {
            panic!("expected if node");
        };
        assert_eq!(node.line, 3);
        let Node::Print(print) = &node.branches[0].body.nodes[0] else {
            panic!("expected print node");
        };
        assert_eq!(print.line, 4);
    }
}
