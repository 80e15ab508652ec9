//! Value descriptors
//!
//! The four kinds of value expressions usable inside directives,
//! parsed once at template-build time into immutable descriptors:
//!
//! - Scalar: `'text'`, `"text"`, `42`, `4.5`, `true`, `false`,
//!   `null`, `undefined`
//! - Reference: `ident` plus optional `.key` / `[0]` path segments,
//!   resolved against runtime scopes and locals
//! - Global: `#ident` plus optional path, resolved against the
//!   configuration's globals
//! - Tool: `@ident(args...)` plus optional result path, resolved by
//!   invoking a registered tool; arguments are themselves descriptors,
//!   recursively

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{FxError, Result};
use crate::render::value::FxValue;
use crate::template::args::{find_matching_paren, split_top_level};

const IDENT: &str = r"[A-Za-z_$][A-Za-z0-9_$]*";
const PATH: &str = r"(?:\.[A-Za-z_$][A-Za-z0-9_$]*|\[\d+\])*";

lazy_static! {
    static ref SCALAR_RE: Regex =
        Regex::new(r#"^(?:'[^']*'|"[^"]*"|-?\d+(?:\.\d+)?|true|false|null|undefined)$"#).unwrap();
    static ref REFERENCE_RE: Regex =
        Regex::new(&format!("^{IDENT}{PATH}$")).unwrap();
    static ref GLOBAL_RE: Regex =
        Regex::new(&format!("^#{IDENT}{PATH}$")).unwrap();
    static ref TOOL_HEAD_RE: Regex =
        Regex::new(&format!("^@({IDENT})\\(")).unwrap();
    static ref PATH_RE: Regex =
        Regex::new(&format!("^{PATH}$")).unwrap();
    static ref PATH_SEGMENT_RE: Regex =
        Regex::new(r"\.([A-Za-z_$][A-Za-z0-9_$]*)|\[(\d+)\]").unwrap();
}

/// One step of a dotted/bracket-indexed access path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A parsed value expression
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Scalar(ScalarDescriptor),
    Reference(ReferenceDescriptor),
    Global(GlobalDescriptor),
    Tool(ToolDescriptor),
}

/// A literal fixed at parse time
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarDescriptor {
    pub value: FxValue,
    pub line: usize,
}

/// A bare identifier resolved against runtime scopes/locals;
/// unresolved references evaluate to `undefined`, not an error
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDescriptor {
    pub key: String,
    pub path: Vec<PathSegment>,
    pub line: usize,
}

/// A `#`-prefixed identifier resolved against the global registry;
/// an unresolved key is an error
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDescriptor {
    pub key: String,
    pub path: Vec<PathSegment>,
    pub line: usize,
}

/// A `@`-prefixed tool invocation with recursive descriptor arguments
/// and an optional result path
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub key: String,
    pub args: Vec<Descriptor>,
    pub path: Vec<PathSegment>,
    pub line: usize,
}

impl ScalarDescriptor {
    pub fn check(token: &str) -> bool {
        SCALAR_RE.is_match(token)
    }

    fn parse(token: &str, line: usize) -> Result<Self> {
        let value = if let Some(inner) = quoted_inner(token) {
            FxValue::String(inner.to_string())
        } else if token == "true" {
            FxValue::Bool(true)
        } else if token == "false" {
            FxValue::Bool(false)
        } else if token == "null" {
            FxValue::Null
        } else if token == "undefined" {
            FxValue::Undefined
        } else {
            let number = token
                .parse()
                .map_err(|_| FxError::syntax(line, format!("invalid literal '{token}'")))?;
            FxValue::Number(number)
        };
        Ok(Self { value, line })
    }
}

impl ReferenceDescriptor {
    pub fn check(token: &str) -> bool {
        REFERENCE_RE.is_match(token)
    }

    fn parse(token: &str, line: usize) -> Self {
        let (key, path) = split_key_path(token);
        Self { key, path, line }
    }
}

impl GlobalDescriptor {
    pub fn check(token: &str) -> bool {
        GLOBAL_RE.is_match(token)
    }

    fn parse(token: &str, line: usize) -> Self {
        let (key, path) = split_key_path(&token[1..]);
        Self { key, path, line }
    }
}

impl ToolDescriptor {
    pub fn check(token: &str) -> bool {
        let Some(head) = TOOL_HEAD_RE.find(token) else {
            return false;
        };
        let open = head.end() - 1;
        match find_matching_paren(token, open) {
            Some(close) => PATH_RE.is_match(&token[close + 1..]),
            None => false,
        }
    }

    fn parse(token: &str, line: usize) -> Result<Self> {
        // check() already validated the shape
        let caps = TOOL_HEAD_RE
            .captures(token)
            .ok_or_else(|| FxError::syntax(line, format!("invalid tool expression '{token}'")))?;
        let key = caps[1].to_string();
        let open = caps.get(0).map(|m| m.end() - 1).unwrap_or(0);
        let close = find_matching_paren(token, open)
            .ok_or_else(|| FxError::syntax(line, format!("unbalanced parenthesis in '{token}'")))?;
        let args = split_top_level(&token[open + 1..close])
            .iter()
            .map(|arg| Descriptor::parse(arg, line))
            .collect::<Result<Vec<_>>>()?;
        let path = parse_path(&token[close + 1..]);
        Ok(Self {
            key,
            args,
            path,
            line,
        })
    }
}

impl Descriptor {
    /// Parse a single token into a descriptor. Scalars win over
    /// references so that `true` or `undefined` never become lookups.
    pub fn parse(token: &str, line: usize) -> Result<Descriptor> {
        let token = token.trim();
        if ScalarDescriptor::check(token) {
            Ok(Descriptor::Scalar(ScalarDescriptor::parse(token, line)?))
        } else if GlobalDescriptor::check(token) {
            Ok(Descriptor::Global(GlobalDescriptor::parse(token, line)))
        } else if ToolDescriptor::check(token) {
            Ok(Descriptor::Tool(ToolDescriptor::parse(token, line)?))
        } else if ReferenceDescriptor::check(token) {
            Ok(Descriptor::Reference(ReferenceDescriptor::parse(
                token, line,
            )))
        } else {
            Err(FxError::syntax(
                line,
                format!("invalid value expression '{token}'"),
            ))
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Descriptor::Scalar(d) => d.line,
            Descriptor::Reference(d) => d.line,
            Descriptor::Global(d) => d.line,
            Descriptor::Tool(d) => d.line,
        }
    }
}

/// Strip matching single or double quotes, if any. The inner text may
/// contain the other quote character but not the delimiter itself.
pub fn quoted_inner(token: &str) -> Option<&str> {
    for quote in ['\'', '"'] {
        if let Some(inner) = token
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
        {
            return (!inner.contains(quote)).then_some(inner);
        }
    }
    None
}

fn split_key_path(token: &str) -> (String, Vec<PathSegment>) {
    let key_end = token
        .find(['.', '['])
        .unwrap_or(token.len());
    (
        token[..key_end].to_string(),
        parse_path(&token[key_end..]),
    )
}

fn parse_path(suffix: &str) -> Vec<PathSegment> {
    PATH_SEGMENT_RE
        .captures_iter(suffix)
        .map(|caps| {
            if let Some(key) = caps.get(1) {
                PathSegment::Key(key.as_str().to_string())
            } else {
                PathSegment::Index(caps[2].parse().unwrap_or(0))
            }
        })
        .collect()
}
