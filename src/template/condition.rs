//! Condition expression parser
//!
//! Builds a binary/unary/operand tree from the tokens of an `$if` /
//! `$elseif` argument. Logical operators always out-rank comparisons:
//! the split for `&&`/`||` is an independent first pass over the whole
//! token slice, so a comparison appearing before a logical operator
//! does not pre-empt it. Splits are leftmost at parenthesis depth 0.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{FxError, Result};
use crate::template::descriptor::Descriptor;
use crate::template::tokenizer::tokenize_with;

lazy_static! {
    /// Separators for condition expressions: parentheses, commas and
    /// the comparison/logical operators, longest alternatives first
    static ref CONDITION_SEPARATORS: Regex =
        Regex::new(r"===|!==|==|!=|<=|>=|<|>|&&|\|\||!|[(),]").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
}

impl BinaryOp {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "&&" => Some(BinaryOp::And),
            "||" => Some(BinaryOp::Or),
            "===" => Some(BinaryOp::StrictEq),
            "!==" => Some(BinaryOp::StrictNe),
            "==" => Some(BinaryOp::Eq),
            "!=" => Some(BinaryOp::Ne),
            "<=" => Some(BinaryOp::Le),
            ">=" => Some(BinaryOp::Ge),
            "<" => Some(BinaryOp::Lt),
            ">" => Some(BinaryOp::Gt),
            _ => None,
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

/// A parsed condition tree, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Binary {
        operator: BinaryOp,
        left: Box<Condition>,
        right: Box<Condition>,
        parenthesized: bool,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Condition>,
        parenthesized: bool,
    },
    Operand {
        value: Descriptor,
        parenthesized: bool,
    },
}

impl Condition {
    pub fn parenthesized(&self) -> bool {
        match self {
            Condition::Binary { parenthesized, .. }
            | Condition::Unary { parenthesized, .. }
            | Condition::Operand { parenthesized, .. } => *parenthesized,
        }
    }
}

/// Parse a condition expression into its tree.
pub fn parse_condition(expr: &str, line: usize) -> Result<Condition> {
    let tokens = tokenize_with(expr, &CONDITION_SEPARATORS);
    parse_tokens(&tokens, line, false)
}

fn parse_tokens(tokens: &[String], line: usize, parenthesized: bool) -> Result<Condition> {
    if tokens.is_empty() {
        return Err(FxError::syntax(line, "empty condition"));
    }

    // First pass: leftmost logical operator at depth 0.
    if let Some(pos) = find_operator(tokens, line, true)? {
        return split_binary(tokens, pos, line, parenthesized);
    }

    // Second pass: leftmost comparison operator at depth 0.
    if let Some(pos) = find_operator(tokens, line, false)? {
        return split_binary(tokens, pos, line, parenthesized);
    }

    // No operator left: parenthesized group, negation, or operand.
    if tokens[0] == "(" {
        let close = matching_paren_token(tokens, line)?;
        if close != tokens.len() - 1 {
            return Err(FxError::syntax(
                line,
                format!("unexpected token '{}' after ')'", tokens[close + 1]),
            ));
        }
        return parse_tokens(&tokens[1..close], line, true);
    }

    if tokens[0] == "!" {
        let operand = parse_tokens(&tokens[1..], line, false)?;
        return Ok(Condition::Unary {
            operator: UnaryOp::Not,
            operand: Box::new(operand),
            parenthesized,
        });
    }

    if tokens.len() == 1 {
        return Ok(Condition::Operand {
            value: Descriptor::parse(&tokens[0], line)?,
            parenthesized,
        });
    }

    // A tool call spans several tokens because the tokenizer isolated
    // its parentheses and commas; re-join and parse as one expression.
    if tokens[0].starts_with('@') {
        let joined: String = tokens.concat();
        return Ok(Condition::Operand {
            value: Descriptor::parse(&joined, line)?,
            parenthesized,
        });
    }

    Err(FxError::syntax(
        line,
        format!("invalid condition near '{}'", tokens.join(" ")),
    ))
}

fn split_binary(
    tokens: &[String],
    pos: usize,
    line: usize,
    parenthesized: bool,
) -> Result<Condition> {
    let operator = BinaryOp::from_token(&tokens[pos])
        .ok_or_else(|| FxError::syntax(line, format!("invalid operator '{}'", tokens[pos])))?;
    let left = parse_tokens(&tokens[..pos], line, false)?;
    let right = parse_tokens(&tokens[pos + 1..], line, false)?;
    Ok(Condition::Binary {
        operator,
        left: Box::new(left),
        right: Box::new(right),
        parenthesized,
    })
}

/// Leftmost operator position at parenthesis depth 0; `logical`
/// selects between the `&&`/`||` pass and the comparison pass.
/// Unbalanced parentheses surface here.
fn find_operator(tokens: &[String], line: usize, logical: bool) -> Result<Option<usize>> {
    let mut depth = 0i32;
    for (i, token) in tokens.iter().enumerate() {
        match token.as_str() {
            "(" => depth += 1,
            ")" => {
                depth -= 1;
                if depth < 0 {
                    return Err(FxError::syntax(line, "unbalanced ')' in condition"));
                }
            }
            _ if depth == 0 => {
                if let Some(op) = BinaryOp::from_token(token) {
                    if op.is_logical() == logical {
                        return Ok(Some(i));
                    }
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(FxError::syntax(line, "unbalanced '(' in condition"));
    }
    Ok(None)
}

/// Token index of the `)` matching the `(` at index 0.
fn matching_paren_token(tokens: &[String], line: usize) -> Result<usize> {
    let mut depth = 0i32;
    for (i, token) in tokens.iter().enumerate() {
        match token.as_str() {
            "(" => depth += 1,
            ")" => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(FxError::syntax(line, "unbalanced '(' in condition"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::value::FxValue;

    fn operand_key(cond: &Condition) -> &str {
        match cond {
            Condition::Operand {
                value: Descriptor::Reference(r),
                ..
            } => &r.key,
            other => panic!("not a reference operand: {other:?}"),
        }
    }

    #[test]
    fn test_single_operand() {
        let cond = parse_condition("user.active", 1).unwrap();
        match cond {
            Condition::Operand { value, .. } => {
                assert!(matches!(value, Descriptor::Reference(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_logical_outranks_comparison() {
        // leftmost && splits first even though == appears before it
        let cond = parse_condition("a == b && c", 1).unwrap();
        match cond {
            Condition::Binary {
                operator,
                left,
                right,
                ..
            } => {
                assert_eq!(operator, BinaryOp::And);
                assert!(matches!(*left, Condition::Binary { operator: BinaryOp::Eq, .. }));
                assert_eq!(operand_key(&right), "c");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_leftmost_logical_split() {
        let cond = parse_condition("a || b && c", 1).unwrap();
        match cond {
            Condition::Binary { operator, right, .. } => {
                assert_eq!(operator, BinaryOp::Or);
                assert!(matches!(
                    *right,
                    Condition::Binary { operator: BinaryOp::And, .. }
                ));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parenthesized_flag() {
        let cond = parse_condition("(a) && b", 1).unwrap();
        match cond {
            Condition::Binary { left, right, .. } => {
                assert!(left.parenthesized());
                assert!(!right.parenthesized());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_paren_group_encloses_subtree() {
        let cond = parse_condition("(a || b)", 1).unwrap();
        match cond {
            Condition::Binary {
                operator,
                parenthesized,
                ..
            } => {
                assert_eq!(operator, BinaryOp::Or);
                assert!(parenthesized);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_operator_inside_parens_not_split_at_depth() {
        let cond = parse_condition("(a || b) && c", 1).unwrap();
        match cond {
            Condition::Binary { operator, left, .. } => {
                assert_eq!(operator, BinaryOp::And);
                assert!(left.parenthesized());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unary_negation() {
        let cond = parse_condition("!user.hidden", 1).unwrap();
        match cond {
            Condition::Unary { operator, operand, .. } => {
                assert_eq!(operator, UnaryOp::Not);
                assert_eq!(operand_key(&operand), "user");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_tool_call_operand_rejoined() {
        let cond = parse_condition("@count(items) > 0", 1).unwrap();
        match cond {
            Condition::Binary {
                operator,
                left,
                right,
                ..
            } => {
                assert_eq!(operator, BinaryOp::Gt);
                match *left {
                    Condition::Operand {
                        value: Descriptor::Tool(ref t),
                        ..
                    } => assert_eq!(t.key, "count"),
                    ref other => panic!("unexpected: {other:?}"),
                }
                match *right {
                    Condition::Operand {
                        value: Descriptor::Scalar(ref s),
                        ..
                    } => assert_eq!(s.value, FxValue::Number(0.0)),
                    ref other => panic!("unexpected: {other:?}"),
                }
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unbalanced_parens() {
        assert!(parse_condition("(a && b", 1).is_err());
        assert!(parse_condition("a) && b", 1).is_err());
    }

    #[test]
    fn test_empty_condition() {
        assert!(parse_condition("", 1).is_err());
    }

    #[test]
    fn test_strict_operators() {
        let cond = parse_condition("a !== 'x'", 1).unwrap();
        assert!(matches!(
            cond,
            Condition::Binary { operator: BinaryOp::StrictNe, .. }
        ));
    }
}
