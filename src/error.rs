//! Engine error types
//!
//! Three kinds of failures, kept as distinct variants so callers can
//! tell them apart: usage errors (malformed arguments to the engine's
//! own API), syntax errors (malformed directive grammar, raised while
//! parsing with a component name and 1-based line), and semantic
//! errors (raised while evaluating, fatal to the enclosing render call
//! only).

use thiserror::Error;

/// Templating engine errors
#[derive(Error, Debug)]
pub enum FxError {
    /// Malformed arguments to the engine API; raised synchronously,
    /// never retried.
    #[error("usage error: {0}")]
    Usage(String),

    /// Malformed directive grammar. `component` is filled in by the
    /// render call that owns the template being parsed.
    #[error("syntax error in '{component}' at line {line}: {message}")]
    Syntax {
        component: String,
        line: usize,
        message: String,
    },

    /// Component file does not exist under the views root.
    #[error("component undefined: '{0}'")]
    ComponentUndefined(String),

    /// A `#key` lookup missed the configured globals.
    #[error("undefined global: '#{0}'")]
    UndefinedGlobal(String),

    /// A `@key` lookup missed the configured tools.
    #[error("undefined tool: '@{0}'")]
    UndefinedTool(String),

    /// A registered tool returned an error.
    #[error("tool '@{name}' failed: {message}")]
    Tool { name: String, message: String },

    /// Evaluation-time failure (non-array foreach collection, missing
    /// replacement for a `$place` key, ...).
    #[error("render error in '{component}': {message}")]
    Render { component: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FxError {
    /// Shorthand for a syntax error that does not yet know its
    /// component; the evaluator attaches the name via [`in_component`].
    ///
    /// [`in_component`]: FxError::in_component
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        FxError::Syntax {
            component: "template".to_string(),
            line,
            message: message.into(),
        }
    }

    /// Attach the owning component name to a syntax or render error.
    pub fn in_component(self, component: &str) -> Self {
        match self {
            FxError::Syntax { line, message, .. } => FxError::Syntax {
                component: component.to_string(),
                line,
                message,
            },
            FxError::Render { message, .. } => FxError::Render {
                component: component.to_string(),
                message,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, FxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = FxError::syntax(12, "unexpected tag $endif").in_component("pages.home");
        assert_eq!(
            err.to_string(),
            "syntax error in 'pages.home' at line 12: unexpected tag $endif"
        );
    }

    #[test]
    fn test_in_component_leaves_other_kinds_alone() {
        let err = FxError::UndefinedGlobal("site".to_string()).in_component("pages.home");
        assert_eq!(err.to_string(), "undefined global: '#site'");
    }
}
