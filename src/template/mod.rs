//! Template parsing pipeline
//!
//! From raw component text to a typed Node tree: the tokenizer splits
//! expression text, descriptors classify value expressions, the
//! condition parser builds boolean trees, the scanner extracts tag
//! spans, and the builder assembles the layout plus Node AST that the
//! renderer walks.

pub mod args;
pub mod builder;
pub mod condition;
pub mod descriptor;
pub mod scanner;
pub mod tokenizer;

pub use builder::{build, Block, Node};
pub use condition::{parse_condition, BinaryOp, Condition, UnaryOp};
pub use descriptor::{Descriptor, PathSegment};
pub use scanner::{scan, Statement, TagKind};
