//! Rendering module
//!
//! The runtime half of the engine: values, the scope stack, and the
//! evaluator that walks parsed components.

pub mod evaluator;
pub mod scope;
pub mod value;

pub use evaluator::{post_process, Evaluator};
pub use scope::ScopeStack;
pub use value::FxValue;
