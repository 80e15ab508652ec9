//! Configuration module

mod engine;

pub use engine::EngineConfig;
pub use engine::Environment;
pub use engine::LogSink;
pub use engine::ToolFn;
pub use engine::Tools;

/// Config file name looked up in the working directory
pub const CONFIG_FILE: &str = "fx.yml";
