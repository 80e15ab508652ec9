//! Engine configuration (fx.yml)

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf, MAIN_SEPARATOR_STR};
use std::pin::Pin;
use std::sync::Arc;

use crate::render::FxValue;

/// Async host function callable from templates as `@name(...)`
pub type ToolFn = Arc<
    dyn Fn(Vec<FxValue>) -> Pin<Box<dyn Future<Output = crate::error::Result<FxValue>> + Send>>
        + Send
        + Sync,
>;

/// Destination for `$log` output. Defaults to the tracing pipeline.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Runtime environment. Development enables extra render diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Registry of host tools, keyed by the name used after `@`
#[derive(Clone, Default)]
pub struct Tools {
    registry: HashMap<String, ToolFn>,
}

impl Tools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async tool under a name. Later registrations
    /// replace earlier ones.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, tool: F)
    where
        F: Fn(Vec<FxValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<FxValue>> + Send + 'static,
    {
        let tool: ToolFn = Arc::new(move |args| {
            let fut = tool(args);
            Box::pin(fut) as Pin<Box<dyn Future<Output = crate::error::Result<FxValue>> + Send>>
        });
        self.registry.insert(name.into(), tool);
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolFn> {
        self.registry.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.registry.keys().map(String::as_str)
    }
}

impl fmt::Debug for Tools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.registry.keys().collect();
        names.sort();
        f.debug_struct("Tools").field("registry", &names).finish()
    }
}

/// Main engine configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory component paths resolve under
    pub views_dir: PathBuf,
    /// Component file extension, without the dot
    pub extension: String,
    /// Whether loaded components are cached across renders
    pub cache: bool,
    pub env: Environment,
    /// Values reachable from templates via `#name`
    pub globals: FxValue,
    #[serde(skip)]
    pub tools: Tools,
    #[serde(skip)]
    pub log_sink: Option<LogSink>,

    // Store any additional fields
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            views_dir: PathBuf::from("views"),
            extension: "fx".to_string(),
            cache: true,
            env: Environment::default(),
            globals: FxValue::object(),
            tools: Tools::new(),
            log_sink: None,
            extra: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve a dotted component path to a file under the views root.
    /// `widgets.card` becomes `<views_dir>/widgets/card.<ext>`.
    pub fn component_path(&self, name: &str) -> PathBuf {
        let relative = name.replace('.', MAIN_SEPARATOR_STR);
        self.views_dir
            .join(format!("{}.{}", relative, self.extension))
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("views_dir", &self.views_dir)
            .field("extension", &self.extension)
            .field("cache", &self.cache)
            .field("env", &self.env)
            .field("globals", &self.globals)
            .field("tools", &self.tools)
            .field("log_sink", &self.log_sink.as_ref().map(|_| "<fn>"))
            .field("extra", &self.extra)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.views_dir, PathBuf::from("views"));
        assert_eq!(config.extension, "fx");
        assert!(config.cache);
        assert_eq!(config.env, Environment::Production);
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
views_dir: web/components
extension: fxml
cache: false
env: development
globals:
  site:
    name: Demo
"#;
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.views_dir, PathBuf::from("web/components"));
        assert_eq!(config.extension, "fxml");
        assert!(!config.cache);
        assert!(config.env.is_development());
        let site = config.globals.get_property("site").unwrap();
        assert_eq!(
            site.get_property("name").unwrap().to_output_string(),
            "Demo"
        );
    }

    #[test]
    fn test_component_path() {
        let config = EngineConfig::default();
        let path = config.component_path("widgets.card");
        assert_eq!(path, Path::new("views").join("widgets").join("card.fx"));
    }

    #[test]
    fn test_tool_registry() {
        let mut tools = Tools::new();
        tools.register("upper", |args| async move {
            let text = args
                .first()
                .map(FxValue::to_output_string)
                .unwrap_or_default();
            Ok(FxValue::from(text.to_uppercase()))
        });
        assert!(tools.lookup("upper").is_some());
        assert!(tools.lookup("lower").is_none());
    }
}
