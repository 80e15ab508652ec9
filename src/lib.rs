//! fxview: an async component templating engine
//!
//! Components are plain text files with `$`-prefixed directives:
//! conditionals, loops, nested component renders with replaceable
//! slots, raw includes, and value interpolation backed by call-site
//! locals, configured globals and async host tools.

pub mod cache;
pub mod config;
pub mod error;
pub mod render;
pub mod template;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::cache::TemplateCache;
use crate::config::{EngineConfig, CONFIG_FILE};
use crate::render::{Evaluator, FxValue};

/// The main engine handle: a config plus the shared component cache.
/// Cheap to clone; clones share the cache.
#[derive(Debug, Clone)]
pub struct Fx {
    pub config: EngineConfig,
    cache: Arc<TemplateCache>,
}

impl Fx {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cache: Arc::new(TemplateCache::new()),
        }
    }

    /// Create an engine from a directory, loading `fx.yml` if present.
    /// The views directory resolves relative to `base_dir`.
    pub fn open<P: AsRef<Path>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.as_ref();
        let config_path = base_dir.join(CONFIG_FILE);

        let mut config = if config_path.exists() {
            EngineConfig::load(&config_path)?
        } else {
            EngineConfig::default()
        };
        if config.views_dir.is_relative() {
            config.views_dir = base_dir.join(&config.views_dir);
        }

        Ok(Self::new(config))
    }

    /// Render a component by dotted path with the given locals.
    pub async fn render(&self, component: &str, locals: FxValue) -> error::Result<String> {
        Evaluator::new(&self.config, &self.cache)
            .render(component, locals)
            .await
    }

    /// Render a component, filling its top-level `$place` slots from
    /// `replacements`.
    pub async fn render_with(
        &self,
        component: &str,
        locals: FxValue,
        replacements: HashMap<String, String>,
    ) -> error::Result<String> {
        Evaluator::new(&self.config, &self.cache)
            .render_with(component, locals, replacements)
            .await
    }

    /// Load and parse a component without rendering, reporting any
    /// syntax error.
    pub async fn check(&self, component: &str) -> error::Result<()> {
        Evaluator::new(&self.config, &self.cache)
            .check(component)
            .await
    }

    /// Drop every cached component.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_without_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let fx = Fx::open(dir.path()).unwrap();
        assert_eq!(fx.config.views_dir, dir.path().join("views"));
        assert_eq!(fx.config.extension, "fx");
    }

    #[tokio::test]
    async fn test_open_reads_config_and_renders() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("fx.yml"),
            "views_dir: web\nglobals:\n  site:\n    name: Demo\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("web")).unwrap();
        fs::write(dir.path().join("web/home.fx"), "Welcome to $(#site.name)").unwrap();

        let fx = Fx::open(dir.path()).unwrap();
        let out = fx.render("home", FxValue::object()).await.unwrap();
        assert_eq!(out, "Welcome to Demo");
    }

    #[tokio::test]
    async fn test_render_with_fills_top_level_slots() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("views")).unwrap();
        fs::write(
            dir.path().join("views/shell.fx"),
            "<main>$place('content')</main>",
        )
        .unwrap();

        let fx = Fx::open(dir.path()).unwrap();
        let mut replacements = HashMap::new();
        replacements.insert("content".to_string(), "hello".to_string());
        let out = fx
            .render_with("shell", FxValue::object(), replacements)
            .await
            .unwrap();
        assert_eq!(out, "<main>hello</main>");
    }

    #[tokio::test]
    async fn test_clear_cache_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("views")).unwrap();
        fs::write(dir.path().join("views/page.fx"), "one").unwrap();

        let fx = Fx::open(dir.path()).unwrap();
        assert_eq!(fx.render("page", FxValue::object()).await.unwrap(), "one");

        fs::write(dir.path().join("views/page.fx"), "two").unwrap();
        assert_eq!(fx.render("page", FxValue::object()).await.unwrap(), "one");
        fx.clear_cache();
        assert_eq!(fx.render("page", FxValue::object()).await.unwrap(), "two");
    }
}
