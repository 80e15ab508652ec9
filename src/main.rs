//! CLI entry point for fxview

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxview::render::FxValue;
use fxview::Fx;

#[derive(Parser)]
#[command(name = "fxview")]
#[command(version = "0.1.0")]
#[command(about = "An async component templating engine", long_about = None)]
struct Cli {
    /// Set the base directory (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a component to stdout
    #[command(alias = "r")]
    Render {
        /// Dotted component path, e.g. widgets.card
        component: String,

        /// JSON file with the locals to render with
        #[arg(short, long)]
        locals: Option<PathBuf>,

        /// Override the views directory from fx.yml
        #[arg(long)]
        views: Option<PathBuf>,
    },

    /// Parse a component and report syntax errors
    Check {
        /// Dotted component path
        component: String,
    },

    /// Display version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "fxview=debug,info"
    } else {
        "fxview=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine base directory
    let base_dir = cli.cwd.unwrap_or_else(|| std::env::current_dir().unwrap());

    match cli.command {
        Commands::Render {
            component,
            locals,
            views,
        } => {
            let mut fx = Fx::open(&base_dir)?;
            if let Some(views) = views {
                fx.config.views_dir = if views.is_absolute() {
                    views
                } else {
                    base_dir.join(views)
                };
            }

            let values = match locals {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read locals file {:?}", path))?;
                    let json: serde_json::Value = serde_json::from_str(&content)
                        .with_context(|| format!("invalid JSON in {:?}", path))?;
                    FxValue::from_json(&json)
                }
                None => FxValue::object(),
            };

            tracing::debug!("Rendering component {}", component);
            let output = fx.render(&component, values).await?;
            println!("{}", output);
        }

        Commands::Check { component } => {
            let fx = Fx::open(&base_dir)?;
            fx.check(&component).await?;
            println!("{} OK", component);
        }

        Commands::Version => {
            println!("fxview version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
