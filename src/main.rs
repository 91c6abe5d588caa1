//! Scopebind CLI - render and check mustache templates

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;

use scopebind::error::{FixSuggestion, ScopeError};
use scopebind::{template, DiagnosticLog, Env, RenderConfig, Store};

#[derive(Parser)]
#[command(name = "scopebind")]
#[command(about = "Scopebind - reactive mustache templates with {{#with}} scoping")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template against a data file
    Render {
        /// Path to the template file
        template: String,

        /// Data file (.json, or YAML otherwise)
        #[arg(short, long)]
        data: Option<String>,

        /// Render config (YAML)
        #[arg(short, long)]
        config: Option<String>,

        /// Update the store after the first render (PATH=JSON), repeatable
        #[arg(short, long = "set", value_name = "PATH=JSON")]
        sets: Vec<String>,
    },

    /// Parse a template without rendering
    Check {
        /// Path to the template file
        template: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render {
            template,
            data,
            config,
            sets,
        } => render_template(&template, data.as_deref(), config.as_deref(), &sets),
        Commands::Check { template } => check_template(&template),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn render_template(
    file: &str,
    data: Option<&str>,
    config: Option<&str>,
    sets: &[String],
) -> Result<(), ScopeError> {
    let source = fs::read_to_string(file)?;
    let config = match config {
        Some(path) => RenderConfig::load(path)?,
        None => {
            let mut config = RenderConfig::default();
            config.apply_env()?;
            config
        }
    };

    let root = match data {
        Some(path) => load_data(path)?,
        None => Value::Object(Default::default()),
    };
    let updates = sets
        .iter()
        .map(|raw| parse_set(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let log = DiagnosticLog::new();
    let env = Env::new(config).with_diagnostics(Arc::new(log.clone()));
    let store = Store::new(root);
    let rendered = env.render_str(&source, &store)?;

    for (path, value) in updates {
        store.set(&path, value)?;
        rendered.flush()?;
    }

    println!("{}", rendered.html()?);

    for diagnostic in log.warnings() {
        eprintln!(
            "{} [{}] {}",
            "warning:".yellow().bold(),
            diagnostic.kind.helper(),
            diagnostic.kind.message()
        );
    }

    Ok(())
}

fn check_template(file: &str) -> Result<(), ScopeError> {
    let source = fs::read_to_string(file)?;
    let program = template::parse(&source)?;

    println!("{} Template '{}' is valid", "✓".green(), file);
    println!("  Nodes: {}", program.nodes.len());

    Ok(())
}

fn load_data(path: &str) -> Result<Value, ScopeError> {
    let text = fs::read_to_string(path)?;
    let is_json = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(&text)?)
    } else {
        Ok(serde_yaml::from_str(&text)?)
    }
}

/// `PATH=JSON`; a value that is not JSON is taken as a string
fn parse_set(raw: &str) -> Result<(String, Value), ScopeError> {
    let (path, value) = raw.split_once('=').ok_or_else(|| ScopeError::Config {
        reason: format!("--set expects PATH=JSON, got '{raw}'"),
    })?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((path.trim().to_string(), value))
}
