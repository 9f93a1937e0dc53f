//! dynbrowse - plan and evaluate query expressions from the command line.
//!
//! # Usage
//!
//! ```text
//! dynbrowse plan --schema orders.json 'pk = "abc" and sk > 10 and active = true'
//! dynbrowse filter --schema orders.json --items scan.json --limit 20 'customer is not "ANY"'
//! dynbrowse eval 'range(1, 3)'
//! ```
//!
//! Schema files are `describe-table` output (`{"Table": {...}}`). Item files
//! are either a JSON array of items or `scan` output (`{"Items": [...]}`).
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LOG_LEVEL` | `warn` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//! | `DYNBROWSE_DEFAULT_LIMIT` | `1000` | Maximum rows `filter` returns |

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dynbrowse_core::BrowseConfig;
use tracing_subscriber::EnvFilter;

/// Plan and evaluate dynbrowse query expressions.
#[derive(Parser, Debug)]
#[command(name = "dynbrowse", version, about)]
struct Cli {
    /// Log level used when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the query plan of an expression as JSON.
    Plan {
        /// `describe-table` output for the table.
        #[arg(long)]
        schema: PathBuf,
        /// The expression.
        expression: String,
    },
    /// Apply an expression to items read from a file.
    Filter {
        /// `describe-table` output for the table.
        #[arg(long)]
        schema: PathBuf,
        /// Items as a JSON array or `scan` output.
        #[arg(long)]
        items: PathBuf,
        /// Maximum number of items to print.
        #[arg(long)]
        limit: Option<usize>,
        /// The expression.
        expression: String,
    },
    /// Evaluate an expression and print its value.
    Eval {
        /// `describe-table` output, when the expression names key attributes.
        #[arg(long)]
        schema: Option<PathBuf>,
        /// A single item to evaluate against, in store JSON.
        #[arg(long)]
        item: Option<PathBuf>,
        /// The expression.
        expression: String,
    },
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `log_level` is used as the filter.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BrowseConfig::from_env();
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_tracing(&config.log_level)?;

    let output = match cli.command {
        Command::Plan { schema, expression } => commands::plan(&schema, &expression)?,
        Command::Filter {
            schema,
            items,
            limit,
            expression,
        } => commands::filter(
            &schema,
            &items,
            limit.unwrap_or(config.default_limit),
            &expression,
        )?,
        Command::Eval {
            schema,
            item,
            expression,
        } => commands::eval(schema.as_deref(), item.as_deref(), &expression)?,
    };

    let text = serde_json::to_string_pretty(&output).context("failed to render output")?;
    println!("{text}");
    Ok(())
}
