//! # Visa Assist CLI (`visa`)
//!
//! The `visa` binary builds the visa document store, runs retrieval, and
//! drives the travel assistant from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! visa --config ./config/visa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `visa build` | Normalize the dataset and build (or reuse) the vector store |
//! | `visa search "<query>"` | Diversity-aware search over the store |
//! | `visa ask "<message>"` | Process one chat turn and print the reply |
//! | `visa chat` | Interactive chat session |
//! | `visa history` | Print a thread's messages |
//! | `visa threads` | List conversation threads |
//! | `visa tools list` | List registered tools |
//! | `visa tools call <name>` | Invoke a tool with `--param key=value` |
//!
//! Logs go to stderr and are filtered by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use visa_assist::commands::{self, DEFAULT_THREAD};
use visa_assist::config;
use visa_assist::progress::ProgressMode;
use visa_assist_core::retrieval::SearchParams;

/// Visa Assist: a travel assistant grounded in a passport-index dataset.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/visa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "visa",
    about = "Visa Assist: a travel assistant grounded in a passport-index dataset",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/visa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize the dataset and build the vector store.
    ///
    /// A complete store is reused without any embedding calls unless
    /// `--force` is given. A store left incomplete by an interrupted build
    /// must be rebuilt with `--force`.
    Build {
        /// Rebuild even if a complete store exists.
        #[arg(long)]
        force: bool,

        /// Rules per embedding call (overrides `embedding.batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Progress output on stderr. Defaults to human on a TTY, otherwise off.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search visa requirements.
    Search {
        query: String,

        /// Results to return.
        #[arg(long)]
        k: Option<usize>,

        /// Candidates considered before re-ranking.
        #[arg(long)]
        fetch_k: Option<usize>,

        /// Relevance/diversity trade-off in [0, 1].
        #[arg(long)]
        lambda: Option<f64>,

        /// Print hits as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Send one message and print the reply.
    Ask {
        message: String,

        #[arg(long, default_value = DEFAULT_THREAD)]
        thread: String,
    },

    /// Interactive chat; `exit` or `quit` to stop.
    Chat {
        #[arg(long, default_value = DEFAULT_THREAD)]
        thread: String,
    },

    /// Print the messages of a thread.
    History {
        #[arg(long, default_value = DEFAULT_THREAD)]
        thread: String,
    },

    /// List conversation threads, most recent first.
    Threads,

    /// Inspect and invoke tools.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List registered tools with their parameter schemas.
    List,

    /// Call a tool by name.
    Call {
        name: String,

        /// Tool parameter as KEY=VALUE; VALUE is parsed as JSON when possible.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Tools {
        action: ToolsAction::List,
    } = &cli.command
    {
        return commands::run_tools_list();
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build {
            force,
            batch_size,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_build(&cfg, force, batch_size, mode).await?;
        }
        Commands::Search {
            query,
            k,
            fetch_k,
            lambda,
            json,
        } => {
            let defaults = cfg.retrieval.params();
            let params = SearchParams {
                k: k.unwrap_or(defaults.k),
                fetch_k: fetch_k.unwrap_or(defaults.fetch_k),
                diversity_lambda: lambda.unwrap_or(defaults.diversity_lambda),
            };
            commands::run_search(&cfg, &query, params, json).await?;
        }
        Commands::Ask { message, thread } => {
            commands::run_ask(&cfg, &thread, &message).await?;
        }
        Commands::Chat { thread } => {
            commands::run_chat(&cfg, &thread).await?;
        }
        Commands::History { thread } => {
            commands::run_history(&cfg, &thread).await?;
        }
        Commands::Threads => {
            commands::run_threads(&cfg).await?;
        }
        Commands::Tools { action } => match action {
            ToolsAction::Call { name, params } => {
                commands::run_tools_call(&cfg, &name, params).await?;
            }
            ToolsAction::List => {
                // Handled above (before config loading)
                unreachable!()
            }
        },
    }

    Ok(())
}
