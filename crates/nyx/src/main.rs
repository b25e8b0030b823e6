//! Nyx CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nyx::config::NyxConfig;
use nyx::console::{self, ConsolePlatform};
use nyx::runtime::Runtime;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Nyx chat assistant
#[derive(Parser, Debug)]
#[command(name = "nyx")]
#[command(about = "Chat assistant with graph-backed long-term memory")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "nyx.yaml", global = true)]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chat over stdin/stdout
    Chat {
        /// User id to chat as
        #[arg(short, long, default_value = "console-user")]
        user: String,
    },

    /// Segment, summarize and store a user's recent history
    Digest {
        /// User id to digest
        #[arg(short, long)]
        user: String,
    },

    /// Search stored messages and summaries
    Search {
        /// Search text
        query: String,

        /// Similarity floor (defaults to the configured one)
        #[arg(long)]
        min_similarity: Option<f32>,

        /// Maximum hits
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = NyxConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let runtime = Runtime::connect(config).context("starting runtime")?;

    match cli.command {
        Commands::Chat { user } => {
            let platform = Arc::new(ConsolePlatform::new(&runtime.config.bot_name));
            eprintln!("Chatting as {user}. Ctrl-D to quit.");
            console::run(runtime.bot.clone(), platform, &user).await?;
        }

        Commands::Digest { user } => {
            let summaries = runtime.digester.digest_user(&user).await?;
            if summaries.is_empty() {
                println!("Nothing new to digest for {user}");
            }
            for summary in summaries {
                println!(
                    "[{} .. {}] {}\n  {}",
                    summary.start_time.format("%Y-%m-%d %H:%M"),
                    summary.end_time.format("%Y-%m-%d %H:%M"),
                    summary.topic,
                    summary.summary
                );
            }
        }

        Commands::Search {
            query,
            min_similarity,
            limit,
        } => {
            let min = min_similarity.unwrap_or(runtime.config.search_min_similarity);
            let limit = limit.unwrap_or(runtime.config.search_limit);

            let hits = runtime.memory.search(&query, min, limit).await?;
            println!("Messages ({}):", hits.len());
            for hit in hits {
                println!(
                    "  {:.3}  {}  {}: {}",
                    hit.score,
                    hit.timestamp.format("%Y-%m-%d %H:%M"),
                    hit.sender_name,
                    hit.content
                );
            }

            let summaries = runtime.memory.relevant_summaries(&query, limit).await?;
            println!("Summaries ({}):", summaries.len());
            for (summary, score) in summaries {
                println!("  {:.3}  {}: {}", score, summary.topic, summary.summary);
            }
        }
    }

    Ok(())
}
