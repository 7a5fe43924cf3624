//! tsa-in - Post capture and training sample loading
//!
//! `stream` reads newline-delimited JSON posts from stdin, keeps those
//! matching the keyword rules and stores them in batches. `load` fills the
//! training pool from the curated samples and/or a labeled JSONL file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tsa_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV};
use tsa_common::models::RawPost;
use tsa_in::loader::{self, SENTIMENT140_SOURCE};
use tsa_in::{BatchPolicy, LogOnlySink, PostBatcher, PostSink, RuleSet, SqlitePostSink};

#[derive(Parser, Debug)]
#[command(name = "tsa-in")]
#[command(about = "Sentiment data ingestion")]
#[command(version)]
struct Args {
    /// Data folder holding the database
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture matching posts from NDJSON on stdin
    Stream {
        /// Keywords to filter on (comma separated or repeated)
        #[arg(short, long, required = true, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Tag for the rules (defaults to each keyword)
        #[arg(long)]
        tag: Option<String>,

        /// Log posts instead of storing them
        #[arg(long)]
        no_db: bool,
    },
    /// Load labeled training samples
    Load {
        #[arg(long, value_enum, default_value_t = LoadSource::Both)]
        source: LoadSource,

        /// Labeled JSONL file (sentiment140 shape)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Maximum samples read from the file
        #[arg(long)]
        limit: Option<usize>,

        /// Source name recorded on file samples
        #[arg(long, default_value = SENTIMENT140_SOURCE)]
        source_name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LoadSource {
    Custom,
    File,
    Both,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tsa_in={level},tsa_common={level}", level = config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting tsa-in {}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new(args.root_folder.as_deref(), &config).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    let db_pool = tsa_common::db::init_database(&initializer.database_path()).await?;

    match args.command {
        Command::Stream { keywords, tag, no_db } => {
            let mut rules = RuleSet::new();
            rules.add_rules(keywords.as_slice(), tag.as_deref())?;
            for rule in rules.rules() {
                info!(value = %rule.value, tag = %rule.tag, "Stream rule");
            }

            let sink: Arc<dyn PostSink> = if no_db {
                Arc::new(LogOnlySink)
            } else {
                Arc::new(SqlitePostSink::new(db_pool))
            };
            let batcher = PostBatcher::spawn(BatchPolicy::from(&config.ingest), sink, None);

            tokio::select! {
                result = read_stdin(&rules, &batcher) => result?,
                _ = shutdown_signal() => {}
            }

            let stats = batcher.close().await;
            println!("{}", serde_json::to_string(&stats)?);
        }
        Command::Load { source, path, limit, source_name } => {
            if source == LoadSource::File && path.is_none() {
                bail!("--path is required with --source file");
            }

            if matches!(source, LoadSource::File | LoadSource::Both) {
                match &path {
                    Some(path) => {
                        let report =
                            loader::load_labeled_jsonl(&db_pool, path, &source_name, limit).await?;
                        println!("{}", serde_json::to_string(&report)?);
                    }
                    None => warn!("No --path given, skipping file samples"),
                }
            }
            if matches!(source, LoadSource::Custom | LoadSource::Both) {
                let report = loader::load_curated(&db_pool).await?;
                println!("{}", serde_json::to_string(&report)?);
            }
        }
    }

    Ok(())
}

/// Forward matching stdin posts to the batcher until EOF
async fn read_stdin(rules: &RuleSet, batcher: &PostBatcher) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let post: RawPost = match serde_json::from_str(&line) {
            Ok(post) => post,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed post");
                continue;
            }
        };
        if !rules.matches(&post) {
            debug!(post_id = %post.post_id, "Post matches no rule");
            continue;
        }
        info!(post_id = %post.post_id, tags = ?rules.matching_tags(&post), "Received post");
        batcher.submit(post).await?;
    }

    info!("Input stream ended");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, stopping capture");
}
