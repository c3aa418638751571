#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
//! `tessera` - command-line tool for Tessera HNSW indexes
//!
//! Usage:
//!   `tessera create ./idx --dim 768 --metric cosine`
//!   `tessera insert ./idx vectors.jsonl`
//!   `tessera search ./idx --vector '[0.1, 0.2, ...]' -k 10`
//!   `tessera info ./idx`

mod import;
#[cfg(test)]
mod import_tests;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tessera_core::index::CONFIG_FILE;
use tessera_core::{DistanceMetric, HnswIndex, IndexOptions, SearchRequest, TesseraConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(
    author,
    version,
    about = "Tessera CLI - Durable HNSW vector index"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to `tessera.toml` inside the index directory)
    #[arg(long, global = true, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// CLI metric option
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum MetricArg {
    #[default]
    Cosine,
    Euclidean,
    Dot,
}

impl From<MetricArg> for DistanceMetric {
    fn from(m: MetricArg) -> Self {
        match m {
            MetricArg::Cosine => DistanceMetric::Cosine,
            MetricArg::Euclidean => DistanceMetric::Euclidean,
            MetricArg::Dot => DistanceMetric::DotProduct,
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum FormatArg {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty index
    Create {
        /// Path to index directory
        path: PathBuf,

        /// Vector dimension
        #[arg(long)]
        dim: usize,

        /// Distance metric
        #[arg(long, value_enum, default_value = "cosine")]
        metric: MetricArg,
    },

    /// Insert vectors from a JSON Lines file
    Insert {
        /// Path to index directory
        path: PathBuf,

        /// JSONL file, one `{"id": "<uuid>", "vector": [...]}` per line
        file: PathBuf,
    },

    /// Run a k-NN query
    Search {
        /// Path to index directory
        path: PathBuf,

        /// Query vector (JSON array or comma separated)
        #[arg(long)]
        vector: String,

        /// Number of results
        #[arg(short, long, default_value = "10")]
        k: usize,

        /// Beam width (defaults to `search.ef_search`)
        #[arg(long)]
        ef: Option<usize>,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: FormatArg,
    },

    /// Delete a node by internal id
    Delete {
        /// Path to index directory
        path: PathBuf,

        /// Internal id returned by insert
        id: u64,
    },

    /// Unlink all tombstoned nodes now
    Compact {
        /// Path to index directory
        path: PathBuf,
    },

    /// Write a snapshot and drop the WAL it covers
    Snapshot {
        /// Path to index directory
        path: PathBuf,
    },

    /// Show index statistics
    Info {
        /// Path to index directory
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: FormatArg,
    },

    /// Run recovery and print what it found
    Verify {
        /// Path to index directory
        path: PathBuf,
    },
}

impl Commands {
    fn path(&self) -> &Path {
        match self {
            Self::Create { path, .. }
            | Self::Insert { path, .. }
            | Self::Search { path, .. }
            | Self::Delete { path, .. }
            | Self::Compact { path }
            | Self::Snapshot { path }
            | Self::Info { path, .. }
            | Self::Verify { path } => path,
        }
    }
}

fn load_config(explicit: Option<&Path>, index_dir: &Path) -> anyhow::Result<TesseraConfig> {
    let path = explicit.map_or_else(|| index_dir.join(CONFIG_FILE), Path::to_path_buf);
    let config = TesseraConfig::load_from_path(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Logs go to stderr so JSON output on stdout stays parseable.
fn init_tracing(config: &TesseraConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.command.path())?;
    init_tracing(&config);

    match cli.command {
        Commands::Create { path, dim, metric } => {
            let index = HnswIndex::create(&path, IndexOptions::new(dim, metric.into()), config)
                .with_context(|| format!("Failed to create index at {}", path.display()))?;
            println!(
                "Created {}-d {} index at {}",
                dim,
                DistanceMetric::from(metric),
                path.display()
            );
            index.close()?;
        }
        Commands::Insert { path, file } => {
            let index = HnswIndex::open(&path, config)?;
            let stats = import::import_jsonl(&index, &file)?;
            index.close()?;
            output::print_import_stats(&stats);
        }
        Commands::Search {
            path,
            vector,
            k,
            ef,
            timeout_ms,
            format,
        } => {
            let query = import::parse_vector(&vector)?;
            let index = HnswIndex::open(&path, config)?;
            let mut request = SearchRequest::new(k);
            if let Some(ef) = ef {
                request = request.with_ef(ef);
            }
            if let Some(ms) = timeout_ms {
                request = request.with_timeout(std::time::Duration::from_millis(ms));
            }
            let hits = index.search(&query, &request)?;
            index.close()?;
            if format == FormatArg::Json {
                println!("{}", serde_json::to_string_pretty(&output::hits_json(&hits))?);
            } else {
                output::print_hits(&hits);
            }
        }
        Commands::Delete { path, id } => {
            let index = HnswIndex::open(&path, config)?;
            index.delete(id)?;
            index.close()?;
            println!("Deleted {}", id);
        }
        Commands::Compact { path } => {
            let index = HnswIndex::open(&path, config)?;
            let stats = index.compact()?;
            index.close()?;
            output::print_compaction(&stats);
        }
        Commands::Snapshot { path } => {
            let index = HnswIndex::open(&path, config)?;
            let seq = index.flush()?;
            index.close()?;
            println!("Snapshot covers sequence {}", seq);
        }
        Commands::Info { path, format } => {
            let index = HnswIndex::open(&path, config)?;
            let stats = index.stats();
            index.close()?;
            if format == FormatArg::Json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                output::print_stats(&path, &stats);
            }
        }
        Commands::Verify { path } => {
            let mut config = config;
            config.snapshot.on_close = false;
            let index = HnswIndex::open(&path, config)?;
            let report = index.recovery_report().clone();
            index.close()?;
            output::print_report(&report);
        }
    }

    Ok(())
}
