#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
//! `QuiverDB` CLI - administer a database directory from the shell.
//!
//! Usage:
//!   `quiverdb create ./data docs --dimension 768 --metric cosine --index hnsw`
//!   `quiverdb insert ./data docs --file vectors.jsonl`
//!   `quiverdb search ./data docs --vector "0.1,0.2,0.3" --limit 10`
//!   `quiverdb search ./data docs --text "a question" --limit 5`
//!   `quiverdb info ./data [docs]`

mod import;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use quiverdb_core::embedding::VectorizerConfig;
use quiverdb_core::{
    CancelToken, Database, DistanceMetric, EngineConfig, IndexKind, SearchRequest,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quiverdb")]
#[command(author, version, about = "QuiverDB - embedded vector database")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a quiverdb.toml (defaults and env vars apply otherwise).
    #[arg(long, global = true)]
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
    Manhattan,
}

impl From<MetricArg> for DistanceMetric {
    fn from(m: MetricArg) -> Self {
        match m {
            MetricArg::Cosine => DistanceMetric::Cosine,
            MetricArg::Euclidean => DistanceMetric::Euclidean,
            MetricArg::Dot => DistanceMetric::DotProduct,
            MetricArg::Manhattan => DistanceMetric::Manhattan,
        }
    }
}

/// CLI index option
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum IndexArg {
    #[default]
    Flat,
    Hnsw,
}

impl From<IndexArg> for IndexKind {
    fn from(i: IndexArg) -> Self {
        match i {
            IndexArg::Flat => IndexKind::Flat,
            IndexArg::Hnsw => IndexKind::Hnsw,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a collection
    Create {
        /// Database directory
        database: PathBuf,
        /// Collection name
        name: String,
        /// Vector dimension
        #[arg(long)]
        dimension: usize,
        /// Distance metric
        #[arg(long, value_enum, default_value_t = MetricArg::Cosine)]
        metric: MetricArg,
        /// Index kind
        #[arg(long, value_enum, default_value_t = IndexArg::Flat)]
        index: IndexArg,
        /// Attach the offline feature-hashing vectorizer
        #[arg(long)]
        local_vectorizer: bool,
    },
    /// List collections
    List {
        /// Database directory
        database: PathBuf,
    },
    /// Show database or collection details
    Info {
        /// Database directory
        database: PathBuf,
        /// Collection name (all collections when omitted)
        name: Option<String>,
    },
    /// Import records from a JSONL file
    Insert {
        /// Database directory
        database: PathBuf,
        /// Collection name
        name: String,
        /// JSONL file: one {"id", "vector"|"text", "metadata"?} per line
        #[arg(long)]
        file: PathBuf,
    },
    /// Search a collection
    Search {
        /// Database directory
        database: PathBuf,
        /// Collection name
        name: String,
        /// Comma-separated query vector
        #[arg(long, conflicts_with = "text")]
        vector: Option<String>,
        /// Text query (requires a configured vectorizer)
        #[arg(long)]
        text: Option<String>,
        /// Number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Results to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Include stored content in the output
        #[arg(long)]
        content: bool,
    },
    /// Drop a collection and its files
    Drop {
        /// Database directory
        database: PathBuf,
        /// Collection name
        name: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let engine = match &cli.config {
        Some(path) => EngineConfig::load_from_path(path)?,
        None => EngineConfig::load()?,
    };

    match cli.command {
        Commands::Create {
            database,
            name,
            dimension,
            metric,
            index,
            local_vectorizer,
        } => {
            let db = Database::open_with_config(&database, engine)?;
            let mut config = db.collection_config(&name, dimension, metric.into(), index.into());
            if local_vectorizer {
                config = config.with_vectorizer(VectorizerConfig::local(dimension));
            }
            db.create_collection(config)?;
            println!("created collection '{name}'");
        }
        Commands::List { database } => {
            let db = Database::open_with_config(&database, engine)?;
            for name in db.list_collections() {
                println!("{name}");
            }
        }
        Commands::Info { database, name } => {
            let db = Database::open_with_config(&database, engine)?;
            let names = match name {
                Some(name) => vec![name],
                None => db.list_collections(),
            };
            for name in names {
                let collection = db
                    .get_collection(&name)
                    .with_context(|| format!("collection '{name}' not found"))?;
                let info = collection.info();
                println!(
                    "{}: {} vectors, dim {}, {} metric, {} index",
                    info.name, info.count, info.dimension, info.metric, info.index_kind
                );
                println!(
                    "  cache: {} entries, {:.1}% hit rate | index: {} live, {} deleted",
                    info.cache.entries,
                    info.cache.hit_rate() * 100.0,
                    info.index.len,
                    info.index.deleted,
                );
            }
        }
        Commands::Insert {
            database,
            name,
            file,
        } => {
            let db = Database::open_with_config(&database, engine)?;
            let collection = db
                .get_collection(&name)
                .with_context(|| format!("collection '{name}' not found"))?;
            let report = import::import_jsonl(&collection, &file)?;
            println!(
                "imported {} records ({} failed) in {:.2}s",
                report.inserted,
                report.failed,
                report.elapsed.as_secs_f64()
            );
            collection.close()?;
        }
        Commands::Search {
            database,
            name,
            vector,
            text,
            limit,
            offset,
            content,
        } => {
            let db = Database::open_with_config(&database, engine)?;
            let collection = db
                .get_collection(&name)
                .with_context(|| format!("collection '{name}' not found"))?;
            let cancel = CancelToken::never();

            let hits = match (vector, text) {
                (Some(vector), _) => {
                    let vector = parse_vector(&vector)?;
                    let mut request = SearchRequest::new(vector, limit).with_offset(offset);
                    request.include_content = content;
                    collection.search(&request, &cancel)?
                }
                (None, Some(text)) => collection.search_text(&text, limit, None, &cancel)?,
                (None, None) => bail!("pass either --vector or --text"),
            };

            for (rank, hit) in hits.iter().enumerate() {
                print!("{:>3}. {}  score={:.6}", rank + 1 + offset, hit.id, hit.score);
                if let Some(content) = &hit.content {
                    print!("  {content:?}");
                }
                println!();
            }
        }
        Commands::Drop { database, name } => {
            let db = Database::open_with_config(&database, engine)?;
            db.delete_collection(&name)?;
            println!("dropped collection '{name}'");
        }
    }

    Ok(())
}

fn parse_vector(input: &str) -> Result<Vec<f32>> {
    input
        .trim_matches(|c| c == '[' || c == ']')
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid vector component {part:?}"))
        })
        .collect()
}
