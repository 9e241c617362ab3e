//! gazex — gazetteer import and place-resolution CLI.
//!
//! Run with: cargo run -p gazex-cli -- import-all

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gazex_common::{GazetteerSource, GazexConfig, JobStatus};
use gazex_db::{Page, PgStore, SearchFilters};
use gazex_ingestion::fetch::PreStagedProvider;
use gazex_ingestion::{CancelFlag, ImportRunner};
use gazex_resolver::ResolverEngine;

#[derive(Parser)]
#[command(name = "gazex", version, about = "Multi-source gazetteer ingestion and place resolution")]
struct Cli {
    /// Path to a gazex.toml config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Truncate and reload one source from its staged payload.
    Import {
        /// geonames | wof | btaa | fast
        source: String,
    },
    /// Reload every source concurrently.
    ImportAll,
    /// Filtered search, merged across sources or against one.
    Search {
        query: String,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        type_code: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Resolve a bare name (plus optional type hint) into ranked candidates.
    Resolve {
        name: String,
        #[arg(long)]
        hint: Option<String>,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Show each source with its loaded record count.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let store = Arc::new(
        PgStore::connect(&config.database_url()?)
            .await
            .context("connecting to the gazetteer database")?,
    );

    match cli.command {
        Command::Import { source } => {
            let source = parse_source(&source)?;
            let runner = runner(&config, store);
            let job = runner.run_import(source, &CancelFlag::new()).await;
            println!("{}", job.summary());
            if job.status == JobStatus::Failed {
                bail!(job.failure.unwrap_or_else(|| "import failed".to_string()));
            }
        }
        Command::ImportAll => {
            let runner = runner(&config, store);
            let jobs = runner.run_all(&CancelFlag::new()).await;
            for job in &jobs {
                println!("{}", job.summary());
            }
            if jobs.iter().any(|j| j.status == JobStatus::Failed) {
                bail!("one or more imports failed");
            }
        }
        Command::Search {
            query,
            source,
            type_code,
            country,
            page,
        } => {
            let engine = ResolverEngine::new(store, &config);
            let filters = SearchFilters {
                name: Some(query),
                type_code,
                country_code: country,
                ..SearchFilters::default()
            };
            let page = Page {
                number: page,
                size: config.search.page_size,
            };
            match source {
                Some(source) => {
                    let source = parse_source(&source)?;
                    let result = engine.search_source(source, &filters, &page).await?;
                    info!(source = %source, total = result.total, "search finished");
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                None => {
                    let merged = engine.search_all(&filters, &page).await;
                    if merged.is_partial() {
                        info!(failed = ?merged.failed_sources, "merged search returned partial results");
                    }
                    println!("{}", serde_json::to_string_pretty(&merged)?);
                }
            }
        }
        Command::Resolve { name, hint, top_k } => {
            let engine = ResolverEngine::new(store, &config);
            let candidates = engine.resolve(&name, hint.as_deref(), top_k).await?;
            println!("{}", serde_json::to_string_pretty(&candidates)?);
        }
        Command::List => {
            use gazex_db::PlaceReader;
            for source in GazetteerSource::all() {
                let count = store.count(source).await?;
                println!("{source:10} {count} records");
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<GazexConfig> {
    match path {
        Some(p) => GazexConfig::load(p).with_context(|| format!("loading {}", p.display())),
        None => {
            let default = std::path::Path::new("gazex.toml");
            if default.exists() {
                GazexConfig::load(default).context("loading gazex.toml")
            } else {
                Ok(GazexConfig::default())
            }
        }
    }
}

fn parse_source(raw: &str) -> anyhow::Result<GazetteerSource> {
    GazetteerSource::from_str_opt(&raw.to_lowercase())
        .with_context(|| format!("unknown source {raw:?}; expected geonames, wof, btaa, or fast"))
}

fn runner(config: &GazexConfig, store: Arc<PgStore>) -> ImportRunner {
    ImportRunner::new(
        Arc::new(PreStagedProvider::new(config.data_dir.clone())),
        store,
        config.ingest.clone(),
    )
}
