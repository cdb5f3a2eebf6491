//! mycf - crawl MyCareersFuture job listings and read back what was stored.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mycf_crawler::exporters::jobs::{export_csv, format_table};
use mycf_crawler::{
    load_keywords, CrawlConfig, DedupStore, FetchMode, JobQuery, PartitionMode, PartitionedWriter,
    ProbePolicy, Scheduler, SqliteStore,
};

#[derive(Parser)]
#[command(name = "mycf")]
#[command(about = "MyCareersFuture job crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl keywords and append new jobs to the partitioned CSV output
    Crawl(CrawlArgs),

    /// List or export jobs from the dedup store
    Jobs(JobsArgs),
}

#[derive(Args)]
struct CrawlArgs {
    /// Single keyword (added to any keywords file)
    #[arg(short = 'q', long)]
    query: Option<String>,

    /// File with one keyword per line; `#` starts a comment
    #[arg(long)]
    keywords_file: Option<PathBuf>,

    #[arg(long)]
    within_days: Option<u32>,

    #[arg(long)]
    max_pages: Option<u32>,

    /// api | dom
    #[arg(long)]
    mode: Option<FetchMode>,

    #[arg(long)]
    per_page: Option<u32>,

    #[arg(long)]
    sort: Option<String>,

    /// keyword | category
    #[arg(long)]
    split_mode: Option<PartitionMode>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Dedup store path
    #[arg(long)]
    db: Option<PathBuf>,

    #[arg(long)]
    concurrency: Option<usize>,

    /// Do not consult robots.txt
    #[arg(long)]
    no_robots: bool,

    /// all | first-success
    #[arg(long)]
    probe_policy: Option<ProbePolicy>,
}

impl CrawlArgs {
    fn apply(self, mut config: CrawlConfig) -> CrawlConfig {
        config.keywords = load_keywords(self.keywords_file.as_deref(), self.query.as_deref());

        if let Some(days) = self.within_days {
            config.within_days = days;
        }
        if let Some(pages) = self.max_pages {
            config.max_pages = pages;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(per_page) = self.per_page {
            config.per_page = per_page;
        }
        if let Some(sort) = self.sort {
            config.sort = sort;
        }
        if let Some(split) = self.split_mode {
            config.partition = split;
        }
        if let Some(dir) = self.output_dir {
            config.output_root = dir;
        }
        if let Some(db) = self.db {
            config.dedup_store_path = db;
        }
        if let Some(n) = self.concurrency {
            config.throttle.concurrency = n;
        }
        if self.no_robots {
            config.obey_robots = false;
        }
        if let Some(policy) = self.probe_policy {
            config.probe_policy = policy;
        }
        config
    }
}

#[derive(Args)]
struct JobsArgs {
    /// Dedup store path
    #[arg(long)]
    db: Option<PathBuf>,

    #[arg(long, default_value_t = 50)]
    limit: usize,

    /// LIKE pattern on category
    #[arg(long, default_value = "%")]
    category: String,

    /// LIKE pattern on the search keyword
    #[arg(long, default_value = "%")]
    keyword: String,

    /// LIKE pattern on posted, e.g. `2025-10%`
    #[arg(long, default_value = "%")]
    posted_prefix: String,

    /// Also write the rows to this CSV file
    #[arg(long)]
    export_csv: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mycf_crawler=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(args) => cmd_crawl(args).await,
        Commands::Jobs(args) => cmd_jobs(args).await,
    }
}

async fn cmd_crawl(args: CrawlArgs) -> Result<()> {
    let config = args.apply(CrawlConfig::from_env().context("Invalid MYCF_* environment")?);

    let store_path = config.dedup_store_path.clone();
    let scheduler = Scheduler::open(config)
        .await
        .with_context(|| format!("Failed to start crawl with store {}", store_path.display()))?;

    let config = scheduler.config();
    let mut writer =
        PartitionedWriter::for_today(&config.output_root, config.partition, config.timezone());

    info!(
        keywords = ?config.keywords,
        store = %config.dedup_store_path.display(),
        output = %config.output_root.display(),
        "Configured crawl"
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            on_interrupt.cancel();
        }
    });

    let summary = scheduler.run(&mut writer, &cancel).await;
    scheduler.store().close().await;

    println!(
        "{} new, {} duplicate, {} invalid, {} stale, {} parse failures",
        summary.admitted, summary.duplicate, summary.invalid, summary.stale, summary.parse_failed
    );
    if !summary.is_success() {
        warn!("One or more keywords failed");
    }
    Ok(())
}

async fn cmd_jobs(args: JobsArgs) -> Result<()> {
    let db = match args.db {
        Some(db) => db,
        None => {
            CrawlConfig::from_env()
                .context("Invalid MYCF_* environment")?
                .dedup_store_path
        }
    };

    let store = SqliteStore::open_existing(&db)
        .await
        .with_context(|| format!("Cannot read dedup store {}", db.display()))?;

    let query = JobQuery::new()
        .with_category(args.category)
        .with_keyword(args.keyword)
        .with_posted_prefix(args.posted_prefix)
        .with_limit(args.limit);
    let rows = store.query_jobs(&query).await.context("Query failed")?;
    store.close().await;

    println!("{}", format_table(&rows));

    if let Some(path) = args.export_csv {
        export_csv(&rows, &path)
            .with_context(|| format!("Failed to export {}", path.display()))?;
        println!("Exported {} rows -> {}", rows.len(), path.display());
    }
    Ok(())
}
