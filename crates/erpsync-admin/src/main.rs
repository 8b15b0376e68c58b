use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use erpsync_core::db::PgWarehouse;
use erpsync_core::loaders::{calendar, compare};
use erpsync_core::reports::ReportWriter;
use erpsync_core::{
    run_loaders, DateRange, EtlConfig, ErpApiClient, Loader, LoaderContext, RunSummary,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Occasional erpsync maintenance tasks", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "erpsync.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert new codes from the catalog files into their dimensions
    Catalogs,
    /// Regenerate the calendar dimension
    Calendar(CalendarArgs),
    /// Copy the current inventory into today's snapshot
    InventorySnapshot,
    /// List the records only present in the second of two extraction files
    CompareExtractions(CompareArgs),
}

#[derive(Args, Debug, Default)]
struct CalendarArgs {
    /// First day to generate (default 2020-01-01)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day to generate (default 2030-12-31)
    #[arg(long)]
    end: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    first: PathBuf,
    second: PathBuf,
    /// Comma-separated key columns
    #[arg(long, value_delimiter = ',')]
    key: Vec<String>,
    /// Directory for the resulting report
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Catalogs => handle_loader(&cli.config, Loader::Catalogs, None).await,
        Command::Calendar(args) => handle_calendar(&cli.config, args).await,
        Command::InventorySnapshot => {
            handle_loader(&cli.config, Loader::InventorySnapshot, None).await
        }
        Command::CompareExtractions(args) => handle_compare(args),
    }
}

async fn handle_calendar(config_path: &Path, args: CalendarArgs) -> Result<()> {
    let defaults = calendar::default_range()?;
    let range = DateRange::new(
        args.start.unwrap_or(defaults.start),
        args.end.unwrap_or(defaults.end),
    )?;
    handle_loader(config_path, Loader::Calendar, Some(range)).await
}

async fn handle_loader(
    config_path: &Path,
    loader: Loader,
    window: Option<DateRange>,
) -> Result<()> {
    let config = EtlConfig::load(config_path).with_context(|| {
        format!("failed to load configuration from {}", config_path.display())
    })?;
    let warehouse = PgWarehouse::connect(config.database_url()?).await?;
    let source = ErpApiClient::new(&config.api).context("failed to build the ERP API client")?;

    let mut ctx = LoaderContext::new(&config, &source, &warehouse);
    if let Some(window) = window {
        ctx = ctx.with_window(window);
    }
    let summary = run_loaders(&ctx, &[loader]).await;
    warehouse.close().await;

    report(&summary)
}

fn report(summary: &RunSummary) -> Result<()> {
    for outcome in &summary.outcomes {
        match (&outcome.report, &outcome.error) {
            (Some(report), _) => {
                println!(
                    "{}: {} read, {} inserted, {} updated, {} already present",
                    outcome.loader,
                    report.extracted,
                    report.sink.inserted,
                    report.sink.updated,
                    report.sink.skipped
                );
                for note in &report.notes {
                    println!("  note: {note}");
                }
                if let Some(error) = &outcome.error {
                    println!("  failed: {error}");
                }
            }
            (None, Some(error)) => println!("{}: failed: {error}", outcome.loader),
            (None, None) => println!("{}: no result", outcome.loader),
        }
    }

    if !summary.is_success() {
        bail!("{} loader(s) failed", summary.failed());
    }
    Ok(())
}

fn handle_compare(args: CompareArgs) -> Result<()> {
    let key: Vec<&str> = if args.key.is_empty() {
        compare::DEFAULT_KEY.to_vec()
    } else {
        args.key.iter().map(|column| column.trim()).collect()
    };

    let added = compare::compare_extractions(&args.first, &args.second, &key)?;
    if added.is_empty() {
        println!("No records are exclusive to {}.", args.second.display());
        return Ok(());
    }

    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let path = ReportWriter::new(&args.reports_dir, stamp)
        .write_records("compare_extractions", &added)?;
    info!(rows = added.len(), report = %path.display(), "Comparison written");
    println!(
        "{} records only in {}; written to {}",
        added.len(),
        args.second.display(),
        path.display()
    );
    Ok(())
}
