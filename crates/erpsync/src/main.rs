use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use erpsync_core::db::PgWarehouse;
use erpsync_core::{
    run_loaders, run_phase, DateRange, EtlConfig, ErpApiClient, Loader, LoaderContext,
    LoaderStatus, Phase, RunSummary,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "ERP to warehouse synchronization", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "erpsync.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract from the ERP API and run the audits
    Daily,
    /// Sync the curated files from the input directory
    Manual,
    /// Run a single loader by name
    Load(LoadArgs),
    /// Run one audit and write its work list
    Audit {
        #[command(subcommand)]
        audit: AuditCommand,
    },
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Loader name, e.g. `sales` or `product-management`
    loader: String,
    /// First day of the sales or calendar window
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day of the window (defaults to today when only --from is given)
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum AuditCommand {
    /// Products without a curated management row
    ProductsPending,
    /// Recently active customers without a master link
    CustomersPending,
    /// Active sales roles compared with the ERP seller list
    SellersAudit,
}

impl AuditCommand {
    fn loader(self) -> Loader {
        match self {
            AuditCommand::ProductsPending => Loader::ProductsPending,
            AuditCommand::CustomersPending => Loader::CustomersPending,
            AuditCommand::SellersAudit => Loader::SellersAudit,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let summary = match cli.command {
        Command::Daily => execute(&config, Target::Phase(Phase::Daily), None).await?,
        Command::Manual => execute(&config, Target::Phase(Phase::Manual), None).await?,
        Command::Load(args) => handle_load(&config, args).await?,
        Command::Audit { audit } => {
            execute(&config, Target::Loaders(vec![audit.loader()]), None).await?
        }
    };

    print_summary(&summary);
    if !summary.is_success() {
        bail!("{} of {} loaders failed", summary.failed(), summary.outcomes.len());
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<EtlConfig> {
    EtlConfig::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

enum Target {
    Phase(Phase),
    Loaders(Vec<Loader>),
}

async fn handle_load(config: &EtlConfig, args: LoadArgs) -> Result<RunSummary> {
    let loader: Loader = args.loader.parse()?;
    let window = match (args.from, args.to) {
        (None, None) => None,
        (Some(from), to) => {
            let to = to.unwrap_or_else(|| config.today());
            Some(DateRange::new(from, to)?)
        }
        (None, Some(_)) => bail!("--to requires --from"),
    };
    execute(config, Target::Loaders(vec![loader]), window).await
}

async fn execute(
    config: &EtlConfig,
    target: Target,
    window: Option<DateRange>,
) -> Result<RunSummary> {
    let database_url = config.database_url()?;
    let warehouse = PgWarehouse::connect(database_url).await?;
    let source = ErpApiClient::new(&config.api).context("failed to build the ERP API client")?;

    let mut ctx = LoaderContext::new(config, &source, &warehouse);
    if let Some(window) = window {
        ctx = ctx.with_window(window);
    }

    let summary = match target {
        Target::Phase(phase) => run_phase(&ctx, phase).await,
        Target::Loaders(loaders) => run_loaders(&ctx, &loaders).await,
    };

    warehouse.close().await;
    info!(run_id = %summary.run_id, "Connection closed");
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "loader",
        "status",
        "extracted",
        "new",
        "modified",
        "removed",
        "written",
        "deleted",
        "quarantined",
        "pending",
        "skipped tenants",
    ]);

    for outcome in &summary.outcomes {
        let status = match outcome.status {
            LoaderStatus::Success => "ok",
            LoaderStatus::Failed => "FAILED",
        };
        match &outcome.report {
            Some(report) => {
                table.add_row(vec![
                    outcome.loader.to_string(),
                    status.to_string(),
                    report.extracted.to_string(),
                    report.new.to_string(),
                    report.modified.to_string(),
                    report.removed.to_string(),
                    report.sink.written().to_string(),
                    report.sink.deleted.to_string(),
                    report.quarantined.to_string(),
                    report.pending.to_string(),
                    report.skipped_tenants.join(", "),
                ]);
            }
            None => {
                table.add_row(vec![outcome.loader.to_string(), status.to_string()]);
            }
        }
    }

    println!("Run {}", summary.run_id);
    println!("{table}");

    for outcome in &summary.outcomes {
        if let Some(error) = &outcome.error {
            println!("{}: {}", outcome.loader, error);
        }
        if let Some(report) = &outcome.report {
            for note in &report.notes {
                println!("{}: note: {}", outcome.loader, note);
            }
            for path in &report.reports {
                println!("{}: report {}", outcome.loader, path.display());
            }
        }
    }

    println!(
        "{} succeeded, {} failed, {} rows written, {} deleted, {} quarantined",
        summary.succeeded(),
        summary.failed(),
        summary.rows_written(),
        summary.rows_deleted(),
        summary.rows_quarantined()
    );
}
