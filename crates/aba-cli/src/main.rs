use std::path::PathBuf;

use aba_core::BulletinSource;
use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "aba")]
#[command(about = "Avalanche bulletin archive: fetch bulletins and weather, build the static site")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Regenerate archive/ and the landing page.
    Build,
    /// Fetch all weather stations and merge into the stored series.
    Weather,
    /// Download bulletin PDFs for a day.
    Pdfs {
        /// Bulletin day (defaults to today, UTC).
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Read bulletins from this JSON file instead of the bulletin cache.
        #[arg(long, requires = "source")]
        bulletins: Option<PathBuf>,
        /// Upstream that renders the bulletins in `--bulletins`.
        #[arg(long, value_parser = parse_source)]
        source: Option<BulletinSource>,
    },
    /// Delete archived PDFs dated before the cutoff.
    Cleanup {
        #[arg(long)]
        cutoff: Option<NaiveDate>,
    },
    /// Rename legacy `_v2` PDFs to publication-timestamp names.
    Migrate,
    /// Serve the generated site locally.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run weather and PDF fetches on their cron schedules.
    Schedule,
}

fn parse_source(raw: &str) -> Result<BulletinSource, String> {
    match raw {
        "lawinen-warnung" => Ok(BulletinSource::LawinenWarnung),
        "avalanche-report" => Ok(BulletinSource::AvalancheReport),
        other => Err(format!(
            "unknown source {other:?} (expected lawinen-warnung or avalanche-report)"
        )),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "aba=info,aba_core=info,aba_storage=info,aba_sources=info,aba_sync=info,aba_site=info".into()
        }))
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Build) {
        Commands::Build => {
            let summary = aba_site::run_build_from_env().await?;
            println!(
                "build complete: regions={} months={} pdfs={} incidents={} output={}",
                summary.regions, summary.months, summary.pdfs, summary.incidents, summary.output
            );
        }
        Commands::Weather => {
            let summary = aba_sync::run_weather_from_env().await?;
            println!(
                "weather complete: run_id={} stations={} refreshed={} stale={} output={}",
                summary.run_id, summary.stations, summary.refreshed, summary.stale, summary.output
            );
        }
        Commands::Pdfs {
            date,
            bulletins,
            source,
        } => {
            let summary = match (bulletins, source) {
                (Some(path), Some(source)) => {
                    let bulletins = aba_sources::load_bulletin_document(&path)?;
                    aba_sync::run_pdfs_for_document_from_env(
                        date.unwrap_or_else(aba_sync::today_utc),
                        &bulletins,
                        source,
                    )
                    .await?
                }
                _ => aba_sync::run_pdfs_from_env(date).await?,
            };
            println!(
                "pdfs complete: run_id={} date={} seen={} matched={} created={} archived={} unchanged={} failed={}",
                summary.run_id,
                summary.date,
                summary.bulletins_seen,
                summary.bulletins_matched,
                summary.created,
                summary.archived,
                summary.unchanged,
                summary.failed
            );
        }
        Commands::Cleanup { cutoff } => {
            let summary = aba_sync::run_cleanup_from_env(cutoff).await?;
            println!(
                "cleanup complete: deleted={} kept={}",
                summary.deleted, summary.kept
            );
        }
        Commands::Migrate => {
            let summary = aba_sync::run_migration_from_env().await?;
            println!(
                "migration complete: renamed={} skipped={}",
                summary.renamed, summary.skipped
            );
        }
        Commands::Serve { port } => {
            aba_site::serve_from_env(port).await?;
        }
        Commands::Schedule => {
            aba_sync::run_scheduler_from_env().await?;
        }
    }

    Ok(())
}
