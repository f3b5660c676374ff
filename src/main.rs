use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use hwspec_scraper::config::{AppConfig, FetchMode};
use hwspec_scraper::fetch::{FetchBackend, RenderBackend};
use hwspec_scraper::loader::{load_benchmarks, load_prices, UploadReport};
use hwspec_scraper::pipeline::{PassReport, ScrapeService};
use hwspec_scraper::storage::Repository;
use hwspec_scraper::utils::{self, ellipsize_start, fmt_number};

#[derive(Parser)]
#[command(name = "hwspec-scraper", about = "Hardware spec scraper and catalogue loader", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run one scrape pass (all enabled sites unless --site is given)
    Scrape {
        /// Site name from the configuration; repeatable
        #[arg(short, long = "site")]
        sites: Vec<String>,

        /// Print the pass report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import price points from CSV
    LoadPrices { file: PathBuf },

    /// Import benchmark scores from CSV
    LoadBenchmarks { file: PathBuf },

    /// List configured sites
    Sites,

    /// Show database statistics
    Stats,

    /// Apply schema migrations
    Migrate,
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "hwspec_scraper=info,warn",
        1 => "hwspec_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Scrape { sites, json } => {
            let repo = Arc::new(open_repo(&config)?);
            let render = Arc::new(RenderBackend::new(
                config.render.clone(),
                Duration::from_secs(config.scraper.timeout_secs),
            ));
            let report = render
                .run_then_release(async {
                    let fetcher = Arc::new(FetchBackend::new(&config, Arc::clone(&render))?);
                    let service = ScrapeService::new(config.clone(), fetcher, repo);

                    let token = service.cancellation_token();
                    tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            warn!("Interrupt received, finishing in-flight requests…");
                            token.cancel();
                        }
                    });

                    anyhow::Ok(service.run_scrape_pass(&sites).await?)
                })
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_pass_report(&report);
            }
        }

        Command::LoadPrices { file } => {
            let _t = utils::Timer::start("price import");
            let repo = open_repo(&config)?;
            print_upload_report("price points", &load_prices(&file, &repo)?);
        }

        Command::LoadBenchmarks { file } => {
            let _t = utils::Timer::start("benchmark import");
            let repo = open_repo(&config)?;
            print_upload_report("benchmark rows", &load_benchmarks(&file, &repo)?);
        }

        Command::Sites => {
            if config.sites.is_empty() {
                println!("No sites configured.");
            }
            for site in &config.sites {
                let mode = match site.fetch_mode {
                    FetchMode::Http => "http",
                    FetchMode::Render => "render",
                };
                println!(
                    "  {:<20} {:<8} {:<12} {:<6} {}{}",
                    site.name,
                    site.strategy,
                    site.category.as_str(),
                    mode,
                    site.seed_urls.join(" "),
                    if site.enabled { "" } else { "  (disabled)" },
                );
            }
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let counts = repo.counts()?;
            let (min, max) = repo.price_date_range().unwrap_or((None, None));
            println!("─────────────────────────────────");
            println!("  Hardware catalogue — Stats");
            println!("─────────────────────────────────");
            println!("  Entities    : {}", fmt_number(counts.entities));
            for (category, n) in repo.entity_counts_by_category()? {
                println!("    {:<11}: {}", category, fmt_number(n));
            }
            println!("  Benchmarks  : {}", fmt_number(counts.benchmarks));
            println!("  Price points: {}", fmt_number(counts.price_points));
            println!("  Prices from : {}", min.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("  Prices to   : {}", max.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

fn print_pass_report(report: &PassReport) {
    println!("Scrape run #{}", report.run_id);
    println!(
        "  {:<20} {:<9} {:>8} {:>9} {:>7} {:>8} {:>8} {:>10}",
        "site", "state", "listing", "extracted", "failed", "created", "updated", "unchanged"
    );
    for site in &report.sites {
        println!(
            "  {:<20} {:<9} {:>8} {:>9} {:>7} {:>8} {:>8} {:>10}",
            site.site,
            format!("{:?}", site.state).to_lowercase(),
            site.listing_pages_visited,
            site.details_extracted,
            site.details_failed,
            site.entities_created,
            site.entities_updated,
            site.entities_unchanged,
        );
    }
    for site in report.sites.iter().filter(|s| !s.failures.is_empty()) {
        println!("\n  {} failures (showing {} of {}):", site.site, site.failures.len(), site.details_failed);
        for failure in &site.failures {
            println!("    {:<20} {}", failure.cause, ellipsize_start(&failure.url, 80));
        }
    }
    info!(
        "{} created, {} updated, {} failed detail pages",
        report.entities_created(),
        report.entities_updated(),
        report.details_failed()
    );
}

fn print_upload_report(what: &str, report: &UploadReport) {
    println!("{} {} accepted, {} rejected", report.accepted, what, report.rejected.len());
    for row in &report.rejected {
        println!("  line {:>5}: {}", row.line, row.error);
    }
}
