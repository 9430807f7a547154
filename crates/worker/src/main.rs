use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newhigh_core::domain::constituent::UniverseSnapshot;
use newhigh_core::domain::screen::{ScreenReport, DEFAULT_MIN_ROE};
use newhigh_core::fundamentals::yahoo::YahooFundamentalsClient;
use newhigh_core::ingest::yahoo::YahooChartProvider;

mod backfill;

#[derive(Debug, Parser)]
#[command(name = "newhigh_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one screen against the configured universe and print the ranking.
    Screen {
        /// Minimum ROE in percent.
        #[arg(long, default_value_t = DEFAULT_MIN_ROE, allow_negative_numbers = true)]
        min_roe: f64,

        /// Print at most this many rows.
        #[arg(long)]
        limit: Option<usize>,

        /// Print the full report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Refresh the ROE column of the universe file from the quote summary endpoint.
    BackfillRoe {
        #[arg(long, default_value = backfill::DEFAULT_PROGRESS_FILE)]
        progress_file: PathBuf,

        /// Pause between symbols.
        #[arg(long, default_value_t = backfill::DEFAULT_DELAY_MS)]
        delay_ms: u64,

        /// Wait after a rate-limit response before refreshing credentials.
        #[arg(long, default_value_t = backfill::DEFAULT_BACKOFF_SECS)]
        backoff_secs: u64,

        /// Lookups allowed per symbol, including the first.
        #[arg(long, default_value_t = backfill::DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = newhigh_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Screen {
            min_roe,
            limit,
            json,
        } => screen(&settings, min_roe, limit, json).await,
        Command::BackfillRoe {
            progress_file,
            delay_ms,
            backoff_secs,
            max_attempts,
        } => {
            let client = YahooFundamentalsClient::from_settings(&settings)?;
            let args = backfill::BackfillArgs {
                progress_file,
                delay_ms,
                backoff_secs,
                max_attempts,
            };
            backfill::backfill_universe_file(Path::new(settings.universe_path()), &client, &args)
                .await
                .map(|_| ())
        }
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %err, "worker run failed");
    }
    result
}

async fn screen(
    settings: &newhigh_core::config::Settings,
    min_roe: f64,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let universe = UniverseSnapshot::load(settings.universe_path())?;
    let provider = YahooChartProvider::from_settings(settings)?;

    let mut report = newhigh_core::screener::run_screen(&universe, &provider, min_roe).await;
    if let Some(limit) = limit {
        report.results.truncate(limit);
    }

    if json {
        let value = serde_json::json!({
            "results": report.results,
            "lastUpdated": chrono::Utc::now(),
            "totalScreened": report.total_screened,
            "totalPassed": report.total_passed,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_table(&report);
    }
    Ok(())
}

fn print_table(report: &ScreenReport) {
    println!(
        "{:>4}  {:<8} {:<28} {:>10} {:>7} {:>8} {:>7} {:>6}",
        "rank", "symbol", "name", "price", "roe", "mom1m", "relvol", "score"
    );
    for r in &report.results {
        let name: String = r.company_name.chars().take(28).collect();
        println!(
            "{:>4}  {:<8} {:<28} {:>10.2} {:>7.1} {:>8.1} {:>7.2} {:>6.1}",
            r.rank, r.symbol, name, r.price, r.roe, r.momentum_1m, r.relative_volume, r.composite_score
        );
    }
    println!(
        "{} passed / {} screened",
        report.total_passed, report.total_screened
    );
}

fn init_sentry(settings: &newhigh_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
