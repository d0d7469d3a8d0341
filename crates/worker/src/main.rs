use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trapvalue_core::config::Settings;
use trapvalue_core::ingest::progress::{JobRegistry, JobStatus};
use trapvalue_core::ingest::provider::{HttpJsonMarketData, MarketDataSource};
use trapvalue_core::ingest::seeder::{SeedConfig, SeedRequest, Seeder};
use trapvalue_core::storage::memory::MemoryStore;
use trapvalue_core::storage::postgres::PgStore;
use trapvalue_core::storage::SeedStore;

mod universe;

#[derive(Debug, Parser)]
#[command(name = "trapvalue_worker")]
struct Args {
    /// Comma-separated tickers. Defaults to the built-in S&P 500 sample.
    #[arg(long)]
    tickers: Option<String>,

    /// Re-fetch instruments that are already stored.
    #[arg(long)]
    force_refresh: bool,

    /// Instruments per commit (overrides SEED_BATCH_SIZE).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Pause between instruments in milliseconds (overrides SEED_DELAY_MS).
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Seed into an in-memory store instead of the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let request = SeedRequest::new(
        universe::resolve_tickers(args.tickers.as_deref()),
        args.force_refresh,
    )?;

    let mut config = SeedConfig::from_env();
    if let Some(n) = args.batch_size {
        config.batch_size = n.max(1);
    }
    if let Some(ms) = args.delay_ms {
        config.delay = Duration::from_millis(ms);
    }

    let source: Arc<dyn MarketDataSource> = Arc::new(HttpJsonMarketData::from_settings(&settings)?);

    let store: Arc<dyn SeedStore> = if args.dry_run {
        tracing::info!(dry_run = true, "seeding into in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let db_url = settings.require_database_url()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;
        trapvalue_core::storage::migrate(&pool).await?;
        Arc::new(PgStore::new(pool))
    };

    let seeder = Seeder::new(source.clone(), store, JobRegistry::new(), config.clone());

    tracing::info!(
        source = source.source_name(),
        tickers = request.tickers.len(),
        batch_size = config.batch_size,
        delay_ms = config.delay.as_millis() as u64,
        force_refresh = request.force_refresh,
        "worker seed run starting"
    );

    let progress = seeder.seed(&request).await?;

    for e in &progress.errors {
        tracing::warn!(ticker = %e.ticker, error = %e.error, "ticker not seeded");
    }

    if progress.status == JobStatus::Error {
        let err = anyhow::anyhow!(
            "seed job {} aborted after {} of {} tickers",
            progress.job_id,
            progress.processed,
            progress.total
        );
        sentry_anyhow::capture_anyhow(&err);
        return Err(err);
    }

    tracing::info!(
        job_id = %progress.job_id,
        successful = progress.successful,
        failed = progress.failed,
        "worker seed run finished"
    );
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
