use sqlx::PgPool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trapvalue_core::config::Settings;
use trapvalue_core::ingest::progress::JobRegistry;
use trapvalue_core::ingest::provider::HttpJsonMarketData;
use trapvalue_core::ingest::seeder::{SeedConfig, Seeder};
use trapvalue_core::storage::postgres::PgStore;
use trapvalue_core::storage::GameStore;

mod routes;

use routes::AppState;

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

    let pool = connect_pool(&settings).await;
    let jobs = JobRegistry::new();

    let (game, seeder) = match pool {
        Some(pool) => {
            let store = Arc::new(PgStore::new(pool));
            let seeder = match HttpJsonMarketData::from_settings(&settings) {
                Ok(source) => Some(Arc::new(Seeder::new(
                    Arc::new(source),
                    store.clone(),
                    jobs.clone(),
                    SeedConfig::from_env(),
                ))),
                Err(e) => {
                    tracing::warn!(error = %e, "market data source not configured; seeding disabled");
                    None
                }
            };
            let game: Arc<dyn GameStore> = store;
            (Some(game), seeder)
        }
        None => (None, None),
    };

    let app = routes::router(AppState { game, seeder, jobs });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Connects and migrates, or returns `None` so the API starts degraded.
async fn connect_pool(settings: &Settings) -> Option<PgPool> {
    match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match trapvalue_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
