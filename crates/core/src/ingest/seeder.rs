//! Seeding job: fetch, normalize, derive snapshots and persist, one instrument
//! at a time.

use crate::config::env_or;
use crate::domain::market::normalize_ticker;
use crate::error::{Error, Result};
use crate::ingest::names::{NameGenerator, SectorNameGenerator};
use crate::ingest::progress::{IngestionProgress, JobRegistry};
use crate::ingest::provider::MarketDataSource;
use crate::ingest::rate_limit::{FixedDelay, RateLimiter};
use crate::pit;
use crate::snapshots::{generate_snapshots, WindowConfig};
use crate::storage::{NewInstrument, SeedSession, SeedStore, StoredInstrument};
use anyhow::Context;
use chrono::{Datelike, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_DELAY_MS: u64 = 1000;
const PRICE_HISTORY_YEARS: i32 = 10;

#[derive(Debug, Clone)]
pub struct SeedConfig {
    /// Instruments per commit.
    pub batch_size: usize,
    /// Default pause between instruments when no limiter is injected.
    pub delay: Duration,
    pub price_history_years: i32,
    pub window: WindowConfig,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            price_history_years: PRICE_HISTORY_YEARS,
            window: WindowConfig::default(),
        }
    }
}

impl SeedConfig {
    pub fn from_env() -> Self {
        Self {
            batch_size: env_or("SEED_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            delay: Duration::from_millis(env_or("SEED_DELAY_MS", DEFAULT_DELAY_MS)),
            price_history_years: PRICE_HISTORY_YEARS,
            window: WindowConfig::from_env(),
        }
    }
}

/// A validated list of tickers to seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRequest {
    pub tickers: Vec<String>,
    pub force_refresh: bool,
}

impl SeedRequest {
    /// Trims and upper-cases every ticker, dropping repeats while keeping the
    /// first occurrence's position. Blank entries and empty lists are rejected.
    pub fn new<I, S>(tickers: I, force_refresh: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (idx, raw) in tickers.into_iter().enumerate() {
            let ticker = normalize_ticker(raw.as_ref())
                .ok_or_else(|| Error::Validation(format!("ticker #{} is blank", idx + 1)))?;
            if seen.insert(ticker.clone()) {
                out.push(ticker);
            }
        }

        if out.is_empty() {
            return Err(Error::Validation("at least one ticker is required".to_string()));
        }

        Ok(Self {
            tickers: out,
            force_refresh,
        })
    }
}

/// Result of seeding one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerReport {
    pub ticker: String,
    pub display_name: String,
    pub prices_inserted: u64,
    pub financial_years: usize,
    pub snapshots_created: usize,
    pub playable_snapshots: usize,
}

pub struct Seeder {
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn SeedStore>,
    names: Arc<dyn NameGenerator>,
    limiter: Arc<dyn RateLimiter>,
    jobs: JobRegistry,
    config: SeedConfig,
    today: Option<NaiveDate>,
}

impl Seeder {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn SeedStore>,
        jobs: JobRegistry,
        config: SeedConfig,
    ) -> Self {
        Self {
            source,
            store,
            names: Arc::new(SectorNameGenerator::new()),
            limiter: Arc::new(FixedDelay::new(config.delay)),
            jobs,
            config,
            today: None,
        }
    }

    pub fn with_names(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Pins the as-of date used for price windows and filing cutoffs.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Registers a job for `request` and returns its id without running it.
    /// Fails with [`Error::Conflict`] while another job is idle or running.
    pub fn submit(&self, request: &SeedRequest) -> Result<Uuid> {
        self.jobs
            .try_create(request.tickers.len())
            .ok_or_else(|| Error::Conflict("a seed job is already running".to_string()))
    }

    /// Registers and runs a job to completion.
    pub async fn seed(&self, request: &SeedRequest) -> Result<IngestionProgress> {
        let job_id = self.submit(request)?;
        Ok(self.run(job_id, request).await)
    }

    /// Runs a previously submitted job and returns its final progress.
    pub async fn run(&self, job_id: Uuid, request: &SeedRequest) -> IngestionProgress {
        self.jobs.update(job_id, |p| p.start());
        tracing::info!(%job_id, total = request.tickers.len(), force_refresh = request.force_refresh, "seed job started");

        match self.run_batch(job_id, request).await {
            Ok(()) => {
                self.jobs.update(job_id, |p| p.complete());
            }
            Err(err) => {
                let message = format!("{err:#}");
                tracing::error!(%job_id, error = %message, "seed job aborted");
                self.jobs.update(job_id, |p| p.abort(message));
            }
        }

        let progress = self
            .jobs
            .get(job_id)
            .unwrap_or_else(|| IngestionProgress::new(job_id, request.tickers.len()));
        tracing::info!(
            %job_id,
            status = ?progress.status,
            processed = progress.processed,
            successful = progress.successful,
            failed = progress.failed,
            "seed job finished"
        );
        progress
    }

    async fn run_batch(&self, job_id: Uuid, request: &SeedRequest) -> anyhow::Result<()> {
        let mut session = self
            .store
            .open_session()
            .await
            .context("failed to open seed session")?;

        let result = self.seed_all(job_id, request, session.as_mut()).await;

        if let Err(err) = session.close().await {
            tracing::warn!(%job_id, error = %err, "failed to close seed session");
        }
        result
    }

    async fn seed_all(
        &self,
        job_id: Uuid,
        request: &SeedRequest,
        session: &mut dyn SeedSession,
    ) -> anyhow::Result<()> {
        let mut used_names = session
            .used_display_names()
            .await
            .context("failed to load used display names")?;
        let today = self.today();
        let total = request.tickers.len();
        let batch_size = self.config.batch_size.max(1);
        let mut uncommitted: usize = 0;

        for (idx, ticker) in request.tickers.iter().enumerate() {
            if idx != 0 {
                self.limiter.wait().await;
            }
            self.jobs
                .update(job_id, |p| p.current_ticker = Some(ticker.clone()));

            let existing = session
                .find_instrument(ticker)
                .await
                .with_context(|| format!("existence check failed for {ticker}"))?;

            if existing.is_some() && !request.force_refresh {
                tracing::info!(%job_id, %ticker, "already seeded; skipping");
                self.jobs.update(job_id, |p| p.record_success());
            } else {
                session
                    .begin_instrument()
                    .await
                    .context("failed to open instrument savepoint")?;

                match self
                    .seed_one(session, ticker, existing.as_ref(), &used_names, today)
                    .await
                {
                    Ok(report) => {
                        session
                            .finish_instrument()
                            .await
                            .context("failed to release instrument savepoint")?;
                        tracing::info!(
                            %job_id,
                            %ticker,
                            display_name = %report.display_name,
                            prices_inserted = report.prices_inserted,
                            financial_years = report.financial_years,
                            snapshots_created = report.snapshots_created,
                            playable_snapshots = report.playable_snapshots,
                            "seeded ticker"
                        );
                        if existing.is_none() {
                            used_names.insert(report.display_name);
                        }
                        self.jobs.update(job_id, |p| p.record_success());
                    }
                    Err(err) => {
                        session
                            .abandon_instrument()
                            .await
                            .context("failed to roll back instrument savepoint")?;
                        tracing::warn!(%job_id, %ticker, error = %err, "ticker failed; continuing");
                        self.jobs
                            .update(job_id, |p| p.record_failure(ticker, &err));
                    }
                }
            }

            uncommitted += 1;
            if uncommitted >= batch_size {
                session.commit().await.context("batch commit failed")?;
                uncommitted = 0;
            }

            let n = idx + 1;
            if n == 1 || n == total || n % batch_size == 0 {
                tracing::info!(%job_id, processed = n, total, "seed progress");
            }
        }

        session.commit().await.context("final commit failed")?;
        Ok(())
    }

    async fn seed_one(
        &self,
        session: &mut dyn SeedSession,
        ticker: &str,
        existing: Option<&StoredInstrument>,
        used_names: &HashSet<String>,
        today: NaiveDate,
    ) -> Result<TickerReport> {
        let info = self.source.fetch_company_info(ticker).await?;
        let company_name = info
            .resolved_name()
            .ok_or_else(|| Error::CompanyNotFound {
                ticker: ticker.to_string(),
            })?
            .to_string();

        // A refresh keeps the name players already know.
        let display_name = match existing {
            Some(stored) => stored.display_name.clone(),
            None => self.names.generate(info.sector.as_deref(), used_names),
        };

        let instrument_id = session
            .upsert_instrument(&NewInstrument {
                ticker: ticker.to_string(),
                company_name,
                display_name: display_name.clone(),
                sector: info.sector.clone(),
                industry: info.industry.clone(),
                market_cap_tier: info.market_cap_tier,
            })
            .await?;

        let start = NaiveDate::from_ymd_opt(today.year() - self.config.price_history_years, 1, 1)
            .ok_or_else(|| Error::DataUnavailable(format!("no price window before {today}")))?;
        let prices = self.source.fetch_prices(ticker, start, today).await?;
        if prices.is_empty() {
            return Err(Error::NoPriceHistory {
                ticker: ticker.to_string(),
            });
        }
        let prices_inserted = session
            .insert_prices_if_absent(instrument_id, &prices)
            .await?;

        let periods = self.source.fetch_raw_financials(ticker).await?;
        let years = pit::extract(&periods, today);
        for year in &years {
            session.upsert_financial_year(instrument_id, year).await?;
        }

        let outcomes = generate_snapshots(prices, &self.config.window);
        let mut snapshots_created = 0;
        for outcome in &outcomes {
            if session
                .insert_snapshot_if_absent(instrument_id, outcome)
                .await?
            {
                snapshots_created += 1;
            }
        }
        let playable_snapshots = outcomes
            .iter()
            .filter(|o| o.outcome_label.is_playable())
            .count();

        Ok(TickerReport {
            ticker: ticker.to_string(),
            display_name,
            prices_inserted,
            financial_years: years.len(),
            snapshots_created,
            playable_snapshots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_dedupes_tickers() {
        let req = SeedRequest::new([" aapl", "MSFT ", "AAPL", "brk-b"], false).unwrap();
        assert_eq!(req.tickers, vec!["AAPL", "MSFT", "BRK-B"]);
        assert!(!req.force_refresh);
    }

    #[test]
    fn rejects_blank_and_empty_ticker_lists() {
        assert!(matches!(
            SeedRequest::new(["AAPL", "  "], false),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            SeedRequest::new(Vec::<String>::new(), true),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn batch_size_never_zero_from_env() {
        std::env::set_var("SEED_BATCH_SIZE", "0");
        assert_eq!(SeedConfig::from_env().batch_size, 1);
        std::env::remove_var("SEED_BATCH_SIZE");
    }
}
