use chrono::{Duration, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trapvalue_core::domain::market::{CompanyInfo, MarketCapTier, PricePoint, RawStatementPeriod};
use trapvalue_core::error::{Error, Result};
use trapvalue_core::ingest::names::{NameGenerator, SectorNameGenerator};
use trapvalue_core::ingest::progress::{JobRegistry, JobStatus, GLOBAL_ERROR_TICKER};
use trapvalue_core::ingest::provider::MarketDataSource;
use trapvalue_core::ingest::rate_limit::RateLimiter;
use trapvalue_core::ingest::seeder::{SeedConfig, SeedRequest, Seeder};
use trapvalue_core::storage::memory::MemoryStore;
use trapvalue_core::storage::{SeedSession, SeedStore};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn today() -> NaiveDate {
    d(2025, 6, 30)
}

fn history_start() -> NaiveDate {
    d(2015, 1, 1)
}

fn prices_per_ticker() -> usize {
    ((today() - history_start()).num_days() + 1) as usize
}

#[derive(Clone)]
enum Script {
    Listed,
    UnknownName,
    NoPrices,
    FinancialsDown,
}

/// Serves a steadily rising price series and five annual statements for
/// every listed ticker.
#[derive(Default)]
struct ScriptedSource {
    scripts: HashMap<String, Script>,
}

impl ScriptedSource {
    fn listed(tickers: &[&str]) -> Self {
        let mut s = Self::default();
        for t in tickers {
            s.scripts.insert(t.to_string(), Script::Listed);
        }
        s
    }

    fn with(mut self, ticker: &str, script: Script) -> Self {
        self.scripts.insert(ticker.to_string(), script);
        self
    }

    fn script(&self, ticker: &str) -> Result<Script> {
        self.scripts
            .get(ticker)
            .cloned()
            .ok_or_else(|| Error::CompanyNotFound {
                ticker: ticker.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl MarketDataSource for ScriptedSource {
    fn source_name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_company_info(&self, ticker: &str) -> Result<CompanyInfo> {
        let name = match self.script(ticker)? {
            Script::UnknownName => "Unknown".to_string(),
            _ => format!("{ticker} Holdings"),
        };
        Ok(CompanyInfo {
            ticker: ticker.to_string(),
            name: Some(name),
            sector: Some("Technology".to_string()),
            industry: Some("Software".to_string()),
            market_cap_tier: MarketCapTier::Mid,
        })
    }

    async fn fetch_prices(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>> {
        if matches!(self.script(ticker)?, Script::NoPrices) {
            return Ok(Vec::new());
        }
        let days = (end - start).num_days();
        Ok((0..=days)
            .map(|i| PricePoint::new(start + Duration::days(i), 20.0 + i as f64 * 0.05))
            .collect())
    }

    async fn fetch_raw_financials(&self, ticker: &str) -> Result<Vec<RawStatementPeriod>> {
        if matches!(self.script(ticker)?, Script::FinancialsDown) {
            return Err(Error::TransientUpstream("financials endpoint timed out".to_string()));
        }
        Ok((2020..=2024)
            .map(|fy| {
                let mut p = RawStatementPeriod {
                    period_end: d(fy, 12, 31),
                    ..RawStatementPeriod::default()
                };
                p.income
                    .insert("Total Revenue".to_string(), Some(1_000_000_000.0 * f64::from(fy - 2019)));
                p.income.insert("Net Income".to_string(), Some(100_000_000.0));
                p
            })
            .collect())
    }
}

#[derive(Default)]
struct CountingLimiter {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl RateLimiter for CountingLimiter {
    async fn wait(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Delegates to a seeded generator and counts how often a name is drawn.
struct CountingNames {
    inner: SectorNameGenerator,
    calls: AtomicUsize,
}

impl NameGenerator for CountingNames {
    fn generate(&self, sector: Option<&str>, used: &HashSet<String>) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate(sector, used)
    }
}

struct UnreachableStore;

#[async_trait::async_trait]
impl SeedStore for UnreachableStore {
    async fn open_session(&self) -> anyhow::Result<Box<dyn SeedSession>> {
        anyhow::bail!("connection refused")
    }
}

fn seeder(
    source: ScriptedSource,
    store: Arc<dyn SeedStore>,
    batch_size: usize,
    limiter: Arc<CountingLimiter>,
) -> Seeder {
    let config = SeedConfig {
        batch_size,
        ..SeedConfig::default()
    };
    Seeder::new(Arc::new(source), store, JobRegistry::new(), config)
        .with_names(Arc::new(SectorNameGenerator::seeded(11)))
        .with_limiter(limiter)
        .with_today(today())
}

#[tokio::test]
async fn seeds_every_ticker_and_reruns_are_idempotent() {
    let store = MemoryStore::new();
    let tickers = ["AAA", "BBB", "CCC"];
    let s = seeder(
        ScriptedSource::listed(&tickers),
        Arc::new(store.clone()),
        10,
        Arc::default(),
    );

    let progress = s.seed(&SeedRequest::new(tickers, false).unwrap()).await.unwrap();
    assert_eq!(progress.status, JobStatus::Completed);
    assert_eq!((progress.successful, progress.failed), (3, 0));
    assert!(progress.finished_at.is_some());

    let first = store.row_counts();
    assert_eq!(first.instruments, 3);
    assert_eq!(first.prices, 3 * prices_per_ticker());
    assert_eq!(first.financial_years, 3 * 5);
    // 2023-01-01, 2023-04-01 and 2023-06-30 fit before last price - 720 days.
    assert_eq!(first.snapshots, 3 * 3);

    let again = s.seed(&SeedRequest::new(tickers, false).unwrap()).await.unwrap();
    assert_eq!(again.successful, 3);
    assert_eq!(store.row_counts(), first);

    let forced = s.seed(&SeedRequest::new(tickers, true).unwrap()).await.unwrap();
    assert_eq!(forced.status, JobStatus::Completed);
    assert_eq!(forced.successful, 3);
    assert_eq!(store.row_counts(), first);
}

#[tokio::test]
async fn force_refresh_keeps_stored_display_names() {
    let store = MemoryStore::new();
    let names = Arc::new(CountingNames {
        inner: SectorNameGenerator::seeded(7),
        calls: AtomicUsize::new(0),
    });
    let s = seeder(
        ScriptedSource::listed(&["AAA", "BBB"]),
        Arc::new(store.clone()),
        10,
        Arc::default(),
    )
    .with_names(names.clone());

    s.seed(&SeedRequest::new(["AAA", "BBB"], false).unwrap())
        .await
        .unwrap();
    assert_eq!(names.calls.load(Ordering::SeqCst), 2);
    let before = store.display_names();

    let forced = s
        .seed(&SeedRequest::new(["AAA", "BBB"], true).unwrap())
        .await
        .unwrap();
    assert_eq!(forced.successful, 2);
    assert_eq!(names.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.display_names(), before);
}

#[tokio::test]
async fn commits_once_per_batch_and_once_at_the_end() {
    let store = MemoryStore::new();
    let tickers: Vec<String> = (0..12).map(|i| format!("T{i:02}")).collect();
    let names: Vec<&str> = tickers.iter().map(String::as_str).collect();
    let s = seeder(
        ScriptedSource::listed(&names),
        Arc::new(store.clone()),
        10,
        Arc::default(),
    );

    let progress = s.seed(&SeedRequest::new(&tickers, false).unwrap()).await.unwrap();
    assert_eq!(progress.successful, 12);
    assert_eq!(store.commit_count(), 2);
    assert_eq!(store.row_counts().instruments, 12);
}

#[tokio::test]
async fn failed_ticker_leaves_no_rows_and_batch_continues() {
    let store = MemoryStore::new();
    let source = ScriptedSource::listed(&["GOOD", "FINE"]).with("FLAKY", Script::FinancialsDown);
    let s = seeder(source, Arc::new(store.clone()), 10, Arc::default());

    let progress = s
        .seed(&SeedRequest::new(["GOOD", "FLAKY", "FINE"], false).unwrap())
        .await
        .unwrap();
    assert_eq!(progress.status, JobStatus::Completed);
    assert_eq!((progress.processed, progress.successful, progress.failed), (3, 2, 1));
    assert_eq!(progress.errors.len(), 1);
    assert_eq!(progress.errors[0].ticker, "FLAKY");
    assert!(progress.errors[0].error.contains("timed out"));

    let mut tickers = store.tickers();
    tickers.sort();
    assert_eq!(tickers, vec!["FINE", "GOOD"]);
    let counts = store.row_counts();
    assert_eq!(counts.prices, 2 * prices_per_ticker());
    assert_eq!(counts.snapshots, 2 * 3);
}

#[tokio::test]
async fn unresolved_company_and_empty_history_fail_per_ticker() {
    let store = MemoryStore::new();
    let source = ScriptedSource::listed(&["OK"])
        .with("GHOST", Script::UnknownName)
        .with("NEWCO", Script::NoPrices);
    let s = seeder(source, Arc::new(store.clone()), 10, Arc::default());

    let progress = s
        .seed(&SeedRequest::new(["GHOST", "NEWCO", "OK", "MISSING"], false).unwrap())
        .await
        .unwrap();
    assert_eq!(progress.status, JobStatus::Completed);
    assert_eq!((progress.successful, progress.failed), (1, 3));

    let by_ticker: HashMap<_, _> = progress
        .errors
        .iter()
        .map(|e| (e.ticker.as_str(), e.error.as_str()))
        .collect();
    assert_eq!(by_ticker["GHOST"], "company not found: GHOST");
    assert_eq!(by_ticker["NEWCO"], "no price history found for NEWCO");
    assert_eq!(by_ticker["MISSING"], "company not found: MISSING");
    assert_eq!(store.tickers(), vec!["OK"]);
}

#[tokio::test]
async fn limiter_runs_between_tickers_only() {
    let limiter = Arc::new(CountingLimiter::default());
    let s = seeder(
        ScriptedSource::listed(&["A", "B", "C", "D"]),
        Arc::new(MemoryStore::new()),
        10,
        limiter.clone(),
    );
    s.seed(&SeedRequest::new(["A", "B", "C", "D"], false).unwrap())
        .await
        .unwrap();
    assert_eq!(limiter.calls.load(Ordering::SeqCst), 3);

    let single = Arc::new(CountingLimiter::default());
    let s = seeder(
        ScriptedSource::listed(&["A"]),
        Arc::new(MemoryStore::new()),
        10,
        single.clone(),
    );
    s.seed(&SeedRequest::new(["A"], false).unwrap()).await.unwrap();
    assert_eq!(single.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_store_aborts_job_with_global_error() {
    let s = seeder(
        ScriptedSource::listed(&["AAA"]),
        Arc::new(UnreachableStore),
        10,
        Arc::default(),
    );
    let progress = s.seed(&SeedRequest::new(["AAA"], false).unwrap()).await.unwrap();

    assert_eq!(progress.status, JobStatus::Error);
    assert_eq!(progress.processed, 0);
    let last = progress.errors.last().unwrap();
    assert_eq!(last.ticker, GLOBAL_ERROR_TICKER);
    assert!(last.error.contains("connection refused"), "{}", last.error);
    assert_eq!(s.jobs().latest().unwrap().status, JobStatus::Error);
}
