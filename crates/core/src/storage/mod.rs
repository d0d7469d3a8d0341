pub mod memory;
pub mod postgres;

use crate::domain::financials::FinancialYear;
use crate::domain::game::{PlayableSnapshot, RevealRecord, SnapshotFilters};
use crate::domain::market::{MarketCapTier, PricePoint};
use crate::domain::snapshot::Outcome;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Instrument metadata written by the seeder.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInstrument {
    pub ticker: String,
    pub company_name: String,
    pub display_name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap_tier: MarketCapTier,
}

/// An instrument row as the seeder sees it before refreshing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInstrument {
    pub id: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub instruments: i64,
    pub snapshots: i64,
    pub playable_snapshots: i64,
}

/// Opens write sessions for seeding jobs.
#[async_trait::async_trait]
pub trait SeedStore: Send + Sync {
    async fn open_session(&self) -> anyhow::Result<Box<dyn SeedSession>>;
}

/// One job's write scope. Writes become visible to readers only on
/// [`SeedSession::commit`]; each instrument's writes sit between
/// `begin_instrument` and `finish_instrument`/`abandon_instrument` so a failed
/// instrument leaves nothing behind.
#[async_trait::async_trait]
pub trait SeedSession: Send {
    async fn find_instrument(&mut self, ticker: &str) -> anyhow::Result<Option<StoredInstrument>>;

    async fn used_display_names(&mut self) -> anyhow::Result<HashSet<String>>;

    async fn begin_instrument(&mut self) -> anyhow::Result<()>;

    async fn finish_instrument(&mut self) -> anyhow::Result<()>;

    async fn abandon_instrument(&mut self) -> anyhow::Result<()>;

    /// Inserts the instrument or, when the ticker exists, refreshes its
    /// mutable metadata (the display name is kept). Returns the instrument id.
    async fn upsert_instrument(&mut self, instrument: &NewInstrument) -> anyhow::Result<i64>;

    /// Inserts prices, ignoring dates already stored. Returns rows inserted.
    async fn insert_prices_if_absent(
        &mut self,
        instrument_id: i64,
        prices: &[PricePoint],
    ) -> anyhow::Result<u64>;

    async fn upsert_financial_year(
        &mut self,
        instrument_id: i64,
        year: &FinancialYear,
    ) -> anyhow::Result<()>;

    /// Returns false when a snapshot for that date already exists.
    async fn insert_snapshot_if_absent(
        &mut self,
        instrument_id: i64,
        outcome: &Outcome,
    ) -> anyhow::Result<bool>;

    async fn commit(&mut self) -> anyhow::Result<()>;

    /// Ends the session, discarding anything not yet committed.
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Read side used by gameplay. Only ever observes committed rows.
#[async_trait::async_trait]
pub trait GameStore: Send + Sync {
    async fn random_playable_snapshot(
        &self,
        filters: &SnapshotFilters,
    ) -> anyhow::Result<Option<PlayableSnapshot>>;

    /// Up to `limit` most recent years with `report_date <= cutoff`, returned
    /// oldest first.
    async fn financials_before(
        &self,
        instrument_id: i64,
        cutoff: NaiveDate,
        limit: i64,
    ) -> anyhow::Result<Vec<FinancialYear>>;

    async fn find_reveal(&self, snapshot_id: i64) -> anyhow::Result<Option<RevealRecord>>;

    /// Prices with `start <= date <= end`, ascending.
    async fn prices_between(
        &self,
        instrument_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<PricePoint>>;

    /// Returns false when the snapshot does not exist.
    async fn increment_play_stats(&self, snapshot_id: i64, correct: bool) -> anyhow::Result<bool>;

    async fn counts(&self) -> anyhow::Result<StoreCounts>;
}
