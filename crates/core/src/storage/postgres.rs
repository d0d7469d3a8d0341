use crate::domain::financials::FinancialYear;
use crate::domain::game::{PlayableSnapshot, RevealRecord, SnapshotFilters};
use crate::domain::market::PricePoint;
use crate::domain::snapshot::Outcome;
use crate::storage::{
    GameStore, NewInstrument, SeedSession, SeedStore, StoreCounts, StoredInstrument,
};
use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashSet;

const SAVEPOINT: &str = "SAVEPOINT seed_instrument";
const RELEASE_SAVEPOINT: &str = "RELEASE SAVEPOINT seed_instrument";
const ROLLBACK_TO_SAVEPOINT: &str = "ROLLBACK TO SAVEPOINT seed_instrument";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl SeedStore for PgStore {
    async fn open_session(&self) -> anyhow::Result<Box<dyn SeedSession>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("begin seed transaction failed")?;
        Ok(Box::new(PgSeedSession {
            pool: self.pool.clone(),
            tx: Some(tx),
        }))
    }
}

/// A seeding session: one open transaction at a time, replaced on every
/// batch commit. Dropping an open transaction rolls it back.
pub struct PgSeedSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSeedSession {
    fn tx(&mut self) -> anyhow::Result<&mut Transaction<'static, Postgres>> {
        self.tx.as_mut().context("seed session is closed")
    }

    async fn exec(&mut self, sql: &'static str) -> anyhow::Result<()> {
        let tx = self.tx()?;
        sqlx::query(sql)
            .persistent(false)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("{sql} failed"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SeedSession for PgSeedSession {
    async fn find_instrument(&mut self, ticker: &str) -> anyhow::Result<Option<StoredInstrument>> {
        let tx = self.tx()?;
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, display_name FROM instruments WHERE ticker = $1")
                .persistent(false)
                .bind(ticker)
                .fetch_optional(&mut **tx)
                .await
                .context("select instrument by ticker failed")?;
        Ok(row.map(|(id, display_name)| StoredInstrument { id, display_name }))
    }

    async fn used_display_names(&mut self) -> anyhow::Result<HashSet<String>> {
        let tx = self.tx()?;
        let names: Vec<String> = sqlx::query_scalar("SELECT display_name FROM instruments")
            .persistent(false)
            .fetch_all(&mut **tx)
            .await
            .context("select display names failed")?;
        Ok(names.into_iter().collect())
    }

    async fn begin_instrument(&mut self) -> anyhow::Result<()> {
        self.exec(SAVEPOINT).await
    }

    async fn finish_instrument(&mut self) -> anyhow::Result<()> {
        self.exec(RELEASE_SAVEPOINT).await
    }

    async fn abandon_instrument(&mut self) -> anyhow::Result<()> {
        self.exec(ROLLBACK_TO_SAVEPOINT).await?;
        self.exec(RELEASE_SAVEPOINT).await
    }

    async fn upsert_instrument(&mut self, instrument: &NewInstrument) -> anyhow::Result<i64> {
        let tx = self.tx()?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO instruments (ticker, company_name, display_name, sector, industry, market_cap_tier) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (ticker) DO UPDATE \
               SET company_name = EXCLUDED.company_name, sector = EXCLUDED.sector, \
                   industry = EXCLUDED.industry, market_cap_tier = EXCLUDED.market_cap_tier \
             RETURNING id",
        )
        .persistent(false)
        .bind(&instrument.ticker)
        .bind(&instrument.company_name)
        .bind(&instrument.display_name)
        .bind(&instrument.sector)
        .bind(&instrument.industry)
        .bind(instrument.market_cap_tier.as_str())
        .fetch_one(&mut **tx)
        .await
        .context("upsert instruments failed")?;
        Ok(id)
    }

    async fn insert_prices_if_absent(
        &mut self,
        instrument_id: i64,
        prices: &[PricePoint],
    ) -> anyhow::Result<u64> {
        let chunk_size: usize = crate::config::env_or("PRICE_INSERT_BATCH", 500usize).max(1);
        let tx = self.tx()?;

        let mut inserted: u64 = 0;
        for chunk in prices.chunks(chunk_size) {
            let t0 = std::time::Instant::now();
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO price_history (instrument_id, date, adj_close, volume) ");
            qb.push_values(chunk, |mut b, p| {
                b.push_bind(instrument_id)
                    .push_bind(p.date)
                    .push_bind(p.adj_close)
                    .push_bind(p.volume);
            });
            qb.push(" ON CONFLICT (instrument_id, date) DO NOTHING");

            let res = qb
                .build()
                .persistent(false)
                .execute(&mut **tx)
                .await
                .context("batch insert price_history failed")?;
            inserted += res.rows_affected();

            tracing::debug!(
                instrument_id,
                batch_size = chunk.len(),
                elapsed_ms = t0.elapsed().as_millis(),
                "price_history batch insert"
            );
        }

        Ok(inserted)
    }

    async fn upsert_financial_year(
        &mut self,
        instrument_id: i64,
        year: &FinancialYear,
    ) -> anyhow::Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO financial_years (instrument_id, fiscal_year, report_date, revenue, gross_profit, \
               operating_income, ebitda, net_income, gross_margin, operating_margin, net_margin, \
               total_assets, total_debt, cash_and_equivalents, total_equity, shares_outstanding, \
               operating_cash_flow, capital_expenditures, free_cash_flow) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) \
             ON CONFLICT (instrument_id, fiscal_year) DO UPDATE \
               SET report_date = EXCLUDED.report_date, revenue = EXCLUDED.revenue, \
                   gross_profit = EXCLUDED.gross_profit, operating_income = EXCLUDED.operating_income, \
                   ebitda = EXCLUDED.ebitda, net_income = EXCLUDED.net_income, \
                   gross_margin = EXCLUDED.gross_margin, operating_margin = EXCLUDED.operating_margin, \
                   net_margin = EXCLUDED.net_margin, total_assets = EXCLUDED.total_assets, \
                   total_debt = EXCLUDED.total_debt, cash_and_equivalents = EXCLUDED.cash_and_equivalents, \
                   total_equity = EXCLUDED.total_equity, shares_outstanding = EXCLUDED.shares_outstanding, \
                   operating_cash_flow = EXCLUDED.operating_cash_flow, \
                   capital_expenditures = EXCLUDED.capital_expenditures, \
                   free_cash_flow = EXCLUDED.free_cash_flow",
        )
        .persistent(false)
        .bind(instrument_id)
        .bind(year.fiscal_year)
        .bind(year.report_date)
        .bind(year.revenue)
        .bind(year.gross_profit)
        .bind(year.operating_income)
        .bind(year.ebitda)
        .bind(year.net_income)
        .bind(year.gross_margin)
        .bind(year.operating_margin)
        .bind(year.net_margin)
        .bind(year.total_assets)
        .bind(year.total_debt)
        .bind(year.cash_and_equivalents)
        .bind(year.total_equity)
        .bind(year.shares_outstanding)
        .bind(year.operating_cash_flow)
        .bind(year.capital_expenditures)
        .bind(year.free_cash_flow)
        .execute(&mut **tx)
        .await
        .context("upsert financial_years failed")?;
        Ok(())
    }

    async fn insert_snapshot_if_absent(
        &mut self,
        instrument_id: i64,
        outcome: &Outcome,
    ) -> anyhow::Result<bool> {
        let tx = self.tx()?;
        let res = sqlx::query(
            "INSERT INTO snapshots (instrument_id, snapshot_date, price_at_snapshot, price_at_6mo, \
               price_at_12mo, price_at_24mo, return_6mo, return_12mo, return_24mo, outcome_label, difficulty) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (instrument_id, snapshot_date) DO NOTHING",
        )
        .persistent(false)
        .bind(instrument_id)
        .bind(outcome.snapshot_date)
        .bind(outcome.price_at_snapshot)
        .bind(outcome.price_at_6mo)
        .bind(outcome.price_at_12mo)
        .bind(outcome.price_at_24mo)
        .bind(outcome.return_6mo)
        .bind(outcome.return_12mo)
        .bind(outcome.return_24mo)
        .bind(outcome.outcome_label.as_str())
        .bind(outcome.difficulty.as_str())
        .execute(&mut **tx)
        .await
        .context("insert snapshots failed")?;
        Ok(res.rows_affected() == 1)
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        let tx = self.tx.take().context("seed session is closed")?;
        tx.commit().await.context("commit seed batch failed")?;
        let next = self
            .pool
            .begin()
            .await
            .context("begin seed transaction failed")?;
        self.tx = Some(next);
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback()
                .await
                .context("rollback seed transaction failed")?;
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct FinancialRow {
    fiscal_year: i32,
    report_date: NaiveDate,
    revenue: f64,
    gross_profit: Option<f64>,
    operating_income: Option<f64>,
    ebitda: Option<f64>,
    net_income: Option<f64>,
    gross_margin: Option<f64>,
    operating_margin: Option<f64>,
    net_margin: Option<f64>,
    total_assets: Option<f64>,
    total_debt: Option<f64>,
    cash_and_equivalents: Option<f64>,
    total_equity: Option<f64>,
    shares_outstanding: Option<f64>,
    operating_cash_flow: Option<f64>,
    capital_expenditures: Option<f64>,
    free_cash_flow: Option<f64>,
}

impl From<FinancialRow> for FinancialYear {
    fn from(r: FinancialRow) -> Self {
        FinancialYear {
            fiscal_year: r.fiscal_year,
            report_date: r.report_date,
            revenue: r.revenue,
            gross_profit: r.gross_profit,
            operating_income: r.operating_income,
            ebitda: r.ebitda,
            net_income: r.net_income,
            gross_margin: r.gross_margin,
            operating_margin: r.operating_margin,
            net_margin: r.net_margin,
            total_assets: r.total_assets,
            total_debt: r.total_debt,
            cash_and_equivalents: r.cash_and_equivalents,
            total_equity: r.total_equity,
            shares_outstanding: r.shares_outstanding,
            operating_cash_flow: r.operating_cash_flow,
            capital_expenditures: r.capital_expenditures,
            free_cash_flow: r.free_cash_flow,
        }
    }
}

#[async_trait::async_trait]
impl GameStore for PgStore {
    async fn random_playable_snapshot(
        &self,
        filters: &SnapshotFilters,
    ) -> anyhow::Result<Option<PlayableSnapshot>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT s.id, s.instrument_id, s.snapshot_date, i.display_name, i.sector, i.industry \
             FROM snapshots s \
             JOIN instruments i ON i.id = s.instrument_id \
             WHERE i.is_active AND s.outcome_label IN ('value', 'trap')",
        );

        if let Some(difficulty) = filters.difficulty {
            qb.push(" AND s.difficulty = ").push_bind(difficulty.as_str());
        }
        if let Some(sector) = &filters.sector {
            qb.push(" AND i.sector = ").push_bind(sector.clone());
        }
        if !filters.exclude_ids.is_empty() {
            let ids: Vec<i64> = filters.exclude_ids.iter().copied().collect();
            qb.push(" AND NOT (s.id = ANY(").push_bind(ids).push("))");
        }
        qb.push(" ORDER BY random() LIMIT 1");

        let row = qb
            .build_query_as::<(i64, i64, NaiveDate, String, Option<String>, Option<String>)>()
            .persistent(false)
            .fetch_optional(&self.pool)
            .await
            .context("select random playable snapshot failed")?;

        Ok(row.map(
            |(snapshot_id, instrument_id, snapshot_date, display_name, sector, industry)| {
                PlayableSnapshot {
                    snapshot_id,
                    instrument_id,
                    snapshot_date,
                    display_name,
                    sector,
                    industry,
                }
            },
        ))
    }

    async fn financials_before(
        &self,
        instrument_id: i64,
        cutoff: NaiveDate,
        limit: i64,
    ) -> anyhow::Result<Vec<FinancialYear>> {
        let rows = sqlx::query_as::<_, FinancialRow>(
            "SELECT fiscal_year, report_date, revenue, gross_profit, operating_income, ebitda, \
               net_income, gross_margin, operating_margin, net_margin, total_assets, total_debt, \
               cash_and_equivalents, total_equity, shares_outstanding, operating_cash_flow, \
               capital_expenditures, free_cash_flow \
             FROM financial_years \
             WHERE instrument_id = $1 AND report_date <= $2 \
             ORDER BY fiscal_year DESC \
             LIMIT $3",
        )
        .persistent(false)
        .bind(instrument_id)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("select financial_years failed")?;

        Ok(rows.into_iter().rev().map(FinancialYear::from).collect())
    }

    async fn find_reveal(&self, snapshot_id: i64) -> anyhow::Result<Option<RevealRecord>> {
        let row = sqlx::query_as::<_, (i64, i64, NaiveDate, f64, f64, f64, String, String, String)>(
            "SELECT s.id, s.instrument_id, s.snapshot_date, s.price_at_snapshot, s.price_at_24mo, \
               s.return_24mo, s.outcome_label, i.ticker, i.company_name \
             FROM snapshots s \
             JOIN instruments i ON i.id = s.instrument_id \
             WHERE s.id = $1",
        )
        .persistent(false)
        .bind(snapshot_id)
        .fetch_optional(&self.pool)
        .await
        .context("select snapshot for reveal failed")?;

        let Some((
            snapshot_id,
            instrument_id,
            snapshot_date,
            price_at_snapshot,
            price_at_24mo,
            return_24mo,
            outcome_label,
            ticker,
            company_name,
        )) = row
        else {
            return Ok(None);
        };

        let outcome_label = outcome_label
            .parse()
            .with_context(|| format!("invalid outcome_label in DB for snapshot_id={snapshot_id}"))?;

        Ok(Some(RevealRecord {
            snapshot_id,
            instrument_id,
            snapshot_date,
            price_at_snapshot,
            price_at_24mo,
            return_24mo,
            outcome_label,
            ticker,
            company_name,
        }))
    }

    async fn prices_between(
        &self,
        instrument_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<PricePoint>> {
        let rows = sqlx::query_as::<_, (NaiveDate, f64, i64)>(
            "SELECT date, adj_close, volume \
             FROM price_history \
             WHERE instrument_id = $1 AND date >= $2 AND date <= $3 \
             ORDER BY date ASC",
        )
        .persistent(false)
        .bind(instrument_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("select price_history range failed")?;

        Ok(rows
            .into_iter()
            .map(|(date, adj_close, volume)| PricePoint {
                date,
                adj_close,
                volume,
            })
            .collect())
    }

    async fn increment_play_stats(&self, snapshot_id: i64, correct: bool) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE snapshots \
             SET times_played = times_played + 1, correct_guesses = correct_guesses + $1 \
             WHERE id = $2",
        )
        .persistent(false)
        .bind(i32::from(correct))
        .bind(snapshot_id)
        .execute(&self.pool)
        .await
        .context("update snapshot play stats failed")?;
        Ok(res.rows_affected() == 1)
    }

    async fn counts(&self) -> anyhow::Result<StoreCounts> {
        let (instruments, snapshots, playable_snapshots): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
               (SELECT COUNT(*) FROM instruments), \
               (SELECT COUNT(*) FROM snapshots), \
               (SELECT COUNT(*) FROM snapshots WHERE outcome_label IN ('value', 'trap'))",
        )
        .persistent(false)
        .fetch_one(&self.pool)
        .await
        .context("select store counts failed")?;

        Ok(StoreCounts {
            instruments,
            snapshots,
            playable_snapshots,
        })
    }
}
