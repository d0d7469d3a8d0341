//! In-process store with the same visibility rules as Postgres. A session
//! buffers its own writes and merges them into the shared tables on `commit`;
//! until then only that session sees them.

use crate::domain::financials::FinancialYear;
use crate::domain::game::{PlayableSnapshot, RevealRecord, SnapshotFilters};
use crate::domain::market::PricePoint;
use crate::domain::snapshot::{Outcome, Snapshot};
use crate::storage::{
    GameStore, NewInstrument, SeedSession, SeedStore, StoreCounts, StoredInstrument,
};
use anyhow::Context;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct InstrumentRow {
    id: i64,
    instrument: NewInstrument,
    is_active: bool,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    instruments: BTreeMap<i64, InstrumentRow>,
    prices: BTreeMap<(i64, NaiveDate), PricePoint>,
    financials: BTreeMap<(i64, i32), FinancialYear>,
    snapshots: BTreeMap<i64, Snapshot>,
}

impl Tables {
    fn instrument_by_ticker(&self, ticker: &str) -> Option<&InstrumentRow> {
        self.instruments
            .values()
            .find(|r| r.instrument.ticker == ticker)
    }

    fn has_display_name(&self, name: &str) -> bool {
        self.instruments
            .values()
            .any(|r| r.instrument.display_name == name)
    }

    fn has_snapshot(&self, instrument_id: i64, date: NaiveDate) -> bool {
        self.snapshots
            .values()
            .any(|s| s.instrument_id == instrument_id && s.outcome.snapshot_date == date)
    }
}

#[derive(Debug, Default)]
struct Shared {
    committed: Tables,
    commits: usize,
    /// Id counters behave like sequences: never rolled back.
    next_instrument_id: i64,
    next_snapshot_id: i64,
}

/// Row totals, for inspecting idempotence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub instruments: usize,
    pub prices: usize,
    pub financial_years: usize,
    pub snapshots: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful session commits so far.
    pub fn commit_count(&self) -> usize {
        self.shared.lock().commits
    }

    pub fn row_counts(&self) -> RowCounts {
        let shared = self.shared.lock();
        let t = &shared.committed;
        RowCounts {
            instruments: t.instruments.len(),
            prices: t.prices.len(),
            financial_years: t.financials.len(),
            snapshots: t.snapshots.len(),
        }
    }

    pub fn tickers(&self) -> Vec<String> {
        let shared = self.shared.lock();
        shared
            .committed
            .instruments
            .values()
            .map(|r| r.instrument.ticker.clone())
            .collect()
    }

    /// Committed display names keyed by ticker.
    pub fn display_names(&self) -> BTreeMap<String, String> {
        let shared = self.shared.lock();
        shared
            .committed
            .instruments
            .values()
            .map(|r| (r.instrument.ticker.clone(), r.instrument.display_name.clone()))
            .collect()
    }

    pub fn snapshot(&self, snapshot_id: i64) -> Option<Snapshot> {
        self.shared.lock().committed.snapshots.get(&snapshot_id).cloned()
    }
}

#[async_trait::async_trait]
impl SeedStore for MemoryStore {
    async fn open_session(&self) -> anyhow::Result<Box<dyn SeedSession>> {
        Ok(Box::new(MemorySession {
            shared: Arc::clone(&self.shared),
            pending: Some(Tables::default()),
            savepoint: None,
        }))
    }
}

pub struct MemorySession {
    shared: Arc<Mutex<Shared>>,
    /// Writes not yet committed.
    pending: Option<Tables>,
    savepoint: Option<Tables>,
}

impl MemorySession {
    fn pending(&mut self) -> anyhow::Result<&mut Tables> {
        self.pending.as_mut().context("seed session is closed")
    }
}

/// Folds one session's writes into the committed tables. Rows another session
/// committed in the meantime win; play counters are never touched.
fn merge(committed: &mut Tables, pending: Tables) -> anyhow::Result<()> {
    for (id, row) in &pending.instruments {
        if committed.instruments.contains_key(id) {
            continue;
        }
        let ticker = &row.instrument.ticker;
        anyhow::ensure!(
            committed.instrument_by_ticker(ticker).is_none(),
            "instrument {ticker} was committed by another session"
        );
        anyhow::ensure!(
            !committed.has_display_name(&row.instrument.display_name),
            "display name already taken: {}",
            row.instrument.display_name
        );
    }

    for (id, row) in pending.instruments {
        match committed.instruments.get_mut(&id) {
            Some(current) => {
                let target = &mut current.instrument;
                target.company_name = row.instrument.company_name;
                target.sector = row.instrument.sector;
                target.industry = row.instrument.industry;
                target.market_cap_tier = row.instrument.market_cap_tier;
            }
            None => {
                committed.instruments.insert(id, row);
            }
        }
    }
    for (key, price) in pending.prices {
        committed.prices.entry(key).or_insert(price);
    }
    committed.financials.extend(pending.financials);
    for (id, snapshot) in pending.snapshots {
        if !committed.has_snapshot(snapshot.instrument_id, snapshot.outcome.snapshot_date) {
            committed.snapshots.insert(id, snapshot);
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl SeedSession for MemorySession {
    async fn find_instrument(&mut self, ticker: &str) -> anyhow::Result<Option<StoredInstrument>> {
        let shared = Arc::clone(&self.shared);
        let pending = self.pending()?;
        let shared = shared.lock();
        Ok(pending
            .instrument_by_ticker(ticker)
            .or_else(|| shared.committed.instrument_by_ticker(ticker))
            .map(|r| StoredInstrument {
                id: r.id,
                display_name: r.instrument.display_name.clone(),
            }))
    }

    async fn used_display_names(&mut self) -> anyhow::Result<HashSet<String>> {
        let shared = Arc::clone(&self.shared);
        let pending = self.pending()?;
        let shared = shared.lock();
        Ok(pending
            .instruments
            .values()
            .chain(shared.committed.instruments.values())
            .map(|r| r.instrument.display_name.clone())
            .collect())
    }

    async fn begin_instrument(&mut self) -> anyhow::Result<()> {
        let snapshot = self.pending()?.clone();
        self.savepoint = Some(snapshot);
        Ok(())
    }

    async fn finish_instrument(&mut self) -> anyhow::Result<()> {
        self.savepoint
            .take()
            .context("no instrument savepoint to release")?;
        Ok(())
    }

    async fn abandon_instrument(&mut self) -> anyhow::Result<()> {
        let restored = self
            .savepoint
            .take()
            .context("no instrument savepoint to roll back to")?;
        self.pending = Some(restored);
        Ok(())
    }

    async fn upsert_instrument(&mut self, instrument: &NewInstrument) -> anyhow::Result<i64> {
        let shared = Arc::clone(&self.shared);
        let pending = self.pending()?;
        let mut shared = shared.lock();

        let existing = pending
            .instrument_by_ticker(&instrument.ticker)
            .or_else(|| shared.committed.instrument_by_ticker(&instrument.ticker))
            .cloned();
        if let Some(mut row) = existing {
            row.instrument.company_name = instrument.company_name.clone();
            row.instrument.sector = instrument.sector.clone();
            row.instrument.industry = instrument.industry.clone();
            row.instrument.market_cap_tier = instrument.market_cap_tier;
            let id = row.id;
            pending.instruments.insert(id, row);
            return Ok(id);
        }

        anyhow::ensure!(
            !pending.has_display_name(&instrument.display_name)
                && !shared.committed.has_display_name(&instrument.display_name),
            "display name already taken: {}",
            instrument.display_name
        );

        shared.next_instrument_id += 1;
        let id = shared.next_instrument_id;
        pending.instruments.insert(
            id,
            InstrumentRow {
                id,
                instrument: instrument.clone(),
                is_active: true,
            },
        );
        Ok(id)
    }

    async fn insert_prices_if_absent(
        &mut self,
        instrument_id: i64,
        prices: &[PricePoint],
    ) -> anyhow::Result<u64> {
        let shared = Arc::clone(&self.shared);
        let pending = self.pending()?;
        let shared = shared.lock();
        let mut inserted = 0;
        for p in prices {
            let key = (instrument_id, p.date);
            if shared.committed.prices.contains_key(&key) {
                continue;
            }
            if let std::collections::btree_map::Entry::Vacant(slot) = pending.prices.entry(key) {
                slot.insert(*p);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn upsert_financial_year(
        &mut self,
        instrument_id: i64,
        year: &FinancialYear,
    ) -> anyhow::Result<()> {
        let pending = self.pending()?;
        pending
            .financials
            .insert((instrument_id, year.fiscal_year), year.clone());
        Ok(())
    }

    async fn insert_snapshot_if_absent(
        &mut self,
        instrument_id: i64,
        outcome: &Outcome,
    ) -> anyhow::Result<bool> {
        let shared = Arc::clone(&self.shared);
        let pending = self.pending()?;
        let mut shared = shared.lock();
        if pending.has_snapshot(instrument_id, outcome.snapshot_date)
            || shared
                .committed
                .has_snapshot(instrument_id, outcome.snapshot_date)
        {
            return Ok(false);
        }

        shared.next_snapshot_id += 1;
        let id = shared.next_snapshot_id;
        pending.snapshots.insert(
            id,
            Snapshot {
                id,
                instrument_id,
                outcome: outcome.clone(),
                times_played: 0,
                correct_guesses: 0,
            },
        );
        Ok(true)
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        let shared = Arc::clone(&self.shared);
        let pending = std::mem::take(self.pending()?);
        let mut shared = shared.lock();
        merge(&mut shared.committed, pending)?;
        shared.commits += 1;
        self.savepoint = None;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.pending = None;
        self.savepoint = None;
        Ok(())
    }
}

#[async_trait::async_trait]
impl GameStore for MemoryStore {
    async fn random_playable_snapshot(
        &self,
        filters: &SnapshotFilters,
    ) -> anyhow::Result<Option<PlayableSnapshot>> {
        let shared = self.shared.lock();
        let t = &shared.committed;

        let picked = t
            .snapshots
            .values()
            .filter_map(|s| {
                let inst = t.instruments.get(&s.instrument_id)?;
                let keep = inst.is_active
                    && s.outcome.outcome_label.is_playable()
                    && filters
                        .difficulty
                        .map_or(true, |d| s.outcome.difficulty == d)
                    && filters
                        .sector
                        .as_deref()
                        .map_or(true, |sec| inst.instrument.sector.as_deref() == Some(sec))
                    && !filters.exclude_ids.contains(&s.id);
                keep.then_some((s, inst))
            })
            .choose(&mut rand::thread_rng());

        Ok(picked.map(|(s, inst)| PlayableSnapshot {
            snapshot_id: s.id,
            instrument_id: s.instrument_id,
            snapshot_date: s.outcome.snapshot_date,
            display_name: inst.instrument.display_name.clone(),
            sector: inst.instrument.sector.clone(),
            industry: inst.instrument.industry.clone(),
        }))
    }

    async fn financials_before(
        &self,
        instrument_id: i64,
        cutoff: NaiveDate,
        limit: i64,
    ) -> anyhow::Result<Vec<FinancialYear>> {
        let shared = self.shared.lock();
        let limit = usize::try_from(limit.max(0)).unwrap_or(0);
        let mut recent: Vec<FinancialYear> = shared
            .committed
            .financials
            .range((instrument_id, i32::MIN)..=(instrument_id, i32::MAX))
            .rev()
            .map(|(_, y)| y)
            .filter(|y| y.is_public_on(cutoff))
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn find_reveal(&self, snapshot_id: i64) -> anyhow::Result<Option<RevealRecord>> {
        let shared = self.shared.lock();
        let t = &shared.committed;
        let Some(s) = t.snapshots.get(&snapshot_id) else {
            return Ok(None);
        };
        let inst = t
            .instruments
            .get(&s.instrument_id)
            .with_context(|| format!("snapshot {snapshot_id} has no instrument"))?;

        Ok(Some(RevealRecord {
            snapshot_id: s.id,
            instrument_id: s.instrument_id,
            snapshot_date: s.outcome.snapshot_date,
            price_at_snapshot: s.outcome.price_at_snapshot,
            price_at_24mo: s.outcome.price_at_24mo,
            return_24mo: s.outcome.return_24mo,
            outcome_label: s.outcome.outcome_label,
            ticker: inst.instrument.ticker.clone(),
            company_name: inst.instrument.company_name.clone(),
        }))
    }

    async fn prices_between(
        &self,
        instrument_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<PricePoint>> {
        if start > end {
            return Ok(Vec::new());
        }
        let shared = self.shared.lock();
        Ok(shared
            .committed
            .prices
            .range((instrument_id, start)..=(instrument_id, end))
            .map(|(_, p)| *p)
            .collect())
    }

    async fn increment_play_stats(&self, snapshot_id: i64, correct: bool) -> anyhow::Result<bool> {
        let mut shared = self.shared.lock();
        let Some(s) = shared.committed.snapshots.get_mut(&snapshot_id) else {
            return Ok(false);
        };
        s.times_played += 1;
        if correct {
            s.correct_guesses += 1;
        }
        Ok(true)
    }

    async fn counts(&self) -> anyhow::Result<StoreCounts> {
        let shared = self.shared.lock();
        let t = &shared.committed;
        let playable = t
            .snapshots
            .values()
            .filter(|s| s.outcome.outcome_label.is_playable())
            .count();
        Ok(StoreCounts {
            instruments: t.instruments.len() as i64,
            snapshots: t.snapshots.len() as i64,
            playable_snapshots: playable as i64,
        })
    }
}
