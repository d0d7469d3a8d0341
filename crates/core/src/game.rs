//! Gameplay: draw a disguised snapshot, then reveal what happened next.

use crate::domain::game::{ChartPoint, GameSnapshot, PlayerChoice, RevealOutcome, SnapshotFilters};
use crate::error::{Error, Result};
use crate::pit::MAX_YEARS;
use crate::storage::GameStore;
use chrono::{Datelike, Months};

const UNKNOWN_SECTOR: &str = "Unknown";
const REVEAL_CHART_MONTHS: u32 = 24;

/// A random playable snapshot matching `filters`, with the financial years
/// that had been filed by its date.
pub async fn next_snapshot(store: &dyn GameStore, filters: &SnapshotFilters) -> Result<GameSnapshot> {
    let picked = store
        .random_playable_snapshot(filters)
        .await?
        .ok_or_else(|| Error::NotFound("no playable snapshot matches the filters".to_string()))?;

    let financials = store
        .financials_before(picked.instrument_id, picked.snapshot_date, MAX_YEARS as i64)
        .await?;

    Ok(GameSnapshot {
        snapshot_id: picked.snapshot_id,
        display_name: picked.display_name,
        sector: picked
            .sector
            .unwrap_or_else(|| UNKNOWN_SECTOR.to_string()),
        industry: picked.industry,
        snapshot_date: picked.snapshot_date,
        snapshot_year: picked.snapshot_date.year(),
        financials,
    })
}

/// Scores `player_choice` against the stored outcome and counts the play.
pub async fn reveal_outcome(
    store: &dyn GameStore,
    snapshot_id: i64,
    player_choice: &str,
) -> Result<RevealOutcome> {
    let choice: PlayerChoice = player_choice.trim().parse()?;

    let record = store
        .find_reveal(snapshot_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("snapshot {snapshot_id}")))?;

    let chart_end = record
        .snapshot_date
        .checked_add_months(Months::new(REVEAL_CHART_MONTHS))
        .ok_or_else(|| Error::DataUnavailable(format!("no chart window after {}", record.snapshot_date)))?;

    let price_series = store
        .prices_between(record.instrument_id, record.snapshot_date, chart_end)
        .await?
        .into_iter()
        .map(|p| ChartPoint {
            date: p.date,
            price: p.adj_close,
        })
        .collect();

    let is_correct = choice.matches(record.outcome_label);
    store.increment_play_stats(snapshot_id, is_correct).await?;
    tracing::debug!(snapshot_id, choice = choice.as_str(), is_correct, "snapshot revealed");

    Ok(RevealOutcome {
        ticker: record.ticker,
        company_name: record.company_name,
        snapshot_date: record.snapshot_date,
        price_at_snapshot: record.price_at_snapshot,
        price_at_24mo: record.price_at_24mo,
        return_24mo: record.return_24mo,
        outcome_label: record.outcome_label,
        player_choice: choice,
        is_correct,
        price_series,
    })
}
