use crate::domain::market::PricePoint;
use crate::domain::snapshot::{Difficulty, Outcome, OutcomeLabel};
use chrono::{Duration, NaiveDate};

pub const DEFAULT_FORWARD_MONTHS: u32 = 24;

const SIX_MONTH_DAYS: i64 = 182;
const TWELVE_MONTH_DAYS: i64 = 365;
const DAYS_PER_MONTH: i64 = 30;

const VALUE_THRESHOLD: f64 = 0.30;
const TRAP_THRESHOLD: f64 = -0.20;
const EASY_THRESHOLD: f64 = 0.50;
const HARD_THRESHOLD: f64 = 0.10;

/// A date-ordered price series. Construction sorts (stably) so lookups can
/// binary search.
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// First close dated on or after `date`, forward-filling over gaps such as
    /// weekends and holidays.
    pub fn price_on_or_after(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.points.partition_point(|p| p.date < date);
        self.points.get(idx).map(|p| p.adj_close)
    }
}

pub fn forward_horizon_days(forward_months: u32) -> i64 {
    i64::from(forward_months) * DAYS_PER_MONTH
}

/// Forward returns and labels for a snapshot on `snapshot_date`.
///
/// Returns `None` unless both the snapshot-day price and the mandatory
/// forward price exist. The 6/12-month prices are best effort.
pub fn compute_outcome(
    series: &PriceSeries,
    snapshot_date: NaiveDate,
    forward_months: u32,
) -> Option<Outcome> {
    let t0 = series
        .price_on_or_after(snapshot_date)
        .filter(|p| *p > 0.0)?;
    let t24 = series.price_on_or_after(snapshot_date + Duration::days(forward_horizon_days(forward_months)))?;

    let t6 = series.price_on_or_after(snapshot_date + Duration::days(SIX_MONTH_DAYS));
    let t12 = series.price_on_or_after(snapshot_date + Duration::days(TWELVE_MONTH_DAYS));

    let ret = |p: f64| p / t0 - 1.0;
    let return_24mo = ret(t24);

    Some(Outcome {
        snapshot_date,
        price_at_snapshot: t0,
        price_at_6mo: t6,
        price_at_12mo: t12,
        price_at_24mo: t24,
        return_6mo: t6.map(ret),
        return_12mo: t12.map(ret),
        return_24mo,
        outcome_label: classify_outcome(return_24mo),
        difficulty: classify_difficulty(return_24mo),
    })
}

pub fn classify_outcome(return_24mo: f64) -> OutcomeLabel {
    if return_24mo >= VALUE_THRESHOLD {
        OutcomeLabel::Value
    } else if return_24mo <= TRAP_THRESHOLD {
        OutcomeLabel::Trap
    } else {
        OutcomeLabel::Neutral
    }
}

/// How obvious the outcome was in hindsight, by magnitude of the return.
pub fn classify_difficulty(return_24mo: f64) -> Difficulty {
    let magnitude = return_24mo.abs();
    if magnitude >= EASY_THRESHOLD {
        Difficulty::Easy
    } else if magnitude <= HARD_THRESHOLD {
        Difficulty::Hard
    } else {
        Difficulty::Medium
    }
}
