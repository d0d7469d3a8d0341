use crate::domain::market::PricePoint;
use crate::domain::snapshot::Outcome;
use crate::snapshots::outcome::{compute_outcome, forward_horizon_days, PriceSeries, DEFAULT_FORWARD_MONTHS};
use chrono::{Duration, NaiveDate};

pub const SNAPSHOT_STEP_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Price history required before the first snapshot.
    pub min_history_years: u32,
    pub forward_months: u32,
    /// No snapshot earlier than Jan 1 of this year, so financials exist.
    pub min_snapshot_year: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            min_history_years: 5,
            forward_months: DEFAULT_FORWARD_MONTHS,
            min_snapshot_year: 2023,
        }
    }
}

impl WindowConfig {
    pub fn from_env() -> Self {
        let mut out = Self::default();
        out.min_snapshot_year = crate::config::env_or("SNAPSHOT_MIN_YEAR", out.min_snapshot_year);
        out
    }

    /// The `[lower, upper]` snapshot window for `series`, or `None` when the
    /// history is too short.
    pub fn bounds(&self, series: &PriceSeries) -> Option<(NaiveDate, NaiveDate)> {
        let first = series.first_date()?;
        let last = series.last_date()?;

        let by_history = first + Duration::days(i64::from(self.min_history_years) * 365);
        let by_year = NaiveDate::from_ymd_opt(self.min_snapshot_year, 1, 1)?;
        let lower = by_history.max(by_year);
        let upper = last - Duration::days(forward_horizon_days(self.forward_months));

        (lower < upper).then_some((lower, upper))
    }
}

/// Candidate snapshot dates: every 90 days from the lower bound up to and
/// including the upper bound.
pub fn candidate_dates(series: &PriceSeries, config: &WindowConfig) -> Vec<NaiveDate> {
    let Some((lower, upper)) = config.bounds(series) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut current = lower;
    while current <= upper {
        out.push(current);
        current += Duration::days(SNAPSHOT_STEP_DAYS);
    }
    out
}

/// Snapshot outcomes for every candidate date that has both a snapshot-day
/// and a forward price. Candidates without a valid outcome are dropped.
pub fn generate_snapshots(prices: Vec<PricePoint>, config: &WindowConfig) -> Vec<Outcome> {
    let series = PriceSeries::new(prices);
    candidate_dates(&series, config)
        .into_iter()
        .filter_map(|date| compute_outcome(&series, date, config.forward_months))
        .collect()
}
