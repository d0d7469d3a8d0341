use crate::domain::financials::FinancialYear;
use crate::domain::snapshot::{Difficulty, OutcomeLabel};
use crate::error::Error;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerChoice {
    Value,
    Trap,
}

impl PlayerChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerChoice::Value => "value",
            PlayerChoice::Trap => "trap",
        }
    }

    pub fn matches(&self, label: OutcomeLabel) -> bool {
        matches!(
            (self, label),
            (PlayerChoice::Value, OutcomeLabel::Value) | (PlayerChoice::Trap, OutcomeLabel::Trap)
        )
    }
}

impl FromStr for PlayerChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(PlayerChoice::Value),
            "trap" => Ok(PlayerChoice::Trap),
            other => Err(Error::invalid_choice(other)),
        }
    }
}

/// Optional narrowing of the random snapshot draw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotFilters {
    pub difficulty: Option<Difficulty>,
    pub sector: Option<String>,
    pub exclude_ids: BTreeSet<i64>,
}

impl SnapshotFilters {
    /// Builds filters from loosely-typed request parameters.
    ///
    /// `exclude_ids` is a comma-separated id list; empty segments are ignored.
    pub fn parse(
        difficulty: Option<&str>,
        sector: Option<&str>,
        exclude_ids: Option<&str>,
    ) -> Result<Self, Error> {
        let difficulty = difficulty
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<Difficulty>()
                    .map_err(|_| Error::Validation(format!("unknown difficulty '{s}'")))
            })
            .transpose()?;

        let sector = sector
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut ids = BTreeSet::new();
        if let Some(raw) = exclude_ids {
            for part in raw.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let id = part
                    .parse::<i64>()
                    .map_err(|_| Error::Validation(format!("invalid snapshot id '{part}'")))?;
                ids.insert(id);
            }
        }

        Ok(Self {
            difficulty,
            sector,
            exclude_ids: ids,
        })
    }
}

/// A randomly drawn playable snapshot, before its financials are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableSnapshot {
    pub snapshot_id: i64,
    pub instrument_id: i64,
    pub snapshot_date: NaiveDate,
    pub display_name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
}

/// What a player sees: a disguised company at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub snapshot_id: i64,
    pub display_name: String,
    pub sector: String,
    pub industry: Option<String>,
    pub snapshot_date: NaiveDate,
    pub snapshot_year: i32,
    /// Up to five fiscal years filed by the snapshot date, oldest first.
    pub financials: Vec<FinancialYear>,
}

/// Stored facts needed to reveal a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealRecord {
    pub snapshot_id: i64,
    pub instrument_id: i64,
    pub snapshot_date: NaiveDate,
    pub price_at_snapshot: f64,
    pub price_at_24mo: f64,
    pub return_24mo: f64,
    pub outcome_label: OutcomeLabel,
    pub ticker: String,
    pub company_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealOutcome {
    pub ticker: String,
    pub company_name: String,
    pub snapshot_date: NaiveDate,
    pub price_at_snapshot: f64,
    pub price_at_24mo: f64,
    pub return_24mo: f64,
    pub outcome_label: OutcomeLabel,
    pub player_choice: PlayerChoice,
    pub is_correct: bool,
    pub price_series: Vec<ChartPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filters_from_query_strings() {
        let f = SnapshotFilters::parse(Some("easy"), Some(" Technology "), Some("3, 1,,2")).unwrap();
        assert_eq!(f.difficulty, Some(Difficulty::Easy));
        assert_eq!(f.sector.as_deref(), Some("Technology"));
        assert_eq!(f.exclude_ids.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn rejects_malformed_filters() {
        assert!(matches!(
            SnapshotFilters::parse(Some("impossible"), None, None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            SnapshotFilters::parse(None, None, Some("1,abc")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn choice_parsing_and_matching() {
        assert_eq!("value".parse::<PlayerChoice>().unwrap(), PlayerChoice::Value);
        assert!(matches!("hold".parse::<PlayerChoice>(), Err(Error::Validation(_))));
        assert!(PlayerChoice::Trap.matches(OutcomeLabel::Trap));
        assert!(!PlayerChoice::Value.matches(OutcomeLabel::Neutral));
    }
}
