use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeLabel {
    Value,
    Trap,
    Neutral,
}

impl OutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeLabel::Value => "value",
            OutcomeLabel::Trap => "trap",
            OutcomeLabel::Neutral => "neutral",
        }
    }

    /// Only value/trap snapshots are served to players.
    pub fn is_playable(&self) -> bool {
        !matches!(self, OutcomeLabel::Neutral)
    }
}

impl fmt::Display for OutcomeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(OutcomeLabel::Value),
            "trap" => Ok(OutcomeLabel::Trap),
            "neutral" => Ok(OutcomeLabel::Neutral),
            other => anyhow::bail!("unknown outcome label: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => anyhow::bail!("unknown difficulty: {other}"),
        }
    }
}

/// Forward prices, returns and labels computed for one snapshot date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub snapshot_date: NaiveDate,
    pub price_at_snapshot: f64,
    pub price_at_6mo: Option<f64>,
    pub price_at_12mo: Option<f64>,
    pub price_at_24mo: f64,
    pub return_6mo: Option<f64>,
    pub return_12mo: Option<f64>,
    pub return_24mo: f64,
    pub outcome_label: OutcomeLabel,
    pub difficulty: Difficulty,
}

/// A persisted snapshot. Labels never change after insert; only the play
/// counters do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub instrument_id: i64,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub times_played: i32,
    pub correct_guesses: i32,
}
