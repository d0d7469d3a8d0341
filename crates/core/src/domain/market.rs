use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One daily split/dividend-adjusted close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub adj_close: f64,
    #[serde(default)]
    pub volume: i64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, adj_close: f64) -> Self {
        Self {
            date,
            adj_close,
            volume: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCapTier {
    Large,
    Mid,
    Small,
}

impl MarketCapTier {
    const LARGE_CAP: f64 = 10_000_000_000.0;
    const MID_CAP: f64 = 2_000_000_000.0;

    pub fn from_market_cap(cap: Option<f64>) -> Self {
        match cap.unwrap_or(0.0) {
            c if c >= Self::LARGE_CAP => MarketCapTier::Large,
            c if c >= Self::MID_CAP => MarketCapTier::Mid,
            _ => MarketCapTier::Small,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCapTier::Large => "large",
            MarketCapTier::Mid => "mid",
            MarketCapTier::Small => "small",
        }
    }
}

impl fmt::Display for MarketCapTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketCapTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "large" => Ok(MarketCapTier::Large),
            "mid" => Ok(MarketCapTier::Mid),
            "small" => Ok(MarketCapTier::Small),
            other => anyhow::bail!("unknown market cap tier: {other}"),
        }
    }
}

/// Company metadata as resolved by a market data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap_tier: MarketCapTier,
}

impl CompanyInfo {
    /// The source's placeholder for an unresolved company.
    pub const UNKNOWN_NAME: &'static str = "Unknown";

    /// Returns the company name unless it is missing, blank or the source's
    /// "unknown" placeholder.
    pub fn resolved_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty() && *n != Self::UNKNOWN_NAME)
    }
}

/// Raw line items of one statement, keyed by the vendor's label.
pub type StatementLines = BTreeMap<String, Option<f64>>;

/// One reporting period's raw statements as delivered by the source, in
/// source units (not yet normalized).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStatementPeriod {
    pub period_end: NaiveDate,
    #[serde(default)]
    pub income: StatementLines,
    #[serde(default)]
    pub balance: StatementLines,
    #[serde(default)]
    pub cash_flow: StatementLines,
}

/// Normalizes a user-supplied ticker symbol. Returns `None` for blanks.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    Some(t.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_market_cap_tiers() {
        assert_eq!(MarketCapTier::from_market_cap(Some(2.5e12)), MarketCapTier::Large);
        assert_eq!(MarketCapTier::from_market_cap(Some(10e9)), MarketCapTier::Large);
        assert_eq!(MarketCapTier::from_market_cap(Some(2e9)), MarketCapTier::Mid);
        assert_eq!(MarketCapTier::from_market_cap(Some(1.99e9)), MarketCapTier::Small);
        assert_eq!(MarketCapTier::from_market_cap(None), MarketCapTier::Small);
    }

    #[test]
    fn unknown_company_name_is_unresolved() {
        let mut info = CompanyInfo {
            ticker: "ZZZZ".to_string(),
            name: Some("Unknown".to_string()),
            sector: None,
            industry: None,
            market_cap_tier: MarketCapTier::Small,
        };
        assert_eq!(info.resolved_name(), None);
        info.name = Some("  ".to_string());
        assert_eq!(info.resolved_name(), None);
        info.name = Some("Acme Corp".to_string());
        assert_eq!(info.resolved_name(), Some("Acme Corp"));
    }

    #[test]
    fn normalizes_tickers() {
        assert_eq!(normalize_ticker(" brk-b "), Some("BRK-B".to_string()));
        assert_eq!(normalize_ticker("   "), None);
    }
}
