use crate::domain::market::{CompanyInfo, MarketCapTier, PricePoint, RawStatementPeriod};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyResponse {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    /// Raw market capitalization in dollars.
    #[serde(default)]
    pub market_cap: Option<f64>,
}

impl From<CompanyResponse> for CompanyInfo {
    fn from(r: CompanyResponse) -> Self {
        CompanyInfo {
            ticker: r.ticker,
            name: r.name,
            sector: r.sector,
            industry: r.industry,
            market_cap_tier: MarketCapTier::from_market_cap(r.market_cap),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricesResponse {
    pub ticker: String,
    #[serde(default)]
    pub prices: Vec<PricePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialsResponse {
    pub ticker: String,
    #[serde(default)]
    pub periods: Vec<RawStatementPeriod>,
}
