use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One normalized fiscal year. Monetary figures and share counts are in
/// millions; margins are ratios of revenue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialYear {
    pub fiscal_year: i32,
    /// Assumed public filing date (`fiscal year end + 90 days`).
    pub report_date: NaiveDate,
    pub revenue: f64,
    pub gross_profit: Option<f64>,
    pub operating_income: Option<f64>,
    pub ebitda: Option<f64>,
    pub net_income: Option<f64>,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_debt: Option<f64>,
    pub cash_and_equivalents: Option<f64>,
    pub total_equity: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub capital_expenditures: Option<f64>,
    pub free_cash_flow: Option<f64>,
}

impl FinancialYear {
    /// Whether this year had been filed by `date` and may be shown alongside a
    /// snapshot taken that day.
    pub fn is_public_on(&self, date: NaiveDate) -> bool {
        self.report_date <= date
    }
}
