//! Point-in-time normalization of annual statements.
//!
//! A fiscal year only becomes visible once its assumed filing date
//! (`period end + FILING_LAG_DAYS`) is strictly before the as-of date. Vendor
//! line items are mapped onto normalized fields through [`SYNONYMS`], a
//! priority-ordered lookup table per field.

use crate::domain::financials::FinancialYear;
use crate::domain::market::{RawStatementPeriod, StatementLines};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

pub const FILING_LAG_DAYS: i64 = 90;
pub const MAX_YEARS: usize = 5;

const MILLION: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement {
    Income,
    Balance,
    CashFlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Revenue,
    GrossProfit,
    OperatingIncome,
    Ebitda,
    NetIncome,
    TotalAssets,
    TotalDebt,
    CashAndEquivalents,
    TotalEquity,
    SharesOutstanding,
    OperatingCashFlow,
    CapitalExpenditures,
}

#[derive(Debug, Clone, Copy)]
pub struct Synonyms {
    pub field: Field,
    pub statement: Statement,
    /// Checked in order; the first present, finite value wins.
    pub keys: &'static [&'static str],
}

pub const SYNONYMS: &[Synonyms] = &[
    Synonyms {
        field: Field::Revenue,
        statement: Statement::Income,
        keys: &["Total Revenue", "Revenue"],
    },
    Synonyms {
        field: Field::GrossProfit,
        statement: Statement::Income,
        keys: &["Gross Profit"],
    },
    Synonyms {
        field: Field::OperatingIncome,
        statement: Statement::Income,
        keys: &["Operating Income", "EBIT"],
    },
    Synonyms {
        field: Field::Ebitda,
        statement: Statement::Income,
        keys: &["EBITDA", "Normalized EBITDA"],
    },
    Synonyms {
        field: Field::NetIncome,
        statement: Statement::Income,
        keys: &["Net Income", "Net Income Common Stockholders"],
    },
    Synonyms {
        field: Field::TotalAssets,
        statement: Statement::Balance,
        keys: &["Total Assets"],
    },
    Synonyms {
        field: Field::TotalDebt,
        statement: Statement::Balance,
        keys: &["Total Debt", "Long Term Debt"],
    },
    Synonyms {
        field: Field::CashAndEquivalents,
        statement: Statement::Balance,
        keys: &["Cash And Cash Equivalents", "Cash"],
    },
    Synonyms {
        field: Field::TotalEquity,
        statement: Statement::Balance,
        keys: &["Total Equity Gross Minority Interest", "Stockholders Equity"],
    },
    Synonyms {
        field: Field::SharesOutstanding,
        statement: Statement::Balance,
        keys: &["Ordinary Shares Number", "Share Issued"],
    },
    Synonyms {
        field: Field::OperatingCashFlow,
        statement: Statement::CashFlow,
        keys: &["Operating Cash Flow"],
    },
    Synonyms {
        field: Field::CapitalExpenditures,
        statement: Statement::CashFlow,
        keys: &["Capital Expenditure"],
    },
];

pub fn report_date(period_end: NaiveDate) -> NaiveDate {
    period_end + Duration::days(FILING_LAG_DAYS)
}

/// Normalizes `periods` into at most [`MAX_YEARS`] fiscal years whose filing
/// date is strictly before `as_of`, oldest first.
///
/// Periods without a usable revenue figure are skipped. When two periods land
/// in the same fiscal year the later period end wins.
pub fn extract(periods: &[RawStatementPeriod], as_of: NaiveDate) -> Vec<FinancialYear> {
    let mut by_year: BTreeMap<i32, (NaiveDate, FinancialYear)> = BTreeMap::new();

    for period in periods {
        let filed = report_date(period.period_end);
        if filed >= as_of {
            continue;
        }

        let Some(year) = normalize_period(period, filed) else {
            continue;
        };

        match by_year.get(&year.fiscal_year) {
            Some((existing_end, _)) if *existing_end >= period.period_end => {}
            _ => {
                by_year.insert(year.fiscal_year, (period.period_end, year));
            }
        }
    }

    let years: Vec<FinancialYear> = by_year.into_values().map(|(_, y)| y).collect();
    let skip = years.len().saturating_sub(MAX_YEARS);
    years.into_iter().skip(skip).collect()
}

fn normalize_period(period: &RawStatementPeriod, report_date: NaiveDate) -> Option<FinancialYear> {
    let get = |field: Field| lookup(period, field);

    let revenue = get(Field::Revenue).filter(|r| *r != 0.0)?;

    let gross_profit = get(Field::GrossProfit);
    let operating_income = get(Field::OperatingIncome);
    let net_income = get(Field::NetIncome);
    let op_cf = get(Field::OperatingCashFlow);
    let capex = get(Field::CapitalExpenditures).map(f64::abs);

    let free_cash_flow = match (op_cf, capex) {
        (Some(ocf), Some(cx)) => Some(ocf - cx),
        _ => None,
    };

    let margin = |line: Option<f64>| line.map(|v| v / revenue);
    let millions = |v: Option<f64>| v.map(|v| v / MILLION);

    Some(FinancialYear {
        fiscal_year: period.period_end.year(),
        report_date,
        revenue: revenue / MILLION,
        gross_profit: millions(gross_profit),
        operating_income: millions(operating_income),
        ebitda: millions(get(Field::Ebitda)),
        net_income: millions(net_income),
        gross_margin: margin(gross_profit),
        operating_margin: margin(operating_income),
        net_margin: margin(net_income),
        total_assets: millions(get(Field::TotalAssets)),
        total_debt: millions(get(Field::TotalDebt)),
        cash_and_equivalents: millions(get(Field::CashAndEquivalents)),
        total_equity: millions(get(Field::TotalEquity)),
        shares_outstanding: millions(get(Field::SharesOutstanding)),
        operating_cash_flow: millions(op_cf),
        capital_expenditures: millions(capex),
        free_cash_flow: millions(free_cash_flow),
    })
}

fn lookup(period: &RawStatementPeriod, field: Field) -> Option<f64> {
    let entry = SYNONYMS.iter().find(|s| s.field == field)?;
    let lines: &StatementLines = match entry.statement {
        Statement::Income => &period.income,
        Statement::Balance => &period.balance,
        Statement::CashFlow => &period.cash_flow,
    };

    entry.keys
        .iter()
        .find_map(|key| lines.get(*key).copied().flatten().filter(|v| v.is_finite()))
}
