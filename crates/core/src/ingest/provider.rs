use crate::config::{env_or, Settings};
use crate::domain::market::{CompanyInfo, PricePoint, RawStatementPeriod};
use crate::error::{Error, Result};
use crate::ingest::types::{CompanyResponse, FinancialsResponse, PricesResponse};
use anyhow::Context;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const MAX_BACKOFF_SECS: u64 = 30;

/// Where the seeder gets company metadata, prices and statements from.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_company_info(&self, ticker: &str) -> Result<CompanyInfo>;

    /// Adjusted daily closes with `start <= date <= end`.
    async fn fetch_prices(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>>;

    /// Annual statements in source units, any order.
    async fn fetch_raw_financials(&self, ticker: &str) -> Result<Vec<RawStatementPeriod>>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonMarketData {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retries: u32,
}

impl HttpJsonMarketData {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_market_data_base_url()?.to_string();
        let api_key = settings.market_data_api_key.clone();

        let timeout_secs = env_or("MARKET_DATA_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        let retries = env_or("MARKET_DATA_RETRIES", DEFAULT_RETRIES).max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            retries,
        })
    }

    fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        let headers = self.headers()?;

        let res = self
            .http
            .get(&url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|err| Error::TransientUpstream(format!("GET {url}: {err}")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|err| Error::TransientUpstream(format!("reading {url}: {err}")))?;

        if !status.is_success() {
            return Err(status_error(status, &url, &text));
        }

        let parsed = serde_json::from_str::<T>(&text)
            .with_context(|| format!("market data response from {url} has unexpected shape"))?;
        Ok(parsed)
    }

    /// Retries transient failures with exponential backoff; anything else
    /// returns immediately.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(path, query).await {
                Ok(parsed) => return Ok(parsed),
                Err(err) if err.is_transient() && attempt < self.retries => {
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(attempt, ?backoff, %path, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Doubles from one second per attempt, capped at [`MAX_BACKOFF_SECS`].
fn retry_backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    Duration::from_secs((1u64 << exp).min(MAX_BACKOFF_SECS))
}

fn status_error(status: StatusCode, url: &str, body: &str) -> Error {
    let detail = format!("market data HTTP {status} for {url}: {}", truncate(body, 200));
    if status == StatusCode::NOT_FOUND {
        Error::NotFound(detail)
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::TransientUpstream(detail)
    } else {
        Error::Internal(anyhow::anyhow!(detail))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait::async_trait]
impl MarketDataSource for HttpJsonMarketData {
    fn source_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_company_info(&self, ticker: &str) -> Result<CompanyInfo> {
        match self
            .get_json::<CompanyResponse>(&format!("/v1/company/{ticker}"), &[])
            .await
        {
            Ok(resp) => Ok(resp.into()),
            Err(Error::NotFound(_)) => Err(Error::CompanyNotFound {
                ticker: ticker.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    async fn fetch_prices(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>> {
        let query = [("start", start.to_string()), ("end", end.to_string())];
        match self
            .get_json::<PricesResponse>(&format!("/v1/prices/{ticker}"), &query)
            .await
        {
            Ok(resp) => Ok(resp.prices),
            Err(Error::NotFound(_)) => Err(Error::NoPriceHistory {
                ticker: ticker.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    async fn fetch_raw_financials(&self, ticker: &str) -> Result<Vec<RawStatementPeriod>> {
        match self
            .get_json::<FinancialsResponse>(&format!("/v1/financials/{ticker}"), &[])
            .await
        {
            Ok(resp) => Ok(resp.periods),
            // No statements on file is not fatal: the instrument still gets
            // prices and snapshots.
            Err(Error::NotFound(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}
