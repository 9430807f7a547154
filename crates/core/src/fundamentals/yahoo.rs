use crate::config::Settings;
use crate::fundamentals::backfill::{RoeLookup, RoeSource};
use crate::ingest::error::ProviderResponseError;
use crate::ingest::yahoo::{endpoint_url, BROWSER_USER_AGENT, DEFAULT_BASE_URL};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PROVIDER_NAME: &str = "yahoo_quote_summary";

#[derive(Debug, Clone)]
struct Credentials {
    crumb: String,
    cookies: String,
}

/// Reads `financialData.returnOnEquity` from the quote summary endpoint.
///
/// The endpoint needs a session cookie plus a matching crumb; both are cached for the life of the
/// client and replaced by `refresh_credentials`.
#[derive(Debug)]
pub struct YahooFundamentalsClient {
    http: reqwest::Client,
    base_url: String,
    cookie_url: String,
    credentials: Mutex<Option<Credentials>>,
}

impl YahooFundamentalsClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .fundamentals_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let cookie_url = settings
            .fundamentals_cookie_url
            .clone()
            .unwrap_or_else(|| DEFAULT_COOKIE_URL.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .context("failed to build fundamentals http client")?;

        Ok(Self {
            http,
            base_url,
            cookie_url,
            credentials: Mutex::new(None),
        })
    }

    fn cached_credentials(&self) -> Option<Credentials> {
        self.credentials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn fetch_credentials(&self) -> Result<Credentials> {
        // The cookie endpoint usually answers 404; only its Set-Cookie headers matter.
        let res = self
            .http
            .get(&self.cookie_url)
            .send()
            .await
            .context("session cookie request failed")?;
        let cookies = collect_cookies(res.headers());

        let url = endpoint_url(&self.base_url, &["v1", "test", "getcrumb"])?;
        let res = self
            .http
            .get(url)
            .header(COOKIE, &cookies)
            .send()
            .await
            .context("crumb request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read crumb response")?;
        if !status.is_success() {
            return Err(
                ProviderResponseError::http(PROVIDER_NAME, "crumb", status.as_u16(), &text).into(),
            );
        }

        let crumb = text.trim().to_string();
        anyhow::ensure!(!crumb.is_empty(), "crumb response was empty");
        Ok(Credentials { crumb, cookies })
    }

    async fn lookup(&self, symbol: &str, credentials: &Credentials) -> Result<RoeLookup> {
        let mut url = endpoint_url(
            &self.base_url,
            &["v10", "finance", "quoteSummary", symbol],
        )?;
        url.query_pairs_mut()
            .append_pair("modules", "financialData")
            .append_pair("crumb", &credentials.crumb);

        let res = self
            .http
            .get(url)
            .header(COOKIE, &credentials.cookies)
            .send()
            .await
            .context("quote summary request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read quote summary response")?;
        if !status.is_success() {
            let err = ProviderResponseError::http(PROVIDER_NAME, "http", status.as_u16(), &text);
            if err.is_rate_limited() {
                return Ok(RoeLookup::RateLimited);
            }
            return Err(err.into());
        }

        Ok(match parse_return_on_equity(&text)? {
            Some(roe) => RoeLookup::Known(roe),
            None => RoeLookup::Unknown,
        })
    }
}

#[async_trait::async_trait]
impl RoeSource for YahooFundamentalsClient {
    async fn refresh_credentials(&self) -> Result<()> {
        let fresh = self.fetch_credentials().await?;
        tracing::debug!(crumb_len = fresh.crumb.len(), "refreshed quote summary credentials");
        *self
            .credentials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(fresh);
        Ok(())
    }

    async fn fetch_roe(&self, symbol: &str) -> RoeLookup {
        let credentials = match self.cached_credentials() {
            Some(c) => c,
            None => {
                if let Err(err) = self.refresh_credentials().await {
                    tracing::warn!(%symbol, error = %err, "no quote summary credentials");
                    return RoeLookup::Unknown;
                }
                match self.cached_credentials() {
                    Some(c) => c,
                    None => return RoeLookup::Unknown,
                }
            }
        };

        match self.lookup(symbol, &credentials).await {
            Ok(lookup) => lookup,
            Err(err) => {
                tracing::debug!(%symbol, error = %err, "ROE lookup failed");
                RoeLookup::Unknown
            }
        }
    }
}

/// `name=value` pairs from every Set-Cookie header, joined for a Cookie header.
fn collect_cookies(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|c| c.split(';').next())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryEnvelope {
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    financial_data: Option<FinancialData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    #[serde(default)]
    return_on_equity: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

/// ROE as a percentage with one decimal, or `None` when the payload carries no value.
fn parse_return_on_equity(text: &str) -> Result<Option<f64>> {
    let envelope = serde_json::from_str::<QuoteSummaryEnvelope>(text)
        .context("quote summary response is not valid JSON")?;

    let raw = envelope
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .and_then(|r| r.financial_data)
        .and_then(|f| f.return_on_equity)
        .and_then(|v| v.raw);

    // The ratio arrives as a fraction (0.1534 -> 15.3%).
    Ok(raw.map(|r| (r * 1000.0 + 0.5).floor() / 10.0))
}
