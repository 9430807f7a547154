use crate::config::Settings;
use crate::ingest::error::ProviderResponseError;
use crate::ingest::provider::MarketDataProvider;
use crate::ingest::types::PriceSeries;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PROVIDER_NAME: &str = "yahoo_chart";

/// Daily chart endpoint (one year of 1d bars). No API key required.
#[derive(Debug, Clone)]
pub struct YahooChartProvider {
    http: reqwest::Client,
    base_url: String,
}

impl YahooChartProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .market_data_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs = settings
            .market_data_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(base_url, Duration::from_secs(timeout_secs))
    }

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, symbol: &str) -> Result<reqwest::Url> {
        let mut url = endpoint_url(&self.base_url, &["v8", "finance", "chart", symbol])?;
        url.query_pairs_mut()
            .append_pair("range", "1y")
            .append_pair("interval", "1d");
        Ok(url)
    }
}

/// `base_url` joined with percent-encoded path `segments`.
pub(crate) fn endpoint_url(base_url: &str, segments: &[&str]) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url.trim_end_matches('/'))
        .with_context(|| format!("invalid base url: {base_url}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("base url cannot carry a path: {base_url}"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooChartProvider {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn fetch_price_series(&self, symbol: &str) -> Result<PriceSeries> {
        let url = self.url(symbol)?;

        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("chart request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read chart response")?;
        if !status.is_success() {
            return Err(
                ProviderResponseError::http(PROVIDER_NAME, "http", status.as_u16(), &text).into(),
            );
        }

        parse_chart_response(symbol, &text)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    fifty_two_week_high: Option<f64>,
    #[serde(default)]
    fifty_two_week_low: Option<f64>,
    #[serde(default)]
    regular_market_volume: Option<f64>,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn parse_chart_response(requested: &str, text: &str) -> Result<PriceSeries> {
    let envelope = serde_json::from_str::<ChartEnvelope>(text)
        .context("chart response is not valid chart JSON")?;

    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .context("chart response has no result")?;
    let quote = result
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .context("chart response has no quote block")?;

    let meta = result.meta;
    let current_price = meta
        .regular_market_price
        .context("chart meta is missing regularMarketPrice")?;
    let year_high = meta
        .fifty_two_week_high
        .context("chart meta is missing fiftyTwoWeekHigh")?;

    let name = [meta.long_name, meta.short_name]
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| requested.to_string());

    Ok(PriceSeries {
        symbol: meta.symbol.unwrap_or_else(|| requested.to_string()),
        name,
        current_price,
        year_high,
        year_low: meta.fifty_two_week_low.unwrap_or(0.0),
        current_volume: meta.regular_market_volume.unwrap_or(0.0),
        closes: quote.close.into_iter().flatten().collect(),
        volumes: quote.volume.into_iter().flatten().collect(),
    })
}
