use crate::ingest::types::{FetchOutcome, PriceSeries};
use anyhow::Result;
use std::collections::BTreeMap;

/// Upper bound on in-flight provider requests during one screening run.
pub const FETCH_BATCH_SIZE: usize = 10;

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_price_series(&self, symbol: &str) -> Result<PriceSeries>;
}

/// Fetch one symbol and classify the result. Never fails: errors and incomplete payloads become
/// `FetchOutcome::Unavailable`.
pub async fn fetch_one(provider: &dyn MarketDataProvider, symbol: &str) -> FetchOutcome {
    match provider.fetch_price_series(symbol).await {
        Ok(series) => match validate_series(&series) {
            Ok(()) => FetchOutcome::Fetched(series),
            Err(err) => FetchOutcome::Unavailable {
                reason: format!("{err:#}"),
            },
        },
        Err(err) => FetchOutcome::Unavailable {
            reason: format!("{err:#}"),
        },
    }
}

/// Fetch price series for `symbols` in batches of [`FETCH_BATCH_SIZE`].
///
/// Requests inside a batch run concurrently; the next batch starts only after every request of
/// the current one has resolved. Unavailable symbols are left out of the returned map.
pub async fn fetch_price_series_batched(
    provider: &dyn MarketDataProvider,
    symbols: &[String],
) -> BTreeMap<String, PriceSeries> {
    let mut out = BTreeMap::new();
    let mut unavailable: usize = 0;

    for (batch_idx, batch) in symbols.chunks(FETCH_BATCH_SIZE).enumerate() {
        let t0 = std::time::Instant::now();
        let outcomes = futures::future::join_all(
            batch
                .iter()
                .map(|symbol| async move { (symbol, fetch_one(provider, symbol).await) }),
        )
        .await;

        for (symbol, outcome) in outcomes {
            match outcome {
                FetchOutcome::Fetched(series) => {
                    out.insert(symbol.clone(), series);
                }
                FetchOutcome::Unavailable { reason } => {
                    unavailable += 1;
                    tracing::debug!(
                        %symbol,
                        provider = provider.provider_name(),
                        %reason,
                        "price series unavailable; dropping symbol"
                    );
                }
            }
        }

        tracing::debug!(
            batch_idx,
            batch_size = batch.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "price series batch resolved"
        );
    }

    if unavailable > 0 {
        tracing::warn!(
            unavailable,
            requested = symbols.len(),
            provider = provider.provider_name(),
            "some symbols had no usable price series"
        );
    }

    out
}

fn validate_series(series: &PriceSeries) -> Result<()> {
    anyhow::ensure!(
        series.current_price.is_finite(),
        "current price is not a finite number"
    );
    anyhow::ensure!(
        series.year_high.is_finite(),
        "52-week high is not a finite number"
    );
    Ok(())
}
