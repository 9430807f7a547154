//! Screening pipeline: ROE filter, batched price fetch, near-high filter, metric calculation,
//! cohort ranking and formatting.

pub mod format;
pub mod metrics;
pub mod rank;

use crate::domain::constituent::UniverseSnapshot;
use crate::domain::screen::ScreenReport;
use crate::ingest::provider::{fetch_price_series_batched, MarketDataProvider};
use rank::CohortMember;

/// Run one screen over `universe` using `provider` for price history.
///
/// The ROE filter runs before any provider request, so symbols that cannot pass on fundamentals
/// are never fetched. Symbols without usable price data are dropped silently.
pub async fn run_screen(
    universe: &UniverseSnapshot,
    provider: &dyn MarketDataProvider,
    min_roe: f64,
) -> ScreenReport {
    let total_screened = universe.len();
    let t0 = std::time::Instant::now();

    let roe_passed = universe.roe_passers(min_roe);
    tracing::info!(
        min_roe,
        roe_passed = roe_passed.len(),
        total_screened,
        "ROE filter applied"
    );

    let charts = fetch_price_series_batched(provider, &roe_passed).await;
    tracing::info!(
        fetched = charts.len(),
        requested = roe_passed.len(),
        provider = provider.provider_name(),
        "price series fetched"
    );

    let mut cohort = Vec::new();
    for (symbol, series) in &charts {
        if !metrics::is_near_year_high(series) {
            continue;
        }
        let Some(roe) = universe.get(symbol).and_then(|c| c.roe) else {
            continue;
        };

        cohort.push(CohortMember {
            symbol: symbol.clone(),
            roe,
            momentum_1m: metrics::momentum_1m(&series.closes),
            relative_volume: metrics::relative_volume(&series.volumes),
        });
    }

    tracing::info!(passed = cohort.len(), "near-high and ROE filters passed");

    if cohort.is_empty() {
        return ScreenReport::empty(total_screened);
    }

    let ranked = rank::rank_cohort(cohort);

    let results: Vec<_> = ranked
        .iter()
        .filter_map(|scored| {
            let symbol = scored.member.symbol.as_str();
            Some((scored, universe.get(symbol)?, charts.get(symbol)?))
        })
        .enumerate()
        .map(|(position, (scored, constituent, series))| {
            format::format_result(position, scored, constituent, series)
        })
        .collect();

    tracing::info!(
        total_passed = results.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "screen complete"
    );

    ScreenReport::new(results, total_screened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constituent::Constituent;
    use crate::ingest::types::PriceSeries;
    use anyhow::Result;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StaticProvider {
        series: BTreeMap<String, PriceSeries>,
        requested: Mutex<Vec<String>>,
    }

    impl StaticProvider {
        fn with(mut self, series: PriceSeries) -> Self {
            self.series.insert(series.symbol.clone(), series);
            self
        }

        fn requested(&self) -> Vec<String> {
            let mut out = self.requested.lock().unwrap().clone();
            out.sort();
            out
        }
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for StaticProvider {
        fn provider_name(&self) -> &'static str {
            "static"
        }

        async fn fetch_price_series(&self, symbol: &str) -> Result<PriceSeries> {
            self.requested.lock().unwrap().push(symbol.to_string());
            self.series
                .get(symbol)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no data for {symbol}"))
        }
    }

    fn constituent(symbol: &str, roe: Option<f64>) -> Constituent {
        Constituent {
            symbol: symbol.to_string(),
            name: format!("{symbol} Holdings"),
            sector: "Industrials".to_string(),
            roe,
        }
    }

    /// 31 steadily rising closes ending at a new high, last volume 3x the trailing average.
    fn breakout(symbol: &str) -> PriceSeries {
        let closes: Vec<f64> = (100..=130).map(f64::from).collect();
        let mut volumes = vec![27.0; 31];
        volumes[30] = 87.0;
        PriceSeries {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            current_price: 130.0,
            year_high: 130.0,
            year_low: 90.0,
            current_volume: 87.0,
            closes,
            volumes,
        }
    }

    fn series(symbol: &str, price: f64, year_high: f64, drift: f64, last_volume: f64) -> PriceSeries {
        let closes: Vec<f64> = (0..40).map(|i| price - drift * (39 - i) as f64).collect();
        let mut volumes = vec![1000.0; 40];
        volumes[39] = last_volume;
        PriceSeries {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            current_price: price,
            year_high,
            year_low: price / 2.0,
            current_volume: last_volume,
            closes,
            volumes,
        }
    }

    #[tokio::test]
    async fn three_symbol_scenario() {
        let universe = UniverseSnapshot::try_new(vec![
            constituent("A", Some(15.0)),
            constituent("B", Some(5.0)),
            constituent("C", Some(20.0)),
        ])
        .unwrap();

        let mut c = breakout("C");
        c.current_price = 80.0;
        c.year_high = 100.0;
        let provider = StaticProvider::default()
            .with(breakout("A"))
            .with(breakout("B"))
            .with(c);

        let report = run_screen(&universe, &provider, 10.0).await;

        // B fails on ROE and is never requested from the provider.
        assert_eq!(provider.requested(), vec!["A", "C"]);
        assert_eq!(report.total_screened, 3);
        assert_eq!(report.total_passed, 1);

        let a = &report.results[0];
        assert_eq!(a.rank, 1);
        assert_eq!(a.symbol, "A");
        assert_eq!(a.company_name, "A Holdings");
        assert_eq!(a.relative_volume, 3.0);
        assert_eq!(a.composite_score, 100.0);
        // (130 - 110) / 110
        assert_eq!(a.momentum_1m, 18.2);
        assert_eq!(a.roe, 15.0);
        assert_eq!(a.avg_volume, 29);
        assert_eq!(a.market_cap, 0.0);
    }

    #[tokio::test]
    async fn ranked_results_hold_ordering_and_threshold_properties() {
        let universe = UniverseSnapshot::try_new(vec![
            constituent("AAA", Some(12.0)),
            constituent("BBB", Some(35.0)),
            constituent("CCC", Some(18.5)),
            constituent("DDD", Some(22.0)),
            constituent("EEE", None),
            constituent("FFF", Some(40.0)),
            constituent("GGG", Some(9.0)),
        ])
        .unwrap();

        let provider = StaticProvider::default()
            .with(series("AAA", 50.0, 51.0, 0.2, 3000.0))
            .with(series("BBB", 200.0, 199.0, 1.5, 900.0))
            .with(series("CCC", 75.0, 78.0, 0.1, 1500.0))
            .with(series("DDD", 20.0, 30.0, 0.1, 5000.0))
            .with(series("EEE", 10.0, 10.0, 0.1, 5000.0))
            .with(series("GGG", 10.0, 10.0, 0.1, 5000.0));
        // FFF has no data at all and is dropped.

        for min_roe in [0.0, 10.0, 20.0, 50.0] {
            let report = run_screen(&universe, &provider, min_roe).await;

            assert_eq!(report.total_screened, universe.len());
            assert_eq!(report.total_passed, report.results.len());
            assert!(report.total_passed <= report.total_screened);

            for (i, r) in report.results.iter().enumerate() {
                assert_eq!(r.rank, i + 1);
                assert!(r.roe >= min_roe);
                assert!((0.0..=100.0).contains(&r.composite_score));
                assert_ne!(r.symbol, "EEE");
                assert_ne!(r.symbol, "DDD");
            }
            for pair in report.results.windows(2) {
                assert!(pair[0].composite_score >= pair[1].composite_score);
            }
        }

        let report = run_screen(&universe, &provider, 10.0).await;
        let symbols: Vec<_> = report.results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols.len(), 3);
        assert!(symbols.contains(&"AAA"));
        assert!(symbols.contains(&"BBB"));
        assert!(symbols.contains(&"CCC"));
    }

    #[tokio::test]
    async fn empty_cohort_is_a_well_formed_report() {
        let universe = UniverseSnapshot::try_new(vec![
            constituent("LAG", Some(30.0)),
            constituent("NEW", Some(30.0)),
        ])
        .unwrap();
        let mut short = series("NEW", 10.0, 10.0, 0.1, 1000.0);
        short.closes.truncate(9);
        let provider = StaticProvider::default()
            .with(series("LAG", 50.0, 100.0, 0.1, 1000.0))
            .with(short);

        let report = run_screen(&universe, &provider, 10.0).await;
        assert_eq!(report, ScreenReport::empty(2));
        assert_eq!(report.total_passed, 0);
    }
}
