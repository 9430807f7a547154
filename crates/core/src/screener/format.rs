use crate::domain::constituent::Constituent;
use crate::domain::screen::ScreenResult;
use crate::ingest::types::PriceSeries;
use crate::screener::metrics::{trailing_mean, RELATIVE_VOLUME_WINDOW};
use crate::screener::rank::ScoredMember;

/// Round to `decimals` places with ties going up (2.25 -> 2.3, -2.25 -> -2.2).
pub fn round_half_up(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor + 0.5).floor() / factor
}

pub fn format_result(
    position: usize,
    scored: &ScoredMember,
    constituent: &Constituent,
    series: &PriceSeries,
) -> ScreenResult {
    let company_name = if constituent.name.trim().is_empty() {
        series.name.clone()
    } else {
        constituent.name.clone()
    };
    let avg_volume = round_half_up(trailing_mean(&series.volumes, RELATIVE_VOLUME_WINDOW), 0);

    ScreenResult {
        rank: position + 1,
        symbol: scored.member.symbol.clone(),
        company_name,
        sector: constituent.sector.clone(),
        price: series.current_price,
        year_high: series.year_high,
        year_low: series.year_low,
        roe: round_half_up(scored.member.roe, 1),
        momentum_1m: round_half_up(scored.member.momentum_1m, 1),
        relative_volume: round_half_up(scored.member.relative_volume, 2),
        composite_score: round_half_up(scored.composite_score, 1),
        market_cap: 0.0,
        volume: series.current_volume,
        avg_volume: avg_volume.max(0.0) as u64,
    }
}
