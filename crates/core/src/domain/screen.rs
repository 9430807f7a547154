use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_ROE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenResult {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub symbol: String,
    pub company_name: String,
    pub sector: String,
    pub price: f64,
    pub year_high: f64,
    pub year_low: f64,
    pub roe: f64,
    #[serde(rename = "momentum1M")]
    pub momentum_1m: f64,
    pub relative_volume: f64,
    pub composite_score: f64,
    /// Not sourced yet; always 0.
    pub market_cap: f64,
    pub volume: f64,
    pub avg_volume: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenReport {
    pub results: Vec<ScreenResult>,
    pub total_screened: usize,
    pub total_passed: usize,
}

impl ScreenReport {
    pub fn new(results: Vec<ScreenResult>, total_screened: usize) -> Self {
        let total_passed = results.len();
        Self {
            results,
            total_screened,
            total_passed,
        }
    }

    pub fn empty(total_screened: usize) -> Self {
        Self::new(Vec::new(), total_screened)
    }
}
