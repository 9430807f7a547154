/// One symbol's trailing-year daily history as returned by a market data provider.
///
/// `closes` and `volumes` are chronological (oldest first). Each series drops its own missing
/// observations, so the two may differ in length.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub year_high: f64,
    pub year_low: f64,
    pub current_volume: f64,
    pub closes: Vec<f64>,
    pub volumes: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(PriceSeries),
    Unavailable { reason: String },
}
