//! Per-symbol technical signals. All functions are pure and total: short histories map to a
//! neutral value instead of an error.

use crate::ingest::types::PriceSeries;

/// Fraction of the 52-week high a price must reach to count as "near the high".
pub const NEAR_HIGH_RATIO: f64 = 0.95;
/// Closes required before the near-high check is considered at all.
pub const MIN_CLOSES_FOR_NEAR_HIGH: usize = 10;

pub const MIN_CLOSES_FOR_MOMENTUM: usize = 20;
/// Offset from the latest close to the reference close (a ~21-session span).
pub const MOMENTUM_LOOKBACK: usize = 20;

pub const RELATIVE_VOLUME_WINDOW: usize = 30;

pub fn is_near_year_high(series: &PriceSeries) -> bool {
    if series.closes.len() < MIN_CLOSES_FOR_NEAR_HIGH {
        return false;
    }
    series.current_price >= series.year_high * NEAR_HIGH_RATIO
}

/// Percent change from the close `MOMENTUM_LOOKBACK + 1` bars back to the latest close.
pub fn momentum_1m(closes: &[f64]) -> f64 {
    if closes.len() < MIN_CLOSES_FOR_MOMENTUM {
        return 0.0;
    }
    let Some(&latest) = closes.last() else {
        return 0.0;
    };
    // With exactly 20 closes the reference bar does not exist.
    let Some(&reference) = closes
        .len()
        .checked_sub(MOMENTUM_LOOKBACK + 1)
        .and_then(|i| closes.get(i))
    else {
        return 0.0;
    };
    if reference == 0.0 {
        return 0.0;
    }
    (latest - reference) / reference * 100.0
}

/// Latest volume over the mean of the trailing 30 volumes.
pub fn relative_volume(volumes: &[f64]) -> f64 {
    if volumes.len() < RELATIVE_VOLUME_WINDOW {
        return 1.0;
    }
    let Some(&latest) = volumes.last() else {
        return 1.0;
    };
    let avg = trailing_mean(volumes, RELATIVE_VOLUME_WINDOW);
    if avg == 0.0 {
        return 1.0;
    }
    latest / avg
}

/// Mean of the last `window` values, or of all values when fewer are available. Empty input
/// yields 0.
pub fn trailing_mean(values: &[f64], window: usize) -> f64 {
    let tail = &values[values.len().saturating_sub(window)..];
    if tail.is_empty() {
        return 0.0;
    }
    tail.iter().sum::<f64>() / tail.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(price: f64, year_high: f64, n_closes: usize) -> PriceSeries {
        PriceSeries {
            symbol: "T".to_string(),
            name: "T".to_string(),
            current_price: price,
            year_high,
            year_low: 1.0,
            current_volume: 0.0,
            closes: vec![price; n_closes],
            volumes: Vec::new(),
        }
    }

    #[test]
    fn near_high_needs_ten_closes() {
        assert!(!is_near_year_high(&series(100.0, 100.0, 9)));
        assert!(!is_near_year_high(&series(1000.0, 100.0, 9)));
        assert!(is_near_year_high(&series(100.0, 100.0, 10)));
    }

    #[test]
    fn near_high_band_is_inclusive_at_95_percent() {
        assert!(is_near_year_high(&series(95.0, 100.0, 20)));
        assert!(!is_near_year_high(&series(94.99, 100.0, 20)));
        assert!(is_near_year_high(&series(101.0, 100.0, 20)));
    }

    #[test]
    fn momentum_is_zero_for_short_history() {
        let closes: Vec<f64> = (1..=19).map(f64::from).collect();
        assert_eq!(momentum_1m(&closes), 0.0);
        // 20 closes pass the length check but have no bar 20 positions before the last.
        let closes: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(momentum_1m(&closes), 0.0);
    }

    #[test]
    fn momentum_uses_bar_twenty_before_last() {
        let closes: Vec<f64> = (1..=21).map(f64::from).collect();
        // (21 - 1) / 1 * 100
        assert_eq!(momentum_1m(&closes), 2000.0);

        let mut closes = vec![50.0; 30];
        closes[9] = 40.0;
        closes[29] = 50.0;
        assert_eq!(momentum_1m(&closes), 25.0);
    }

    #[test]
    fn momentum_with_zero_reference_is_zero() {
        let mut closes = vec![10.0; 25];
        closes[4] = 0.0;
        assert_eq!(momentum_1m(&closes), 0.0);
    }

    #[test]
    fn relative_volume_defaults_and_ratio() {
        assert_eq!(relative_volume(&vec![100.0; 29]), 1.0);
        assert_eq!(relative_volume(&vec![0.0; 30]), 1.0);

        let mut volumes = vec![27.0; 31];
        volumes[30] = 87.0;
        // trailing 30 = 29 * 27 + 87 = 870, mean 29
        assert_eq!(relative_volume(&volumes), 3.0);
    }

    #[test]
    fn trailing_mean_falls_back_to_all_values() {
        assert_eq!(trailing_mean(&[], 30), 0.0);
        assert_eq!(trailing_mean(&[2.0, 4.0], 30), 3.0);
        assert_eq!(trailing_mean(&[100.0, 1.0, 3.0], 2), 2.0);
    }

    #[test]
    fn signals_are_deterministic() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64).sin()).collect();
        assert_eq!(momentum_1m(&closes), momentum_1m(&closes));
        assert_eq!(relative_volume(&closes), relative_volume(&closes));
    }
}
