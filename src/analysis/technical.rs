use crate::models::screening::{TechnicalEvaluation, TechnicalSnapshot};
use crate::models::stock::{closes, Bar, ChartData};
use crate::util;
use log::{debug, warn};
use std::collections::HashMap;

/// Longest moving-average window; shorter histories fail the technical check.
pub const MIN_HISTORY: usize = 200;

/// Simple moving average aligned to `values`: `None` until index `period - 1`.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    for (i, window) in values.windows(period).enumerate() {
        out[i + period - 1] = Some(window.iter().sum::<f64>() / period as f64);
    }
    out
}

/// Mean first difference over the trailing `window + 1` defined points.
pub fn slope(series: &[Option<f64>], window: usize) -> Option<f64> {
    let defined: Vec<f64> = series.iter().filter_map(|v| *v).collect();
    if window == 0 || defined.len() < window + 1 {
        return None;
    }

    let recent = &defined[defined.len() - window - 1..];
    let total: f64 = recent.windows(2).map(|pair| pair[1] - pair[0]).sum();
    Some(total / window as f64)
}

pub struct TechnicalAnalyzer {
    slope_window: usize,
}

impl TechnicalAnalyzer {
    pub fn new(slope_window: usize) -> Self {
        Self { slope_window }
    }

    /// Evaluate an ascending series against the four moving-average criteria.
    pub fn evaluate(&self, bars: &[Bar]) -> TechnicalEvaluation {
        if bars.len() < MIN_HISTORY {
            debug!("insufficient history: {} bars", bars.len());
            return TechnicalEvaluation::failed();
        }

        let prices = closes(bars);
        if prices.iter().any(|p| !p.is_finite()) {
            warn!("non-finite closing price in series, skipping");
            return TechnicalEvaluation::failed();
        }

        let sma50 = sma(&prices, 50);
        let sma100 = sma(&prices, 100);
        let sma200 = sma(&prices, 200);

        let (Some(last50), Some(last100), Some(last200)) = (
            sma50.last().copied().flatten(),
            sma100.last().copied().flatten(),
            sma200.last().copied().flatten(),
        ) else {
            return TechnicalEvaluation::failed();
        };

        let current_price = prices[prices.len() - 1];
        let snapshot = TechnicalSnapshot::new(
            current_price,
            last50,
            last100,
            last200,
            slope(&sma200, self.slope_window),
        );

        TechnicalEvaluation {
            passes: snapshot.passes(),
            snapshot: Some(snapshot),
        }
    }

    /// Each symbol is evaluated on its own; one bad series never affects another.
    pub fn evaluate_batch(&self, series: &HashMap<String, Vec<Bar>>) -> HashMap<String, TechnicalEvaluation> {
        series
            .iter()
            .map(|(symbol, bars)| (symbol.clone(), self.evaluate(bars)))
            .collect()
    }

    /// Chart lines for the last `points` bars. Averages use the full history so
    /// the long windows are populated across the visible range when possible.
    pub fn chart_data(&self, bars: &[Bar], points: usize) -> ChartData {
        let prices = closes(bars);
        let sma50 = sma(&prices, 50);
        let sma100 = sma(&prices, 100);
        let sma200 = sma(&prices, 200);

        let start = bars.len().saturating_sub(points);
        ChartData {
            dates: bars[start..].iter().map(|b| util::format_bar_date(&b.datetime)).collect(),
            prices: prices[start..].to_vec(),
            sma50: sma50[start..].to_vec(),
            sma100: sma100[start..].to_vec(),
            sma200: sma200[start..].to_vec(),
        }
    }
}

impl Default for TechnicalAnalyzer {
    fn default() -> Self {
        Self::new(14)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn series_from(prices: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                datetime: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000,
            })
            .collect()
    }

    fn arithmetic(len: usize, start: f64, step: f64) -> Vec<f64> {
        (0..len).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_sma_basic() {
        let result = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(result.len(), 5);
        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert!((result[2].unwrap() - 2.0).abs() < 1e-9);
        assert!((result[4].unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_sma_insufficient_data() {
        assert_eq!(sma(&[1.0, 2.0], 5), vec![None, None]);
        assert_eq!(sma(&[1.0, 2.0], 0), vec![None, None]);
    }

    #[test]
    fn test_sma_constant_series() {
        let prices = vec![42.5; 260];
        for period in [50, 100, 200] {
            let values = sma(&prices, period);
            for v in values[period - 1..].iter() {
                assert!((v.unwrap() - 42.5).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_sma_arithmetic_series_is_trailing_mean() {
        let prices = arithmetic(300, 10.0, 0.5);
        let values = sma(&prices, 200);
        for i in [199, 250, 299] {
            let expected: f64 = prices[i + 1 - 200..=i].iter().sum::<f64>() / 200.0;
            assert!((values[i].unwrap() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_slope_of_arithmetic_series_equals_step() {
        let prices = arithmetic(300, 10.0, 0.5);
        let s = slope(&sma(&prices, 200), 14).unwrap();
        assert!((s - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_slope_needs_window_plus_one_points() {
        let values: Vec<Option<f64>> = vec![None, Some(1.0), Some(2.0), Some(3.0)];
        assert_eq!(slope(&values, 3), None);
        assert!((slope(&values, 2).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_history_always_fails_closed() {
        let analyzer = TechnicalAnalyzer::default();
        for len in 0..MIN_HISTORY {
            let bars = series_from(&arithmetic(len, 10.0, 1.0));
            let result = analyzer.evaluate(&bars);
            assert!(!result.passes, "length {}", len);
            assert!(result.snapshot.is_none(), "length {}", len);
        }
    }

    #[test]
    fn test_uptrend_passes() {
        let bars = series_from(&arithmetic(365, 50.0, 0.1));
        let result = TechnicalAnalyzer::default().evaluate(&bars);

        assert!(result.passes);
        let snapshot = result.snapshot.unwrap();
        assert!((snapshot.current_price - 86.4).abs() < 1e-9);
        assert!((snapshot.sma200_slope.unwrap() - 0.1).abs() < 1e-9);
        assert!(snapshot.sma50_above_sma200 && snapshot.sma100_above_sma200);
    }

    #[test]
    fn test_downtrend_fails_with_snapshot() {
        let bars = series_from(&arithmetic(365, 100.0, -0.1));
        let result = TechnicalAnalyzer::default().evaluate(&bars);

        assert!(!result.passes);
        let snapshot = result.snapshot.unwrap();
        assert!(!snapshot.price_above_sma200);
        assert!(!snapshot.sma200_slope_positive);
    }

    #[test]
    fn test_constant_series_fails_on_strict_comparisons() {
        let bars = series_from(&vec![20.0; 250]);
        let result = TechnicalAnalyzer::default().evaluate(&bars);

        assert!(!result.passes);
        let snapshot = result.snapshot.unwrap();
        assert!((snapshot.sma50 - 20.0).abs() < 1e-9);
        assert!((snapshot.sma200 - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_price_fails_closed() {
        let mut prices = arithmetic(250, 10.0, 0.1);
        prices[100] = f64::NAN;
        let result = TechnicalAnalyzer::default().evaluate(&series_from(&prices));
        assert_eq!(result, TechnicalEvaluation::failed());
    }

    #[test]
    fn test_batch_isolates_symbols() {
        let mut series = HashMap::new();
        series.insert("UP".to_string(), series_from(&arithmetic(300, 10.0, 0.2)));
        series.insert("SHORT".to_string(), series_from(&arithmetic(20, 10.0, 0.2)));

        let results = TechnicalAnalyzer::default().evaluate_batch(&series);
        assert!(results["UP"].passes);
        assert_eq!(results["SHORT"], TechnicalEvaluation::failed());
    }

    #[test]
    fn test_chart_data_tail_alignment() {
        let bars = series_from(&arithmetic(365, 10.0, 0.1));
        let chart = TechnicalAnalyzer::default().chart_data(&bars, 200);

        assert_eq!(chart.len(), 200);
        assert_eq!(chart.dates.len(), 200);
        assert!(chart.sma200.iter().all(|v| v.is_some()));
        assert_eq!(chart.dates.last().map(String::as_str), Some("2024-01-01"));

        let short = TechnicalAnalyzer::default().chart_data(&bars[..120], 200);
        assert_eq!(short.len(), 120);
        assert!(short.sma200.iter().all(|v| v.is_none()));
        assert_eq!(short.sma50[48], None);
        assert!(short.sma50[49].is_some());
    }
}
