//! Typed shapes of the provider's JSON payloads.
//!
//! Fields vary by subscription tier, so everything beyond the bare minimum is
//! optional. Numbers arrive as JSON numbers or as strings; `lenient_f64`
//! accepts both and drops anything non-finite.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub(crate) fn number_from_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_from_value)
        .map(|n| n.max(0.0) as u32)
        .unwrap_or_default())
}

/// `{"code": 429, "message": "...", "status": "error"}`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

impl ErrorBody {
    /// Error payload if `value` is one, whatever the HTTP status said.
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("status").and_then(Value::as_str) != Some("error") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TimeSeriesResponse {
    #[serde(default)]
    pub values: Vec<RawBar>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBar {
    pub datetime: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub open: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileResponse {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EarningsResponse {
    #[serde(default)]
    pub earnings: Vec<EarningsEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EarningsEntry {
    #[serde(default)]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub eps_actual: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IncomeStatementResponse {
    #[serde(default)]
    pub income_statement: Vec<IncomeStatementEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IncomeStatementEntry {
    #[serde(default)]
    pub fiscal_date: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sales: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub eps_diluted: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatisticsResponse {
    #[serde(default)]
    pub statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Statistics {
    #[serde(default)]
    pub financials: Option<StatisticsFinancials>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatisticsFinancials {
    #[serde(default)]
    pub income_statement: Option<StatisticsIncome>,
}

/// Growth figures here are fractions, not percentages.
#[derive(Debug, Deserialize)]
pub(crate) struct StatisticsIncome {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quarterly_revenue_growth: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quarterly_earnings_growth_yoy: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GrowthEstimatesResponse {
    #[serde(default)]
    pub growth_estimates: Option<GrowthEstimates>,
}

/// Fractions.
#[derive(Debug, Deserialize)]
pub(crate) struct GrowthEstimates {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_quarter: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub next_quarter: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_year: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub next_year: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub next_5_years_pa: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub past_5_years_pa: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RevenueEstimateResponse {
    #[serde(default)]
    pub revenue_estimate: Vec<RevenueEstimate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RevenueEstimate {
    #[serde(default)]
    pub period: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sales_growth: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PriceTargetResponse {
    #[serde(default)]
    pub price_target: Option<RawPriceTarget>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPriceTarget {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub median: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub average: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecommendationsResponse {
    #[serde(default)]
    pub trends: Option<RecommendationTrends>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rating: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecommendationTrends {
    #[serde(default)]
    pub current_month: Option<RatingCounts>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RatingCounts {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub strong_buy: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub buy: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub hold: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub sell: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub strong_sell: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarketMoversResponse {
    #[serde(default)]
    pub values: Vec<MarketMover>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarketMover {
    pub symbol: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bar_numbers_from_strings_or_numbers() {
        let bar: RawBar = serde_json::from_value(json!({
            "datetime": "2024-05-01",
            "open": "170.5",
            "high": 172.25,
            "low": "bad",
            "close": "171.0"
        }))
        .unwrap();

        assert_eq!(bar.open, Some(170.5));
        assert_eq!(bar.high, Some(172.25));
        assert_eq!(bar.low, None);
        assert_eq!(bar.close, Some(171.0));
        assert_eq!(bar.volume, None);
    }

    #[test]
    fn test_error_body_detection() {
        let err = json!({"code": 429, "message": "You have run out of API credits", "status": "error"});
        let body = ErrorBody::from_value(&err).unwrap();
        assert_eq!(body.code, 429);

        assert!(ErrorBody::from_value(&json!({"values": [], "status": "ok"})).is_none());
    }

    #[test]
    fn test_rating_counts_tolerate_nulls() {
        let counts: RatingCounts = serde_json::from_value(json!({
            "strong_buy": 12, "buy": "7", "hold": null, "sell": 1
        }))
        .unwrap();
        assert_eq!((counts.strong_buy, counts.buy, counts.hold, counts.sell, counts.strong_sell), (12, 7, 0, 1, 0));
    }
}
