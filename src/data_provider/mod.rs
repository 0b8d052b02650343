//! Market data access: the `MarketDataSource` seam and its Twelve Data client.
//!
//! Every fetch path checks the rate-limit flag, then the cache, then goes
//! upstream. A 429 (HTTP status or JSON error code) trips the flag and the
//! caller gets whatever was collected so far.

pub mod responses;

use crate::cache::{CachedValue, RateLimitedCache, ResponseCache};
use crate::config::Config;
use crate::errors::{Result, ScreenerError};
use crate::models::fundamental::{AnalystRatings, FundamentalData, GrowthOutlook, PriceTarget};
use crate::models::stock::{Bar, Interval};
use crate::util;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use responses::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Upstream market data as the screening pipeline sees it.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Ascending OHLCV series for one symbol, `None` when unavailable.
    async fn fetch_time_series(&self, symbol: &str, interval: Interval, outputsize: usize) -> Option<Vec<Bar>>;

    /// Series for many symbols, `max_batch_size` per request. Partial on failure.
    async fn fetch_time_series_batch(
        &self,
        symbols: &[String],
        interval: Interval,
        outputsize: usize,
        max_batch_size: usize,
    ) -> HashMap<String, Vec<Bar>>;

    async fn fetch_fundamentals(&self, symbol: &str) -> Option<FundamentalData>;

    /// Today's top gainers.
    async fn fetch_market_movers(&self, count: usize) -> Result<Vec<String>>;

    fn is_rate_limited(&self) -> bool;
}

pub struct MarketDataClient {
    client: Client,
    api_key: String,
    base_url: String,
    cache: Arc<dyn ResponseCache>,
    rate_limit_cooldown: Duration,
    batch_pause_every: usize,
    batch_pause: Duration,
    include_analyst_data: bool,
}

impl MarketDataClient {
    pub fn new(config: &Config) -> Result<Self> {
        let cache = Arc::new(RateLimitedCache::with_timeout(config.cache_timeout));
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: &Config, cache: Arc<dyn ResponseCache>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ScreenerError::RequestError)?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache,
            rate_limit_cooldown: config.rate_limit_cooldown,
            batch_pause_every: config.batch_pause_every,
            batch_pause: config.batch_pause,
            include_analyst_data: config.include_analyst_data,
        })
    }

    pub fn cache(&self) -> &Arc<dyn ResponseCache> {
        &self.cache
    }

    fn series_key(symbol: &str, interval: Interval, outputsize: usize) -> String {
        format!("timeseries_{}_{}_{}", symbol, interval, outputsize)
    }

    fn trip_rate_limit(&self, retry_after: Option<Duration>) {
        self.cache.trip_rate_limit(retry_after.unwrap_or(self.rate_limit_cooldown));
    }

    /// One GET against the provider, with error payloads mapped onto `ScreenerError`.
    async fn request(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        if self.cache.is_rate_limited() {
            return Err(ScreenerError::RateLimited);
        }

        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("GET {} {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.trip_rate_limit(retry_after(response.headers()));
            return Err(ScreenerError::RateLimited);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = response.text().await.unwrap_or_default();
            return Err(ScreenerError::Unavailable {
                code: status.as_u16(),
                message,
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScreenerError::ProviderError {
                code: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        if let Some(error) = ErrorBody::from_value(&body) {
            return Err(match error.code {
                429 => {
                    self.trip_rate_limit(None);
                    ScreenerError::RateLimited
                }
                401 | 403 => ScreenerError::Unavailable {
                    code: error.code,
                    message: error.message,
                },
                code => ScreenerError::ProviderError {
                    code,
                    message: error.message,
                },
            });
        }

        Ok(body)
    }

    /// A sub-call whose absence only degrades one field.
    async fn optional<T: DeserializeOwned>(&self, endpoint: &str, symbol: &str, extra: &[(&str, String)]) -> Option<T> {
        if self.cache.is_rate_limited() {
            return None;
        }

        let mut params = vec![("symbol", symbol.to_string())];
        params.extend(extra.iter().cloned());

        match self.request(endpoint, &params).await {
            Ok(body) => match serde_json::from_value::<T>(body) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Unexpected {} payload for {}: {}", endpoint, symbol, e);
                    None
                }
            },
            Err(ScreenerError::Unavailable { code, .. }) => {
                debug!("{} not available for {} on this plan ({})", endpoint, symbol, code);
                None
            }
            Err(ScreenerError::RateLimited) => None,
            Err(e) => {
                warn!("Could not get {} data for {}: {}", endpoint, symbol, e);
                None
            }
        }
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = httpdate::parse_http_date(raw).ok()?;
    at.duration_since(SystemTime::now()).ok()
}

/// Normalize raw rows into an ascending series. Rows without a usable date or
/// close are dropped.
fn bars_from_raw(raw: Vec<RawBar>) -> Vec<Bar> {
    let mut bars: Vec<Bar> = raw
        .into_iter()
        .filter_map(|row| {
            let datetime = match util::parse_provider_datetime(&row.datetime) {
                Ok(dt) => dt,
                Err(e) => {
                    debug!("skipping bar with bad datetime {:?}: {}", row.datetime, e);
                    return None;
                }
            };
            let close = row.close?;
            Some(Bar {
                datetime,
                open: row.open.unwrap_or(close),
                high: row.high.unwrap_or(close),
                low: row.low.unwrap_or(close),
                close,
                volume: row.volume.map(|v| v as i64).unwrap_or_default(),
            })
        })
        .collect();

    // provider order is newest first
    bars.sort_by_key(|b| b.datetime);
    bars
}

fn series_from_value(value: Value) -> Result<Vec<Bar>> {
    let parsed: TimeSeriesResponse = serde_json::from_value(value)?;
    Ok(bars_from_raw(parsed.values))
}

/// Per-symbol series pulled out of one batch response.
#[derive(Debug, Default)]
struct BatchSplit {
    series: Vec<(String, Vec<Bar>)>,
    /// Some entry carried the provider's 429 error object.
    rate_limited: bool,
}

/// Split a multi-symbol response (`{"AAPL": {...}, "MSFT": {...}}`) into
/// per-symbol series. Symbols that came back as error objects are skipped.
fn split_batch(body: Value, requested: &[String]) -> BatchSplit {
    let mut split = BatchSplit::default();

    if body.get("values").is_some() {
        // a batch of one comes back in single-symbol shape
        if let (Some(symbol), Ok(bars)) = (requested.first(), series_from_value(body)) {
            if !bars.is_empty() {
                split.series.push((symbol.clone(), bars));
            }
        }
        return split;
    }

    let Value::Object(entries) = body else {
        return split;
    };

    for (symbol, entry) in entries {
        if !entry.is_object() {
            continue;
        }
        if let Some(error) = ErrorBody::from_value(&entry) {
            match error.code {
                429 => {
                    debug!("rate limited on {} inside batch: {}", symbol, error.message);
                    split.rate_limited = true;
                }
                401 | 403 => warn!("{} unavailable ({}): {}", symbol, error.code, error.message),
                _ => debug!("no series for {}: {} {}", symbol, error.code, error.message),
            }
            continue;
        }
        match series_from_value(entry) {
            Ok(bars) if !bars.is_empty() => split.series.push((symbol, bars)),
            Ok(_) => debug!("empty series for {}", symbol),
            Err(e) => warn!("Malformed series for {}: {}", symbol, e),
        }
    }
    split
}

fn percent(fraction: f64) -> f64 {
    fraction * 100.0
}

#[async_trait]
impl MarketDataSource for MarketDataClient {
    async fn fetch_time_series(&self, symbol: &str, interval: Interval, outputsize: usize) -> Option<Vec<Bar>> {
        if self.cache.is_rate_limited() {
            warn!("Rate limited, not fetching time series for {}", symbol);
            return None;
        }

        let key = Self::series_key(symbol, interval, outputsize);
        if let Some(CachedValue::Series(bars)) = self.cache.get(&key) {
            return Some(bars);
        }

        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("outputsize", outputsize.to_string()),
        ];
        let body = match self.request("time_series", &params).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Error fetching time series for {}: {}", symbol, e);
                return None;
            }
        };

        match series_from_value(body) {
            Ok(bars) if !bars.is_empty() => {
                self.cache.put(&key, CachedValue::Series(bars.clone()));
                Some(bars)
            }
            Ok(_) => {
                warn!("No time series data for {}", symbol);
                None
            }
            Err(e) => {
                warn!("Malformed time series for {}: {}", symbol, e);
                None
            }
        }
    }

    async fn fetch_time_series_batch(
        &self,
        symbols: &[String],
        interval: Interval,
        outputsize: usize,
        max_batch_size: usize,
    ) -> HashMap<String, Vec<Bar>> {
        let mut results = HashMap::new();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for symbol in symbols {
            if !seen.insert(symbol.as_str()) {
                continue;
            }
            match self.cache.get(&Self::series_key(symbol, interval, outputsize)) {
                Some(CachedValue::Series(bars)) => {
                    results.insert(symbol.clone(), bars);
                }
                _ => pending.push(symbol.clone()),
            }
        }

        let chunk_size = max_batch_size.max(1);
        let mut requests = 0usize;

        for chunk in pending.chunks(chunk_size) {
            if self.cache.is_rate_limited() {
                warn!("Rate limited, skipping remaining time series batches");
                break;
            }
            if requests > 0 && self.batch_pause_every > 0 && requests % self.batch_pause_every == 0 && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
            requests += 1;

            let joined = chunk.join(",");
            let params = [
                ("symbol", joined.clone()),
                ("interval", interval.to_string()),
                ("outputsize", outputsize.to_string()),
            ];

            match self.request("time_series", &params).await {
                Ok(body) => {
                    let split = split_batch(body, chunk);
                    for (symbol, bars) in split.series {
                        self.cache.put(&Self::series_key(&symbol, interval, outputsize), CachedValue::Series(bars.clone()));
                        results.insert(symbol, bars);
                    }
                    if split.rate_limited {
                        self.trip_rate_limit(None);
                        warn!("Rate limited inside batch [{}], returning partial results", joined);
                        break;
                    }
                }
                Err(ScreenerError::RateLimited) => {
                    warn!("Rate limited while fetching batch [{}], returning partial results", joined);
                    break;
                }
                Err(e) => warn!("Time series batch [{}] failed: {}", joined, e),
            }
        }

        info!(
            "Fetched time series for {} of {} symbols in {} requests",
            results.len(),
            seen.len(),
            requests
        );
        results
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Option<FundamentalData> {
        if self.cache.is_rate_limited() {
            warn!("Rate limited, not fetching fundamentals for {}", symbol);
            return None;
        }

        let key = format!("fundamentals_{}", symbol);
        if let Some(CachedValue::Fundamentals(data)) = self.cache.get(&key) {
            return Some(data);
        }

        let mut data = FundamentalData::new(symbol);

        if let Some(profile) = self.optional::<ProfileResponse>("profile", symbol, &[]).await {
            data.company_name = profile.name.filter(|n| !n.trim().is_empty());
        }

        if let Some(earnings) = self.optional::<EarningsResponse>("earnings", symbol, &[]).await {
            let mut reported: Vec<EarningsEntry> = earnings
                .earnings
                .into_iter()
                .filter(|e| e.eps_actual.is_some())
                .collect();
            reported.sort_by(|a, b| b.date.cmp(&a.date));
            data.quarterly_eps = reported.into_iter().filter_map(|e| e.eps_actual).collect();
        }

        if let Some(income) = self
            .optional::<IncomeStatementResponse>("income_statement", symbol, &[("period", "quarterly".to_string())])
            .await
        {
            let mut quarters = income.income_statement;
            quarters.sort_by(|a, b| b.fiscal_date.cmp(&a.fiscal_date));
            data.quarterly_revenue = quarters.iter().filter_map(|q| q.sales).collect();
            if data.quarterly_eps.is_empty() {
                data.quarterly_eps = quarters.iter().filter_map(|q| q.eps_diluted).collect();
            }
        }

        if let Some(stats) = self.optional::<StatisticsResponse>("statistics", symbol, &[]).await {
            let income = stats
                .statistics
                .and_then(|s| s.financials)
                .and_then(|f| f.income_statement);
            if let Some(income) = income {
                data.quarterly_revenue_growth = income.quarterly_revenue_growth.map(percent);
                data.quarterly_eps_growth = income.quarterly_earnings_growth_yoy.map(percent);
            }
        }

        if let Some(growth) = self
            .optional::<GrowthEstimatesResponse>("growth_estimates", symbol, &[])
            .await
            .and_then(|g| g.growth_estimates)
        {
            data.estimated_eps_growth = growth.next_year.or(growth.current_year).map(percent);
            data.outlook = Some(GrowthOutlook {
                current_quarter: growth.current_quarter.map(percent),
                next_quarter: growth.next_quarter.map(percent),
                current_year: growth.current_year.map(percent),
                next_year: growth.next_year.map(percent),
                next_5_years: growth.next_5_years_pa.map(percent),
                past_5_years: growth.past_5_years_pa.map(percent),
            });
        }

        if let Some(revenue) = self.optional::<RevenueEstimateResponse>("revenue_estimate", symbol, &[]).await {
            let growth_for = |period: &str| {
                revenue
                    .revenue_estimate
                    .iter()
                    .find(|e| e.period == period)
                    .and_then(|e| e.sales_growth)
            };
            data.estimated_sales_growth = growth_for("next_year").or_else(|| growth_for("current_year")).map(percent);
        }

        if self.include_analyst_data {
            if let Some(target) = self
                .optional::<PriceTargetResponse>("price_target", symbol, &[])
                .await
                .and_then(|p| p.price_target)
            {
                data.price_target = Some(PriceTarget {
                    high: target.high,
                    median: target.median,
                    low: target.low,
                    average: target.average,
                    current: target.current,
                });
            }

            if let Some(recommendations) = self.optional::<RecommendationsResponse>("recommendations", symbol, &[]).await {
                let rating = recommendations.rating;
                data.ratings = recommendations
                    .trends
                    .and_then(|t| t.current_month)
                    .map(|counts| AnalystRatings {
                        strong_buy: counts.strong_buy,
                        buy: counts.buy,
                        hold: counts.hold,
                        sell: counts.sell,
                        strong_sell: counts.strong_sell,
                        rating,
                    });
            }
        }

        if !data.has_minimal_signal() {
            warn!("No usable fundamental data for {}", symbol);
            return None;
        }

        if self.cache.is_rate_limited() {
            warn!("Fundamentals for {} are partial (rate limited), not caching", symbol);
        } else {
            self.cache.put(&key, CachedValue::Fundamentals(data.clone()));
        }
        Some(data)
    }

    async fn fetch_market_movers(&self, count: usize) -> Result<Vec<String>> {
        let key = format!("movers_gainers_{}", count);
        if let Some(CachedValue::Symbols(symbols)) = self.cache.get(&key) {
            return Ok(symbols);
        }

        let params = [
            ("direction", "gainers".to_string()),
            ("outputsize", count.to_string()),
            ("country", "USA".to_string()),
        ];
        let body = self.request("market_movers/stocks", &params).await?;
        let movers: MarketMoversResponse = serde_json::from_value(body)?;

        let symbols: Vec<String> = movers
            .values
            .into_iter()
            .map(|m| m.symbol.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        self.cache.put(&key, CachedValue::Symbols(symbols.clone()));
        Ok(symbols)
    }

    fn is_rate_limited(&self) -> bool {
        self.cache.is_rate_limited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bars_are_reordered_ascending() {
        let body = json!({
            "meta": {"symbol": "AAPL"},
            "values": [
                {"datetime": "2024-01-04", "open": "3", "high": "3", "low": "3", "close": "3", "volume": "300"},
                {"datetime": "2024-01-03", "open": "2", "high": "2", "low": "2", "close": "2", "volume": "200"},
                {"datetime": "2024-01-02", "open": "1", "high": "1", "low": "1", "close": "1", "volume": "100"}
            ],
            "status": "ok"
        });

        let bars = series_from_value(body).unwrap();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
        assert_eq!(bars[2].volume, 300);
    }

    #[test]
    fn test_rows_without_close_are_dropped() {
        let body = json!({"values": [
            {"datetime": "2024-01-03", "close": null},
            {"datetime": "not a date", "close": "5"},
            {"datetime": "2024-01-02", "close": "4.5"}
        ]});
        let bars = series_from_value(body).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open, 4.5);
        assert_eq!(bars[0].volume, 0);
    }

    #[test]
    fn test_split_batch_skips_error_entries() {
        let body = json!({
            "AAPL": {"values": [{"datetime": "2024-01-02", "close": "185.1"}], "status": "ok"},
            "ZZZZ": {"code": 400, "message": "symbol not found", "status": "error"},
            "MSFT": {"values": [{"datetime": "2024-01-02", "close": "370.2"}], "status": "ok"}
        });
        let requested = vec!["AAPL".to_string(), "ZZZZ".to_string(), "MSFT".to_string()];

        let split = split_batch(body, &requested);
        let mut symbols: Vec<String> = split.series.into_iter().map(|(s, _)| s).collect();
        symbols.sort();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
        assert!(!split.rate_limited);
    }

    #[test]
    fn test_split_batch_flags_rate_limited_entry() {
        let body = json!({
            "AAPL": {"values": [{"datetime": "2024-01-02", "close": "185.1"}], "status": "ok"},
            "MSFT": {"code": 429, "message": "You have run out of API credits", "status": "error"},
            "NVDA": {"code": 403, "message": "available starting with Pro plan", "status": "error"}
        });
        let requested = vec!["AAPL".to_string(), "MSFT".to_string(), "NVDA".to_string()];

        let split = split_batch(body, &requested);
        assert!(split.rate_limited);
        assert_eq!(split.series.len(), 1);
        assert_eq!(split.series[0].0, "AAPL");
    }

    #[test]
    fn test_split_batch_plan_errors_do_not_flag() {
        let body = json!({
            "AAPL": {"code": 401, "message": "invalid api key", "status": "error"},
            "MSFT": {"code": 403, "message": "available starting with Pro plan", "status": "error"}
        });
        let split = split_batch(body, &["AAPL".to_string(), "MSFT".to_string()]);
        assert!(split.series.is_empty());
        assert!(!split.rate_limited);
    }

    #[test]
    fn test_split_batch_single_shape() {
        let body = json!({"meta": {"symbol": "NVDA"}, "values": [{"datetime": "2024-01-02", "close": "480"}]});
        let out = split_batch(body, &["NVDA".to_string()]).series;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "NVDA");
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "42".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(42)));

        assert_eq!(retry_after(&HeaderMap::new()), None);
    }
}
