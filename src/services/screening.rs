//! Two-phase screening: batched technical filter over the whole universe,
//! then per-symbol fundamental checks on the survivors, then scoring and
//! ranking.

use crate::analysis::{FundamentalAnalyzer, TechnicalAnalyzer};
use crate::config::{Config, ScoreWeights};
use crate::data_provider::{MarketDataClient, MarketDataSource};
use crate::errors::{Result, ScreenerError};
use crate::models::screening::{
    FundamentalEvaluation, FundamentalSnapshot, QualifiedCandidate, ScreeningOutcome, ScreeningSession, StockDetails,
    TechnicalEvaluation, TechnicalSnapshot,
};
use crate::models::stock::Interval;
use crate::services::universe::SymbolUniverse;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Weighted growth sum plus the scaled SMA200 slope.
pub fn score(technical: &TechnicalSnapshot, fundamental: &FundamentalSnapshot, weights: &ScoreWeights) -> f64 {
    weights.growth_weight * fundamental.growth_sum() + technical.sma200_slope.unwrap_or(0.0) * weights.slope_multiplier
}

/// Highest score first, one entry per symbol (its best score), at most `limit`.
pub fn rank_candidates(mut candidates: Vec<QualifiedCandidate>, limit: usize) -> Vec<QualifiedCandidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.symbol.clone()))
        .take(limit)
        .collect()
}

pub struct ScreeningPipeline {
    config: Config,
    data: Arc<dyn MarketDataSource>,
    universe: SymbolUniverse,
    technical: TechnicalAnalyzer,
    fundamental: FundamentalAnalyzer,
}

impl ScreeningPipeline {
    pub fn new(config: Config, data: Arc<dyn MarketDataSource>, universe: SymbolUniverse) -> Self {
        let technical = TechnicalAnalyzer::new(config.slope_window);
        let fundamental = FundamentalAnalyzer::new(config.acceptance_policy, config.growth_thresholds);
        Self {
            config,
            data,
            universe,
            technical,
            fundamental,
        }
    }

    /// Twelve Data client and the standard universe sources.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let client: Arc<dyn MarketDataSource> = Arc::new(MarketDataClient::new(&config)?);
        let universe = SymbolUniverse::standard(client.clone(), &config)?;
        Ok(Self::new(config, client, universe))
    }

    pub fn with_universe(mut self, universe: SymbolUniverse) -> Self {
        self.universe = universe;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn effective_limit(&self, limit: usize) -> usize {
        if limit == 0 {
            self.config.default_limit
        } else {
            limit.min(self.config.max_limit)
        }
    }

    pub async fn get_top_stocks(&self, limit: usize) -> Result<Vec<QualifiedCandidate>> {
        Ok(self.run(limit).await?.candidates)
    }

    /// Full pipeline run. Fails only on a missing API key; provider trouble
    /// yields a partial outcome with `rate_limited` set where applicable.
    pub async fn run(&self, limit: usize) -> Result<ScreeningOutcome> {
        if self.config.api_key.trim().is_empty() {
            error!("No market data API key configured, cannot screen");
            return Err(ScreenerError::MissingApiKey);
        }

        let started = Instant::now();
        let timestamp = Utc::now();
        let limit = self.effective_limit(limit);

        let universe = self.universe.build_universe(self.config.max_universe_size).await;
        info!("Screening {} symbols", universe.len());

        let series = self
            .data
            .fetch_time_series_batch(&universe, Interval::OneDay, self.config.outputsize, self.config.max_batch_size)
            .await;

        let mut processed_count = 0;
        let mut technically_qualified = Vec::new();
        for symbol in &universe {
            let Some(bars) = series.get(symbol) else {
                continue;
            };
            processed_count += 1;
            let evaluation = self.technical.evaluate(bars);
            if let (true, Some(snapshot)) = (evaluation.passes, evaluation.snapshot) {
                technically_qualified.push((symbol.clone(), snapshot));
            }
        }
        info!(
            "{} of {} symbols passed technical criteria",
            technically_qualified.len(),
            processed_count
        );

        let mut candidates = Vec::new();
        for (i, (symbol, technical)) in technically_qualified.into_iter().enumerate() {
            if self.data.is_rate_limited() {
                warn!("Rate limited, stopping fundamental checks with {} candidates", candidates.len());
                break;
            }
            if i > 0 && !self.config.fundamental_delay.is_zero() {
                tokio::time::sleep(self.config.fundamental_delay).await;
            }

            let Some(data) = self.data.fetch_fundamentals(&symbol).await else {
                debug!("no fundamentals for {}", symbol);
                continue;
            };
            let evaluation = self.fundamental.evaluate(&data);
            let (true, Some(fundamental)) = (evaluation.passes, evaluation.snapshot) else {
                debug!("{} failed fundamental criteria", symbol);
                continue;
            };

            let chart_data = series
                .get(&symbol)
                .map(|bars| self.technical.chart_data(bars, self.config.chart_points));
            let score = score(&technical, &fundamental, &self.config.score_weights);
            let meets_all_criteria = technical.passes() && fundamental.meets_all_fundamental_criteria;

            candidates.push(QualifiedCandidate {
                symbol,
                company_name: fundamental.company_name.clone(),
                score,
                technical,
                fundamental,
                chart_data,
                meets_all_criteria,
            });
        }

        let qualified = candidates.len();
        let candidates = rank_candidates(candidates, limit);
        let execution_time = started.elapsed().as_secs_f64();
        info!(
            "Screening finished in {:.1}s: {} qualified, returning {}",
            execution_time,
            qualified,
            candidates.len()
        );

        Ok(ScreeningOutcome {
            session: ScreeningSession {
                timestamp,
                symbol_count: processed_count,
                qualified_count: qualified,
                execution_time,
            },
            candidates,
            processed_count,
            rate_limited: self.data.is_rate_limited(),
        })
    }

    /// Technical, fundamental and chart bundle for one symbol, outside the
    /// screening gate. Always returns a renderable bundle.
    pub async fn get_stock_details(&self, symbol: &str) -> StockDetails {
        let symbol = symbol.trim().to_uppercase();
        let mut details = StockDetails::empty(&symbol);

        if self.config.api_key.trim().is_empty() {
            error!("No market data API key configured, cannot load details for {}", symbol);
            return details;
        }

        let bars = self
            .data
            .fetch_time_series(&symbol, Interval::OneDay, self.config.outputsize)
            .await;

        let technical = match &bars {
            Some(bars) => {
                details.chart_data = Some(self.technical.chart_data(bars, self.config.chart_points));
                self.technical.evaluate(bars)
            }
            None => TechnicalEvaluation::failed(),
        };

        let fundamental = match self.data.fetch_fundamentals(&symbol).await {
            Some(data) => self.fundamental.evaluate(&data),
            None => FundamentalEvaluation::failed(),
        };

        let strict = fundamental
            .snapshot
            .as_ref()
            .is_some_and(|f| f.meets_all_fundamental_criteria);
        if let Some(snapshot) = &fundamental.snapshot {
            details.company_name = snapshot.company_name.clone();
        }

        details.passes_all_criteria = technical.passes && fundamental.passes;
        details.meets_all_criteria = technical.passes && strict;
        details.technical = technical.snapshot;
        details.fundamental = fundamental.snapshot;
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fundamental::GrowthFigures;
    use crate::models::fundamental::FundamentalData;
    use crate::models::stock::Bar;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeMarket {
        series: HashMap<String, Vec<Bar>>,
        fundamentals: HashMap<String, FundamentalData>,
        rate_limit_after_fundamentals: Option<usize>,
        batch_calls: AtomicUsize,
        fundamental_calls: AtomicUsize,
        limited: AtomicBool,
    }

    #[async_trait]
    impl MarketDataSource for FakeMarket {
        async fn fetch_time_series(&self, symbol: &str, _: Interval, _: usize) -> Option<Vec<Bar>> {
            self.series.get(symbol).cloned()
        }

        async fn fetch_time_series_batch(
            &self,
            symbols: &[String],
            _: Interval,
            _: usize,
            _: usize,
        ) -> HashMap<String, Vec<Bar>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            symbols
                .iter()
                .filter_map(|s| self.series.get(s).map(|bars| (s.clone(), bars.clone())))
                .collect()
        }

        async fn fetch_fundamentals(&self, symbol: &str) -> Option<FundamentalData> {
            let calls = self.fundamental_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.rate_limit_after_fundamentals.is_some_and(|n| calls >= n) {
                self.limited.store(true, Ordering::SeqCst);
            }
            self.fundamentals.get(symbol).cloned()
        }

        async fn fetch_market_movers(&self, _: usize) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn is_rate_limited(&self) -> bool {
            self.limited.load(Ordering::SeqCst)
        }
    }

    fn bars(len: usize, start: f64, step: f64) -> Vec<Bar> {
        let first = NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        (0..len)
            .map(|i| {
                let close = start + step * i as f64;
                Bar {
                    datetime: first + Duration::days(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 10_000,
                }
            })
            .collect()
    }

    fn strict_pass(symbol: &str) -> FundamentalData {
        FundamentalData {
            company_name: Some(format!("{} Inc.", symbol)),
            quarterly_revenue: vec![110.0, 100.0],
            quarterly_eps: vec![1.2, 1.0],
            estimated_sales_growth: Some(8.0),
            estimated_eps_growth: Some(12.0),
            ..FundamentalData::new(symbol)
        }
    }

    fn relaxed_only(symbol: &str) -> FundamentalData {
        FundamentalData {
            quarterly_revenue: vec![103.0, 100.0],
            quarterly_eps: vec![1.04, 1.0],
            ..FundamentalData::new(symbol)
        }
    }

    fn config() -> Config {
        Config::new().with_api_key("test-key").without_pacing()
    }

    fn pipeline(market: Arc<FakeMarket>, symbols: &[&str]) -> ScreeningPipeline {
        let universe = SymbolUniverse::custom(symbols.iter().map(|s| s.to_string()).collect());
        ScreeningPipeline::new(config(), market, universe)
    }

    fn candidate(symbol: &str, score: f64) -> QualifiedCandidate {
        let technical = TechnicalSnapshot::new(120.0, 110.0, 105.0, 100.0, Some(0.1));
        let fundamental = FundamentalAnalyzer::default().snapshot(symbol, &GrowthFigures::default());
        QualifiedCandidate {
            symbol: symbol.to_string(),
            company_name: symbol.to_string(),
            score,
            technical,
            fundamental,
            chart_data: None,
            meets_all_criteria: false,
        }
    }

    #[test]
    fn test_ranking_is_descending_and_truncated() {
        let ranked = rank_candidates(
            vec![candidate("ONE", 3.2), candidate("TWO", 5.0), candidate("SIX", 1.1)],
            2,
        );
        let scores: Vec<f64> = ranked.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![5.0, 3.2]);
    }

    #[test]
    fn test_ranking_keeps_best_score_per_symbol() {
        let ranked = rank_candidates(
            vec![candidate("ONE", 1.0), candidate("TWO", 4.0), candidate("ONE", 9.0)],
            10,
        );
        let ranked: Vec<(&str, f64)> = ranked.iter().map(|c| (c.symbol.as_str(), c.score)).collect();
        assert_eq!(ranked, vec![("ONE", 9.0), ("TWO", 4.0)]);
    }

    #[test]
    fn test_score_formula() {
        let technical = TechnicalSnapshot::new(120.0, 110.0, 105.0, 100.0, Some(0.25));
        let fundamental = FundamentalAnalyzer::default().snapshot(
            "X",
            &GrowthFigures {
                quarterly_revenue: 10.0,
                quarterly_eps: 20.0,
                estimated_sales: 5.0,
                estimated_eps: -5.0,
            },
        );
        let weights = ScoreWeights::default();
        assert!((score(&technical, &fundamental, &weights) - 55.0).abs() < 1e-9);

        let heavier = ScoreWeights {
            growth_weight: 0.5,
            slope_multiplier: 200.0,
        };
        assert!((score(&technical, &fundamental, &heavier) - 65.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_end_to_end_three_symbols() {
        let mut market = FakeMarket::default();
        market.series.insert("ACME".into(), bars(300, 50.0, 0.1));
        market.series.insert("BOLT".into(), bars(300, 50.0, 0.1));
        market.series.insert("CORE".into(), bars(300, 100.0, -0.1));
        market.fundamentals.insert("ACME".into(), strict_pass("ACME"));
        market.fundamentals.insert("BOLT".into(), relaxed_only("BOLT"));
        market.fundamentals.insert("CORE".into(), strict_pass("CORE"));
        let market = Arc::new(market);

        let outcome = pipeline(market.clone(), &["ACME", "BOLT", "CORE"]).run(10).await.unwrap();

        let symbols: Vec<&str> = outcome.candidates.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ACME", "BOLT"]);
        assert!(outcome.candidates[0].meets_all_criteria);
        assert!(!outcome.candidates[1].meets_all_criteria);
        assert_eq!(outcome.candidates[0].company_name, "ACME Inc.");
        assert_eq!(outcome.processed_count, 3);
        assert_eq!(outcome.session.qualified_count, 2);
        assert!(!outcome.rate_limited);

        // CORE failed the technical gate, so only two fundamentals lookups
        assert_eq!(market.fundamental_calls.load(Ordering::SeqCst), 2);

        let chart = outcome.candidates[0].chart_data.as_ref().unwrap();
        assert_eq!(chart.len(), 200);
    }

    #[tokio::test]
    async fn test_no_technical_survivors_skips_fundamentals() {
        let mut market = FakeMarket::default();
        market.series.insert("ACME".into(), bars(300, 100.0, -0.1));
        market.series.insert("BOLT".into(), bars(150, 50.0, 0.1));
        market.fundamentals.insert("ACME".into(), strict_pass("ACME"));
        let market = Arc::new(market);

        let outcome = pipeline(market.clone(), &["ACME", "BOLT", "CORE"]).run(10).await.unwrap();

        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.processed_count, 2);
        assert_eq!(market.fundamental_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_mid_loop_keeps_partial_results() {
        let mut market = FakeMarket {
            rate_limit_after_fundamentals: Some(1),
            ..Default::default()
        };
        for symbol in ["ACME", "BOLT", "CORE"] {
            market.series.insert(symbol.into(), bars(300, 50.0, 0.1));
            market.fundamentals.insert(symbol.into(), strict_pass(symbol));
        }
        let market = Arc::new(market);

        let outcome = pipeline(market.clone(), &["ACME", "BOLT", "CORE"]).run(10).await.unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].symbol, "ACME");
        assert!(outcome.rate_limited);
        assert_eq!(market.fundamental_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_an_error() {
        let market = Arc::new(FakeMarket::default());
        let universe = SymbolUniverse::custom(vec!["ACME".to_string()]);
        let pipeline = ScreeningPipeline::new(Config::new(), market.clone(), universe);

        let err = pipeline.get_top_stocks(10).await.unwrap_err();
        assert!(matches!(err, ScreenerError::MissingApiKey));
        assert_eq!(market.batch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let mut market = FakeMarket::default();
        for (i, symbol) in ["ACME", "BOLT", "CORE"].iter().enumerate() {
            market.series.insert(symbol.to_string(), bars(300, 50.0, 0.1 + i as f64 * 0.05));
            market.fundamentals.insert(symbol.to_string(), strict_pass(symbol));
        }

        let outcome = pipeline(Arc::new(market), &["ACME", "BOLT", "CORE"]).run(2).await.unwrap();

        let symbols: Vec<&str> = outcome.candidates.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["CORE", "BOLT"]);
        // the session counts every qualifier, not just the returned top N
        assert_eq!(outcome.session.qualified_count, 3);
    }

    #[tokio::test]
    async fn test_details_for_unknown_symbol_is_empty_bundle() {
        let details = pipeline(Arc::new(FakeMarket::default()), &[])
            .get_stock_details(" zzzz ")
            .await;

        assert_eq!(details, StockDetails::empty("ZZZZ"));
    }

    #[tokio::test]
    async fn test_details_run_both_analyzers_outside_the_gate() {
        let mut market = FakeMarket::default();
        market.series.insert("BOLT".into(), bars(300, 100.0, -0.1));
        market.fundamentals.insert("BOLT".into(), strict_pass("BOLT"));

        let details = pipeline(Arc::new(market), &[]).get_stock_details("BOLT").await;

        assert_eq!(details.company_name, "BOLT Inc.");
        assert!(details.technical.is_some());
        assert!(details.fundamental.as_ref().unwrap().meets_all_fundamental_criteria);
        assert!(!details.passes_all_criteria);
        assert!(!details.meets_all_criteria);
        assert_eq!(details.chart_data.unwrap().len(), 200);
    }
}
