use crate::errors::{Result, ScreenerError};
use log::warn;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";

/// Which fundamental acceptance rule gates a candidate into the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptancePolicy {
    /// All four growth metrics positive.
    Strict,
    /// Partial or exceptional growth is enough.
    Relaxed,
}

/// Composite score weights. The slope is scaled up so trend strength is
/// commensurate with the percentage growth terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub growth_weight: f64,
    pub slope_multiplier: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            growth_weight: 1.0,
            slope_multiplier: 100.0,
        }
    }
}

/// Percent thresholds for the relaxed fundamental policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthThresholds {
    pub exceptional_quarterly: f64,
    pub exceptional_estimated: f64,
    pub moderate_quarterly: f64,
    pub moderate_estimated: f64,
    /// How many of the four positivity checks admit a stock on their own.
    pub min_positive: usize,
}

impl Default for GrowthThresholds {
    fn default() -> Self {
        Self {
            exceptional_quarterly: 20.0,
            exceptional_estimated: 15.0,
            moderate_quarterly: 10.0,
            moderate_estimated: 5.0,
            min_positive: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub cache_timeout: Duration,
    pub rate_limit_cooldown: Duration,
    pub max_batch_size: usize,
    pub batch_pause_every: usize,
    pub batch_pause: Duration,
    pub fundamental_delay: Duration,
    pub max_universe_size: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    pub outputsize: usize,
    pub chart_points: usize,
    pub slope_window: usize,
    pub score_weights: ScoreWeights,
    pub acceptance_policy: AcceptancePolicy,
    pub growth_thresholds: GrowthThresholds,
    pub data_dir: String,
    pub result_cache_hours: i64,
    pub include_analyst_data: bool,
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            cache_timeout: Duration::from_secs(3600),
            rate_limit_cooldown: Duration::from_secs(60),
            max_batch_size: 8,
            batch_pause_every: 3,
            batch_pause: Duration::from_secs(1),
            fundamental_delay: Duration::from_millis(200),
            max_universe_size: 100,
            default_limit: 10,
            max_limit: 50,
            outputsize: 365,
            chart_points: 200,
            slope_window: 14,
            score_weights: ScoreWeights::default(),
            acceptance_policy: AcceptancePolicy::Relaxed,
            growth_thresholds: GrowthThresholds::default(),
            data_dir: "data".to_string(),
            result_cache_hours: 12,
            include_analyst_data: true,
        }
    }

    /// Defaults overlaid with whatever the environment provides.
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Ok(key) = std::env::var("TWELVEDATA_API_KEY") {
            config.api_key = key.trim().to_string();
        }
        if let Ok(url) = std::env::var("TWELVEDATA_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(dir) = std::env::var("SCREENER_DATA_DIR") {
            config.data_dir = dir;
        }
        if let Some(secs) = env_number::<u64>("SCREENER_CACHE_SECONDS") {
            config.cache_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = env_number::<usize>("SCREENER_BATCH_SIZE") {
            config.max_batch_size = size.max(1);
        }
        if let Some(max) = env_number::<usize>("SCREENER_MAX_SYMBOLS") {
            config.max_universe_size = max;
        }
        if let Some(hours) = env_number::<i64>("SCREENER_RESULT_CACHE_HOURS") {
            config.result_cache_hours = hours;
        }

        config
    }

    /// Fails when nothing can be fetched at all.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ScreenerError::MissingApiKey);
        }
        if self.max_batch_size == 0 {
            return Err(ScreenerError::ConfigError("max_batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = key.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    pub fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_batch_pause(mut self, every: usize, pause: Duration) -> Self {
        self.batch_pause_every = every;
        self.batch_pause = pause;
        self
    }

    pub fn with_fundamental_delay(mut self, delay: Duration) -> Self {
        self.fundamental_delay = delay;
        self
    }

    pub fn with_max_universe_size(mut self, max: usize) -> Self {
        self.max_universe_size = max;
        self
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_outputsize(mut self, outputsize: usize) -> Self {
        self.outputsize = outputsize;
        self
    }

    pub fn with_chart_points(mut self, points: usize) -> Self {
        self.chart_points = points;
        self
    }

    pub fn with_score_weights(mut self, weights: ScoreWeights) -> Self {
        self.score_weights = weights;
        self
    }

    pub fn with_acceptance_policy(mut self, policy: AcceptancePolicy) -> Self {
        self.acceptance_policy = policy;
        self
    }

    pub fn with_growth_thresholds(mut self, thresholds: GrowthThresholds) -> Self {
        self.growth_thresholds = thresholds;
        self
    }

    pub fn with_data_dir(mut self, dir: &str) -> Self {
        self.data_dir = dir.to_string();
        self
    }

    pub fn with_result_cache_hours(mut self, hours: i64) -> Self {
        self.result_cache_hours = hours;
        self
    }

    pub fn with_analyst_data(mut self, include: bool) -> Self {
        self.include_analyst_data = include;
        self
    }

    /// Settings for tests and offline runs: no pacing sleeps.
    pub fn without_pacing(mut self) -> Self {
        self.batch_pause = Duration::ZERO;
        self.fundamental_delay = Duration::ZERO;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.max_batch_size, 8);
        assert_eq!(config.cache_timeout, Duration::from_secs(3600));
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.acceptance_policy, AcceptancePolicy::Relaxed);
        assert_eq!(config.score_weights.slope_multiplier, 100.0);
    }

    #[test]
    fn test_validate_requires_api_key() {
        assert!(matches!(Config::new().validate(), Err(ScreenerError::MissingApiKey)));
        assert!(Config::new().with_api_key("demo").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = Config::new().with_api_key("demo").with_max_batch_size(0);
        assert!(matches!(config.validate(), Err(ScreenerError::ConfigError(_))));
    }
}
