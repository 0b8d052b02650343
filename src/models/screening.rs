use crate::config::AcceptancePolicy;
use crate::models::fundamental::{AnalystRatings, GrowthOutlook, PriceTarget};
use crate::models::stock::ChartData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub current_price: f64,
    pub sma50: f64,
    pub sma100: f64,
    pub sma200: f64,
    pub sma200_slope: Option<f64>,
    pub price_above_sma200: bool,
    pub sma200_slope_positive: bool,
    pub sma50_above_sma200: bool,
    pub sma100_above_sma200: bool,
}

impl TechnicalSnapshot {
    pub fn new(current_price: f64, sma50: f64, sma100: f64, sma200: f64, sma200_slope: Option<f64>) -> Self {
        Self {
            current_price,
            sma50,
            sma100,
            sma200,
            sma200_slope,
            price_above_sma200: current_price > sma200,
            sma200_slope_positive: sma200_slope.is_some_and(|s| s > 0.0),
            sma50_above_sma200: sma50 > sma200,
            sma100_above_sma200: sma100 > sma200,
        }
    }

    /// Strict technical gate: every criterion must hold.
    pub fn passes(&self) -> bool {
        self.price_above_sma200
            && self.sma200_slope_positive
            && self.sma50_above_sma200
            && self.sma100_above_sma200
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub company_name: String,
    pub quarterly_revenue_growth: f64,
    pub quarterly_eps_growth: f64,
    pub estimated_sales_growth: f64,
    pub estimated_eps_growth: f64,
    pub quarterly_sales_growth_positive: bool,
    pub quarterly_eps_growth_positive: bool,
    pub estimated_sales_growth_positive: bool,
    pub estimated_eps_growth_positive: bool,
    pub meets_all_fundamental_criteria: bool,
    pub meets_relaxed_fundamental_criteria: bool,
    pub outlook: Option<GrowthOutlook>,
    pub price_target: Option<PriceTarget>,
    pub ratings: Option<AnalystRatings>,
}

impl FundamentalSnapshot {
    pub fn positive_flags(&self) -> [bool; 4] {
        [
            self.quarterly_sales_growth_positive,
            self.quarterly_eps_growth_positive,
            self.estimated_sales_growth_positive,
            self.estimated_eps_growth_positive,
        ]
    }

    pub fn growth_sum(&self) -> f64 {
        self.quarterly_revenue_growth
            + self.quarterly_eps_growth
            + self.estimated_sales_growth
            + self.estimated_eps_growth
    }

    pub fn meets(&self, policy: AcceptancePolicy) -> bool {
        match policy {
            AcceptancePolicy::Strict => self.meets_all_fundamental_criteria,
            AcceptancePolicy::Relaxed => self.meets_relaxed_fundamental_criteria,
        }
    }
}

/// Outcome of the technical check. `snapshot` is `None` when the check failed closed.
#[derive(Debug, Clone, PartialEq)]
pub struct TechnicalEvaluation {
    pub passes: bool,
    pub snapshot: Option<TechnicalSnapshot>,
}

impl TechnicalEvaluation {
    pub fn failed() -> Self {
        Self {
            passes: false,
            snapshot: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundamentalEvaluation {
    pub passes: bool,
    pub snapshot: Option<FundamentalSnapshot>,
}

impl FundamentalEvaluation {
    pub fn failed() -> Self {
        Self {
            passes: false,
            snapshot: None,
        }
    }
}

/// A symbol that survived both gates and received a composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifiedCandidate {
    pub symbol: String,
    pub company_name: String,
    pub score: f64,
    pub technical: TechnicalSnapshot,
    pub fundamental: FundamentalSnapshot,
    pub chart_data: Option<ChartData>,
    /// Technical gate and the strict fundamental policy.
    pub meets_all_criteria: bool,
}

/// Single-symbol bundle for the details view; always renderable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockDetails {
    pub symbol: String,
    pub company_name: String,
    pub technical: Option<TechnicalSnapshot>,
    pub fundamental: Option<FundamentalSnapshot>,
    pub chart_data: Option<ChartData>,
    pub passes_all_criteria: bool,
    pub meets_all_criteria: bool,
}

impl StockDetails {
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            company_name: symbol.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningSession {
    pub timestamp: DateTime<Utc>,
    pub symbol_count: usize,
    /// Symbols that passed both gates, before truncation to the limit.
    pub qualified_count: usize,
    /// Seconds.
    pub execution_time: f64,
}

/// A candidate as persisted by the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningRecord {
    pub screened_at: DateTime<Utc>,
    pub candidate: QualifiedCandidate,
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone)]
pub struct ScreeningOutcome {
    pub candidates: Vec<QualifiedCandidate>,
    pub processed_count: usize,
    /// Set when the provider's rate limit cut the run short.
    pub rate_limited: bool,
    pub session: ScreeningSession,
}
