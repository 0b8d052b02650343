use serde::{Deserialize, Serialize};

/// Analyst growth outlook, percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthOutlook {
    pub current_quarter: Option<f64>,
    pub next_quarter: Option<f64>,
    pub current_year: Option<f64>,
    pub next_year: Option<f64>,
    pub next_5_years: Option<f64>,
    pub past_5_years: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTarget {
    pub high: Option<f64>,
    pub median: Option<f64>,
    pub low: Option<f64>,
    pub average: Option<f64>,
    pub current: Option<f64>,
}

/// Analyst recommendation counts for the current month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystRatings {
    pub strong_buy: u32,
    pub buy: u32,
    pub hold: u32,
    pub sell: u32,
    pub strong_sell: u32,
    pub rating: Option<f64>,
}

impl AnalystRatings {
    pub fn total(&self) -> u32 {
        self.strong_buy + self.buy + self.hold + self.sell + self.strong_sell
    }
}

/// Everything the fetch layer could assemble for one symbol.
///
/// Quarterly vectors are ordered most recent first. Every field may be
/// absent: the provider withholds data by subscription tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalData {
    pub symbol: String,
    pub company_name: Option<String>,
    pub quarterly_revenue: Vec<f64>,
    pub quarterly_eps: Vec<f64>,
    /// Pre-aggregated quarter-over-quarter growth, percent.
    pub quarterly_revenue_growth: Option<f64>,
    pub quarterly_eps_growth: Option<f64>,
    /// Annual estimates, percent.
    pub estimated_sales_growth: Option<f64>,
    pub estimated_eps_growth: Option<f64>,
    pub outlook: Option<GrowthOutlook>,
    pub price_target: Option<PriceTarget>,
    pub ratings: Option<AnalystRatings>,
}

impl FundamentalData {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    /// A growth estimate or at least one reported quarter.
    pub fn has_minimal_signal(&self) -> bool {
        self.estimated_sales_growth.is_some()
            || self.estimated_eps_growth.is_some()
            || self.quarterly_revenue_growth.is_some()
            || self.quarterly_eps_growth.is_some()
            || !self.quarterly_revenue.is_empty()
            || !self.quarterly_eps.is_empty()
    }

    pub fn display_name(&self) -> String {
        self.company_name.clone().unwrap_or_else(|| self.symbol.clone())
    }
}
