use crate::config::{AcceptancePolicy, GrowthThresholds};
use crate::models::fundamental::FundamentalData;
use crate::models::screening::{FundamentalEvaluation, FundamentalSnapshot};
use log::debug;

/// The four growth percentages the fundamental criteria look at.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GrowthFigures {
    pub quarterly_revenue: f64,
    pub quarterly_eps: f64,
    pub estimated_sales: f64,
    pub estimated_eps: f64,
}

impl GrowthFigures {
    pub fn positive_flags(&self) -> [bool; 4] {
        [
            self.quarterly_revenue > 0.0,
            self.quarterly_eps > 0.0,
            self.estimated_sales > 0.0,
            self.estimated_eps > 0.0,
        ]
    }
}

/// `(current / previous - 1) * 100`. A zero or non-finite input yields 0.
pub fn growth_rate(current: f64, previous: f64) -> f64 {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return 0.0;
    }
    let growth = (current / previous - 1.0) * 100.0;
    if growth.is_finite() {
        growth
    } else {
        0.0
    }
}

pub fn meets_strict_criteria(flags: [bool; 4]) -> bool {
    flags.iter().all(|f| *f)
}

/// Relaxed admission: enough positive metrics, or one exceptional metric, or
/// one moderate metric backed by at least one positive flag.
pub fn meets_relaxed_criteria(flags: [bool; 4], growth: &GrowthFigures, thresholds: &GrowthThresholds) -> bool {
    let positive = flags.iter().filter(|f| **f).count();

    let exceptional = growth.quarterly_revenue > thresholds.exceptional_quarterly
        || growth.quarterly_eps > thresholds.exceptional_quarterly
        || growth.estimated_sales > thresholds.exceptional_estimated
        || growth.estimated_eps > thresholds.exceptional_estimated;

    let moderate = growth.quarterly_revenue > thresholds.moderate_quarterly
        || growth.quarterly_eps > thresholds.moderate_quarterly
        || growth.estimated_sales > thresholds.moderate_estimated
        || growth.estimated_eps > thresholds.moderate_estimated;

    positive >= thresholds.min_positive || exceptional || (moderate && positive >= 1)
}

/// Growth between the two most recent quarters, or the pre-aggregated figure
/// when fewer than two quarters are known.
fn quarter_over_quarter(values: &[f64], pre_aggregated: Option<f64>) -> Option<f64> {
    match values {
        [current, previous, ..] => Some(growth_rate(*current, *previous)),
        _ => pre_aggregated,
    }
}

pub struct FundamentalAnalyzer {
    policy: AcceptancePolicy,
    thresholds: GrowthThresholds,
}

impl FundamentalAnalyzer {
    pub fn new(policy: AcceptancePolicy, thresholds: GrowthThresholds) -> Self {
        Self { policy, thresholds }
    }

    pub fn policy(&self) -> AcceptancePolicy {
        self.policy
    }

    /// `passes` follows the configured policy; both flags are always on the snapshot.
    pub fn evaluate(&self, data: &FundamentalData) -> FundamentalEvaluation {
        let revenue = quarter_over_quarter(&data.quarterly_revenue, data.quarterly_revenue_growth);
        let eps = quarter_over_quarter(&data.quarterly_eps, data.quarterly_eps_growth);

        if revenue.is_none() && eps.is_none() {
            debug!("insufficient quarterly data for {}", data.symbol);
            return FundamentalEvaluation::failed();
        }

        let growth = GrowthFigures {
            quarterly_revenue: revenue.unwrap_or(0.0),
            quarterly_eps: eps.unwrap_or(0.0),
            estimated_sales: data.estimated_sales_growth.unwrap_or(0.0),
            estimated_eps: data.estimated_eps_growth.unwrap_or(0.0),
        };

        let mut snapshot = self.snapshot(&data.display_name(), &growth);
        snapshot.outlook = data.outlook.clone();
        snapshot.price_target = data.price_target.clone();
        snapshot.ratings = data.ratings.clone();

        FundamentalEvaluation {
            passes: snapshot.meets(self.policy),
            snapshot: Some(snapshot),
        }
    }

    pub fn snapshot(&self, company_name: &str, growth: &GrowthFigures) -> FundamentalSnapshot {
        let flags = growth.positive_flags();
        FundamentalSnapshot {
            company_name: company_name.to_string(),
            quarterly_revenue_growth: growth.quarterly_revenue,
            quarterly_eps_growth: growth.quarterly_eps,
            estimated_sales_growth: growth.estimated_sales,
            estimated_eps_growth: growth.estimated_eps,
            quarterly_sales_growth_positive: flags[0],
            quarterly_eps_growth_positive: flags[1],
            estimated_sales_growth_positive: flags[2],
            estimated_eps_growth_positive: flags[3],
            meets_all_fundamental_criteria: meets_strict_criteria(flags),
            meets_relaxed_fundamental_criteria: meets_relaxed_criteria(flags, growth, &self.thresholds),
            outlook: None,
            price_target: None,
            ratings: None,
        }
    }
}

impl Default for FundamentalAnalyzer {
    fn default() -> Self {
        Self::new(AcceptancePolicy::Relaxed, GrowthThresholds::default())
    }
}
