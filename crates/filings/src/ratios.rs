//! Financial ratio calculation.
//!
//! Ratios are computed from a [`MetricValues`] record. A ratio is present only when
//! every operand is present and its denominator is non-zero; there are no
//! sentinel values. When the provider supplied a finite value for a ratio it is
//! used as-is instead of recomputing it.

use std::collections::BTreeMap;

use filings_core::{MetricValues, PeriodMetrics, RatioCategory, RatioName};
use serde::{Deserialize, Serialize};

/// Where a ratio value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioSource {
    /// Reported by the statement provider.
    Provided,
    /// Computed from normalized metrics.
    Computed,
}

/// One ratio value with its source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatioValue {
    /// The ratio.
    pub value: f64,
    /// Where it came from.
    pub source: RatioSource,
}

/// Ratios of one period. Absent ratios are simply not in the map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculatedRatios {
    /// Ratio values by name.
    pub values: BTreeMap<RatioName, RatioValue>,
}

impl CalculatedRatios {
    /// Returns the value of a ratio.
    #[must_use]
    pub fn get(&self, name: RatioName) -> Option<f64> {
        self.values.get(&name).map(|r| r.value)
    }

    /// Returns the source of a ratio.
    #[must_use]
    pub fn source(&self, name: RatioName) -> Option<RatioSource> {
        self.values.get(&name).map(|r| r.source)
    }

    /// Ratios of one category.
    pub fn by_category(
        &self,
        category: RatioCategory,
    ) -> impl Iterator<Item = (RatioName, &RatioValue)> + '_ {
        self.values
            .iter()
            .filter(move |(name, _)| name.category() == category)
            .map(|(name, value)| (*name, value))
    }

    /// Number of ratios present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no ratio could be calculated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn divide(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if d == 0.0 {
        return None;
    }
    Some(n / d).filter(|r| r.is_finite())
}

/// Computes one ratio from normalized metrics.
#[must_use]
pub fn compute(name: RatioName, m: &MetricValues) -> Option<f64> {
    match name {
        RatioName::ProfitMargin => divide(m.net_income, m.revenue),
        RatioName::GrossMargin => divide(m.gross_profit, m.revenue),
        RatioName::OperatingMargin => divide(m.operating_income, m.revenue),
        RatioName::ReturnOnEquity => divide(m.net_income, m.stockholders_equity),
        RatioName::ReturnOnAssets => divide(m.net_income, m.total_assets),
        RatioName::CurrentRatio => divide(m.current_assets, m.current_liabilities),
        RatioName::QuickRatio => divide(
            m.current_assets.zip(m.inventory).map(|(ca, inv)| ca - inv),
            m.current_liabilities,
        ),
        RatioName::CashRatio => divide(m.cash_and_equivalents, m.current_liabilities),
        RatioName::DebtToEquity => divide(m.total_liabilities, m.stockholders_equity),
        RatioName::DebtToAssets => divide(m.total_liabilities, m.total_assets),
        RatioName::AssetTurnover => divide(m.revenue, m.total_assets),
        RatioName::OperatingCashFlowRatio => {
            divide(m.operating_cash_flow, m.current_liabilities)
        }
        // Capital expenditures are reported as positive outflows by some filers
        // and negative by others.
        RatioName::FreeCashFlowMargin => divide(
            m.operating_cash_flow
                .zip(m.capital_expenditures)
                .map(|(ocf, capex)| ocf - capex.abs()),
            m.revenue,
        ),
    }
}

/// Calculates every ratio, preferring finite provider values.
#[must_use]
pub fn calculate(values: &MetricValues, provided: &BTreeMap<RatioName, f64>) -> CalculatedRatios {
    let values = RatioName::ALL
        .into_iter()
        .filter_map(|name| {
            let ratio = match provided.get(&name).copied().filter(|v| v.is_finite()) {
                Some(value) => RatioValue {
                    value,
                    source: RatioSource::Provided,
                },
                None => RatioValue {
                    value: compute(name, values)?,
                    source: RatioSource::Computed,
                },
            };
            Some((name, ratio))
        })
        .collect();
    CalculatedRatios { values }
}

/// Calculates every ratio of one resolved period.
#[must_use]
pub fn calculate_all(period: &PeriodMetrics) -> CalculatedRatios {
    calculate(&period.values, &period.provided_ratios)
}
