//! Normalized metrics records.
//!
//! [`MetricValues`] holds one optional value per [`CanonicalMetric`]; absent means
//! no source reported a usable value, never zero. [`FinancialMetrics`] wraps the
//! values of each resolved period together with their provenance.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::concepts::CanonicalMetric;
use crate::error::FilingsError;
use crate::types::{AccountingStandard, FilingMetadata, Provenance, RatioCategory, Ticker};

/// A named financial ratio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioName {
    /// Net income / revenue.
    ProfitMargin,
    /// Gross profit / revenue.
    GrossMargin,
    /// Operating income / revenue.
    OperatingMargin,
    /// Net income / equity.
    ReturnOnEquity,
    /// Net income / total assets.
    ReturnOnAssets,
    /// Current assets / current liabilities.
    CurrentRatio,
    /// (Current assets - inventory) / current liabilities.
    QuickRatio,
    /// Cash / current liabilities.
    CashRatio,
    /// Total liabilities / equity.
    DebtToEquity,
    /// Total liabilities / total assets.
    DebtToAssets,
    /// Revenue / total assets.
    AssetTurnover,
    /// Operating cash flow / current liabilities.
    OperatingCashFlowRatio,
    /// (Operating cash flow - capital expenditures) / revenue.
    FreeCashFlowMargin,
}

impl RatioName {
    /// Every ratio, grouped by category.
    pub const ALL: [Self; 13] = [
        Self::ProfitMargin,
        Self::GrossMargin,
        Self::OperatingMargin,
        Self::ReturnOnEquity,
        Self::ReturnOnAssets,
        Self::CurrentRatio,
        Self::QuickRatio,
        Self::CashRatio,
        Self::DebtToEquity,
        Self::DebtToAssets,
        Self::AssetTurnover,
        Self::OperatingCashFlowRatio,
        Self::FreeCashFlowMargin,
    ];

    /// Returns the stored name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProfitMargin => "profit_margin",
            Self::GrossMargin => "gross_margin",
            Self::OperatingMargin => "operating_margin",
            Self::ReturnOnEquity => "roe",
            Self::ReturnOnAssets => "roa",
            Self::CurrentRatio => "current_ratio",
            Self::QuickRatio => "quick_ratio",
            Self::CashRatio => "cash_ratio",
            Self::DebtToEquity => "debt_to_equity",
            Self::DebtToAssets => "debt_to_assets",
            Self::AssetTurnover => "asset_turnover",
            Self::OperatingCashFlowRatio => "operating_cash_flow_ratio",
            Self::FreeCashFlowMargin => "free_cash_flow_margin",
        }
    }

    /// Returns the category the ratio is reported under.
    #[must_use]
    pub const fn category(&self) -> RatioCategory {
        match self {
            Self::ProfitMargin
            | Self::GrossMargin
            | Self::OperatingMargin
            | Self::ReturnOnEquity
            | Self::ReturnOnAssets => RatioCategory::Profitability,
            Self::CurrentRatio | Self::QuickRatio | Self::CashRatio => RatioCategory::Liquidity,
            Self::DebtToEquity | Self::DebtToAssets => RatioCategory::Leverage,
            Self::AssetTurnover => RatioCategory::Efficiency,
            Self::OperatingCashFlowRatio | Self::FreeCashFlowMargin => RatioCategory::CashFlow,
        }
    }
}

impl fmt::Display for RatioName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RatioName {
    type Err = FilingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| FilingsError::Parse(format!("Invalid ratio name: {s}")))
    }
}

/// One optional value per canonical metric.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValues {
    /// Total revenue.
    pub revenue: Option<f64>,
    /// Cost of revenue.
    pub cost_of_revenue: Option<f64>,
    /// Gross profit.
    pub gross_profit: Option<f64>,
    /// Operating income.
    pub operating_income: Option<f64>,
    /// Net income.
    pub net_income: Option<f64>,
    /// Total assets.
    pub total_assets: Option<f64>,
    /// Current assets.
    pub current_assets: Option<f64>,
    /// Cash and cash equivalents.
    pub cash_and_equivalents: Option<f64>,
    /// Inventory.
    pub inventory: Option<f64>,
    /// Accounts receivable.
    pub accounts_receivable: Option<f64>,
    /// Total liabilities.
    pub total_liabilities: Option<f64>,
    /// Current liabilities.
    pub current_liabilities: Option<f64>,
    /// Long-term debt.
    pub long_term_debt: Option<f64>,
    /// Stockholders' equity.
    pub stockholders_equity: Option<f64>,
    /// Operating cash flow.
    pub operating_cash_flow: Option<f64>,
    /// Capital expenditures.
    pub capital_expenditures: Option<f64>,
    /// Basic earnings per share.
    pub eps_basic: Option<f64>,
    /// Diluted earnings per share.
    pub eps_diluted: Option<f64>,
}

impl MetricValues {
    /// Returns the value of a metric.
    #[must_use]
    pub const fn get(&self, metric: CanonicalMetric) -> Option<f64> {
        match metric {
            CanonicalMetric::Revenue => self.revenue,
            CanonicalMetric::CostOfRevenue => self.cost_of_revenue,
            CanonicalMetric::GrossProfit => self.gross_profit,
            CanonicalMetric::OperatingIncome => self.operating_income,
            CanonicalMetric::NetIncome => self.net_income,
            CanonicalMetric::TotalAssets => self.total_assets,
            CanonicalMetric::CurrentAssets => self.current_assets,
            CanonicalMetric::CashAndEquivalents => self.cash_and_equivalents,
            CanonicalMetric::Inventory => self.inventory,
            CanonicalMetric::AccountsReceivable => self.accounts_receivable,
            CanonicalMetric::TotalLiabilities => self.total_liabilities,
            CanonicalMetric::CurrentLiabilities => self.current_liabilities,
            CanonicalMetric::LongTermDebt => self.long_term_debt,
            CanonicalMetric::StockholdersEquity => self.stockholders_equity,
            CanonicalMetric::OperatingCashFlow => self.operating_cash_flow,
            CanonicalMetric::CapitalExpenditures => self.capital_expenditures,
            CanonicalMetric::EpsBasic => self.eps_basic,
            CanonicalMetric::EpsDiluted => self.eps_diluted,
        }
    }

    fn slot(&mut self, metric: CanonicalMetric) -> &mut Option<f64> {
        match metric {
            CanonicalMetric::Revenue => &mut self.revenue,
            CanonicalMetric::CostOfRevenue => &mut self.cost_of_revenue,
            CanonicalMetric::GrossProfit => &mut self.gross_profit,
            CanonicalMetric::OperatingIncome => &mut self.operating_income,
            CanonicalMetric::NetIncome => &mut self.net_income,
            CanonicalMetric::TotalAssets => &mut self.total_assets,
            CanonicalMetric::CurrentAssets => &mut self.current_assets,
            CanonicalMetric::CashAndEquivalents => &mut self.cash_and_equivalents,
            CanonicalMetric::Inventory => &mut self.inventory,
            CanonicalMetric::AccountsReceivable => &mut self.accounts_receivable,
            CanonicalMetric::TotalLiabilities => &mut self.total_liabilities,
            CanonicalMetric::CurrentLiabilities => &mut self.current_liabilities,
            CanonicalMetric::LongTermDebt => &mut self.long_term_debt,
            CanonicalMetric::StockholdersEquity => &mut self.stockholders_equity,
            CanonicalMetric::OperatingCashFlow => &mut self.operating_cash_flow,
            CanonicalMetric::CapitalExpenditures => &mut self.capital_expenditures,
            CanonicalMetric::EpsBasic => &mut self.eps_basic,
            CanonicalMetric::EpsDiluted => &mut self.eps_diluted,
        }
    }

    /// Sets the value of a metric. Non-finite values clear the field.
    pub fn set(&mut self, metric: CanonicalMetric, value: f64) {
        *self.slot(metric) = value.is_finite().then_some(value);
    }

    /// Metrics that currently hold a value.
    pub fn present(&self) -> impl Iterator<Item = CanonicalMetric> + '_ {
        CanonicalMetric::ALL
            .into_iter()
            .filter(|m| self.get(*m).is_some())
    }

    /// Metrics of `required` that are absent.
    #[must_use]
    pub fn missing(&self, required: &[CanonicalMetric]) -> Vec<CanonicalMetric> {
        required
            .iter()
            .copied()
            .filter(|m| self.get(*m).is_none())
            .collect()
    }

    /// Returns true if no metric holds a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }
}

/// Resolved metrics of one reporting period.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    /// Period label as reported by the source (e.g. `FY2025`).
    pub label: String,
    /// End date of the reporting period.
    pub period_end: Option<NaiveDate>,
    /// Filing the period was reported in, when known.
    pub filing: Option<FilingMetadata>,
    /// Normalized values.
    pub values: MetricValues,
    /// Source of each present value.
    pub sources: BTreeMap<CanonicalMetric, Provenance>,
    /// Tag each present value was read from.
    pub concepts: BTreeMap<CanonicalMetric, String>,
    /// Ratios the provider supplied precomputed.
    pub provided_ratios: BTreeMap<RatioName, f64>,
    /// Concepts no canonical metric claims (bounded).
    pub unrecognized: BTreeMap<String, f64>,
}

impl PeriodMetrics {
    /// Creates an empty period.
    #[must_use]
    pub fn new(label: impl Into<String>, period_end: Option<NaiveDate>) -> Self {
        Self {
            label: label.into(),
            period_end,
            ..Default::default()
        }
    }

    /// Records a value together with its source and tag.
    ///
    /// Non-finite values are ignored.
    pub fn record(
        &mut self,
        metric: CanonicalMetric,
        value: f64,
        source: Provenance,
        tag: impl Into<String>,
    ) {
        if !value.is_finite() {
            return;
        }
        self.values.set(metric, value);
        self.sources.insert(metric, source);
        self.concepts.insert(metric, tag.into());
    }

    /// Record-level provenance of this period.
    #[must_use]
    pub fn provenance(&self) -> Option<Provenance> {
        Provenance::combine(self.sources.values().copied())
    }
}

/// Provenance-tagged metrics for one ticker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    /// Ticker the metrics belong to.
    pub ticker: Ticker,
    /// Taxonomy the values were resolved under.
    pub accounting_standard: Option<AccountingStandard>,
    /// Record-level provenance across all periods.
    pub provenance: Provenance,
    /// Resolved periods, most recent first.
    pub periods: Vec<PeriodMetrics>,
    /// Core metrics still absent from the latest period.
    pub missing_core: Vec<CanonicalMetric>,
    /// Non-fatal problems encountered while resolving.
    pub warnings: Vec<FilingsError>,
}

impl FinancialMetrics {
    /// Returns the most recent period.
    #[must_use]
    pub fn latest(&self) -> Option<&PeriodMetrics> {
        self.periods.first()
    }

    /// Returns the latest value of a metric.
    #[must_use]
    pub fn value(&self, metric: CanonicalMetric) -> Option<f64> {
        self.latest().and_then(|p| p.values.get(metric))
    }

    /// Returns true if every core metric of the latest period is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_core.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_values_get_set() {
        let mut values = MetricValues::default();
        assert!(values.is_empty());

        values.set(CanonicalMetric::Revenue, 100.0);
        values.set(CanonicalMetric::NetIncome, f64::INFINITY);
        assert_eq!(values.get(CanonicalMetric::Revenue), Some(100.0));
        assert_eq!(values.revenue, Some(100.0));
        assert_eq!(values.get(CanonicalMetric::NetIncome), None);
        assert_eq!(
            values.missing(&CanonicalMetric::CORE),
            vec![
                CanonicalMetric::NetIncome,
                CanonicalMetric::TotalAssets,
                CanonicalMetric::TotalLiabilities,
                CanonicalMetric::StockholdersEquity,
            ]
        );
        assert_eq!(values.present().count(), 1);
    }

    #[test]
    fn test_period_provenance() {
        let mut period = PeriodMetrics::new("FY2025", None);
        assert_eq!(period.provenance(), None);

        period.record(
            CanonicalMetric::Revenue,
            10.0,
            Provenance::Primary,
            "us-gaap:Revenues",
        );
        assert_eq!(period.provenance(), Some(Provenance::Primary));

        period.record(CanonicalMetric::Inventory, f64::NAN, Provenance::Cache, "x");
        assert_eq!(period.provenance(), Some(Provenance::Primary));

        period.record(
            CanonicalMetric::TotalAssets,
            50.0,
            Provenance::Cache,
            "us-gaap:Assets",
        );
        assert_eq!(period.provenance(), Some(Provenance::Merged));
        assert_eq!(period.concepts[&CanonicalMetric::TotalAssets], "us-gaap:Assets");
    }

    #[test]
    fn test_ratio_names() {
        assert_eq!(RatioName::ReturnOnEquity.as_str(), "roe");
        assert_eq!(
            RatioName::QuickRatio.category(),
            RatioCategory::Liquidity
        );
        assert_eq!(
            "debt_to_assets".parse::<RatioName>().unwrap(),
            RatioName::DebtToAssets
        );
        assert!("pe_ratio".parse::<RatioName>().is_err());
    }
}
