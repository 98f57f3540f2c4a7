//! Provider contract for live statement data.
//!
//! A [`StatementProvider`] answers two questions for a ticker:
//!
//! - the most recent `n` periods of balance sheet, income statement and cash flow
//!   statement, as concept→value maps ([`StatementSet`]),
//! - the flat dimensional-fact table of one filing ([`DimensionalFacts`]).
//!
//! Any data source that can answer these is a provider; nothing else about its
//! implementation is assumed.

use async_trait::async_trait;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::{
    error::Result,
    metrics::RatioName,
    types::{AccountingStandard, FilingMetadata, StatementKind, Ticker},
};

/// Column holding the concept tag in a dimensional-fact table.
pub const CONCEPT_COLUMN: &str = "concept";
/// Column holding the numeric value in a dimensional-fact table.
pub const VALUE_COLUMN: &str = "numeric_value";
/// Column holding the period end date in a dimensional-fact table.
pub const PERIOD_END_COLUMN: &str = "period_end";
/// Optional column holding the period start date of duration facts.
pub const PERIOD_START_COLUMN: &str = "period_start";

/// Concept→value maps of one reporting period.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatementPeriod {
    /// Period label (e.g. `FY2025`).
    pub label: String,
    /// End date of the period.
    pub period_end: Option<NaiveDate>,
    /// Filing the period was reported in, when the provider knows it.
    pub filing: Option<FilingMetadata>,
    /// Balance sheet concepts.
    pub balance_sheet: BTreeMap<String, f64>,
    /// Income statement concepts.
    pub income_statement: BTreeMap<String, f64>,
    /// Cash flow statement concepts.
    pub cash_flow: BTreeMap<String, f64>,
    /// Ratios the provider computed itself.
    pub ratios: BTreeMap<RatioName, f64>,
}

impl StatementPeriod {
    /// Creates an empty period.
    #[must_use]
    pub fn new(label: impl Into<String>, period_end: Option<NaiveDate>) -> Self {
        Self {
            label: label.into(),
            period_end,
            ..Default::default()
        }
    }

    /// Returns the concept map of one statement.
    #[must_use]
    pub const fn statement(&self, kind: StatementKind) -> &BTreeMap<String, f64> {
        match kind {
            StatementKind::BalanceSheet => &self.balance_sheet,
            StatementKind::IncomeStatement => &self.income_statement,
            StatementKind::CashFlow => &self.cash_flow,
        }
    }

    /// Returns the mutable concept map of one statement.
    pub fn statement_mut(&mut self, kind: StatementKind) -> &mut BTreeMap<String, f64> {
        match kind {
            StatementKind::BalanceSheet => &mut self.balance_sheet,
            StatementKind::IncomeStatement => &mut self.income_statement,
            StatementKind::CashFlow => &mut self.cash_flow,
        }
    }

    /// Sets a concept value on one statement.
    #[must_use]
    pub fn with_value(mut self, kind: StatementKind, concept: impl Into<String>, value: f64) -> Self {
        self.statement_mut(kind).insert(concept.into(), value);
        self
    }

    /// Sets a precomputed ratio.
    #[must_use]
    pub fn with_ratio(mut self, ratio: RatioName, value: f64) -> Self {
        self.ratios.insert(ratio, value);
        self
    }

    /// Sets the filing metadata.
    #[must_use]
    pub fn with_filing(mut self, filing: FilingMetadata) -> Self {
        self.filing = Some(filing);
        self
    }

    /// All concepts of all three statements in one map.
    #[must_use]
    pub fn all_concepts(&self) -> BTreeMap<String, f64> {
        StatementKind::ALL
            .iter()
            .flat_map(|kind| self.statement(*kind))
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Returns true if no statement holds any concept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balance_sheet.is_empty() && self.income_statement.is_empty() && self.cash_flow.is_empty()
    }
}

/// Multi-period statements returned by a provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatementSet {
    /// Taxonomy the concepts are tagged in.
    pub accounting_standard: AccountingStandard,
    /// Reporting currency of monetary values.
    pub currency: Option<String>,
    /// Periods, most recent first.
    pub periods: Vec<StatementPeriod>,
}

impl StatementSet {
    /// Creates an empty statement set.
    #[must_use]
    pub const fn new(accounting_standard: AccountingStandard) -> Self {
        Self {
            accounting_standard,
            currency: None,
            periods: Vec::new(),
        }
    }

    /// Appends a period.
    #[must_use]
    pub fn with_period(mut self, period: StatementPeriod) -> Self {
        self.periods.push(period);
        self
    }

    /// Sets the reporting currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

/// Dimensional-fact table of one filing.
///
/// The table has the columns [`CONCEPT_COLUMN`], [`VALUE_COLUMN`],
/// [`PERIOD_END_COLUMN`], optionally [`PERIOD_START_COLUMN`], and one string column
/// per dimension axis (column names containing `Axis`, e.g.
/// `srt:StatementGeographicalAxis` or `dim_us-gaap_StatementBusinessSegmentsAxis`).
/// A null or empty axis cell means the row is not broken out along that axis.
#[derive(Clone, Debug)]
pub struct DimensionalFacts {
    /// Taxonomy the concepts are tagged in.
    pub accounting_standard: AccountingStandard,
    /// Filing the facts belong to, when known.
    pub filing: Option<FilingMetadata>,
    /// Reporting currency.
    pub currency: Option<String>,
    /// The fact table.
    pub table: DataFrame,
}

impl DimensionalFacts {
    /// Wraps a fact table.
    #[must_use]
    pub const fn new(accounting_standard: AccountingStandard, table: DataFrame) -> Self {
        Self {
            accounting_standard,
            filing: None,
            currency: None,
            table,
        }
    }

    /// Sets the filing metadata.
    #[must_use]
    pub fn with_filing(mut self, filing: FilingMetadata) -> Self {
        self.filing = Some(filing);
        self
    }

    /// Sets the reporting currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

/// Live source of filing statements.
///
/// Implementations should fail fast; callers bound every call with a timeout and
/// fall back to the filing cache on any error.
#[async_trait]
pub trait StatementProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g. "SEC EDGAR").
    fn name(&self) -> &str;

    /// Fetches up to `periods` most recent statement periods for a ticker.
    async fn fetch_statements(&self, ticker: &Ticker, periods: usize) -> Result<StatementSet>;

    /// Fetches the dimensional-fact table of a filing.
    ///
    /// `period_index` selects the filing: `0` is the most recent.
    async fn fetch_dimensional_facts(
        &self,
        ticker: &Ticker,
        period_index: usize,
    ) -> Result<DimensionalFacts>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_period_builders() {
        let period = StatementPeriod::new("FY2025", None)
            .with_value(StatementKind::IncomeStatement, "us-gaap:Revenues", 10.0)
            .with_value(StatementKind::BalanceSheet, "us-gaap:Assets", 20.0)
            .with_ratio(RatioName::CurrentRatio, 1.5);

        assert!(!period.is_empty());
        assert_eq!(period.all_concepts().len(), 2);
        assert_eq!(
            period.statement(StatementKind::BalanceSheet)["us-gaap:Assets"],
            20.0
        );
        assert!(period.statement(StatementKind::CashFlow).is_empty());
        assert_eq!(period.ratios[&RatioName::CurrentRatio], 1.5);
    }

    #[test]
    fn test_statement_set_builders() {
        let set = StatementSet::new(AccountingStandard::Ifrs)
            .with_currency("EUR")
            .with_period(StatementPeriod::new("FY2024", None));
        assert_eq!(set.periods.len(), 1);
        assert_eq!(set.currency.as_deref(), Some("EUR"));
    }
}
