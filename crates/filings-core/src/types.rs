//! Core data types for filings and their cached contents.
//!
//! This module defines the persisted data model:
//!
//! - [`Ticker`] - Trading symbol of a filer
//! - [`AccountingStandard`] - US-GAAP or IFRS
//! - [`FilingMetadata`] / [`Filing`] - One SEC filing, before and after caching
//! - [`StatementKind`] / [`LineItem`] - Per-statement XBRL line items
//! - [`RatioCategory`] / [`StoredRatio`] - Persisted financial ratios
//! - [`SegmentType`] / [`SegmentFact`] - Persisted segment breakdowns
//! - [`Provenance`] - Which source a value came from

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FilingsError;
use crate::form::FormType;

/// A trading symbol/ticker.
///
/// Tickers are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    /// Creates a new ticker from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the ticker as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Accounting taxonomy a filing reports under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountingStandard {
    /// US Generally Accepted Accounting Principles.
    #[default]
    #[serde(rename = "US-GAAP")]
    UsGaap,
    /// International Financial Reporting Standards.
    #[serde(rename = "IFRS")]
    Ifrs,
}

impl AccountingStandard {
    /// Returns the stored representation (`US-GAAP` or `IFRS`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UsGaap => "US-GAAP",
            Self::Ifrs => "IFRS",
        }
    }

    /// Returns the XBRL namespace prefix of this taxonomy.
    #[must_use]
    pub const fn namespace(&self) -> &'static str {
        match self {
            Self::UsGaap => "us-gaap",
            Self::Ifrs => "ifrs-full",
        }
    }
}

impl fmt::Display for AccountingStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountingStandard {
    type Err = FilingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "US-GAAP" | "US_GAAP" | "USGAAP" => Ok(Self::UsGaap),
            "IFRS" | "IFRS-FULL" => Ok(Self::Ifrs),
            other => Err(FilingsError::Parse(format!(
                "Unknown accounting standard: {other}"
            ))),
        }
    }
}

/// Row id of a cached filing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilingId(pub i64);

impl fmt::Display for FilingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata describing one SEC filing.
///
/// A filing is identified by `(ticker, form_type, filing_date)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilingMetadata {
    /// Filer ticker.
    pub ticker: Ticker,
    /// SEC CIK number, zero-padded to 10 digits.
    pub cik: Option<String>,
    /// Company name.
    pub company_name: Option<String>,
    /// Form type (10-K, 10-Q, 20-F, ...).
    pub form_type: FormType,
    /// Date the filing was accepted by the SEC.
    pub filing_date: NaiveDate,
    /// Fiscal year covered.
    pub fiscal_year: Option<i32>,
    /// Fiscal period covered (FY, Q1, ...).
    pub fiscal_period: Option<String>,
    /// End date of the reporting period.
    pub period_end: Option<NaiveDate>,
    /// SEC accession number.
    pub accession_number: Option<String>,
    /// Whether the filer is a foreign private issuer.
    pub is_foreign: bool,
    /// Accounting standard of every line item in the filing.
    pub accounting_standard: AccountingStandard,
    /// Share of core metrics present, in `[0, 1]`.
    pub data_quality_score: Option<f64>,
}

impl FilingMetadata {
    /// Creates filing metadata with required fields.
    ///
    /// `is_foreign` is derived from the form type and can be overridden.
    #[must_use]
    pub fn new(ticker: Ticker, form_type: FormType, filing_date: NaiveDate) -> Self {
        let is_foreign = form_type.is_foreign();
        Self {
            ticker,
            cik: None,
            company_name: None,
            form_type,
            filing_date,
            fiscal_year: None,
            fiscal_period: None,
            period_end: None,
            accession_number: None,
            is_foreign,
            accounting_standard: AccountingStandard::UsGaap,
            data_quality_score: None,
        }
    }

    /// Sets the accounting standard.
    #[must_use]
    pub const fn with_standard(mut self, standard: AccountingStandard) -> Self {
        self.accounting_standard = standard;
        self
    }

    /// Sets the fiscal year and period.
    #[must_use]
    pub fn with_fiscal_period(mut self, year: i32, period: impl Into<String>) -> Self {
        self.fiscal_year = Some(year);
        self.fiscal_period = Some(period.into());
        self
    }

    /// Sets the reporting period end date.
    #[must_use]
    pub const fn with_period_end(mut self, period_end: NaiveDate) -> Self {
        self.period_end = Some(period_end);
        self
    }

    /// Sets the SEC CIK number.
    #[must_use]
    pub fn with_cik(mut self, cik: impl Into<String>) -> Self {
        self.cik = Some(cik.into());
        self
    }

    /// Sets the company name.
    #[must_use]
    pub fn with_company_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }

    /// Sets the accession number.
    #[must_use]
    pub fn with_accession_number(mut self, accession: impl Into<String>) -> Self {
        self.accession_number = Some(accession.into());
        self
    }

    /// Short label for the covered period, e.g. `FY2025` or `Q2 2024`.
    #[must_use]
    pub fn period_label(&self) -> String {
        match (&self.fiscal_period, self.fiscal_year) {
            (Some(fp), Some(fy)) if fp == "FY" => format!("FY{fy}"),
            (Some(fp), Some(fy)) => format!("{fp} {fy}"),
            (None, Some(fy)) => format!("FY{fy}"),
            _ => self
                .period_end
                .unwrap_or(self.filing_date)
                .format("%Y-%m-%d")
                .to_string(),
        }
    }
}

/// A filing as stored in the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filing {
    /// Row id.
    pub id: FilingId,
    /// Filing metadata.
    pub metadata: FilingMetadata,
    /// When the filing was first cached or last re-fetched.
    pub cached_at: DateTime<Utc>,
    /// When the filing was last read.
    pub last_accessed: DateTime<Utc>,
}

/// Financial statement a line item belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Balance sheet (instant facts).
    BalanceSheet,
    /// Income statement (duration facts).
    IncomeStatement,
    /// Cash flow statement (duration facts).
    CashFlow,
}

impl StatementKind {
    /// All statement kinds, in presentation order.
    pub const ALL: [Self; 3] = [Self::BalanceSheet, Self::IncomeStatement, Self::CashFlow];

    /// Returns the stored representation, which is also the cache table name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BalanceSheet => "balance_sheet",
            Self::IncomeStatement => "income_statement",
            Self::CashFlow => "cash_flow",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single XBRL line item of a financial statement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// XBRL concept tag, e.g. `us-gaap:Revenues`.
    pub concept: String,
    /// Human-readable label.
    pub label: Option<String>,
    /// Reported value; absent for abstract section headers.
    pub value: Option<f64>,
    /// Reporting currency.
    pub currency: Option<String>,
    /// Unit of measure (USD, shares, USD/shares, ...).
    pub unit: Option<String>,
    /// Reported decimal precision (e.g. `-6` for millions).
    pub decimals: Option<i32>,
    /// XBRL context reference.
    pub context_ref: Option<String>,
    /// Whether this row is a section header without a value.
    pub is_abstract: bool,
    /// Depth in the presentation hierarchy.
    pub level: i32,
    /// Concept of the parent row in the hierarchy.
    pub parent_concept: Option<String>,
}

impl LineItem {
    /// Creates a valued line item.
    #[must_use]
    pub fn new(concept: impl Into<String>, value: f64) -> Self {
        Self {
            concept: concept.into(),
            value: Some(value),
            ..Default::default()
        }
    }

    /// Creates an abstract section header.
    #[must_use]
    pub fn header(concept: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            label: Some(label.into()),
            is_abstract: true,
            ..Default::default()
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets currency and unit.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        let currency = currency.into();
        self.unit = Some(currency.clone());
        self.currency = Some(currency);
        self
    }

    /// Places the item in the presentation hierarchy.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>, level: i32) -> Self {
        self.parent_concept = Some(parent.into());
        self.level = level;
        self
    }
}

/// Line items of one statement together with the filing they belong to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedStatement {
    /// Owning filing.
    pub filing: Filing,
    /// Statement the items belong to.
    pub kind: StatementKind,
    /// Items in their original order.
    pub items: Vec<LineItem>,
}

/// Category of a financial ratio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioCategory {
    /// Margins and returns.
    Profitability,
    /// Short-term solvency.
    Liquidity,
    /// Capital structure.
    Leverage,
    /// Asset utilisation.
    Efficiency,
    /// Cash generation.
    CashFlow,
}

impl RatioCategory {
    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Profitability => "profitability",
            Self::Liquidity => "liquidity",
            Self::Leverage => "leverage",
            Self::Efficiency => "efficiency",
            Self::CashFlow => "cash_flow",
        }
    }
}

impl fmt::Display for RatioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RatioCategory {
    type Err = FilingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profitability" => Ok(Self::Profitability),
            "liquidity" => Ok(Self::Liquidity),
            "leverage" => Ok(Self::Leverage),
            "efficiency" => Ok(Self::Efficiency),
            "cash_flow" => Ok(Self::CashFlow),
            other => Err(FilingsError::Parse(format!("Invalid ratio category: {other}"))),
        }
    }
}

/// A ratio as stored in the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRatio {
    /// Owning filing.
    pub filing_id: FilingId,
    /// Ratio category.
    pub category: RatioCategory,
    /// Ratio name, e.g. `current_ratio`.
    pub name: String,
    /// Ratio value.
    pub value: f64,
    /// When the ratio was computed.
    pub computed_at: DateTime<Utc>,
}

/// Kind of segment breakdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    /// Operating/business segments.
    Business,
    /// Geographic areas.
    Geographic,
    /// Products or services.
    Product,
}

impl SegmentType {
    /// All segment types.
    pub const ALL: [Self; 3] = [Self::Business, Self::Geographic, Self::Product];

    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Geographic => "geographic",
            Self::Product => "product",
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentType {
    type Err = FilingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "business" => Ok(Self::Business),
            "geographic" => Ok(Self::Geographic),
            "product" => Ok(Self::Product),
            other => Err(FilingsError::Parse(format!("Invalid segment type: {other}"))),
        }
    }
}

/// One value of a segment breakdown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentFact {
    /// Kind of breakdown.
    pub segment_type: SegmentType,
    /// Cleaned member name, e.g. `IntelligentCloud`.
    pub segment_name: String,
    /// Metric the value measures, usually `revenue`.
    pub metric_name: String,
    /// Reported value.
    pub metric_value: f64,
    /// Reporting currency.
    pub currency: Option<String>,
    /// Share of the consolidated total in percent.
    pub percentage_of_total: Option<f64>,
}

/// Source a value was resolved from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Live statement provider only.
    Primary,
    /// Filing cache only.
    Cache,
    /// Provider values completed from the cache.
    Merged,
}

impl Provenance {
    /// Combines per-value sources into a record-level tag.
    ///
    /// Returns `None` when there are no values at all.
    #[must_use]
    pub fn combine(sources: impl IntoIterator<Item = Self>) -> Option<Self> {
        let mut primary = false;
        let mut cache = false;
        for source in sources {
            match source {
                Self::Primary => primary = true,
                Self::Cache => cache = true,
                Self::Merged => {
                    primary = true;
                    cache = true;
                }
            }
        }
        match (primary, cache) {
            (true, false) => Some(Self::Primary),
            (false, true) => Some(Self::Cache),
            (true, true) => Some(Self::Merged),
            (false, false) => None,
        }
    }

    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Cache => "cache",
            Self::Merged => "merged",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_creation() {
        assert_eq!(Ticker::new(" msft ").as_str(), "MSFT");
        assert_eq!(Ticker::from("sap").to_string(), "SAP");
    }

    #[test]
    fn test_standard_parsing() {
        assert_eq!(
            "us-gaap".parse::<AccountingStandard>().unwrap(),
            AccountingStandard::UsGaap
        );
        assert_eq!(
            "ifrs-full".parse::<AccountingStandard>().unwrap(),
            AccountingStandard::Ifrs
        );
        assert!("jgaap".parse::<AccountingStandard>().is_err());
        assert_eq!(AccountingStandard::Ifrs.namespace(), "ifrs-full");
    }

    #[test]
    fn test_period_label() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 30).unwrap();
        let meta = FilingMetadata::new(Ticker::new("MSFT"), FormType::TenK, date)
            .with_fiscal_period(2025, "FY");
        assert_eq!(meta.period_label(), "FY2025");

        let bare = FilingMetadata::new(Ticker::new("MSFT"), FormType::TenQ, date);
        assert_eq!(bare.period_label(), "2025-07-30");
        assert!(!bare.is_foreign);

        let foreign = FilingMetadata::new(Ticker::new("SAP"), FormType::TwentyF, date);
        assert!(foreign.is_foreign);
    }

    #[test]
    fn test_provenance_combine() {
        use Provenance::*;
        assert_eq!(Provenance::combine([Primary, Primary]), Some(Primary));
        assert_eq!(Provenance::combine([Cache]), Some(Cache));
        assert_eq!(Provenance::combine([Primary, Cache]), Some(Merged));
        assert_eq!(Provenance::combine(std::iter::empty()), None);
    }

    #[test]
    fn test_enum_round_trips() {
        for category in [
            RatioCategory::Profitability,
            RatioCategory::Liquidity,
            RatioCategory::Leverage,
            RatioCategory::Efficiency,
            RatioCategory::CashFlow,
        ] {
            assert_eq!(category.as_str().parse::<RatioCategory>().unwrap(), category);
        }
        for segment_type in SegmentType::ALL {
            assert_eq!(
                segment_type.as_str().parse::<SegmentType>().unwrap(),
                segment_type
            );
        }
    }
}
