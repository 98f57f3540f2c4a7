#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/filings/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for XBRL filing resolution.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`StatementProvider`](provider::StatementProvider) - Live multi-period statements and dimensional facts
//! - [`FilingStore`](store::FilingStore) - Structured filing cache
//! - [`concepts`] - Canonical metrics and their US-GAAP / IFRS tag aliases
//! - [`FinancialMetrics`](metrics::FinancialMetrics) - Provenance-tagged normalized metrics

/// Canonical metrics and the concept map.
pub mod concepts;
/// Error types for resolution operations.
pub mod error;
/// SEC form type definitions.
pub mod form;
/// Normalized metrics records.
pub mod metrics;
/// Provider trait for live statement data.
pub mod provider;
/// Store trait for cached filing data.
pub mod store;
/// Core data types (Ticker, Filing, LineItem, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use concepts::{CONCEPT_MAP_VERSION, CanonicalMetric};
pub use error::{FilingsError, Result};
pub use form::{FormType, PeriodType};
pub use metrics::{FinancialMetrics, MetricValues, PeriodMetrics, RatioName};
pub use provider::{DimensionalFacts, StatementPeriod, StatementProvider, StatementSet};
pub use store::FilingStore;
pub use types::{
    AccountingStandard, CachedStatement, Filing, FilingId, FilingMetadata, LineItem, Provenance,
    RatioCategory, SegmentFact, SegmentType, StatementKind, StoredRatio, Ticker,
};
