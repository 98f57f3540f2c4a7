//! Store trait for cached filing data.
//!
//! This module defines the [`FilingStore`] trait that provides a unified interface
//! for persisting filings, their statement line items, computed ratios and
//! segment facts.
//!
//! Writers to the same filing must be serialized by the caller. Replacing line
//! items or segment facts is atomic: readers observe either the previous set or
//! the new one, never a mix.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{
        CachedStatement, Filing, FilingId, FilingMetadata, LineItem, RatioCategory, SegmentFact,
        SegmentType, StatementKind, StoredRatio, Ticker,
    },
};

/// Trait for persisting structured filing data.
///
/// Lookups return `Ok(None)` or an empty list on a miss; they never synthesize
/// values.
#[async_trait]
pub trait FilingStore: Send + Sync + Debug {
    /// Inserts a filing or updates it in place, keyed by `(ticker, form_type, filing_date)`.
    ///
    /// Returns the filing's id, which is stable across re-upserts.
    async fn upsert_filing(&self, filing: &FilingMetadata) -> Result<FilingId>;

    /// Atomically replaces all line items of one statement of a filing.
    async fn replace_line_items(
        &self,
        filing_id: FilingId,
        kind: StatementKind,
        items: &[LineItem],
    ) -> Result<()>;

    /// Returns the line items of the latest filing with this statement cached.
    ///
    /// With `as_of`, only filings dated on or before it are considered.
    async fn get_line_items(
        &self,
        ticker: &Ticker,
        kind: StatementKind,
        as_of: Option<NaiveDate>,
    ) -> Result<Option<CachedStatement>>;

    /// Inserts or updates one ratio of a filing.
    async fn upsert_ratio(
        &self,
        filing_id: FilingId,
        category: RatioCategory,
        name: &str,
        value: f64,
    ) -> Result<()>;

    /// Atomically replaces all segment facts of one type for a filing.
    async fn replace_segment_facts(
        &self,
        filing_id: FilingId,
        segment_type: SegmentType,
        facts: &[SegmentFact],
    ) -> Result<()>;

    /// Returns the most recent filing of a ticker dated on or before `as_of`.
    async fn latest_filing(&self, ticker: &Ticker, as_of: Option<NaiveDate>)
    -> Result<Option<Filing>>;

    /// Returns all cached filings of a ticker, most recent first.
    async fn list_filings(&self, ticker: &Ticker) -> Result<Vec<Filing>>;

    /// Returns the stored ratios of a filing.
    async fn get_ratios(&self, filing_id: FilingId) -> Result<Vec<StoredRatio>>;

    /// Returns the stored segment facts of one type for a filing.
    async fn get_segment_facts(
        &self,
        filing_id: FilingId,
        segment_type: SegmentType,
    ) -> Result<Vec<SegmentFact>>;
}
