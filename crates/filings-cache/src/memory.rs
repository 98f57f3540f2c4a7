//! In-memory store implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use filings_core::{
    CachedStatement, Filing, FilingId, FilingMetadata, FilingStore, FilingsError, LineItem,
    RatioCategory, Result, SegmentFact, SegmentType, StatementKind, StoredRatio, Ticker,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// A cached filing with an access timestamp that reads can bump under a shared lock.
#[derive(Debug)]
struct StoredFiling {
    metadata: FilingMetadata,
    cached_at: DateTime<Utc>,
    last_accessed_micros: AtomicI64,
}

impl StoredFiling {
    fn new(metadata: FilingMetadata, now: DateTime<Utc>) -> Self {
        Self {
            metadata,
            cached_at: now,
            last_accessed_micros: AtomicI64::new(now.timestamp_micros()),
        }
    }

    /// Fills fields from a re-fetch, keeping known values the new metadata lacks.
    fn merge(&mut self, update: &FilingMetadata, now: DateTime<Utc>) {
        let current = &mut self.metadata;
        current.cik = update.cik.clone().or_else(|| current.cik.take());
        current.company_name = update
            .company_name
            .clone()
            .or_else(|| current.company_name.take());
        current.fiscal_year = update.fiscal_year.or(current.fiscal_year);
        current.fiscal_period = update
            .fiscal_period
            .clone()
            .or_else(|| current.fiscal_period.take());
        current.period_end = update.period_end.or(current.period_end);
        current.accession_number = update
            .accession_number
            .clone()
            .or_else(|| current.accession_number.take());
        current.is_foreign = update.is_foreign;
        current.accounting_standard = update.accounting_standard;
        current.data_quality_score = update.data_quality_score.or(current.data_quality_score);
        self.cached_at = now;
    }

    fn touch(&self) {
        self.last_accessed_micros
            .store(Utc::now().timestamp_micros(), Ordering::Relaxed);
    }

    fn to_filing(&self, id: FilingId) -> Filing {
        let micros = self.last_accessed_micros.load(Ordering::Relaxed);
        Filing {
            id,
            metadata: self.metadata.clone(),
            cached_at: self.cached_at,
            last_accessed: DateTime::from_timestamp_micros(micros).unwrap_or(self.cached_at),
        }
    }
}

/// Natural key of a filing.
type FilingKey = (Ticker, String, NaiveDate);

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    filings: BTreeMap<FilingId, StoredFiling>,
    keys: HashMap<FilingKey, FilingId>,
    statements: HashMap<(FilingId, StatementKind), Vec<LineItem>>,
    ratios: BTreeMap<(FilingId, RatioCategory, String), StoredRatio>,
    segments: HashMap<(FilingId, SegmentType), Vec<SegmentFact>>,
}

impl Tables {
    fn ensure_filing(&self, id: FilingId) -> Result<()> {
        if self.filings.contains_key(&id) {
            Ok(())
        } else {
            Err(FilingsError::InvalidParameter(format!(
                "Unknown filing id {id}"
            )))
        }
    }

    /// Filings of a ticker dated on or before `as_of`, most recent first.
    fn filings_for<'a>(
        &'a self,
        ticker: &'a Ticker,
        as_of: Option<NaiveDate>,
    ) -> impl Iterator<Item = (&'a FilingId, &'a StoredFiling)> + 'a {
        let mut matching: Vec<_> = self
            .filings
            .iter()
            .filter(move |(_, f)| {
                &f.metadata.ticker == ticker && as_of.is_none_or(|d| f.metadata.filing_date <= d)
            })
            .collect();
        matching.sort_by(|(a_id, a), (b_id, b)| {
            (b.metadata.filing_date, *b_id).cmp(&(a.metadata.filing_date, *a_id))
        });
        matching.into_iter()
    }
}

/// Simple in-memory store for testing and development.
///
/// All tables live behind one `RwLock`, so a replace is observed atomically and
/// any number of reads proceed in parallel. Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FilingStore for InMemoryStore {
    #[instrument(skip(self, filing), fields(ticker = %filing.ticker, form = %filing.form_type, filing_date = %filing.filing_date))]
    async fn upsert_filing(&self, filing: &FilingMetadata) -> Result<FilingId> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        let key = (
            filing.ticker.clone(),
            filing.form_type.as_str().to_string(),
            filing.filing_date,
        );

        if let Some(id) = tables.keys.get(&key).copied() {
            if let Some(stored) = tables.filings.get_mut(&id) {
                stored.merge(filing, now);
            }
            debug!(id = %id, "Updated filing");
            return Ok(id);
        }

        tables.next_id += 1;
        let id = FilingId(tables.next_id);
        tables.keys.insert(key, id);
        tables
            .filings
            .insert(id, StoredFiling::new(filing.clone(), now));
        debug!(id = %id, "Inserted filing");
        Ok(id)
    }

    #[instrument(skip(self, items), fields(filing_id = %filing_id, kind = %kind, count = items.len()))]
    async fn replace_line_items(
        &self,
        filing_id: FilingId,
        kind: StatementKind,
        items: &[LineItem],
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_filing(filing_id)?;
        let items = items
            .iter()
            .cloned()
            .map(|mut item| {
                item.value = item.value.filter(|v| v.is_finite());
                item
            })
            .collect();
        tables.statements.insert((filing_id, kind), items);
        Ok(())
    }

    #[instrument(skip(self), fields(ticker = %ticker, kind = %kind))]
    async fn get_line_items(
        &self,
        ticker: &Ticker,
        kind: StatementKind,
        as_of: Option<NaiveDate>,
    ) -> Result<Option<CachedStatement>> {
        let tables = self.tables.read().await;
        let found = tables.filings_for(ticker, as_of).find_map(|(id, stored)| {
            tables
                .statements
                .get(&(*id, kind))
                .filter(|items| !items.is_empty())
                .map(|items| (*id, stored, items))
        });

        match found {
            Some((id, stored, items)) => {
                stored.touch();
                debug!(filing_id = %id, count = items.len(), "Found cached statement");
                Ok(Some(CachedStatement {
                    filing: stored.to_filing(id),
                    kind,
                    items: items.clone(),
                }))
            }
            None => {
                debug!("No cached statement found");
                Ok(None)
            }
        }
    }

    async fn upsert_ratio(
        &self,
        filing_id: FilingId,
        category: RatioCategory,
        name: &str,
        value: f64,
    ) -> Result<()> {
        if !value.is_finite() {
            return Err(FilingsError::InvalidParameter(format!(
                "Ratio {name} is not finite: {value}"
            )));
        }
        let mut tables = self.tables.write().await;
        tables.ensure_filing(filing_id)?;
        tables.ratios.insert(
            (filing_id, category, name.to_string()),
            StoredRatio {
                filing_id,
                category,
                name: name.to_string(),
                value,
                computed_at: Utc::now(),
            },
        );
        Ok(())
    }

    #[instrument(skip(self, facts), fields(filing_id = %filing_id, segment_type = %segment_type, count = facts.len()))]
    async fn replace_segment_facts(
        &self,
        filing_id: FilingId,
        segment_type: SegmentType,
        facts: &[SegmentFact],
    ) -> Result<()> {
        if let Some(fact) = facts.iter().find(|f| f.segment_type != segment_type) {
            return Err(FilingsError::InvalidParameter(format!(
                "Segment {} is {} but replacing {segment_type}",
                fact.segment_name, fact.segment_type
            )));
        }
        let mut tables = self.tables.write().await;
        tables.ensure_filing(filing_id)?;

        // Same (name, metric) collapses to the last occurrence.
        let mut collapsed: Vec<SegmentFact> = Vec::with_capacity(facts.len());
        for fact in facts {
            match collapsed.iter_mut().find(|f| {
                f.segment_name == fact.segment_name && f.metric_name == fact.metric_name
            }) {
                Some(existing) => *existing = fact.clone(),
                None => collapsed.push(fact.clone()),
            }
        }
        tables.segments.insert((filing_id, segment_type), collapsed);
        Ok(())
    }

    async fn latest_filing(
        &self,
        ticker: &Ticker,
        as_of: Option<NaiveDate>,
    ) -> Result<Option<Filing>> {
        let tables = self.tables.read().await;
        Ok(tables.filings_for(ticker, as_of).next().map(|(id, stored)| {
            stored.touch();
            stored.to_filing(*id)
        }))
    }

    async fn list_filings(&self, ticker: &Ticker) -> Result<Vec<Filing>> {
        let tables = self.tables.read().await;
        Ok(tables
            .filings_for(ticker, None)
            .map(|(id, stored)| stored.to_filing(*id))
            .collect())
    }

    async fn get_ratios(&self, filing_id: FilingId) -> Result<Vec<StoredRatio>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ratios
            .range((filing_id, RatioCategory::Profitability, String::new())..)
            .take_while(|((id, _, _), _)| *id == filing_id)
            .map(|(_, ratio)| ratio.clone())
            .collect())
    }

    async fn get_segment_facts(
        &self,
        filing_id: FilingId,
        segment_type: SegmentType,
    ) -> Result<Vec<SegmentFact>> {
        let tables = self.tables.read().await;
        Ok(tables
            .segments
            .get(&(filing_id, segment_type))
            .cloned()
            .unwrap_or_default())
    }
}
