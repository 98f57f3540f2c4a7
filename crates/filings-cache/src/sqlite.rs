//! SQLite-based store implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use filings_core::{
    AccountingStandard, CachedStatement, Filing, FilingId, FilingMetadata, FilingStore,
    FilingsError, FormType, LineItem, RatioCategory, Result, SegmentFact, SegmentType,
    StatementKind, StoredRatio, Ticker,
};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, instrument, trace};

/// Number of read-only connections opened for a file-backed store.
pub const DEFAULT_READERS: usize = 4;

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS filings_metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    cik TEXT,
    company_name TEXT,
    form_type TEXT NOT NULL,
    filing_date TEXT NOT NULL,
    fiscal_year INTEGER,
    fiscal_period TEXT,
    period_end TEXT,
    accession_number TEXT,
    is_foreign INTEGER NOT NULL DEFAULT 0,
    accounting_standard TEXT NOT NULL,
    cached_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    data_quality_score REAL,
    UNIQUE (ticker, form_type, filing_date)
);
CREATE INDEX IF NOT EXISTS idx_filings_ticker_date
    ON filings_metadata(ticker, filing_date DESC);

CREATE TABLE IF NOT EXISTS balance_sheet (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filing_id INTEGER NOT NULL REFERENCES filings_metadata(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    filing_date TEXT NOT NULL,
    concept TEXT NOT NULL,
    label TEXT,
    value REAL,
    currency TEXT,
    unit TEXT,
    decimals INTEGER,
    context_ref TEXT,
    is_abstract INTEGER NOT NULL DEFAULT 0,
    level INTEGER NOT NULL DEFAULT 0,
    parent_concept TEXT,
    line_order INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_balance_sheet_ticker_date ON balance_sheet(ticker, filing_date DESC);
CREATE INDEX IF NOT EXISTS idx_balance_sheet_concept ON balance_sheet(concept);
CREATE INDEX IF NOT EXISTS idx_balance_sheet_filing ON balance_sheet(filing_id);

CREATE TABLE IF NOT EXISTS income_statement (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filing_id INTEGER NOT NULL REFERENCES filings_metadata(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    filing_date TEXT NOT NULL,
    concept TEXT NOT NULL,
    label TEXT,
    value REAL,
    currency TEXT,
    unit TEXT,
    decimals INTEGER,
    context_ref TEXT,
    is_abstract INTEGER NOT NULL DEFAULT 0,
    level INTEGER NOT NULL DEFAULT 0,
    parent_concept TEXT,
    line_order INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_income_statement_ticker_date ON income_statement(ticker, filing_date DESC);
CREATE INDEX IF NOT EXISTS idx_income_statement_concept ON income_statement(concept);
CREATE INDEX IF NOT EXISTS idx_income_statement_filing ON income_statement(filing_id);

CREATE TABLE IF NOT EXISTS cash_flow (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filing_id INTEGER NOT NULL REFERENCES filings_metadata(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    filing_date TEXT NOT NULL,
    concept TEXT NOT NULL,
    label TEXT,
    value REAL,
    currency TEXT,
    unit TEXT,
    decimals INTEGER,
    context_ref TEXT,
    is_abstract INTEGER NOT NULL DEFAULT 0,
    level INTEGER NOT NULL DEFAULT 0,
    parent_concept TEXT,
    line_order INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cash_flow_ticker_date ON cash_flow(ticker, filing_date DESC);
CREATE INDEX IF NOT EXISTS idx_cash_flow_concept ON cash_flow(concept);
CREATE INDEX IF NOT EXISTS idx_cash_flow_filing ON cash_flow(filing_id);

CREATE TABLE IF NOT EXISTS financial_ratios (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filing_id INTEGER NOT NULL REFERENCES filings_metadata(id) ON DELETE CASCADE,
    category TEXT NOT NULL,
    name TEXT NOT NULL,
    value REAL NOT NULL,
    computed_at TEXT NOT NULL,
    UNIQUE (filing_id, category, name)
);

CREATE TABLE IF NOT EXISTS segment_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filing_id INTEGER NOT NULL REFERENCES filings_metadata(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    segment_type TEXT NOT NULL,
    segment_name TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    metric_value REAL NOT NULL,
    currency TEXT,
    percentage_of_total REAL,
    extracted_at TEXT NOT NULL,
    UNIQUE (filing_id, segment_type, segment_name, metric_name)
);
CREATE INDEX IF NOT EXISTS idx_segment_data_filing ON segment_data(filing_id, segment_type);

CREATE VIEW IF NOT EXISTS latest_filings AS
SELECT f.*
FROM filings_metadata f
WHERE f.filing_date = (
    SELECT MAX(g.filing_date) FROM filings_metadata g WHERE g.ticker = f.ticker
);

CREATE VIEW IF NOT EXISTS balance_sheet_with_filing AS
SELECT b.ticker, b.filing_date, f.form_type, f.fiscal_year, f.fiscal_period, f.period_end,
       f.accounting_standard, b.concept, b.label, b.value, b.currency, b.unit, b.decimals,
       b.is_abstract, b.level, b.parent_concept, b.line_order
FROM balance_sheet b
JOIN filings_metadata f ON f.id = b.filing_id
ORDER BY b.ticker, b.filing_date DESC, b.level, b.line_order;
";

const FILING_COLUMNS: &str = "id, ticker, cik, company_name, form_type, filing_date, fiscal_year, \
     fiscal_period, period_end, accession_number, is_foreign, accounting_standard, cached_at, \
     last_accessed, data_quality_score";

fn db_err(e: rusqlite::Error) -> FilingsError {
    FilingsError::Cache(e.to_string())
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| FilingsError::Cache(e.to_string()))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| FilingsError::Parse(format!("Invalid date {s}: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FilingsError::Parse(format!("Invalid timestamp {s}: {e}")))
}

/// Raw `filings_metadata` row before date parsing.
struct FilingRow {
    id: i64,
    ticker: String,
    cik: Option<String>,
    company_name: Option<String>,
    form_type: String,
    filing_date: String,
    fiscal_year: Option<i32>,
    fiscal_period: Option<String>,
    period_end: Option<String>,
    accession_number: Option<String>,
    is_foreign: bool,
    accounting_standard: String,
    cached_at: String,
    last_accessed: String,
    data_quality_score: Option<f64>,
}

impl FilingRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ticker: row.get(1)?,
            cik: row.get(2)?,
            company_name: row.get(3)?,
            form_type: row.get(4)?,
            filing_date: row.get(5)?,
            fiscal_year: row.get(6)?,
            fiscal_period: row.get(7)?,
            period_end: row.get(8)?,
            accession_number: row.get(9)?,
            is_foreign: row.get(10)?,
            accounting_standard: row.get(11)?,
            cached_at: row.get(12)?,
            last_accessed: row.get(13)?,
            data_quality_score: row.get(14)?,
        })
    }

    fn into_filing(self) -> Result<Filing> {
        let metadata = FilingMetadata {
            ticker: Ticker::new(self.ticker),
            cik: self.cik,
            company_name: self.company_name,
            form_type: FormType::from(self.form_type),
            filing_date: parse_date(&self.filing_date)?,
            fiscal_year: self.fiscal_year,
            fiscal_period: self.fiscal_period,
            period_end: self.period_end.as_deref().map(parse_date).transpose()?,
            accession_number: self.accession_number,
            is_foreign: self.is_foreign,
            accounting_standard: self.accounting_standard.parse::<AccountingStandard>()?,
            data_quality_score: self.data_quality_score,
        };
        Ok(Filing {
            id: FilingId(self.id),
            metadata,
            cached_at: parse_timestamp(&self.cached_at)?,
            last_accessed: parse_timestamp(&self.last_accessed)?,
        })
    }
}

/// SQLite-based store for structured filing data.
///
/// All writes go through a single writer connection. A file-backed store runs in
/// WAL mode and serves reads from a small pool of read-only connections, so reads
/// of different filings do not queue behind each other or behind a writer. An
/// in-memory store uses its writer connection for everything.
#[derive(Debug)]
pub struct SqliteStore {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl SqliteStore {
    /// Open (or create) a store at the given path with [`DEFAULT_READERS`] readers.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_readers(path, DEFAULT_READERS)
    }

    /// Open (or create) a store at the given path with `readers` read-only connections.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn with_readers(path: impl AsRef<Path>, readers: usize) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        Self::configure(&conn)?;
        Self::initialize_schema(&conn)?;

        let readers = (0..readers)
            .map(|_| {
                let reader = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(db_err)?;
                reader.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
                Ok(Mutex::new(reader))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(path = %path.display(), readers = readers.len(), "Opened SQLite filing store");
        Ok(Self {
            writer: Mutex::new(conn),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Create an in-memory SQLite store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::configure(&conn)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            writer: Mutex::new(conn),
            readers: Vec::new(),
            next_reader: AtomicUsize::new(0),
        })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        Ok(())
    }

    /// Initialize the database schema.
    fn initialize_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!("SQLite filing store schema initialized");
        Ok(())
    }

    /// Returns a connection for reads, round-robin over the reader pool.
    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        if self.readers.is_empty() {
            return lock(&self.writer);
        }
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        lock(&self.readers[idx])
    }

    /// Updates `last_accessed` of a filing and returns the new timestamp.
    fn touch(&self, id: FilingId) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let conn = lock(&self.writer)?;
        conn.execute(
            "UPDATE filings_metadata SET last_accessed = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), id.0],
        )
        .map_err(db_err)?;
        Ok(now)
    }

    /// Returns `(ticker, filing_date)` of a filing, failing if it does not exist.
    fn filing_key(conn: &Connection, id: FilingId) -> Result<(String, String)> {
        conn.query_row(
            "SELECT ticker, filing_date FROM filings_metadata WHERE id = ?1",
            params![id.0],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| FilingsError::InvalidParameter(format!("Unknown filing id {id}")))
    }

    fn load_items(conn: &Connection, kind: StatementKind, id: FilingId) -> Result<Vec<LineItem>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT concept, label, value, currency, unit, decimals, context_ref,
                        is_abstract, level, parent_concept
                 FROM {} WHERE filing_id = ?1 ORDER BY line_order",
                kind.as_str()
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![id.0], |row| {
                Ok(LineItem {
                    concept: row.get(0)?,
                    label: row.get(1)?,
                    value: row.get(2)?,
                    currency: row.get(3)?,
                    unit: row.get(4)?,
                    decimals: row.get(5)?,
                    context_ref: row.get(6)?,
                    is_abstract: row.get(7)?,
                    level: row.get(8)?,
                    parent_concept: row.get(9)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

#[async_trait]
impl FilingStore for SqliteStore {
    #[instrument(skip(self, filing), fields(ticker = %filing.ticker, form = %filing.form_type, filing_date = %filing.filing_date))]
    async fn upsert_filing(&self, filing: &FilingMetadata) -> Result<FilingId> {
        let now = Utc::now().to_rfc3339();
        let conn = lock(&self.writer)?;

        let id: i64 = conn
            .query_row(
                "INSERT INTO filings_metadata
                 (ticker, cik, company_name, form_type, filing_date, fiscal_year, fiscal_period,
                  period_end, accession_number, is_foreign, accounting_standard, cached_at,
                  last_accessed, data_quality_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, ?13)
                 ON CONFLICT (ticker, form_type, filing_date) DO UPDATE SET
                    cik = COALESCE(excluded.cik, cik),
                    company_name = COALESCE(excluded.company_name, company_name),
                    fiscal_year = COALESCE(excluded.fiscal_year, fiscal_year),
                    fiscal_period = COALESCE(excluded.fiscal_period, fiscal_period),
                    period_end = COALESCE(excluded.period_end, period_end),
                    accession_number = COALESCE(excluded.accession_number, accession_number),
                    is_foreign = excluded.is_foreign,
                    accounting_standard = excluded.accounting_standard,
                    cached_at = excluded.cached_at,
                    data_quality_score = COALESCE(excluded.data_quality_score, data_quality_score)
                 RETURNING id",
                params![
                    filing.ticker.as_str(),
                    filing.cik,
                    filing.company_name,
                    filing.form_type.as_str(),
                    filing.filing_date.to_string(),
                    filing.fiscal_year,
                    filing.fiscal_period,
                    filing.period_end.map(|d| d.to_string()),
                    filing.accession_number,
                    filing.is_foreign,
                    filing.accounting_standard.as_str(),
                    now,
                    filing.data_quality_score,
                ],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        debug!(id, "Upserted filing");
        Ok(FilingId(id))
    }

    #[instrument(skip(self, items), fields(filing_id = %filing_id, kind = %kind, count = items.len()))]
    async fn replace_line_items(
        &self,
        filing_id: FilingId,
        kind: StatementKind,
        items: &[LineItem],
    ) -> Result<()> {
        let table = kind.as_str();
        let conn = lock(&self.writer)?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        let (ticker, filing_date) = Self::filing_key(&tx, filing_id)?;

        let deleted = tx
            .execute(
                &format!("DELETE FROM {table} WHERE filing_id = ?1"),
                params![filing_id.0],
            )
            .map_err(db_err)?;

        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {table}
                     (filing_id, ticker, filing_date, concept, label, value, currency, unit,
                      decimals, context_ref, is_abstract, level, parent_concept, line_order)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ))
                .map_err(db_err)?;
            for (order, item) in items.iter().enumerate() {
                // Non-finite values are stored as NULL.
                let value = item.value.filter(|v| v.is_finite());
                stmt.execute(params![
                    filing_id.0,
                    ticker,
                    filing_date,
                    item.concept,
                    item.label,
                    value,
                    item.currency,
                    item.unit,
                    item.decimals,
                    item.context_ref,
                    item.is_abstract,
                    item.level,
                    item.parent_concept,
                    order as i64,
                ])
                .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)?;
        debug!(deleted, inserted = items.len(), "Replaced line items");
        Ok(())
    }

    #[instrument(skip(self), fields(ticker = %ticker, kind = %kind))]
    async fn get_line_items(
        &self,
        ticker: &Ticker,
        kind: StatementKind,
        as_of: Option<NaiveDate>,
    ) -> Result<Option<CachedStatement>> {
        let found = {
            let conn = self.reader()?;
            let tx = conn.unchecked_transaction().map_err(db_err)?;
            let row = tx
                .query_row(
                    &format!(
                        "SELECT {FILING_COLUMNS} FROM filings_metadata f
                         WHERE f.ticker = ?1
                           AND (?2 IS NULL OR f.filing_date <= ?2)
                           AND EXISTS (SELECT 1 FROM {} s WHERE s.filing_id = f.id)
                         ORDER BY f.filing_date DESC, f.id DESC
                         LIMIT 1",
                        kind.as_str()
                    ),
                    params![ticker.as_str(), as_of.map(|d| d.to_string())],
                    FilingRow::from_row,
                )
                .optional()
                .map_err(db_err)?;
            match row {
                Some(row) => {
                    let filing = row.into_filing()?;
                    let items = Self::load_items(&tx, kind, filing.id)?;
                    tx.commit().map_err(db_err)?;
                    Some((filing, items))
                }
                None => None,
            }
        };

        let Some((mut filing, items)) = found else {
            debug!("No cached statement found");
            return Ok(None);
        };
        filing.last_accessed = self.touch(filing.id)?;

        debug!(filing_id = %filing.id, count = items.len(), "Found cached statement");
        Ok(Some(CachedStatement {
            filing,
            kind,
            items,
        }))
    }

    #[instrument(skip(self), fields(filing_id = %filing_id, category = %category))]
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
        let conn = lock(&self.writer)?;
        Self::filing_key(&conn, filing_id)?;
        conn.execute(
            "INSERT INTO financial_ratios (filing_id, category, name, value, computed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (filing_id, category, name) DO UPDATE SET
                value = excluded.value,
                computed_at = excluded.computed_at",
            params![
                filing_id.0,
                category.as_str(),
                name,
                value,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(db_err)?;
        trace!(name, value, "Upserted ratio");
        Ok(())
    }

    #[instrument(skip(self, facts), fields(filing_id = %filing_id, segment_type = %segment_type, count = facts.len()))]
    async fn replace_segment_facts(
        &self,
        filing_id: FilingId,
        segment_type: SegmentType,
        facts: &[SegmentFact],
    ) -> Result<()> {
        let extracted_at = Utc::now().to_rfc3339();
        let conn = lock(&self.writer)?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        let (ticker, _) = Self::filing_key(&tx, filing_id)?;

        tx.execute(
            "DELETE FROM segment_data WHERE filing_id = ?1 AND segment_type = ?2",
            params![filing_id.0, segment_type.as_str()],
        )
        .map_err(db_err)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO segment_data
                     (filing_id, ticker, segment_type, segment_name, metric_name, metric_value,
                      currency, percentage_of_total, extracted_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .map_err(db_err)?;
            for fact in facts {
                if fact.segment_type != segment_type {
                    return Err(FilingsError::InvalidParameter(format!(
                        "Segment {} is {} but replacing {segment_type}",
                        fact.segment_name, fact.segment_type
                    )));
                }
                stmt.execute(params![
                    filing_id.0,
                    ticker,
                    segment_type.as_str(),
                    fact.segment_name,
                    fact.metric_name,
                    fact.metric_value,
                    fact.currency,
                    fact.percentage_of_total,
                    extracted_at,
                ])
                .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)?;
        debug!("Replaced segment facts");
        Ok(())
    }

    #[instrument(skip(self), fields(ticker = %ticker))]
    async fn latest_filing(
        &self,
        ticker: &Ticker,
        as_of: Option<NaiveDate>,
    ) -> Result<Option<Filing>> {
        let row = {
            let conn = self.reader()?;
            conn.query_row(
                &format!(
                    "SELECT {FILING_COLUMNS} FROM filings_metadata
                     WHERE ticker = ?1 AND (?2 IS NULL OR filing_date <= ?2)
                     ORDER BY filing_date DESC, id DESC
                     LIMIT 1"
                ),
                params![ticker.as_str(), as_of.map(|d| d.to_string())],
                FilingRow::from_row,
            )
            .optional()
            .map_err(db_err)?
        };

        match row {
            Some(row) => {
                let mut filing = row.into_filing()?;
                filing.last_accessed = self.touch(filing.id)?;
                Ok(Some(filing))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(ticker = %ticker))]
    async fn list_filings(&self, ticker: &Ticker) -> Result<Vec<Filing>> {
        let conn = self.reader()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {FILING_COLUMNS} FROM filings_metadata
                 WHERE ticker = ?1
                 ORDER BY filing_date DESC, id DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![ticker.as_str()], FilingRow::from_row)
            .map_err(db_err)?;

        let mut filings = Vec::new();
        for row in rows {
            filings.push(row.map_err(db_err)?.into_filing()?);
        }
        debug!(count = filings.len(), "Listed cached filings");
        Ok(filings)
    }

    #[instrument(skip(self), fields(filing_id = %filing_id))]
    async fn get_ratios(&self, filing_id: FilingId) -> Result<Vec<StoredRatio>> {
        let conn = self.reader()?;
        let mut stmt = conn
            .prepare(
                "SELECT category, name, value, computed_at FROM financial_ratios
                 WHERE filing_id = ?1
                 ORDER BY category, name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![filing_id.0], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err)?;

        let mut ratios = Vec::new();
        for row in rows {
            let (category, name, value, computed_at) = row.map_err(db_err)?;
            ratios.push(StoredRatio {
                filing_id,
                category: category.parse()?,
                name,
                value,
                computed_at: parse_timestamp(&computed_at)?,
            });
        }
        Ok(ratios)
    }

    #[instrument(skip(self), fields(filing_id = %filing_id, segment_type = %segment_type))]
    async fn get_segment_facts(
        &self,
        filing_id: FilingId,
        segment_type: SegmentType,
    ) -> Result<Vec<SegmentFact>> {
        let conn = self.reader()?;
        let mut stmt = conn
            .prepare(
                "SELECT segment_name, metric_name, metric_value, currency, percentage_of_total
                 FROM segment_data
                 WHERE filing_id = ?1 AND segment_type = ?2
                 ORDER BY id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![filing_id.0, segment_type.as_str()], |row| {
                Ok(SegmentFact {
                    segment_type,
                    segment_name: row.get(0)?,
                    metric_name: row.get(1)?,
                    metric_value: row.get(2)?,
                    currency: row.get(3)?,
                    percentage_of_total: row.get(4)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn msft_10k(filing_date: NaiveDate, fiscal_year: i32) -> FilingMetadata {
        FilingMetadata::new(Ticker::new("MSFT"), FormType::TenK, filing_date)
            .with_fiscal_period(fiscal_year, "FY")
            .with_period_end(date(fiscal_year, 6, 30))
            .with_cik("0000789019")
    }

    fn revenue_fact(segment_type: SegmentType, name: &str, value: f64) -> SegmentFact {
        SegmentFact {
            segment_type,
            segment_name: name.to_string(),
            metric_name: "revenue".to_string(),
            metric_value: value,
            currency: Some("USD".to_string()),
            percentage_of_total: None,
        }
    }

    #[tokio::test]
    async fn test_sqlite_store_initialization() {
        let store = SqliteStore::in_memory();
        assert!(store.is_ok());
    }

    #[tokio::test]
    async fn test_upsert_filing_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let filing = msft_10k(date(2025, 7, 30), 2025);

        let first = store.upsert_filing(&filing).await.unwrap();
        let second = store
            .upsert_filing(&filing.clone().with_company_name("MICROSOFT CORP"))
            .await
            .unwrap();
        assert_eq!(first, second);

        let filings = store.list_filings(&Ticker::new("MSFT")).await.unwrap();
        assert_eq!(filings.len(), 1);
        assert_eq!(
            filings[0].metadata.company_name.as_deref(),
            Some("MICROSOFT CORP")
        );
        assert_eq!(filings[0].metadata.cik.as_deref(), Some("0000789019"));
        assert_eq!(filings[0].metadata.period_end, Some(date(2025, 6, 30)));
    }

    #[tokio::test]
    async fn test_line_items_round_trip_in_order() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .upsert_filing(&msft_10k(date(2025, 7, 30), 2025))
            .await
            .unwrap();

        let items = vec![
            LineItem::header("us-gaap:AssetsAbstract", "Assets"),
            LineItem::new("us-gaap:AssetsCurrent", 191_131_000_000.0)
                .with_currency("USD")
                .with_parent("us-gaap:AssetsAbstract", 1),
            LineItem::new("us-gaap:Assets", 619_003_000_000.0).with_currency("USD"),
        ];
        store
            .replace_line_items(id, StatementKind::BalanceSheet, &items)
            .await
            .unwrap();

        let cached = store
            .get_line_items(&Ticker::new("msft"), StatementKind::BalanceSheet, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.filing.id, id);
        assert_eq!(cached.items, items);
        assert!(cached.items[0].value.is_none());

        // Other statements were not written.
        let missing = store
            .get_line_items(&Ticker::new("MSFT"), StatementKind::CashFlow, None)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_replace_line_items_replaces_full_set() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .upsert_filing(&msft_10k(date(2025, 7, 30), 2025))
            .await
            .unwrap();

        let old = vec![
            LineItem::new("us-gaap:Revenues", 1.0),
            LineItem::new("us-gaap:CostOfRevenue", 2.0),
        ];
        let new = vec![LineItem::new("us-gaap:Revenues", 281_724_000_000.0)];
        store
            .replace_line_items(id, StatementKind::IncomeStatement, &old)
            .await
            .unwrap();
        store
            .replace_line_items(id, StatementKind::IncomeStatement, &new)
            .await
            .unwrap();

        let cached = store
            .get_line_items(&Ticker::new("MSFT"), StatementKind::IncomeStatement, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.items, new);
    }

    #[tokio::test]
    async fn test_get_line_items_as_of() {
        let store = SqliteStore::in_memory().unwrap();
        let ticker = Ticker::new("MSFT");
        let fy24 = store
            .upsert_filing(&msft_10k(date(2024, 7, 30), 2024))
            .await
            .unwrap();
        let fy25 = store
            .upsert_filing(&msft_10k(date(2025, 7, 30), 2025))
            .await
            .unwrap();
        for (id, revenue) in [(fy24, 245_122_000_000.0), (fy25, 281_724_000_000.0)] {
            store
                .replace_line_items(
                    id,
                    StatementKind::IncomeStatement,
                    &[LineItem::new("us-gaap:Revenues", revenue)],
                )
                .await
                .unwrap();
        }

        let latest = store
            .get_line_items(&ticker, StatementKind::IncomeStatement, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.filing.id, fy25);

        let earlier = store
            .get_line_items(
                &ticker,
                StatementKind::IncomeStatement,
                Some(date(2025, 1, 1)),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(earlier.filing.id, fy24);
        assert_eq!(earlier.items[0].value, Some(245_122_000_000.0));

        let none = store
            .get_line_items(
                &ticker,
                StatementKind::IncomeStatement,
                Some(date(2020, 1, 1)),
            )
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_reads_touch_last_accessed() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .upsert_filing(&msft_10k(date(2025, 7, 30), 2025))
            .await
            .unwrap();
        let before = store
            .list_filings(&Ticker::new("MSFT"))
            .await
            .unwrap()
            .remove(0)
            .last_accessed;

        let filing = store
            .latest_filing(&Ticker::new("MSFT"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(filing.id, id);
        assert!(filing.last_accessed >= before);
    }

    #[tokio::test]
    async fn test_unknown_filing_is_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .replace_line_items(
                FilingId(42),
                StatementKind::BalanceSheet,
                &[LineItem::new("us-gaap:Assets", 1.0)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FilingsError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_ratio_upsert_is_unique() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .upsert_filing(&msft_10k(date(2025, 7, 30), 2025))
            .await
            .unwrap();

        store
            .upsert_ratio(id, RatioCategory::Liquidity, "current_ratio", 1.2)
            .await
            .unwrap();
        store
            .upsert_ratio(id, RatioCategory::Liquidity, "current_ratio", 1.3534)
            .await
            .unwrap();
        store
            .upsert_ratio(id, RatioCategory::Profitability, "roe", 0.2965)
            .await
            .unwrap();

        let ratios = store.get_ratios(id).await.unwrap();
        assert_eq!(ratios.len(), 2);
        let current = ratios.iter().find(|r| r.name == "current_ratio").unwrap();
        assert_eq!(current.value, 1.3534);

        assert!(
            store
                .upsert_ratio(id, RatioCategory::Leverage, "debt_to_equity", f64::NAN)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_segment_facts_replace() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .upsert_filing(&msft_10k(date(2025, 7, 30), 2025))
            .await
            .unwrap();

        let first = vec![revenue_fact(SegmentType::Geographic, "UnitedStates", 1.0)];
        let second = vec![
            revenue_fact(SegmentType::Geographic, "UnitedStates", 144_546_000_000.0),
            revenue_fact(SegmentType::Geographic, "NonUs", 137_178_000_000.0),
        ];
        store
            .replace_segment_facts(id, SegmentType::Geographic, &first)
            .await
            .unwrap();
        store
            .replace_segment_facts(id, SegmentType::Geographic, &second)
            .await
            .unwrap();

        let facts = store
            .get_segment_facts(id, SegmentType::Geographic)
            .await
            .unwrap();
        assert_eq!(facts, second);
        assert!(
            store
                .get_segment_facts(id, SegmentType::Business)
                .await
                .unwrap()
                .is_empty()
        );

        let mismatched = [revenue_fact(SegmentType::Business, "IntelligentCloud", 1.0)];
        assert!(
            store
                .replace_segment_facts(id, SegmentType::Geographic, &mismatched)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_views_and_cascade() {
        let store = SqliteStore::in_memory().unwrap();
        let old = store
            .upsert_filing(&msft_10k(date(2024, 7, 30), 2024))
            .await
            .unwrap();
        let new = store
            .upsert_filing(&msft_10k(date(2025, 7, 30), 2025))
            .await
            .unwrap();
        store
            .replace_line_items(
                new,
                StatementKind::BalanceSheet,
                &[LineItem::new("us-gaap:Assets", 619_003_000_000.0)],
            )
            .await
            .unwrap();

        let conn = store.writer.lock().unwrap();
        let latest: i64 = conn
            .query_row(
                "SELECT id FROM latest_filings WHERE ticker = 'MSFT'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(latest, new.0);
        assert_ne!(latest, old.0);

        let joined: String = conn
            .query_row(
                "SELECT form_type FROM balance_sheet_with_filing WHERE concept = 'us-gaap:Assets'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(joined, "10-K");

        conn.execute("DELETE FROM filings_metadata WHERE id = ?1", params![new.0])
            .unwrap();
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM balance_sheet", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_file_backed_store_with_readers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filings.db");

        {
            let store = SqliteStore::with_readers(&path, 2).unwrap();
            let id = store
                .upsert_filing(&msft_10k(date(2025, 7, 30), 2025))
                .await
                .unwrap();
            store
                .replace_line_items(
                    id,
                    StatementKind::IncomeStatement,
                    &[LineItem::new("us-gaap:Revenues", 281_724_000_000.0)],
                )
                .await
                .unwrap();

            // Each read goes through a different reader connection.
            for _ in 0..3 {
                let cached = store
                    .get_line_items(&Ticker::new("MSFT"), StatementKind::IncomeStatement, None)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(cached.items[0].value, Some(281_724_000_000.0));
            }
        }

        // Data persists across reopen.
        let reopened = SqliteStore::new(&path).unwrap();
        let filing = reopened
            .latest_filing(&Ticker::new("MSFT"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(filing.metadata.fiscal_year, Some(2025));
        assert_eq!(filing.metadata.form_type, FormType::TenK);
    }
}
