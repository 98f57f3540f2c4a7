#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/filings/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SEC EDGAR statement provider.
//!
//! This crate provides access to SEC EDGAR filings including:
//!
//! - CIK (Central Index Key) lookup from ticker symbols
//! - Company facts from the EDGAR API
//! - Multi-period statement extraction for US-GAAP and IFRS filers

use async_trait::async_trait;
use chrono::NaiveDate;
use filings_core::{
    AccountingStandard, CanonicalMetric, DimensionalFacts, FilingMetadata, FilingsError, FormType,
    Result, StatementPeriod, StatementProvider, StatementSet, Ticker, concepts,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

/// SEC EDGAR API base URL
const EDGAR_BASE_URL: &str = "https://data.sec.gov";

/// SEC company tickers URL
const COMPANY_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// Default rate limit: 10 requests per second (SEC requirement)
const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(100);

/// Forms whose full-year facts make up a statement period.
const ANNUAL_FORMS: &[&str] = &["10-K", "20-F", "40-F"];

/// Rate limiter to ensure we don't exceed SEC's rate limits
#[derive(Debug)]
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Instant::now() - min_interval,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// SEC EDGAR statement provider.
///
/// Implements rate limiting per SEC requirements (max 10 requests/second).
#[derive(Debug)]
pub struct EdgarProvider {
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl EdgarProvider {
    /// Create a new EDGAR provider with the specified user agent.
    ///
    /// The SEC requires identifying user agent headers. Format should be:
    /// "AppName/Version (contact@email.com)"
    ///
    /// # Errors
    /// Returns `Network` if the HTTP client cannot be built.
    ///
    /// # Example
    /// ```
    /// use filings_edgar::EdgarProvider;
    ///
    /// let provider = EdgarProvider::new("MyApp/1.0 (contact@example.com)").unwrap();
    /// ```
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FilingsError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client))
    }

    /// Create a new EDGAR provider with a custom HTTP client.
    ///
    /// The client must send an identifying user agent.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(DEFAULT_RATE_LIMIT))),
        }
    }

    /// Look up a company's CIK number from its ticker symbol.
    ///
    /// # Returns
    /// The company's CIK number as a zero-padded 10-digit string
    ///
    /// # Errors
    /// Returns `InvalidParameter` for an unknown ticker, `Network` or `Parse` on
    /// transport failures.
    pub async fn get_cik(&self, ticker: &Ticker) -> Result<String> {
        if ticker.as_str().is_empty() {
            return Err(FilingsError::InvalidParameter("Empty ticker".to_string()));
        }

        // Rate limit
        self.rate_limiter.lock().await.wait().await;

        debug!("Fetching company tickers from SEC");
        let response = self
            .client
            .get(COMPANY_TICKERS_URL)
            .send()
            .await
            .map_err(|e| FilingsError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FilingsError::Network(format!(
                "Failed to fetch company tickers: HTTP {}",
                response.status()
            )));
        }

        let data: HashMap<String, CompanyTickerInfo> = response
            .json()
            .await
            .map_err(|e| FilingsError::Parse(format!("Failed to parse company tickers: {e}")))?;

        data.values()
            .find(|company| company.ticker.eq_ignore_ascii_case(ticker.as_str()))
            .map(|company| {
                // CIK should be zero-padded to 10 digits
                let cik = format!("{:0>10}", company.cik_str);
                debug!("Found CIK {} for ticker {}", cik, ticker);
                cik
            })
            .ok_or_else(|| FilingsError::InvalidParameter(format!("Unknown ticker: {ticker}")))
    }

    /// Fetch company facts from SEC EDGAR.
    async fn fetch_company_facts(&self, cik: &str) -> Result<CompanyFacts> {
        let cik_padded = format!("{cik:0>10}");

        // Rate limit
        self.rate_limiter.lock().await.wait().await;

        let url = format!("{EDGAR_BASE_URL}/api/xbrl/companyfacts/CIK{cik_padded}.json");

        debug!("Fetching company facts from {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FilingsError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FilingsError::Network(format!(
                "Failed to fetch company facts for CIK {cik_padded}: HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FilingsError::Parse(format!("Failed to parse company facts: {e}")))
    }
}

#[async_trait]
impl StatementProvider for EdgarProvider {
    fn name(&self) -> &str {
        "SEC EDGAR"
    }

    #[instrument(skip(self), fields(ticker = %ticker))]
    async fn fetch_statements(&self, ticker: &Ticker, periods: usize) -> Result<StatementSet> {
        let cik = self.get_cik(ticker).await?;
        let facts = self.fetch_company_facts(&cik).await?;
        let set = statements_from_facts(ticker, &cik, &facts, periods);
        debug!(
            standard = %set.accounting_standard,
            periods = set.periods.len(),
            "Extracted statements from company facts"
        );
        Ok(set)
    }

    async fn fetch_dimensional_facts(
        &self,
        ticker: &Ticker,
        _period_index: usize,
    ) -> Result<DimensionalFacts> {
        warn!(%ticker, "EDGAR company facts carry no dimension members");
        Err(FilingsError::NotSupported(
            "EDGAR company facts do not include dimensional facts".to_string(),
        ))
    }
}

// =============================================================================
// Statement extraction
// =============================================================================

/// Detects the taxonomy a company reports in.
fn detect_standard(facts: &CompanyFacts) -> AccountingStandard {
    let count = |standard: AccountingStandard| {
        facts
            .facts
            .get(standard.namespace())
            .map_or(0, |tags| {
                tags.keys()
                    .filter(|tag| concepts::canonical_for(tag, standard).is_some())
                    .count()
            })
    };
    if count(AccountingStandard::Ifrs) > count(AccountingStandard::UsGaap) {
        AccountingStandard::Ifrs
    } else {
        AccountingStandard::UsGaap
    }
}

/// Picks the unit a metric's values are read from.
///
/// Per-share metrics use a `<currency>/shares` unit; everything else uses USD when
/// reported, else the first plain currency unit.
fn pick_unit<'a>(
    metric: CanonicalMetric,
    units: &'a HashMap<String, Vec<FactValue>>,
) -> Option<(&'a str, &'a [FactValue])> {
    let per_share = matches!(metric, CanonicalMetric::EpsBasic | CanonicalMetric::EpsDiluted);
    let mut candidates: Vec<&String> = units
        .keys()
        .filter(|unit| unit.contains("/shares") == per_share)
        .filter(|unit| per_share || (*unit != "shares" && *unit != "pure"))
        .collect();
    candidates.sort_by(|a, b| {
        (!a.starts_with("USD"), a.as_str()).cmp(&(!b.starts_with("USD"), b.as_str()))
    });
    let unit: &'a String = candidates.first().copied()?;
    units
        .get(unit)
        .map(|values| (unit.as_str(), values.as_slice()))
}

/// One annual filing assembled from company facts.
#[derive(Debug, Default)]
struct AccessionGroup {
    form: String,
    filed: Option<NaiveDate>,
    fiscal_year: Option<i32>,
    period_end: Option<NaiveDate>,
    /// tag -> (start, value); the longest duration wins.
    values: BTreeMap<String, (Option<NaiveDate>, f64)>,
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn is_annual(value: &FactValue) -> bool {
    value.form.as_deref().is_some_and(|f| ANNUAL_FORMS.contains(&f))
        && value.fp.as_deref() == Some("FY")
}

/// Builds up to `periods` annual statement periods from company facts, most recent first.
///
/// Each annual filing (accession number) becomes one period. Its period end is
/// the latest fact end date in the filing; comparative prior-year facts the same
/// filing repeats are dropped.
fn statements_from_facts(
    ticker: &Ticker,
    cik: &str,
    facts: &CompanyFacts,
    periods: usize,
) -> StatementSet {
    let standard = detect_standard(facts);
    let mut set = StatementSet::new(standard);
    let Some(taxonomy) = facts.facts.get(standard.namespace()) else {
        return set;
    };

    // Pass 1: mapped tags and their chosen units.
    let mut mapped = Vec::new();
    for (tag, tag_facts) in taxonomy {
        let qualified = format!("{}:{tag}", standard.namespace());
        let Some(metric) = concepts::canonical_for(&qualified, standard) else {
            continue;
        };
        let Some((unit, values)) = tag_facts.units.as_ref().and_then(|u| pick_unit(metric, u))
        else {
            continue;
        };
        if set.currency.is_none() && !unit.contains('/') {
            set.currency = Some(unit.to_string());
        }
        mapped.push((qualified, values));
    }

    // Pass 2: group annual facts by accession and find each filing's period end.
    let mut groups: HashMap<&str, AccessionGroup> = HashMap::new();
    for (_, values) in &mapped {
        for value in values.iter().filter(|v| is_annual(v)) {
            let (Some(accn), Some(end)) = (value.accn.as_deref(), parse_date(&value.end)) else {
                continue;
            };
            let group = groups.entry(accn).or_default();
            if group.form.is_empty() {
                group.form = value.form.clone().unwrap_or_default();
            }
            group.filed = group.filed.or_else(|| value.filed.as_deref().and_then(parse_date));
            group.fiscal_year = group.fiscal_year.or(value.fy);
            group.period_end = group.period_end.max(Some(end));
        }
    }

    // Pass 3: keep the values that end on the filing's period end.
    for (qualified, values) in &mapped {
        for value in values.iter().filter(|v| is_annual(v) && v.val.is_finite()) {
            let Some(group) = value.accn.as_deref().and_then(|a| groups.get_mut(a)) else {
                continue;
            };
            if parse_date(&value.end) != group.period_end {
                continue;
            }
            let start = value.start.as_deref().and_then(parse_date);
            match group.values.get(qualified.as_str()) {
                Some((Some(existing), _)) if start.is_none_or(|s| s >= *existing) => {}
                _ => {
                    group.values.insert(qualified.clone(), (start, value.val));
                }
            }
        }
    }

    let mut built: Vec<(String, AccessionGroup)> = groups
        .into_iter()
        .filter(|(_, g)| !g.values.is_empty())
        .map(|(accn, g)| (accn.to_string(), g))
        .collect();
    built.sort_by(|(_, a), (_, b)| b.period_end.cmp(&a.period_end).then(b.filed.cmp(&a.filed)));

    for (accn, group) in built.into_iter().take(periods) {
        let mut period = StatementPeriod::new(String::new(), group.period_end);
        if let Some(filed) = group.filed {
            let mut filing =
                FilingMetadata::new(ticker.clone(), FormType::from_form(&group.form), filed)
                    .with_standard(standard)
                    .with_cik(cik)
                    .with_company_name(facts.entity_name.clone())
                    .with_accession_number(accn);
            if let Some(fy) = group.fiscal_year {
                filing = filing.with_fiscal_period(fy, "FY");
            }
            if let Some(end) = group.period_end {
                filing = filing.with_period_end(end);
            }
            period.label = filing.period_label();
            period = period.with_filing(filing);
        } else if let Some(end) = group.period_end {
            period.label = end.format("%Y-%m-%d").to_string();
        }

        for (tag, (_, value)) in group.values {
            if let Some(metric) = concepts::canonical_for(&tag, standard) {
                period.statement_mut(metric.statement_kind()).insert(tag, value);
            }
        }
        set.periods.push(period);
    }

    set
}

// =============================================================================
// SEC API Response Types
// =============================================================================

/// Company ticker information from SEC JSON.
#[derive(Debug, Deserialize)]
struct CompanyTickerInfo {
    /// CIK as a number (SEC returns this as an integer)
    cik_str: u64,
    /// Ticker symbol
    ticker: String,
}

/// Response from the SEC EDGAR Company Facts API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompanyFacts {
    /// Entity name
    #[serde(default)]
    entity_name: String,
    /// Facts organized by taxonomy and tag
    facts: HashMap<String, HashMap<String, TagFacts>>,
}

/// Facts for a specific XBRL tag.
#[derive(Debug, Deserialize)]
struct TagFacts {
    /// Units (USD, shares, etc.) containing the actual fact values
    #[serde(default)]
    units: Option<HashMap<String, Vec<FactValue>>>,
}

/// A single fact value with metadata.
#[derive(Debug, Clone, Deserialize)]
struct FactValue {
    /// Start date of duration facts
    #[serde(default)]
    start: Option<String>,
    /// End date of the period
    end: String,
    /// Value
    val: f64,
    /// Accession number
    #[serde(default)]
    accn: Option<String>,
    /// Fiscal year
    #[serde(default)]
    fy: Option<i32>,
    /// Fiscal period
    #[serde(default)]
    fp: Option<String>,
    /// Form type
    #[serde(default)]
    form: Option<String>,
    /// Filed date
    #[serde(default)]
    filed: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use filings_core::StatementKind;

    const MSFT_FACTS: &str = r#"{
        "cik": 789019,
        "entityName": "MICROSOFT CORPORATION",
        "facts": {
            "dei": {
                "EntityCommonStockSharesOutstanding": {
                    "units": {"shares": [{"end": "2025-07-24", "val": 7433038381, "accn": "0000950170-25-100235", "fy": 2025, "fp": "FY", "form": "10-K", "filed": "2025-07-30"}]}
                }
            },
            "us-gaap": {
                "RevenueFromContractWithCustomerExcludingAssessedTax": {
                    "label": "Revenue",
                    "units": {"USD": [
                        {"start": "2023-07-01", "end": "2024-06-30", "val": 245122000000, "accn": "0000950170-24-087843", "fy": 2024, "fp": "FY", "form": "10-K", "filed": "2024-07-30"},
                        {"start": "2023-07-01", "end": "2024-06-30", "val": 245122000000, "accn": "0000950170-25-100235", "fy": 2025, "fp": "FY", "form": "10-K", "filed": "2025-07-30"},
                        {"start": "2025-04-01", "end": "2025-06-30", "val": 76441000000, "accn": "0000950170-25-100235", "fy": 2025, "fp": "FY", "form": "10-K", "filed": "2025-07-30"},
                        {"start": "2024-07-01", "end": "2025-06-30", "val": 281724000000, "accn": "0000950170-25-100235", "fy": 2025, "fp": "FY", "form": "10-K", "filed": "2025-07-30"},
                        {"start": "2025-01-01", "end": "2025-03-31", "val": 70066000000, "accn": "0000950170-25-061046", "fy": 2025, "fp": "Q3", "form": "10-Q", "filed": "2025-04-30"}
                    ]}
                },
                "Assets": {
                    "units": {"USD": [
                        {"end": "2024-06-30", "val": 512163000000, "accn": "0000950170-24-087843", "fy": 2024, "fp": "FY", "form": "10-K", "filed": "2024-07-30"},
                        {"end": "2025-06-30", "val": 619003000000, "accn": "0000950170-25-100235", "fy": 2025, "fp": "FY", "form": "10-K", "filed": "2025-07-30"}
                    ]}
                },
                "EarningsPerShareDiluted": {
                    "units": {"USD/shares": [
                        {"start": "2024-07-01", "end": "2025-06-30", "val": 13.64, "accn": "0000950170-25-100235", "fy": 2025, "fp": "FY", "form": "10-K", "filed": "2025-07-30"}
                    ]}
                },
                "CommonStockSharesAuthorized": {
                    "units": {"shares": [
                        {"end": "2025-06-30", "val": 24000000000, "accn": "0000950170-25-100235", "fy": 2025, "fp": "FY", "form": "10-K", "filed": "2025-07-30"}
                    ]}
                }
            }
        }
    }"#;

    const IFRS_FACTS: &str = r#"{
        "cik": 1000184,
        "entityName": "SAP SE",
        "facts": {
            "ifrs-full": {
                "Revenue": {
                    "units": {"EUR": [
                        {"start": "2024-01-01", "end": "2024-12-31", "val": 34176000000, "accn": "0001104659-25-017581", "fy": 2024, "fp": "FY", "form": "20-F", "filed": "2025-02-27"}
                    ]}
                },
                "Assets": {
                    "units": {"EUR": [
                        {"end": "2024-12-31", "val": 74050000000, "accn": "0001104659-25-017581", "fy": 2024, "fp": "FY", "form": "20-F", "filed": "2025-02-27"}
                    ]}
                }
            }
        }
    }"#;

    fn parse(json: &str) -> CompanyFacts {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_provider_name() {
        let provider = EdgarProvider::new("Test/1.0 (test@example.com)").unwrap();
        assert_eq!(provider.name(), "SEC EDGAR");
    }

    #[test]
    fn test_cik_padding() {
        let cik = "789019";
        let padded = format!("{cik:0>10}");
        assert_eq!(padded, "0000789019");
    }

    #[test]
    fn test_us_gaap_periods_by_accession() {
        let facts = parse(MSFT_FACTS);
        let set = statements_from_facts(&Ticker::new("MSFT"), "0000789019", &facts, 5);

        assert_eq!(set.accounting_standard, AccountingStandard::UsGaap);
        assert_eq!(set.currency.as_deref(), Some("USD"));
        assert_eq!(set.periods.len(), 2);

        let latest = &set.periods[0];
        assert_eq!(latest.label, "FY2025");
        assert_eq!(latest.period_end, NaiveDate::from_ymd_opt(2025, 6, 30));
        // Full-year value wins over the fourth-quarter and prior-year comparatives.
        assert_eq!(
            latest.income_statement["us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax"],
            281_724_000_000.0
        );
        assert_eq!(latest.balance_sheet["us-gaap:Assets"], 619_003_000_000.0);
        assert_eq!(latest.income_statement["us-gaap:EarningsPerShareDiluted"], 13.64);
        // Unmapped tags are not returned.
        assert_eq!(latest.all_concepts().len(), 3);

        let filing = latest.filing.as_ref().unwrap();
        assert_eq!(filing.form_type, FormType::TenK);
        assert_eq!(filing.accession_number.as_deref(), Some("0000950170-25-100235"));
        assert_eq!(filing.company_name.as_deref(), Some("MICROSOFT CORPORATION"));
        assert!(!filing.is_foreign);

        assert_eq!(set.periods[1].label, "FY2024");
        assert!(set.periods[1].statement(StatementKind::CashFlow).is_empty());
    }

    #[test]
    fn test_period_limit() {
        let facts = parse(MSFT_FACTS);
        let set = statements_from_facts(&Ticker::new("MSFT"), "0000789019", &facts, 1);
        assert_eq!(set.periods.len(), 1);
        assert_eq!(set.periods[0].label, "FY2025");
    }

    #[test]
    fn test_ifrs_detection() {
        let facts = parse(IFRS_FACTS);
        let set = statements_from_facts(&Ticker::new("SAP"), "0001000184", &facts, 3);

        assert_eq!(set.accounting_standard, AccountingStandard::Ifrs);
        assert_eq!(set.currency.as_deref(), Some("EUR"));
        let period = &set.periods[0];
        assert_eq!(period.income_statement["ifrs-full:Revenue"], 34_176_000_000.0);
        let filing = period.filing.as_ref().unwrap();
        assert_eq!(filing.form_type, FormType::TwentyF);
        assert!(filing.is_foreign);
        assert_eq!(filing.accounting_standard, AccountingStandard::Ifrs);
    }
}
