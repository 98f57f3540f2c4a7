//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use filings::{
    AccountingStandard, DimensionalFacts, FilingMetadata, FilingsError, FormType, LineItem,
    Result, StatementKind, StatementPeriod, StatementProvider, StatementSet, Ticker,
    provider::{CONCEPT_COLUMN, PERIOD_END_COLUMN, PERIOD_START_COLUMN, VALUE_COLUMN},
};
use polars::prelude::{Column, DataFrame};

pub const BUSINESS_AXIS: &str = "us-gaap:StatementBusinessSegmentsAxis";
pub const GEO_AXIS: &str = "srt:StatementGeographicalAxis";
pub const MSFT_REVENUE_TAG: &str = "us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax";
pub const MSFT_REVENUE: f64 = 281_724_000_000.0;

/// Provider serving canned data per ticker. Unknown tickers fail with a network error.
#[derive(Debug, Default)]
pub struct MockProvider {
    statements: HashMap<String, StatementSet>,
    facts: HashMap<String, DimensionalFacts>,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statements(mut self, ticker: &str, set: StatementSet) -> Self {
        self.statements.insert(ticker.to_string(), set);
        self
    }

    pub fn with_facts(mut self, ticker: &str, facts: DimensionalFacts) -> Self {
        self.facts.insert(ticker.to_string(), facts);
        self
    }

    /// Sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl StatementProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_statements(&self, ticker: &Ticker, periods: usize) -> Result<StatementSet> {
        self.wait().await;
        let mut set = self
            .statements
            .get(ticker.as_str())
            .cloned()
            .ok_or_else(|| FilingsError::Network(format!("503 for {ticker}")))?;
        set.periods.truncate(periods);
        Ok(set)
    }

    async fn fetch_dimensional_facts(
        &self,
        ticker: &Ticker,
        _period_index: usize,
    ) -> Result<DimensionalFacts> {
        self.wait().await;
        self.facts
            .get(ticker.as_str())
            .cloned()
            .ok_or_else(|| FilingsError::Network(format!("503 for {ticker}")))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn msft_filing() -> FilingMetadata {
    FilingMetadata::new(Ticker::new("MSFT"), FormType::TenK, date(2025, 7, 30))
        .with_cik("0000789019")
        .with_company_name("MICROSOFT CORP")
        .with_accession_number("0000950170-25-100235")
        .with_fiscal_period(2025, "FY")
        .with_period_end(date(2025, 6, 30))
}

/// Microsoft fiscal 2025 (10-K, period ended 2025-06-30).
pub fn msft_period() -> StatementPeriod {
    const M: f64 = 1_000_000.0;
    StatementPeriod::new("FY2025", Some(date(2025, 6, 30)))
        .with_filing(msft_filing())
        .with_value(StatementKind::IncomeStatement, MSFT_REVENUE_TAG, MSFT_REVENUE)
        .with_value(StatementKind::IncomeStatement, "us-gaap:NetIncomeLoss", 101_832.0 * M)
        .with_value(StatementKind::IncomeStatement, "us-gaap:OperatingIncomeLoss", 128_528.0 * M)
        .with_value(StatementKind::BalanceSheet, "us-gaap:Assets", 619_003.0 * M)
        .with_value(StatementKind::BalanceSheet, "us-gaap:Liabilities", 275_524.0 * M)
        .with_value(StatementKind::BalanceSheet, "us-gaap:StockholdersEquity", 343_479.0 * M)
        .with_value(StatementKind::BalanceSheet, "us-gaap:AssetsCurrent", 191_131.0 * M)
        .with_value(StatementKind::BalanceSheet, "us-gaap:LiabilitiesCurrent", 141_218.0 * M)
        .with_value(
            StatementKind::BalanceSheet,
            "us-gaap:CashAndCashEquivalentsAtCarryingValue",
            30_242.0 * M,
        )
        .with_value(StatementKind::BalanceSheet, "us-gaap:InventoryNet", 938.0 * M)
}

pub fn msft_statements() -> StatementSet {
    StatementSet::new(AccountingStandard::UsGaap)
        .with_currency("USD")
        .with_period(msft_period())
}

/// One dimensional revenue fact.
#[derive(Clone, Debug)]
pub struct FactRow {
    pub concept: &'static str,
    pub value: Option<f64>,
    pub period_start: &'static str,
    pub period_end: &'static str,
    pub business: Option<&'static str>,
    pub geographic: Option<&'static str>,
}

impl FactRow {
    pub fn revenue(value: f64) -> Self {
        Self {
            concept: MSFT_REVENUE_TAG,
            value: Some(value),
            period_start: "2024-07-01",
            period_end: "2025-06-30",
            business: None,
            geographic: None,
        }
    }

    pub fn business(mut self, member: &'static str) -> Self {
        self.business = Some(member);
        self
    }

    pub fn geographic(mut self, member: &'static str) -> Self {
        self.geographic = Some(member);
        self
    }
}

/// MSFT fiscal 2025 revenue facts, with prior-year and quarterly noise.
pub fn msft_fact_rows() -> Vec<FactRow> {
    vec![
        FactRow::revenue(MSFT_REVENUE),
        FactRow::revenue(120_810_000_000.0).business("msft:ProductivityAndBusinessProcessesMember"),
        FactRow::revenue(106_265_000_000.0).business("msft:IntelligentCloudMember"),
        FactRow::revenue(54_649_000_000.0).business("msft:MorePersonalComputingMember"),
        FactRow::revenue(144_546_000_000.0).geographic("country:US"),
        FactRow::revenue(137_178_000_000.0).geographic("us-gaap:NonUsMember"),
        FactRow {
            period_start: "2023-07-01",
            period_end: "2024-06-30",
            ..FactRow::revenue(245_122_000_000.0)
        },
        FactRow {
            period_start: "2025-04-01",
            ..FactRow::revenue(76_441_000_000.0)
        },
        FactRow {
            period_start: "2025-04-01",
            ..FactRow::revenue(29_880_000_000.0).business("msft:IntelligentCloudMember")
        },
    ]
}

pub fn fact_table(rows: &[FactRow]) -> DataFrame {
    DataFrame::new(vec![
        Column::new(
            CONCEPT_COLUMN.into(),
            rows.iter().map(|r| r.concept).collect::<Vec<_>>(),
        ),
        Column::new(
            VALUE_COLUMN.into(),
            rows.iter().map(|r| r.value).collect::<Vec<_>>(),
        ),
        Column::new(
            PERIOD_START_COLUMN.into(),
            rows.iter().map(|r| r.period_start).collect::<Vec<_>>(),
        ),
        Column::new(
            PERIOD_END_COLUMN.into(),
            rows.iter().map(|r| r.period_end).collect::<Vec<_>>(),
        ),
        Column::new(
            BUSINESS_AXIS.into(),
            rows.iter().map(|r| r.business).collect::<Vec<_>>(),
        ),
        Column::new(
            GEO_AXIS.into(),
            rows.iter().map(|r| r.geographic).collect::<Vec<_>>(),
        ),
    ])
    .unwrap()
}

pub fn msft_facts(rows: &[FactRow]) -> DimensionalFacts {
    DimensionalFacts::new(AccountingStandard::UsGaap, fact_table(rows))
        .with_filing(msft_filing())
        .with_currency("USD")
}

pub fn sap_filing(period_end: NaiveDate) -> FilingMetadata {
    FilingMetadata::new(Ticker::new("SAP"), FormType::TwentyF, date(2025, 2, 27))
        .with_standard(AccountingStandard::Ifrs)
        .with_company_name("SAP SE")
        .with_fiscal_period(2024, "FY")
        .with_period_end(period_end)
}

/// SAP balance sheet line items (EUR millions).
pub fn sap_balance_sheet() -> Vec<LineItem> {
    vec![
        LineItem::header("ifrs-full:StatementOfFinancialPositionAbstract", "Balance sheet"),
        LineItem::new("ifrs-full:Assets", 74_119.0)
            .with_label("Total assets")
            .with_currency("EUR"),
        LineItem::new("ifrs-full:Liabilities", 30_811.0)
            .with_label("Total liabilities")
            .with_currency("EUR"),
        LineItem::new("ifrs-full:Equity", 43_308.0)
            .with_label("Total equity")
            .with_currency("EUR"),
        LineItem::new("ifrs-full:CurrentLiabilities", 18_430.0)
            .with_label("Current liabilities")
            .with_currency("EUR"),
    ]
}

/// SAP statements as the live provider reports them: income statement only.
pub fn sap_income_only(period_end: NaiveDate) -> StatementSet {
    StatementSet::new(AccountingStandard::Ifrs)
        .with_currency("EUR")
        .with_period(
            StatementPeriod::new("FY2024", Some(period_end))
                .with_value(StatementKind::IncomeStatement, "ifrs-full:Revenue", 34_176.0)
                .with_value(StatementKind::IncomeStatement, "ifrs-full:ProfitLoss", 3_150.0),
        )
}
