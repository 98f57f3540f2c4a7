//! Canonical metrics and their US-GAAP / IFRS concept aliases.
//!
//! Filers tag semantically equivalent facts differently depending on their
//! taxonomy and on company practice. This module maps each [`CanonicalMetric`] to
//! an ordered list of namespace-qualified candidate tags per
//! [`AccountingStandard`]; earlier candidates win when several are reported.
//!
//! Tags can be given namespace-qualified (`us-gaap:Revenues`), in the underscore
//! form used by some fact tables (`us-gaap_Revenues`), or bare (`Revenues`).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{FilingsError, Result};
use crate::types::{AccountingStandard, StatementKind};

/// Version of the compiled-in concept map.
pub const CONCEPT_MAP_VERSION: &str = "2025.1";

/// Namespaces recognised in the underscore tag form.
const KNOWN_NAMESPACES: &[&str] = &["us-gaap", "ifrs-full", "srt", "dei", "country"];

/// A financial metric independent of any taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalMetric {
    /// Total revenue.
    Revenue,
    /// Cost of revenue (COGS).
    CostOfRevenue,
    /// Gross profit.
    GrossProfit,
    /// Operating income.
    OperatingIncome,
    /// Net income.
    NetIncome,
    /// Total assets.
    TotalAssets,
    /// Current assets.
    CurrentAssets,
    /// Cash and cash equivalents.
    CashAndEquivalents,
    /// Inventory.
    Inventory,
    /// Accounts receivable.
    AccountsReceivable,
    /// Total liabilities.
    TotalLiabilities,
    /// Current liabilities.
    CurrentLiabilities,
    /// Long-term debt.
    LongTermDebt,
    /// Stockholders' equity.
    StockholdersEquity,
    /// Operating cash flow.
    OperatingCashFlow,
    /// Capital expenditures.
    CapitalExpenditures,
    /// Basic earnings per share.
    EpsBasic,
    /// Diluted earnings per share.
    EpsDiluted,
}

impl CanonicalMetric {
    /// Every canonical metric.
    pub const ALL: [Self; 18] = [
        Self::Revenue,
        Self::CostOfRevenue,
        Self::GrossProfit,
        Self::OperatingIncome,
        Self::NetIncome,
        Self::TotalAssets,
        Self::CurrentAssets,
        Self::CashAndEquivalents,
        Self::Inventory,
        Self::AccountsReceivable,
        Self::TotalLiabilities,
        Self::CurrentLiabilities,
        Self::LongTermDebt,
        Self::StockholdersEquity,
        Self::OperatingCashFlow,
        Self::CapitalExpenditures,
        Self::EpsBasic,
        Self::EpsDiluted,
    ];

    /// Metrics whose absence triggers a cache fallback.
    pub const CORE: [Self; 5] = [
        Self::Revenue,
        Self::NetIncome,
        Self::TotalAssets,
        Self::TotalLiabilities,
        Self::StockholdersEquity,
    ];

    /// Returns the canonical snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::CostOfRevenue => "cost_of_revenue",
            Self::GrossProfit => "gross_profit",
            Self::OperatingIncome => "operating_income",
            Self::NetIncome => "net_income",
            Self::TotalAssets => "total_assets",
            Self::CurrentAssets => "current_assets",
            Self::CashAndEquivalents => "cash_and_equivalents",
            Self::Inventory => "inventory",
            Self::AccountsReceivable => "accounts_receivable",
            Self::TotalLiabilities => "total_liabilities",
            Self::CurrentLiabilities => "current_liabilities",
            Self::LongTermDebt => "long_term_debt",
            Self::StockholdersEquity => "stockholders_equity",
            Self::OperatingCashFlow => "operating_cash_flow",
            Self::CapitalExpenditures => "capital_expenditures",
            Self::EpsBasic => "eps_basic",
            Self::EpsDiluted => "eps_diluted",
        }
    }

    /// Returns the statement this metric is reported on.
    #[must_use]
    pub const fn statement_kind(&self) -> StatementKind {
        match self {
            Self::TotalAssets
            | Self::CurrentAssets
            | Self::CashAndEquivalents
            | Self::Inventory
            | Self::AccountsReceivable
            | Self::TotalLiabilities
            | Self::CurrentLiabilities
            | Self::LongTermDebt
            | Self::StockholdersEquity => StatementKind::BalanceSheet,
            Self::Revenue
            | Self::CostOfRevenue
            | Self::GrossProfit
            | Self::OperatingIncome
            | Self::NetIncome
            | Self::EpsBasic
            | Self::EpsDiluted => StatementKind::IncomeStatement,
            Self::OperatingCashFlow | Self::CapitalExpenditures => StatementKind::CashFlow,
        }
    }
}

impl fmt::Display for CanonicalMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalMetric {
    type Err = FilingsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == needle)
            .ok_or_else(|| FilingsError::InvalidParameter(format!("Unknown metric: {s}")))
    }
}

/// Returns the ordered candidate tags for a metric under a standard.
///
/// An empty slice means the metric has no known mapping for that standard.
#[must_use]
pub const fn candidate_tags(
    metric: CanonicalMetric,
    standard: AccountingStandard,
) -> &'static [&'static str] {
    match standard {
        AccountingStandard::UsGaap => us_gaap_tags(metric),
        AccountingStandard::Ifrs => ifrs_tags(metric),
    }
}

/// Resolves a canonical metric name to its ordered candidate tags.
///
/// Unknown names resolve to an empty list.
#[must_use]
pub fn resolve(canonical_name: &str, standard: AccountingStandard) -> Vec<&'static str> {
    canonical_name
        .parse::<CanonicalMetric>()
        .map(|metric| candidate_tags(metric, standard).to_vec())
        .unwrap_or_default()
}

/// Like [`resolve`], but reports a missing mapping as [`FilingsError::ConceptNotFound`].
///
/// # Errors
/// Returns `ConceptNotFound` if the name is unknown or has no tags under `standard`.
pub fn lookup(canonical_name: &str, standard: AccountingStandard) -> Result<Vec<&'static str>> {
    let tags = resolve(canonical_name, standard);
    if tags.is_empty() {
        return Err(FilingsError::ConceptNotFound {
            metric: canonical_name.to_string(),
            standard,
        });
    }
    Ok(tags)
}

/// Splits a tag into its namespace (if any) and local name.
#[must_use]
pub fn split_tag(tag: &str) -> (Option<&str>, &str) {
    let tag = tag.trim();
    if let Some((ns, local)) = tag.split_once(':') {
        return (Some(ns), local);
    }
    for ns in KNOWN_NAMESPACES {
        if let Some(local) = tag
            .strip_prefix(ns)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return (Some(ns), local);
        }
    }
    (None, tag)
}

/// Returns the local (unqualified) name of a tag.
#[must_use]
pub fn local_name(tag: &str) -> &str {
    split_tag(tag).1
}

/// Returns true if `tag` denotes the same concept as `candidate`.
///
/// Local names must match exactly; namespaces must match when both are present.
#[must_use]
pub fn tag_matches(tag: &str, candidate: &str) -> bool {
    let (tag_ns, tag_local) = split_tag(tag);
    let (cand_ns, cand_local) = split_tag(candidate);
    if tag_local != cand_local {
        return false;
    }
    match (tag_ns, cand_ns) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => true,
    }
}

/// Returns the canonical metric a tag is a candidate for under `standard`.
#[must_use]
pub fn canonical_for(tag: &str, standard: AccountingStandard) -> Option<CanonicalMetric> {
    CanonicalMetric::ALL.into_iter().find(|metric| {
        candidate_tags(*metric, standard)
            .iter()
            .any(|candidate| tag_matches(tag, candidate))
    })
}

/// Picks the highest-priority candidate tag for `metric` among `available` tags.
///
/// Returns the matching entry of `available`, so the caller can filter on the
/// exact spelling the data source used.
#[must_use]
pub fn select_tag<'a>(
    metric: CanonicalMetric,
    standard: AccountingStandard,
    available: &[&'a str],
) -> Option<&'a str> {
    candidate_tags(metric, standard).iter().find_map(|candidate| {
        available
            .iter()
            .copied()
            .find(|tag| tag_matches(tag, candidate))
    })
}

/// One concept chosen for a canonical metric.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConcept {
    /// Tag the value was reported under.
    pub tag: String,
    /// Reported value.
    pub value: f64,
}

/// Result of mapping a concept→value table onto canonical metrics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedConcepts {
    /// Exactly one concept per metric that had a usable value.
    pub metrics: BTreeMap<CanonicalMetric, ResolvedConcept>,
    /// Concepts no canonical metric claims, in tag order, truncated to the limit.
    pub unrecognized: BTreeMap<String, f64>,
    /// Number of unrecognized concepts dropped by the limit.
    pub unrecognized_dropped: usize,
}

/// Maps reported concept values onto canonical metrics.
///
/// For each metric the highest-priority candidate with a finite value wins. Values
/// that are NaN or infinite are ignored. At most `max_unrecognized` unclaimed
/// concepts are kept.
#[must_use]
pub fn resolve_values(
    concepts: &BTreeMap<String, f64>,
    standard: AccountingStandard,
    max_unrecognized: usize,
) -> ResolvedConcepts {
    let mut resolved = ResolvedConcepts::default();

    for metric in CanonicalMetric::ALL {
        let found = candidate_tags(metric, standard)
            .iter()
            .find_map(|candidate| {
                concepts
                    .iter()
                    .find(|(tag, value)| value.is_finite() && tag_matches(tag, candidate))
            });
        if let Some((tag, value)) = found {
            resolved.metrics.insert(
                metric,
                ResolvedConcept {
                    tag: tag.clone(),
                    value: *value,
                },
            );
        }
    }

    let claimed: BTreeSet<&str> = concepts
        .keys()
        .filter(|tag| canonical_for(tag, standard).is_some())
        .map(String::as_str)
        .collect();

    for (tag, value) in concepts {
        if claimed.contains(tag.as_str()) || !value.is_finite() {
            continue;
        }
        if resolved.unrecognized.len() < max_unrecognized {
            resolved.unrecognized.insert(tag.clone(), *value);
        } else {
            resolved.unrecognized_dropped += 1;
        }
    }

    resolved
}

const fn us_gaap_tags(metric: CanonicalMetric) -> &'static [&'static str] {
    match metric {
        CanonicalMetric::Revenue => &[
            "us-gaap:Revenues",
            "us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax",
            "us-gaap:SalesRevenueNet",
            "us-gaap:RevenueFromContractWithCustomerIncludingAssessedTax",
        ],
        CanonicalMetric::CostOfRevenue => &[
            "us-gaap:CostOfRevenue",
            "us-gaap:CostOfGoodsAndServicesSold",
            "us-gaap:CostOfGoodsSold",
        ],
        CanonicalMetric::GrossProfit => &["us-gaap:GrossProfit"],
        CanonicalMetric::OperatingIncome => &["us-gaap:OperatingIncomeLoss"],
        CanonicalMetric::NetIncome => &[
            "us-gaap:NetIncomeLoss",
            "us-gaap:ProfitLoss",
            "us-gaap:NetIncomeLossAvailableToCommonStockholdersBasic",
        ],
        CanonicalMetric::TotalAssets => &["us-gaap:Assets"],
        CanonicalMetric::CurrentAssets => &["us-gaap:AssetsCurrent"],
        CanonicalMetric::CashAndEquivalents => &[
            "us-gaap:CashAndCashEquivalentsAtCarryingValue",
            "us-gaap:Cash",
            "us-gaap:CashCashEquivalentsAndShortTermInvestments",
        ],
        CanonicalMetric::Inventory => &["us-gaap:InventoryNet", "us-gaap:InventoryGross"],
        CanonicalMetric::AccountsReceivable => &[
            "us-gaap:AccountsReceivableNetCurrent",
            "us-gaap:AccountsReceivableNet",
            "us-gaap:ReceivablesNetCurrent",
        ],
        CanonicalMetric::TotalLiabilities => &["us-gaap:Liabilities"],
        CanonicalMetric::CurrentLiabilities => &["us-gaap:LiabilitiesCurrent"],
        CanonicalMetric::LongTermDebt => &[
            "us-gaap:LongTermDebtNoncurrent",
            "us-gaap:LongTermDebt",
            "us-gaap:LongTermDebtAndCapitalLeaseObligations",
        ],
        CanonicalMetric::StockholdersEquity => &[
            "us-gaap:StockholdersEquity",
            "us-gaap:StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest",
        ],
        CanonicalMetric::OperatingCashFlow => &[
            "us-gaap:NetCashProvidedByUsedInOperatingActivities",
            "us-gaap:NetCashProvidedByUsedInOperatingActivitiesContinuingOperations",
        ],
        CanonicalMetric::CapitalExpenditures => &[
            "us-gaap:PaymentsToAcquirePropertyPlantAndEquipment",
            "us-gaap:PaymentsToAcquireProductiveAssets",
        ],
        CanonicalMetric::EpsBasic => &["us-gaap:EarningsPerShareBasic"],
        CanonicalMetric::EpsDiluted => &["us-gaap:EarningsPerShareDiluted"],
    }
}

const fn ifrs_tags(metric: CanonicalMetric) -> &'static [&'static str] {
    match metric {
        CanonicalMetric::Revenue => &[
            "ifrs-full:Revenue",
            "ifrs-full:RevenueFromContractsWithCustomers",
        ],
        CanonicalMetric::CostOfRevenue => &["ifrs-full:CostOfSales"],
        CanonicalMetric::GrossProfit => &["ifrs-full:GrossProfit"],
        CanonicalMetric::OperatingIncome => &["ifrs-full:ProfitLossFromOperatingActivities"],
        CanonicalMetric::NetIncome => &[
            "ifrs-full:ProfitLoss",
            "ifrs-full:ProfitLossAttributableToOwnersOfParent",
        ],
        CanonicalMetric::TotalAssets => &["ifrs-full:Assets"],
        CanonicalMetric::CurrentAssets => &["ifrs-full:CurrentAssets"],
        CanonicalMetric::CashAndEquivalents => &["ifrs-full:CashAndCashEquivalents"],
        CanonicalMetric::Inventory => &["ifrs-full:Inventories"],
        CanonicalMetric::AccountsReceivable => &[
            "ifrs-full:TradeAndOtherCurrentReceivables",
            "ifrs-full:CurrentTradeReceivables",
        ],
        CanonicalMetric::TotalLiabilities => &["ifrs-full:Liabilities"],
        CanonicalMetric::CurrentLiabilities => &["ifrs-full:CurrentLiabilities"],
        CanonicalMetric::LongTermDebt => &[
            "ifrs-full:NoncurrentPortionOfNoncurrentBorrowings",
            "ifrs-full:LongtermBorrowings",
        ],
        CanonicalMetric::StockholdersEquity => &[
            "ifrs-full:EquityAttributableToOwnersOfParent",
            "ifrs-full:Equity",
        ],
        CanonicalMetric::OperatingCashFlow => &["ifrs-full:CashFlowsFromUsedInOperatingActivities"],
        CanonicalMetric::CapitalExpenditures => {
            &["ifrs-full:PurchaseOfPropertyPlantAndEquipmentClassifiedAsInvestingActivities"]
        }
        CanonicalMetric::EpsBasic => &["ifrs-full:BasicEarningsLossPerShare"],
        CanonicalMetric::EpsDiluted => &["ifrs-full:DilutedEarningsLossPerShare"],
    }
}
