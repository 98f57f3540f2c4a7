//! Revenue segment extraction and reconciliation.
//!
//! [`SegmentExtractor`] reads one filing's dimensional-fact table, picks the
//! revenue concept that carries segment rows, and splits its latest-period
//! facts into business, geographic and product segments. Rows without any
//! dimension member carry the consolidated total that the segments are
//! reconciled against.

use chrono::NaiveDate;
use filings_core::{
    CanonicalMetric, DimensionalFacts, FilingsError, Provenance, Result, SegmentFact,
    SegmentType, concepts,
    provider::{CONCEPT_COLUMN, PERIOD_END_COLUMN, PERIOD_START_COLUMN, VALUE_COLUMN},
};
use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Default relative reconciliation tolerance (0.1%).
pub const DEFAULT_TOLERANCE: f64 = 0.001;

/// Metric name stored with segment facts.
pub const REVENUE_METRIC: &str = "revenue";

/// One segment of a breakdown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentEntry {
    /// Cleaned member name, e.g. `IntelligentCloud`.
    pub name: String,
    /// Segment revenue.
    pub value: f64,
    /// Share of the consolidated total, in percent.
    pub percentage_of_total: Option<f64>,
}

/// Why a breakdown has no segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentReason {
    /// The filing reports no dimensional facts.
    NoDimensionalData,
    /// No revenue concept of the filing's standard appears in the facts.
    NoRevenueFacts,
}

/// Outcome of checking one segment type against the consolidated total.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentReconciliation {
    /// Segment type checked.
    pub segment_type: SegmentType,
    /// Sum of the segment values.
    pub segment_sum: f64,
    /// Consolidated total.
    pub total: f64,
    /// `|sum - total| / total`.
    pub deviation: f64,
    /// Whether the deviation is below the tolerance. An exact match always is.
    pub within_tolerance: bool,
}

/// Revenue segments of one filing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentBreakdown {
    /// Business (operating) segments.
    pub business_segments: Vec<SegmentEntry>,
    /// Geographic segments.
    pub geographic_segments: Vec<SegmentEntry>,
    /// Product or service lines.
    pub product_segments: Vec<SegmentEntry>,
    /// Consolidated revenue the segments were reconciled against.
    pub total_revenue: Option<f64>,
    /// Revenue concept the segments were read from.
    pub revenue_concept: Option<String>,
    /// Period end of the extracted facts.
    pub period_end: Option<NaiveDate>,
    /// Reporting currency.
    pub currency: Option<String>,
    /// True when a total exists and every non-empty segment type reconciles.
    pub reconciled: bool,
    /// Per-type reconciliation results.
    pub reconciliation: Vec<SegmentReconciliation>,
    /// Rows skipped as malformed.
    pub skipped_rows: usize,
    /// Why no segments were extracted, if none were.
    pub reason: Option<SegmentReason>,
    /// Non-fatal problems met during extraction.
    pub warnings: Vec<FilingsError>,
    /// Where the breakdown came from.
    pub provenance: Provenance,
}

impl SegmentBreakdown {
    /// Creates an empty breakdown.
    #[must_use]
    pub const fn empty(provenance: Provenance) -> Self {
        Self {
            business_segments: Vec::new(),
            geographic_segments: Vec::new(),
            product_segments: Vec::new(),
            total_revenue: None,
            revenue_concept: None,
            period_end: None,
            currency: None,
            reconciled: false,
            reconciliation: Vec::new(),
            skipped_rows: 0,
            reason: None,
            warnings: Vec::new(),
            provenance,
        }
    }

    /// Segments of one type.
    #[must_use]
    pub fn segments(&self, segment_type: SegmentType) -> &[SegmentEntry] {
        match segment_type {
            SegmentType::Business => &self.business_segments,
            SegmentType::Geographic => &self.geographic_segments,
            SegmentType::Product => &self.product_segments,
        }
    }

    fn segments_mut(&mut self, segment_type: SegmentType) -> &mut Vec<SegmentEntry> {
        match segment_type {
            SegmentType::Business => &mut self.business_segments,
            SegmentType::Geographic => &mut self.geographic_segments,
            SegmentType::Product => &mut self.product_segments,
        }
    }

    /// Returns true if no segment of any type was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        SegmentType::ALL
            .iter()
            .all(|t| self.segments(*t).is_empty())
    }

    /// Segments of one type as storable facts.
    #[must_use]
    pub fn to_facts(&self, segment_type: SegmentType) -> Vec<SegmentFact> {
        self.segments(segment_type)
            .iter()
            .map(|entry| SegmentFact {
                segment_type,
                segment_name: entry.name.clone(),
                metric_name: REVENUE_METRIC.to_string(),
                metric_value: entry.value,
                currency: self.currency.clone(),
                percentage_of_total: entry.percentage_of_total,
            })
            .collect()
    }

    /// Rebuilds a breakdown from stored facts.
    ///
    /// Only revenue facts are used. Call [`SegmentExtractor::reconcile_breakdown`]
    /// afterwards to check it against a total.
    #[must_use]
    pub fn from_facts(facts: &[SegmentFact], provenance: Provenance) -> Self {
        let mut breakdown = Self::empty(provenance);
        for fact in facts.iter().filter(|f| f.metric_name == REVENUE_METRIC) {
            if breakdown.currency.is_none() {
                breakdown.currency = fact.currency.clone();
            }
            breakdown.segments_mut(fact.segment_type).push(SegmentEntry {
                name: fact.segment_name.clone(),
                value: fact.metric_value,
                percentage_of_total: fact.percentage_of_total,
            });
        }
        breakdown
    }
}

/// Strips the namespace and a trailing `Member` from a dimension member.
///
/// Returns `None` when nothing usable remains: the result must be non-empty and
/// alphanumeric.
///
/// ```
/// use filings::segments::clean_member;
///
/// assert_eq!(clean_member("msft:IntelligentCloudMember").as_deref(), Some("IntelligentCloud"));
/// assert_eq!(clean_member("country:US").as_deref(), Some("US"));
/// assert_eq!(clean_member("us-gaap:Member"), None);
/// ```
#[must_use]
pub fn clean_member(member: &str) -> Option<String> {
    let local = member
        .trim()
        .rsplit_once(':')
        .map_or(member.trim(), |(_, local)| local);
    let name = local.strip_suffix("Member").unwrap_or(local);
    (!name.is_empty() && name.chars().all(char::is_alphanumeric)).then(|| name.to_string())
}

/// Classifies a dimension axis column by its name.
///
/// Accepts qualified (`srt:StatementGeographicalAxis`), underscore
/// (`us-gaap_StatementBusinessSegmentsAxis`) and `dim_`-prefixed forms.
#[must_use]
pub fn classify_axis(column: &str) -> Option<SegmentType> {
    let name = column.strip_prefix("dim_").unwrap_or(column);
    let local = concepts::local_name(name);
    if local.ends_with("SegmentsAxis") {
        Some(SegmentType::Business)
    } else if local.ends_with("StatementGeographicalAxis") || local.ends_with("GeographicalAreasAxis")
    {
        Some(SegmentType::Geographic)
    } else if local.ends_with("ProductOrServiceAxis") || local.ends_with("ProductsAndServicesAxis")
    {
        Some(SegmentType::Product)
    } else {
        None
    }
}

fn polars_err(e: polars::error::PolarsError) -> FilingsError {
    FilingsError::Parse(e.to_string())
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(polars_err)?
        .cast(&DataType::String)
        .map_err(polars_err)?;
    let values = column.str().map_err(polars_err)?;
    Ok(values
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
        .collect())
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(polars_err)?
        .cast(&DataType::Float64)
        .map_err(polars_err)?;
    let values = column.f64().map_err(polars_err)?;
    Ok(values.into_iter().collect())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

type AxisColumn = (Option<SegmentType>, Vec<Option<String>>);

/// Axes with a member on row `index`.
fn populated_axes(axes: &[AxisColumn], index: usize) -> Vec<(Option<SegmentType>, &str)> {
    axes.iter()
        .filter_map(|(kind, members)| members[index].as_deref().map(|m| (*kind, m)))
        .collect()
}

/// A revenue row that passed date parsing.
#[derive(Debug)]
struct RevenueRow<'a> {
    index: usize,
    concept: &'a str,
    value: Option<f64>,
    period_end: NaiveDate,
    period_start: Option<NaiveDate>,
}

/// Splits dimensional revenue facts into reconciled segment lists.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentExtractor {
    tolerance: f64,
}

impl Default for SegmentExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl SegmentExtractor {
    /// Creates an extractor with a relative reconciliation tolerance.
    #[must_use]
    pub const fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// The configured tolerance.
    #[must_use]
    pub const fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Checks a segment sum against a consolidated total.
    ///
    /// Returns `None` when the total is zero or not finite.
    #[must_use]
    pub fn reconcile(
        &self,
        segment_type: SegmentType,
        segments: &[SegmentEntry],
        total: f64,
    ) -> Option<SegmentReconciliation> {
        if total == 0.0 || !total.is_finite() {
            return None;
        }
        let segment_sum: f64 = segments.iter().map(|s| s.value).sum();
        let deviation = (segment_sum - total).abs() / total.abs();
        Some(SegmentReconciliation {
            segment_type,
            segment_sum,
            total,
            deviation,
            within_tolerance: deviation == 0.0 || deviation < self.tolerance,
        })
    }

    /// Fills percentages and reconciliation results of a breakdown against `total_revenue`.
    ///
    /// Mismatches are recorded as warnings; segments are kept either way.
    pub fn reconcile_breakdown(&self, breakdown: &mut SegmentBreakdown) {
        breakdown.reconciliation.clear();
        breakdown
            .warnings
            .retain(|w| !matches!(w, FilingsError::ReconciliationMismatch { .. }));

        let Some(total) = breakdown.total_revenue.filter(|t| t.is_finite() && *t != 0.0) else {
            breakdown.reconciled = false;
            return;
        };

        let mut reconciled = true;
        for segment_type in SegmentType::ALL {
            let segments = breakdown.segments_mut(segment_type);
            if segments.is_empty() {
                continue;
            }
            for entry in segments.iter_mut() {
                entry.percentage_of_total = Some(entry.value / total * 100.0);
            }
            let Some(result) = self.reconcile(segment_type, breakdown.segments(segment_type), total)
            else {
                continue;
            };
            if !result.within_tolerance {
                warn!(
                    segment_type = %segment_type,
                    deviation = result.deviation,
                    tolerance = self.tolerance,
                    "Segments do not reconcile with consolidated revenue"
                );
                breakdown
                    .warnings
                    .push(FilingsError::ReconciliationMismatch {
                        segment_type,
                        segment_sum: result.segment_sum,
                        total,
                        deviation: result.deviation,
                        tolerance: self.tolerance,
                    });
                reconciled = false;
            }
            breakdown.reconciliation.push(result);
        }
        breakdown.reconciled = reconciled && !breakdown.is_empty();
    }

    /// Extracts revenue segments from a dimensional-fact table.
    ///
    /// `fallback_total` is used for reconciliation when the table has no
    /// consolidated revenue row.
    ///
    /// # Errors
    /// Returns `Parse` if the table lacks the concept, value or period end columns.
    /// Problems with individual rows are reported as warnings instead.
    pub fn extract(
        &self,
        facts: &DimensionalFacts,
        fallback_total: Option<f64>,
    ) -> Result<SegmentBreakdown> {
        let mut breakdown = SegmentBreakdown::empty(Provenance::Primary);
        breakdown.currency = facts.currency.clone();
        let df = &facts.table;

        if df.height() == 0 {
            breakdown.reason = Some(SegmentReason::NoDimensionalData);
            return Ok(breakdown);
        }

        let column_names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let axis_columns: Vec<&String> = column_names
            .iter()
            .filter(|name| name.contains("Axis"))
            .collect();

        let concept_values = string_column(df, CONCEPT_COLUMN)?;
        let values = float_column(df, VALUE_COLUMN)?;
        let period_ends = string_column(df, PERIOD_END_COLUMN)?;
        let period_starts = if column_names.iter().any(|c| c == PERIOD_START_COLUMN) {
            Some(string_column(df, PERIOD_START_COLUMN)?)
        } else {
            None
        };
        let mut axes = Vec::with_capacity(axis_columns.len());
        for name in &axis_columns {
            axes.push((classify_axis(name), string_column(df, name)?));
        }

        let has_members = axes
            .iter()
            .any(|(_, members)| members.iter().any(Option::is_some));
        if !has_members {
            debug!("Fact table has no dimension members");
            breakdown.reason = Some(SegmentReason::NoDimensionalData);
            breakdown.total_revenue = fallback_total;
            return Ok(breakdown);
        }

        let standard = facts.accounting_standard;
        let candidates = concepts::candidate_tags(CanonicalMetric::Revenue, standard);

        let skip = |breakdown: &mut SegmentBreakdown, row: usize, reason: String| {
            trace!(row, %reason, "Skipping malformed row");
            breakdown.skipped_rows += 1;
            breakdown
                .warnings
                .push(FilingsError::MalformedDimensionRow { row, reason });
        };

        // 1. Revenue facts under any candidate tag.
        let mut rows = Vec::new();
        for (index, concept) in concept_values.iter().enumerate() {
            let Some(concept) = concept.as_deref() else {
                continue;
            };
            if !candidates.iter().any(|c| concepts::tag_matches(concept, c)) {
                continue;
            }
            let raw_end = period_ends[index].as_deref().unwrap_or_default();
            let Some(period_end) = parse_date(raw_end) else {
                skip(&mut breakdown, index, format!("invalid period end {raw_end:?}"));
                continue;
            };
            let period_start = period_starts
                .as_ref()
                .and_then(|starts| starts[index].as_deref())
                .and_then(parse_date);
            rows.push(RevenueRow {
                index,
                concept,
                value: values[index],
                period_end,
                period_start,
            });
        }

        // 2. Latest period end; among its rows the longest duration.
        let Some(latest) = rows.iter().map(|r| r.period_end).max() else {
            debug!(%standard, "No revenue concept in fact table");
            breakdown.reason = Some(SegmentReason::NoRevenueFacts);
            breakdown.total_revenue = fallback_total;
            return Ok(breakdown);
        };
        let earliest_start = rows
            .iter()
            .filter(|r| r.period_end == latest)
            .filter_map(|r| r.period_start)
            .min();
        breakdown.period_end = Some(latest);
        let current: Vec<&RevenueRow<'_>> = rows
            .iter()
            .filter(|r| {
                r.period_end == latest
                    && (earliest_start.is_none() || r.period_start == earliest_start)
            })
            .collect();

        // 3. The segmented concept may differ from the one carrying the total.
        let mut segmented = Vec::new();
        let mut totals = Vec::new();
        for row in &current {
            match populated_axes(&axes, row.index).as_slice() {
                [] if row.value.is_some_and(f64::is_finite) => totals.push(row.concept),
                [(Some(_), _)] => segmented.push(row.concept),
                _ => {}
            }
        }
        let total_tag = concepts::select_tag(CanonicalMetric::Revenue, standard, &totals);
        let Some(revenue_tag) =
            concepts::select_tag(CanonicalMetric::Revenue, standard, &segmented).or(total_tag)
        else {
            debug!("No single-axis or consolidated revenue rows");
            breakdown.reason = Some(SegmentReason::NoDimensionalData);
            breakdown.total_revenue = fallback_total;
            return Ok(breakdown);
        };
        breakdown.revenue_concept = Some(revenue_tag.to_string());

        // 4-5. Partition, clean and collapse.
        let mut consolidated: Option<f64> = None;
        for row in current.iter().filter(|r| r.concept == revenue_tag) {
            let populated = populated_axes(&axes, row.index);
            // Unclassified axis or a multi-axis breakdown.
            if !matches!(populated.as_slice(), [] | [(Some(_), _)]) {
                continue;
            }

            let Some(value) = row.value.filter(|v| v.is_finite()) else {
                skip(&mut breakdown, row.index, "missing or non-numeric value".to_string());
                continue;
            };

            match populated.as_slice() {
                [] => {
                    if consolidated.is_none() {
                        consolidated = Some(value);
                    }
                }
                [(Some(segment_type), member)] => {
                    let Some(name) = clean_member(member) else {
                        skip(&mut breakdown, row.index, format!("unusable member {member:?}"));
                        continue;
                    };
                    let segments = breakdown.segments_mut(*segment_type);
                    if segments.iter().any(|s| s.name == name) {
                        trace!(%name, "Duplicate segment fact collapsed");
                        continue;
                    }
                    segments.push(SegmentEntry {
                        name,
                        value,
                        percentage_of_total: None,
                    });
                }
                _ => {}
            }
        }
        if let (None, Some(tag)) = (consolidated, total_tag) {
            debug!(%tag, "Consolidated revenue taken from another concept");
            consolidated = current
                .iter()
                .filter(|r| r.concept == tag && populated_axes(&axes, r.index).is_empty())
                .find_map(|r| r.value.filter(|v| v.is_finite()));
        }

        // 6. Reconcile.
        breakdown.total_revenue = consolidated.or(fallback_total);
        if breakdown.is_empty() {
            breakdown.reason = Some(SegmentReason::NoDimensionalData);
        }
        self.reconcile_breakdown(&mut breakdown);

        debug!(
            business = breakdown.business_segments.len(),
            geographic = breakdown.geographic_segments.len(),
            product = breakdown.product_segments.len(),
            skipped = breakdown.skipped_rows,
            reconciled = breakdown.reconciled,
            "Extracted revenue segments"
        );
        Ok(breakdown)
    }
}
