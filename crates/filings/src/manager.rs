//! Dual-source metric resolution.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use filings_cache::InMemoryStore;
use filings_core::{
    AccountingStandard, CanonicalMetric, DimensionalFacts, Filing, FilingMetadata, FilingStore,
    FilingsError, FinancialMetrics, LineItem, PeriodMetrics, Provenance, Result, SegmentType,
    StatementKind, StatementPeriod, StatementProvider, StatementSet, Ticker, concepts,
};

use crate::config::ResolverConfig;
use crate::ratios::{self, CalculatedRatios};
use crate::segments::{SegmentBreakdown, SegmentExtractor};

/// Resolves normalized metrics, ratios and revenue segments for tickers.
///
/// The live provider is consulted first, bounded by the configured timeout. Core
/// metrics it leaves absent are completed from the filing store, and the store
/// serves alone when the provider is down. Values never come from anywhere else:
/// a metric neither source reports stays `None`.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use filings::{FilingsManager, SqliteStore, Ticker};
///
/// let manager = FilingsManager::new(Arc::new(SqliteStore::new("filings.db")?))
///     .with_edgar("MyApp/1.0 (contact@example.com)")?;
///
/// let metrics = manager.get_metrics(&Ticker::new("MSFT"), 3).await?;
/// println!("{:?} {:?}", metrics.provenance, metrics.missing_core);
/// ```
pub struct FilingsManager {
    provider: Option<Arc<dyn StatementProvider>>,
    store: Arc<dyn FilingStore>,
    config: ResolverConfig,
    extractor: SegmentExtractor,
}

impl std::fmt::Debug for FilingsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilingsManager")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

impl FilingsManager {
    /// Creates a manager over a filing store, without a live provider.
    #[must_use]
    pub fn new(store: Arc<dyn FilingStore>) -> Self {
        let config = ResolverConfig::default();
        Self {
            provider: None,
            store,
            extractor: SegmentExtractor::new(config.reconciliation_tolerance),
            config,
        }
    }

    /// Creates a manager over a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Sets the live statement provider.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn StatementProvider>) -> Self {
        debug!(provider = provider.name(), "Registering statement provider");
        self.provider = Some(provider);
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.extractor = SegmentExtractor::new(config.reconciliation_tolerance);
        self.config = config;
        self
    }

    /// Uses SEC EDGAR as the live provider.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[cfg(feature = "edgar")]
    pub fn with_edgar(self, user_agent: &str) -> Result<Self> {
        let provider = filings_edgar::EdgarProvider::new(user_agent)?;
        Ok(self.with_provider(Arc::new(provider)))
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The filing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn FilingStore> {
        &self.store
    }

    /// Resolves the most recent `periods` periods of normalized metrics.
    ///
    /// Provider failures and timeouts are reported in `warnings` and the store is
    /// used instead.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when `periods` is zero and `CacheMiss` when
    /// neither source has data for the ticker.
    #[instrument(skip(self), fields(ticker = %ticker))]
    pub async fn get_metrics(&self, ticker: &Ticker, periods: usize) -> Result<FinancialMetrics> {
        if periods == 0 {
            return Err(FilingsError::InvalidParameter(
                "periods must be at least 1".to_string(),
            ));
        }

        let mut warnings = Vec::new();
        let mut standard = None;
        let mut resolved: Vec<PeriodMetrics> = Vec::new();
        // Index into `set.periods` of each live entry in `resolved`.
        let mut live = Vec::new();

        let fetched = match self.fetch_statements(ticker, periods).await {
            Some(Ok(set)) => {
                standard = Some(set.accounting_standard);
                for (index, period) in set.periods.iter().take(periods).enumerate() {
                    let metrics = self.resolve_period(period, set.accounting_standard);
                    if metrics.values.is_empty() && metrics.provided_ratios.is_empty() {
                        debug!(period = %period.label, "Provider period has no usable values");
                        continue;
                    }
                    live.push(index);
                    resolved.push(metrics);
                }
                Some(set)
            }
            Some(Err(e)) => {
                warnings.push(e);
                None
            }
            None => {
                debug!("No provider configured, using cache only");
                None
            }
        };

        let needs_cache = resolved
            .first()
            .is_none_or(|p| !p.values.missing(&self.config.core_metrics).is_empty());

        if needs_cache {
            match resolved.first_mut() {
                Some(latest) => {
                    self.fill_from_cache(ticker, latest, true, &mut warnings)
                        .await;
                }
                None => {
                    let mut cached = PeriodMetrics::default();
                    let cache_standard = self
                        .fill_from_cache(ticker, &mut cached, false, &mut warnings)
                        .await;
                    if !cached.values.is_empty() {
                        standard = standard.or(cache_standard);
                        resolved.push(cached);
                    }
                }
            }
        }

        // Cached statements are read before provider statements are written over them.
        if let Some(set) = fetched.as_ref().filter(|_| self.config.write_through) {
            for (&index, metrics) in live.iter().zip(&resolved) {
                self.write_through(set, &set.periods[index], metrics).await;
            }
        }

        let sources = resolved.iter().flat_map(|p| {
            let ratios = (!p.provided_ratios.is_empty()).then_some(Provenance::Primary);
            p.sources.values().copied().chain(ratios)
        });
        let Some(provenance) = Provenance::combine(sources) else {
            return Err(FilingsError::CacheMiss(format!(
                "No statements for {ticker} from provider or cache"
            )));
        };

        let missing_core = resolved
            .first()
            .map(|p| p.values.missing(&self.config.core_metrics))
            .unwrap_or_default();
        if !missing_core.is_empty() {
            debug!(missing = ?missing_core, "Core metrics absent from both sources");
        }

        Ok(FinancialMetrics {
            ticker: ticker.clone(),
            accounting_standard: standard,
            provenance,
            periods: resolved,
            missing_core,
            warnings,
        })
    }

    /// Resolves several tickers concurrently.
    ///
    /// Each ticker gets its own result; one failure never aborts the others.
    pub async fn get_metrics_batch(
        &self,
        tickers: &[Ticker],
        periods: usize,
    ) -> Vec<(Ticker, Result<FinancialMetrics>)> {
        join_all(tickers.iter().map(|ticker| async move {
            (ticker.clone(), self.get_metrics(ticker, periods).await)
        }))
        .await
    }

    /// Calculates the ratios of the latest period and stores them with its filing.
    ///
    /// # Errors
    /// Returns the error of [`get_metrics`](Self::get_metrics) when no metrics
    /// can be resolved.
    #[instrument(skip(self), fields(ticker = %ticker))]
    pub async fn get_ratios(&self, ticker: &Ticker) -> Result<CalculatedRatios> {
        let metrics = self.get_metrics(ticker, 1).await?;
        let Some(latest) = metrics.latest() else {
            return Err(FilingsError::CacheMiss(format!("No periods for {ticker}")));
        };
        let ratios = ratios::calculate_all(latest);

        if self.config.write_through {
            if let Some(filing) = &latest.filing {
                if let Err(e) = self.persist_ratios(filing, &ratios).await {
                    warn!(error = %e, "Failed to store ratios");
                }
            }
        }
        Ok(ratios)
    }

    /// Extracts the revenue segments of the `period_index`-th most recent filing.
    ///
    /// When the provider is unavailable, stored segment facts are served instead
    /// with `Cache` provenance.
    ///
    /// # Errors
    /// Returns `CacheMiss` if the provider fails and nothing is stored, or `Parse`
    /// if the provider's fact table lacks a required column.
    #[instrument(skip(self), fields(ticker = %ticker))]
    pub async fn get_revenue_segments(
        &self,
        ticker: &Ticker,
        period_index: usize,
    ) -> Result<SegmentBreakdown> {
        let provider_error = match self.fetch_dimensional_facts(ticker, period_index).await {
            Some(Ok(facts)) => return self.extract_segments(ticker, period_index, &facts).await,
            Some(Err(e)) => Some(e),
            None => None,
        };
        self.cached_segments(ticker, period_index, provider_error)
            .await
    }

    async fn call_provider<T>(
        &self,
        provider: &dyn StatementProvider,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.config.provider_timeout();
        match timeout(limit, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(provider = provider.name(), error = %e, "Provider failed, using cache");
                Err(FilingsError::ProviderUnavailable {
                    provider: provider.name().to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    provider = provider.name(),
                    timeout_secs = limit.as_secs_f64(),
                    "Provider timed out, using cache"
                );
                Err(FilingsError::ProviderUnavailable {
                    provider: provider.name().to_string(),
                    reason: format!("timed out after {:.3}s", limit.as_secs_f64()),
                })
            }
        }
    }

    async fn fetch_statements(
        &self,
        ticker: &Ticker,
        periods: usize,
    ) -> Option<Result<StatementSet>> {
        let provider = self.provider.as_deref()?;
        debug!(provider = provider.name(), periods, "Fetching statements");
        Some(
            self.call_provider(provider, provider.fetch_statements(ticker, periods))
                .await,
        )
    }

    async fn fetch_dimensional_facts(
        &self,
        ticker: &Ticker,
        period_index: usize,
    ) -> Option<Result<DimensionalFacts>> {
        let provider = self.provider.as_deref()?;
        debug!(provider = provider.name(), period_index, "Fetching dimensional facts");
        Some(
            self.call_provider(provider, provider.fetch_dimensional_facts(ticker, period_index))
                .await,
        )
    }

    fn resolve_period(&self, period: &StatementPeriod, standard: AccountingStandard) -> PeriodMetrics {
        let resolved = concepts::resolve_values(
            &period.all_concepts(),
            standard,
            self.config.max_unrecognized_concepts,
        );
        if resolved.unrecognized_dropped > 0 {
            debug!(
                period = %period.label,
                dropped = resolved.unrecognized_dropped,
                "Unrecognized concepts over limit"
            );
        }

        let period_end = period
            .period_end
            .or_else(|| period.filing.as_ref().and_then(|f| f.period_end));
        let mut metrics = PeriodMetrics::new(period.label.clone(), period_end);
        metrics.filing = period.filing.clone();
        for (metric, concept) in resolved.metrics {
            metrics.record(metric, concept.value, Provenance::Primary, concept.tag);
        }
        metrics.provided_ratios = period
            .ratios
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(name, v)| (*name, *v))
            .collect();
        metrics.unrecognized = resolved.unrecognized;
        metrics
    }

    /// Fills absent metrics of `period` from cached line items.
    ///
    /// With `live` set the period comes from the provider and cached statements
    /// of another period end are ignored. Otherwise the period adopts the first
    /// cached filing found. Returns the standard of the cached filing used.
    async fn fill_from_cache(
        &self,
        ticker: &Ticker,
        period: &mut PeriodMetrics,
        live: bool,
        warnings: &mut Vec<FilingsError>,
    ) -> Option<AccountingStandard> {
        let mut used = None;

        for kind in StatementKind::ALL {
            let cached = match self.store.get_line_items(ticker, kind, None).await {
                Ok(Some(cached)) => cached,
                Ok(None) => continue,
                Err(e) => {
                    warn!(statement = %kind, error = %e, "Cache read failed");
                    warnings.push(e);
                    continue;
                }
            };
            let filing = &cached.filing.metadata;

            if !live && period.filing.is_none() {
                period.label = filing.period_label();
                period.period_end = filing.period_end;
                period.filing = Some(filing.clone());
            }
            if let (Some(expected), Some(actual)) = (period.period_end, filing.period_end) {
                if expected != actual {
                    debug!(
                        statement = %kind,
                        %expected,
                        %actual,
                        "Cached statement is for another period"
                    );
                    continue;
                }
            }

            let standard = filing.accounting_standard;
            used = Some(standard);
            for metric in CanonicalMetric::ALL {
                if metric.statement_kind() != kind || period.values.get(metric).is_some() {
                    continue;
                }
                let tags = concepts::candidate_tags(metric, standard);
                if tags.is_empty() {
                    warnings.push(FilingsError::ConceptNotFound {
                        metric: metric.as_str().to_string(),
                        standard,
                    });
                    continue;
                }
                if let Some((tag, value)) = find_value(&cached.items, tags) {
                    debug!(%metric, %tag, "Filled from cache");
                    period.record(metric, value, Provenance::Cache, tag);
                }
            }
        }

        used
    }

    async fn write_through(&self, set: &StatementSet, period: &StatementPeriod, metrics: &PeriodMetrics) {
        let Some(filing) = &period.filing else {
            return;
        };
        let mut filing = filing.clone().with_standard(set.accounting_standard);
        if filing.period_end.is_none() {
            filing.period_end = metrics.period_end;
        }
        let core = &self.config.core_metrics;
        if !core.is_empty() {
            let present = core.len() - metrics.values.missing(core).len();
            filing.data_quality_score = Some(present as f64 / core.len() as f64);
        }

        if let Err(e) = self
            .persist_period(&filing, period, set.currency.as_deref())
            .await
        {
            warn!(period = %period.label, error = %e, "Failed to cache provider statements");
        }
    }

    async fn persist_period(
        &self,
        filing: &FilingMetadata,
        period: &StatementPeriod,
        currency: Option<&str>,
    ) -> Result<()> {
        let id = self.store.upsert_filing(filing).await?;
        for kind in StatementKind::ALL {
            let statement = period.statement(kind);
            if statement.is_empty() {
                continue;
            }
            let mut items: Vec<LineItem> = statement
                .iter()
                .filter(|(_, v)| v.is_finite())
                .map(|(concept, value)| {
                    let item = LineItem::new(concept.clone(), *value);
                    match currency {
                        Some(currency) => item.with_currency(currency),
                        None => item,
                    }
                })
                .collect();

            // Stored items of this filing the provider did not report are kept.
            let stored = self
                .store
                .get_line_items(&filing.ticker, kind, Some(filing.filing_date))
                .await?
                .filter(|stored| stored.filing.id == id);
            if let Some(stored) = stored {
                let before = items.len();
                items.extend(
                    stored
                        .items
                        .into_iter()
                        .filter(|item| !statement.contains_key(&item.concept)),
                );
                if items.len() > before {
                    debug!(statement = %kind, kept = items.len() - before, "Merged with stored items");
                }
            }
            self.store.replace_line_items(id, kind, &items).await?;
        }
        for (name, value) in period.ratios.iter().filter(|(_, v)| v.is_finite()) {
            self.store
                .upsert_ratio(id, name.category(), name.as_str(), *value)
                .await?;
        }
        debug!(filing_id = %id, period = %period.label, "Cached provider statements");
        Ok(())
    }

    async fn persist_ratios(&self, filing: &FilingMetadata, ratios: &CalculatedRatios) -> Result<()> {
        let id = self.store.upsert_filing(filing).await?;
        for (name, ratio) in &ratios.values {
            self.store
                .upsert_ratio(id, name.category(), name.as_str(), ratio.value)
                .await?;
        }
        debug!(filing_id = %id, count = ratios.len(), "Stored ratios");
        Ok(())
    }

    async fn extract_segments(
        &self,
        ticker: &Ticker,
        period_index: usize,
        facts: &DimensionalFacts,
    ) -> Result<SegmentBreakdown> {
        let mut breakdown = self.extractor.extract(facts, None)?;

        if breakdown.total_revenue.is_none() && !breakdown.is_empty() {
            match self.get_metrics(ticker, period_index + 1).await {
                Ok(metrics) => {
                    let period = metrics
                        .periods
                        .iter()
                        .find(|p| breakdown.period_end.is_some() && p.period_end == breakdown.period_end)
                        .or_else(|| metrics.periods.get(period_index));
                    breakdown.total_revenue = period.and_then(|p| p.values.revenue);
                    self.extractor.reconcile_breakdown(&mut breakdown);
                }
                Err(e) => {
                    debug!(error = %e, "No normalized revenue to reconcile against");
                    breakdown.warnings.push(e);
                }
            }
        }

        if self.config.write_through && !breakdown.is_empty() {
            if let Some(filing) = &facts.filing {
                let mut filing = filing.clone().with_standard(facts.accounting_standard);
                if filing.period_end.is_none() {
                    filing.period_end = breakdown.period_end;
                }
                if let Err(e) = self.persist_segments(&filing, &breakdown).await {
                    warn!(error = %e, "Failed to store segment facts");
                }
            }
        }
        Ok(breakdown)
    }

    async fn persist_segments(&self, filing: &FilingMetadata, breakdown: &SegmentBreakdown) -> Result<()> {
        let id = self.store.upsert_filing(filing).await?;
        for segment_type in SegmentType::ALL {
            self.store
                .replace_segment_facts(id, segment_type, &breakdown.to_facts(segment_type))
                .await?;
        }
        debug!(filing_id = %id, "Stored segment facts");
        Ok(())
    }

    async fn cached_segments(
        &self,
        ticker: &Ticker,
        period_index: usize,
        provider_error: Option<FilingsError>,
    ) -> Result<SegmentBreakdown> {
        let mut remaining = period_index;
        for filing in self.store.list_filings(ticker).await? {
            let mut facts = Vec::new();
            for segment_type in SegmentType::ALL {
                facts.extend(self.store.get_segment_facts(filing.id, segment_type).await?);
            }
            if facts.is_empty() {
                continue;
            }
            if remaining > 0 {
                remaining -= 1;
                continue;
            }

            let mut breakdown = SegmentBreakdown::from_facts(&facts, Provenance::Cache);
            breakdown.period_end = filing.metadata.period_end;
            if let Some((tag, revenue)) = self.cached_revenue(ticker, &filing).await? {
                breakdown.revenue_concept = Some(tag);
                breakdown.total_revenue = Some(revenue);
            }
            self.extractor.reconcile_breakdown(&mut breakdown);
            if let Some(e) = provider_error {
                breakdown.warnings.insert(0, e);
            }
            debug!(filing_id = %filing.id, "Serving segments from cache");
            return Ok(breakdown);
        }

        Err(FilingsError::CacheMiss(format!(
            "No segment data for {ticker} at period index {period_index}"
        )))
    }

    /// Revenue of exactly this filing from its cached income statement.
    async fn cached_revenue(&self, ticker: &Ticker, filing: &Filing) -> Result<Option<(String, f64)>> {
        let cached = self
            .store
            .get_line_items(ticker, StatementKind::IncomeStatement, Some(filing.metadata.filing_date))
            .await?;
        Ok(cached
            .filter(|statement| statement.filing.id == filing.id)
            .and_then(|statement| {
                let tags = concepts::candidate_tags(
                    CanonicalMetric::Revenue,
                    filing.metadata.accounting_standard,
                );
                find_value(&statement.items, tags)
            }))
    }
}

/// First finite value among `items` for the highest-priority tag present.
fn find_value(items: &[LineItem], tags: &[&str]) -> Option<(String, f64)> {
    tags.iter().find_map(|tag| {
        items.iter().find_map(|item| {
            let value = item.value.filter(|v| v.is_finite())?;
            (!item.is_abstract && concepts::tag_matches(&item.concept, tag))
                .then(|| (item.concept.clone(), value))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use filings_core::{FormType, RatioName};

    #[derive(Debug, Default)]
    struct FixedProvider {
        set: Option<StatementSet>,
    }

    #[async_trait]
    impl StatementProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_statements(&self, _ticker: &Ticker, _periods: usize) -> Result<StatementSet> {
            self.set
                .clone()
                .ok_or_else(|| FilingsError::Network("connection refused".to_string()))
        }

        async fn fetch_dimensional_facts(
            &self,
            _ticker: &Ticker,
            _period_index: usize,
        ) -> Result<DimensionalFacts> {
            Err(FilingsError::NotSupported("no facts".to_string()))
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn filing() -> FilingMetadata {
        FilingMetadata::new(Ticker::new("ACME"), FormType::TenK, date(2025, 2, 20))
            .with_fiscal_period(2024, "FY")
            .with_period_end(date(2024, 12, 31))
    }

    fn full_period() -> StatementPeriod {
        StatementPeriod::new("FY2024", Some(date(2024, 12, 31)))
            .with_filing(filing())
            .with_value(StatementKind::IncomeStatement, "us-gaap:Revenues", 1_000.0)
            .with_value(StatementKind::IncomeStatement, "us-gaap:NetIncomeLoss", 100.0)
            .with_value(StatementKind::BalanceSheet, "us-gaap:Assets", 2_000.0)
            .with_value(StatementKind::BalanceSheet, "us-gaap:Liabilities", 1_200.0)
            .with_value(StatementKind::BalanceSheet, "us-gaap:StockholdersEquity", 800.0)
            .with_value(StatementKind::BalanceSheet, "us-gaap:AssetsCurrent", f64::NAN)
            .with_ratio(RatioName::CurrentRatio, 1.5)
    }

    fn manager(set: Option<StatementSet>) -> FilingsManager {
        FilingsManager::in_memory().with_provider(Arc::new(FixedProvider { set }))
    }

    #[tokio::test]
    async fn test_zero_periods_rejected() {
        let err = manager(None)
            .get_metrics(&Ticker::new("ACME"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, FilingsError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_primary_only() {
        let set = StatementSet::new(AccountingStandard::UsGaap).with_period(full_period());
        let manager = manager(Some(set));
        let metrics = manager.get_metrics(&Ticker::new("ACME"), 1).await.unwrap();

        assert_eq!(metrics.provenance, Provenance::Primary);
        assert!(metrics.is_complete());
        assert!(metrics.warnings.is_empty());
        assert_eq!(metrics.value(CanonicalMetric::Revenue), Some(1_000.0));
        // NaN is dropped, not stored as a value.
        assert_eq!(metrics.value(CanonicalMetric::CurrentAssets), None);
        assert_eq!(
            metrics.latest().unwrap().provided_ratios.get(&RatioName::CurrentRatio),
            Some(&1.5)
        );
    }

    #[tokio::test]
    async fn test_write_through() {
        let set = StatementSet::new(AccountingStandard::UsGaap)
            .with_currency("USD")
            .with_period(full_period());
        let manager = manager(Some(set));
        let ticker = Ticker::new("ACME");
        manager.get_metrics(&ticker, 1).await.unwrap();

        let cached = manager
            .store()
            .get_line_items(&ticker, StatementKind::BalanceSheet, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.items.len(), 3);
        assert_eq!(cached.items[0].currency.as_deref(), Some("USD"));
        assert_eq!(cached.filing.metadata.data_quality_score, Some(1.0));

        let ratios = manager.store().get_ratios(cached.filing.id).await.unwrap();
        assert_eq!(ratios.len(), 1);
        assert_eq!(ratios[0].name, "current_ratio");
    }

    #[tokio::test]
    async fn test_write_through_disabled() {
        let set = StatementSet::new(AccountingStandard::UsGaap).with_period(full_period());
        let manager = manager(Some(set)).with_config(ResolverConfig::default().with_write_through(false));
        let ticker = Ticker::new("ACME");
        manager.get_metrics(&ticker, 1).await.unwrap();
        manager.get_ratios(&ticker).await.unwrap();
        assert!(manager.store().list_filings(&ticker).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_then_cache() {
        // First call succeeds and writes through; the second provider is down.
        let set = StatementSet::new(AccountingStandard::UsGaap).with_period(full_period());
        let warm = manager(Some(set));
        let ticker = Ticker::new("ACME");
        warm.get_metrics(&ticker, 1).await.unwrap();

        let cold = FilingsManager::new(Arc::clone(warm.store()))
            .with_provider(Arc::new(FixedProvider::default()));
        let metrics = cold.get_metrics(&ticker, 1).await.unwrap();

        assert_eq!(metrics.provenance, Provenance::Cache);
        assert_eq!(metrics.value(CanonicalMetric::TotalAssets), Some(2_000.0));
        assert_eq!(metrics.latest().unwrap().label, "FY2024");
        assert!(matches!(
            metrics.warnings.as_slice(),
            [FilingsError::ProviderUnavailable { .. }]
        ));
    }

    #[tokio::test]
    async fn test_both_sources_empty() {
        let err = manager(None)
            .get_metrics(&Ticker::new("NONE"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, FilingsError::CacheMiss(_)));

        let err = FilingsManager::in_memory()
            .get_metrics(&Ticker::new("NONE"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, FilingsError::CacheMiss(_)));
    }

    #[tokio::test]
    async fn test_get_ratios_persists() {
        let set = StatementSet::new(AccountingStandard::UsGaap).with_period(full_period());
        let manager = manager(Some(set));
        let ticker = Ticker::new("ACME");
        let ratios = manager.get_ratios(&ticker).await.unwrap();

        assert_eq!(ratios.get(RatioName::CurrentRatio), Some(1.5));
        assert_eq!(ratios.get(RatioName::ProfitMargin), Some(0.1));
        assert_eq!(ratios.get(RatioName::DebtToEquity), Some(1.5));

        let filing = manager.store().latest_filing(&ticker, None).await.unwrap().unwrap();
        let stored = manager.store().get_ratios(filing.id).await.unwrap();
        assert_eq!(stored.len(), ratios.len());
    }

    #[tokio::test]
    async fn test_segments_without_provider_or_cache() {
        let err = manager(None)
            .get_revenue_segments(&Ticker::new("ACME"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, FilingsError::CacheMiss(_)));
    }

    #[test]
    fn test_find_value_priority() {
        let items = vec![
            LineItem::header("us-gaap:Revenues", "Revenues"),
            LineItem::new("us-gaap:SalesRevenueNet", 5.0),
            LineItem::new("us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax", 7.0),
        ];
        let tags = concepts::candidate_tags(CanonicalMetric::Revenue, AccountingStandard::UsGaap);
        assert_eq!(
            find_value(&items, tags),
            Some((
                "us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax".to_string(),
                7.0
            ))
        );
    }

    #[test]
    fn test_debug_names_provider() {
        let debug = format!("{:?}", manager(None));
        assert!(debug.contains("fixed"));
    }
}
