//! Resolver configuration.

use std::time::Duration;

use filings_core::{CanonicalMetric, FilingsError, Result};
use serde::{Deserialize, Serialize};

/// Settings for [`FilingsManager`](crate::FilingsManager).
///
/// Every field has a default, so a partial JSON document is a valid configuration:
///
/// ```
/// use filings::ResolverConfig;
///
/// let config = ResolverConfig::from_json(r#"{"provider_timeout_secs": 5}"#).unwrap();
/// assert_eq!(config.provider_timeout_secs, 5.0);
/// assert_eq!(config.reconciliation_tolerance, 0.001);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upper bound on one provider call, in seconds.
    pub provider_timeout_secs: f64,
    /// Relative deviation allowed between summed segments and the consolidated total.
    pub reconciliation_tolerance: f64,
    /// Metrics whose absence from the provider triggers the cache fallback.
    pub core_metrics: Vec<CanonicalMetric>,
    /// Maximum number of unrecognized concepts kept per period.
    pub max_unrecognized_concepts: usize,
    /// Persist provider results into the filing store.
    pub write_through: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: 30.0,
            reconciliation_tolerance: 0.001,
            core_metrics: CanonicalMetric::CORE.to_vec(),
            max_unrecognized_concepts: 64,
            write_through: true,
        }
    }
}

impl ResolverConfig {
    /// Parses a configuration from JSON, filling omitted fields with defaults.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the document does not parse or fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FilingsError::InvalidParameter(format!("Invalid resolver config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that timeouts and tolerances are usable.
    ///
    /// # Errors
    /// Returns `InvalidParameter` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.provider_timeout_secs.is_finite() && self.provider_timeout_secs > 0.0) {
            return Err(FilingsError::InvalidParameter(format!(
                "provider_timeout_secs must be positive, got {}",
                self.provider_timeout_secs
            )));
        }
        if !(self.reconciliation_tolerance.is_finite() && self.reconciliation_tolerance >= 0.0) {
            return Err(FilingsError::InvalidParameter(format!(
                "reconciliation_tolerance must be non-negative, got {}",
                self.reconciliation_tolerance
            )));
        }
        Ok(())
    }

    /// Provider timeout as a [`Duration`].
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.provider_timeout_secs).unwrap_or(Duration::from_secs(30))
    }

    /// Sets the provider timeout.
    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_secs = timeout.as_secs_f64();
        self
    }

    /// Sets the reconciliation tolerance.
    #[must_use]
    pub const fn with_reconciliation_tolerance(mut self, tolerance: f64) -> Self {
        self.reconciliation_tolerance = tolerance;
        self
    }

    /// Sets the core metrics.
    #[must_use]
    pub fn with_core_metrics(mut self, metrics: impl IntoIterator<Item = CanonicalMetric>) -> Self {
        self.core_metrics = metrics.into_iter().collect();
        self
    }

    /// Sets the unrecognized-concept limit.
    #[must_use]
    pub const fn with_max_unrecognized_concepts(mut self, max: usize) -> Self {
        self.max_unrecognized_concepts = max;
        self
    }

    /// Enables or disables write-through caching.
    #[must_use]
    pub const fn with_write_through(mut self, enabled: bool) -> Self {
        self.write_through = enabled;
        self
    }
}
