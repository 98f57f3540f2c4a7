//! Error types for filing resolution.
//!
//! This module defines [`FilingsError`], which covers every failure that can occur
//! while resolving metrics from a live provider, the filing cache, or a filing's
//! dimensional facts. Most kinds are recovered locally and attached to results as
//! warnings; see [`FilingsError::is_recoverable`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountingStandard, SegmentType};

/// Errors that can occur during filing resolution.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilingsError {
    /// No tag mapping exists for a canonical metric under an accounting standard.
    #[error("No {standard} concept mapping for metric {metric}")]
    ConceptNotFound {
        /// Canonical metric name.
        metric: String,
        /// Accounting standard that was searched.
        standard: AccountingStandard,
    },

    /// The live statement provider failed or timed out.
    #[error("Provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        /// Name of the provider.
        provider: String,
        /// Failure description.
        reason: String,
    },

    /// Neither the provider nor the cache holds data for the ticker.
    #[error("No cached filing for {0}")]
    CacheMiss(String),

    /// Segment values do not sum to the consolidated total within tolerance.
    #[error(
        "{segment_type} segments sum to {segment_sum} but total is {total} (deviation {deviation:.6}, tolerance {tolerance})"
    )]
    ReconciliationMismatch {
        /// Segment breakdown that failed to reconcile.
        segment_type: SegmentType,
        /// Sum of segment values.
        segment_sum: f64,
        /// Consolidated total the segments were checked against.
        total: f64,
        /// Relative deviation `|sum - total| / total`.
        deviation: f64,
        /// Configured relative tolerance.
        tolerance: f64,
    },

    /// A single dimensional-fact row could not be interpreted.
    #[error("Malformed dimensional fact at row {row}: {reason}")]
    MalformedDimensionRow {
        /// Zero-based row index in the fact table.
        row: usize,
        /// What was wrong with the row.
        reason: String,
    },

    /// Network-related errors (connection failures, HTTP status, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Error parsing data from a provider.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error interacting with the filing store.
    #[error("Cache error: {0}")]
    Cache(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested feature is not supported by this provider or store.
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl FilingsError {
    /// Returns true for kinds that degrade to partial data instead of failing a request.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConceptNotFound { .. }
                | Self::ProviderUnavailable { .. }
                | Self::ReconciliationMismatch { .. }
                | Self::MalformedDimensionRow { .. }
        )
    }
}

/// Result type alias using [`FilingsError`].
pub type Result<T> = std::result::Result<T, FilingsError>;
