#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/filings/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Financial metric resolution and segment reconciliation.
//!
//! This crate re-exports the core types and store implementations, and provides
//! a [`FilingsManager`] that resolves metrics from a live provider with automatic
//! fallback to the filing cache.

// Core types and traits
pub use filings_core::*;

// Store implementations
pub use filings_cache::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use filings_cache::SqliteStore;

// Providers
#[cfg(feature = "edgar")]
pub use filings_edgar::EdgarProvider;

mod config;
mod manager;
pub mod ratios;
pub mod segments;

pub use config::ResolverConfig;
pub use manager::FilingsManager;
pub use ratios::{CalculatedRatios, RatioSource, RatioValue};
pub use segments::{
    SegmentBreakdown, SegmentEntry, SegmentExtractor, SegmentReason, SegmentReconciliation,
};
