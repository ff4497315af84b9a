//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Feed schedulers (deliveries, parser failures)
//! - Quality arbitration (verdicts by outcome)
//! - Download triggers and backfill searches
//! - File handling (outcomes, integrity mismatches)
//!
//! Metrics are collected in-process; exposing them is left to the embedder.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Feed Metrics
// =============================================================================

/// Feed items delivered to listeners, by scheduler.
pub static FEED_ITEMS_DELIVERED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediamanager_feed_items_delivered_total",
            "Total new feed items delivered to listeners",
        ),
        &["scheduler"],
    )
    .unwrap()
});

/// Parser failures, by scheduler and source.
pub static PARSER_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediamanager_parser_failures_total",
            "Total parser fetch/search failures",
        ),
        &["scheduler", "source"],
    )
    .unwrap()
});

/// Duration of a single parser fetch.
pub static PARSER_FETCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediamanager_parser_fetch_duration_seconds",
            "Duration of parser fetches",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Arbitration Metrics
// =============================================================================

/// Quality verdicts, by outcome.
pub static QUALITY_VERDICTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediamanager_quality_verdicts_total",
            "Total quality arbitration verdicts",
        ),
        // "primary", "secondary", "not_desired", "unrecognized_quality",
        // "already_accepted", "awaiting_primary_window"
        &["verdict"],
    )
    .unwrap()
});

// =============================================================================
// Download / Backfill Metrics
// =============================================================================

/// Download triggers, by result.
pub static DOWNLOADS_TRIGGERED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediamanager_downloads_triggered_total",
            "Total download triggers",
        ),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Retry attempts made by network collaborators.
pub static RETRY_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediamanager_retry_attempts_total",
        "Total retry attempts after transient failures",
    )
    .unwrap()
});

/// Backfill searches, by result.
pub static BACKFILL_SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediamanager_backfill_searches_total",
            "Total backfill searches",
        ),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

// =============================================================================
// File Metrics
// =============================================================================

/// Files seen by the media handler, by outcome.
pub static FILES_HANDLED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediamanager_files_handled_total",
            "Total files processed by the media handler",
        ),
        &["outcome"], // "accepted", "rejected", "failed"
    )
    .unwrap()
});

/// Post-transfer checksum mismatches.
pub static INTEGRITY_MISMATCHES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediamanager_integrity_mismatches_total",
        "Total post-transfer checksum mismatches",
    )
    .unwrap()
});

/// Episodes reconciled into the library.
pub static EPISODES_RECONCILED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediamanager_episodes_reconciled_total",
            "Total landed files resolved by the library listener",
        ),
        &["result"], // "placed", "unparsed", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Feeds
        Box::new(FEED_ITEMS_DELIVERED.clone()),
        Box::new(PARSER_FAILURES.clone()),
        Box::new(PARSER_FETCH_DURATION.clone()),
        // Arbitration
        Box::new(QUALITY_VERDICTS.clone()),
        // Downloads / backfill
        Box::new(DOWNLOADS_TRIGGERED.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(BACKFILL_SEARCHES.clone()),
        // Files
        Box::new(FILES_HANDLED.clone()),
        Box::new(INTEGRITY_MISMATCHES.clone()),
        Box::new(EPISODES_RECONCILED.clone()),
    ]
}
