//! Process-wide Prometheus registry.
//!
//! Nothing is served over HTTP; the snapshot is written to the log on
//! shutdown and is available to embedders through [`render`].

use once_cell::sync::Lazy;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::warn;

/// Global metrics registry holding every core metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in mediamanager_core::metrics::all_metrics() {
        if let Err(e) = registry.register(metric) {
            warn!("Failed to register metric: {}", e);
        }
    }
    registry
});

/// Text exposition of all registered metrics.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
