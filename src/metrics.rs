use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register the engine's metrics.
/// The returned handle's `render()` produces the text/plain scrape payload
/// for whatever transport embeds the engine.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // Pre-register counters so they appear even before the first increment.
    counter!("ledger_events_total").absolute(0);
    counter!("ledger_replays_total").absolute(0);
    counter!("import_batches_total").absolute(0);
    counter!("import_rows_total").absolute(0);
    counter!("import_failures_total").absolute(0);
    counter!("valuation_cache_hits").absolute(0);
    counter!("valuation_cache_misses").absolute(0);

    // Histogram is lazily created on first record; force creation.
    histogram!("import_batch_seconds").record(0.0);

    handle
}
