use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, register_counter_vec, register_histogram_vec};

/// Reconciliation counters and phase-latency histograms for one controller.
/// Registered against the process-wide default registry, so the metrics
/// HTTP server (`crate::metrics::run_server`) can gather them without being
/// handed a reference to this struct.
pub struct ControllerMetrics {
    pub reconcile_counter: CounterVec,
    pub action_counter: CounterVec,
    pub read_histogram: HistogramVec,
    pub write_histogram: HistogramVec,
}

impl ControllerMetrics {
    /// `namespace` is the Prometheus metric namespace prefix, e.g.
    /// `multi_platform`.
    pub fn new(namespace: &str) -> Self {
        let reconcile_counter = register_counter_vec!(
            Opts::new("reconcile_total", "Total number of reconciliations").namespace(namespace),
            &["name", "namespace"]
        )
        .unwrap();

        let action_counter = register_counter_vec!(
            Opts::new("action_total", "Total number of actions taken, by kind")
                .namespace(namespace),
            &["name", "namespace", "action"]
        )
        .unwrap();

        let read_histogram = register_histogram_vec!(
            HistogramOpts::new(
                "read_phase_seconds",
                "Time spent determining the action to take",
            )
            .namespace(namespace),
            &["name", "namespace", "action"]
        )
        .unwrap();

        let write_histogram = register_histogram_vec!(
            HistogramOpts::new(
                "write_phase_seconds",
                "Time spent applying the determined action",
            )
            .namespace(namespace),
            &["name", "namespace", "action"]
        )
        .unwrap();

        ControllerMetrics {
            reconcile_counter,
            action_counter,
            read_histogram,
            write_histogram,
        }
    }
}
