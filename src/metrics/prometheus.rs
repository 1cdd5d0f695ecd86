//! Prometheus metrics registration and export.
//!
//! Every metric lives on a [`Metrics`] value with its own registry, so two
//! platforms in one process never collide.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Metrics recorded by the bus, runner and leaderboard.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Bus deliveries, labeled by topic and result.
    bus_messages_total: CounterVec,
    /// Publish latency in seconds, labeled by topic.
    bus_publish_seconds: HistogramVec,
    /// Finished runs, labeled by outcome.
    runs_total: CounterVec,
    /// Run duration in seconds, labeled by outcome.
    run_seconds: HistogramVec,
    /// Accumulated LLM spend in dollars.
    llm_cost_dollars: Counter,
    /// Current leaderboard size.
    leaderboard_entries: Gauge,
}

impl Metrics {
    /// Creates and registers all metrics.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if a metric definition is invalid.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bus_messages_total = CounterVec::new(
            Opts::new("agentbench_bus_messages_total", "Events published on the bus"),
            &["topic", "result"],
        )?;

        let bus_publish_seconds = HistogramVec::new(
            HistogramOpts::new(
                "agentbench_bus_publish_seconds",
                "Time spent delivering one event to all subscribers",
            )
            .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0, 60.0, 600.0]),
            &["topic"],
        )?;

        let runs_total = CounterVec::new(
            Opts::new("agentbench_runs_total", "Submissions executed by the runner"),
            &["result"],
        )?;

        let run_seconds = HistogramVec::new(
            HistogramOpts::new("agentbench_run_seconds", "Submission execution time")
                .buckets(vec![1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0]),
            &["result"],
        )?;

        let llm_cost_dollars = Counter::new(
            "agentbench_llm_cost_dollars_total",
            "LLM spend reported by agent runs",
        )?;

        let leaderboard_entries =
            Gauge::new("agentbench_leaderboard_entries", "Ranked leaderboard entries")?;

        registry.register(Box::new(bus_messages_total.clone()))?;
        registry.register(Box::new(bus_publish_seconds.clone()))?;
        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(run_seconds.clone()))?;
        registry.register(Box::new(llm_cost_dollars.clone()))?;
        registry.register(Box::new(leaderboard_entries.clone()))?;

        Ok(Self {
            registry,
            bus_messages_total,
            bus_publish_seconds,
            runs_total,
            run_seconds,
            llm_cost_dollars,
            leaderboard_entries,
        })
    }

    /// Records one publish call.
    pub fn record_publish(&self, topic: &str, result: &str, seconds: f64) {
        self.bus_messages_total
            .with_label_values(&[topic, result])
            .inc();
        self.bus_publish_seconds
            .with_label_values(&[topic])
            .observe(seconds);
    }

    /// Records one finished run.
    pub fn record_run(&self, result: &str, seconds: f64, cost: f64) {
        self.runs_total.with_label_values(&[result]).inc();
        self.run_seconds.with_label_values(&[result]).observe(seconds);
        if cost > 0.0 {
            self.llm_cost_dollars.inc_by(cost);
        }
    }

    /// Sets the leaderboard size gauge.
    pub fn set_leaderboard_size(&self, entries: usize) {
        self.leaderboard_entries.set(entries as f64);
    }

    /// Export all registered metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# Error encoding metrics: {}\n", e);
        }

        String::from_utf8(buffer)
            .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
    }
}
