use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub waiting_orders: IntGauge,
    pub handler_latency_seconds: HistogramVec,
    pub runner_active_orders: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment decisions by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let waiting_orders = IntGauge::new(
            "waiting_orders",
            "Orders currently waiting for a runner",
        )
        .expect("valid waiting_orders metric");

        let handler_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "handler_latency_seconds",
                "Latency of change-event handlers in seconds",
            ),
            &["outcome"],
        )
        .expect("valid handler_latency_seconds metric");

        let runner_active_orders = IntGaugeVec::new(
            Opts::new("runner_active_orders", "Active orders per runner"),
            &["runner_id"],
        )
        .expect("valid runner_active_orders metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(waiting_orders.clone()))
            .expect("register waiting_orders");
        registry
            .register(Box::new(handler_latency_seconds.clone()))
            .expect("register handler_latency_seconds");
        registry
            .register(Box::new(runner_active_orders.clone()))
            .expect("register runner_active_orders");

        Self {
            registry,
            assignments_total,
            waiting_orders,
            handler_latency_seconds,
            runner_active_orders,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
