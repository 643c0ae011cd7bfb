use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub routes_built_total: IntCounterVec,
    pub duplicate_stops_dropped_total: IntCounter,
    pub route_transitions_total: IntCounterVec,
    pub stop_transitions_total: IntCounterVec,
    pub write_conflicts_total: IntCounter,
    pub notifications_total: IntCounterVec,
    pub build_latency_seconds: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let routes_built_total = IntCounterVec::new(
            Opts::new("routes_built_total", "Stop list builds by kind"),
            &["kind"],
        )
        .expect("valid routes_built_total metric");

        let duplicate_stops_dropped_total = IntCounter::new(
            "duplicate_stops_dropped_total",
            "Candidate stops dropped because their subscription was already routed",
        )
        .expect("valid duplicate_stops_dropped_total metric");

        let route_transitions_total = IntCounterVec::new(
            Opts::new("route_transitions_total", "Route status transitions by target status"),
            &["status"],
        )
        .expect("valid route_transitions_total metric");

        let stop_transitions_total = IntCounterVec::new(
            Opts::new("stop_transitions_total", "Stop status transitions by target status"),
            &["status"],
        )
        .expect("valid stop_transitions_total metric");

        let write_conflicts_total = IntCounter::new(
            "write_conflicts_total",
            "Route writes rejected by the optimistic version check",
        )
        .expect("valid write_conflicts_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Notifications dispatched by event"),
            &["event"],
        )
        .expect("valid notifications_total metric");

        let build_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "build_latency_seconds",
                "Latency of stop list builds in seconds",
            ),
            &["outcome"],
        )
        .expect("valid build_latency_seconds metric");

        registry
            .register(Box::new(routes_built_total.clone()))
            .expect("register routes_built_total");
        registry
            .register(Box::new(duplicate_stops_dropped_total.clone()))
            .expect("register duplicate_stops_dropped_total");
        registry
            .register(Box::new(route_transitions_total.clone()))
            .expect("register route_transitions_total");
        registry
            .register(Box::new(stop_transitions_total.clone()))
            .expect("register stop_transitions_total");
        registry
            .register(Box::new(write_conflicts_total.clone()))
            .expect("register write_conflicts_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(build_latency_seconds.clone()))
            .expect("register build_latency_seconds");

        Self {
            registry,
            routes_built_total,
            duplicate_stops_dropped_total,
            route_transitions_total,
            stop_transitions_total,
            write_conflicts_total,
            notifications_total,
            build_latency_seconds,
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
