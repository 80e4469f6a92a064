//! Process-local Prometheus registry (spec §6: `/metrics` on every service).
//! Each binary builds its own `Metrics` instance; counters a given service
//! never touches simply stay at zero in its exposition rather than being
//! omitted, which is the normal multi-service Prometheus posture.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub orders_submitted_total: IntCounterVec,
    pub webhook_events_total: IntCounterVec,
    pub reconciliation_cycles_total: IntCounterVec,
    /// 0 = open, 1 = quiet_period, 2 = tripped (`CircuitBreakerState` ordinal).
    pub circuit_breaker_state: IntGauge,
    pub signals_generated_total: IntCounter,
    pub orchestration_runs_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_submitted_total = IntCounterVec::new(
            Opts::new("tradectl_orders_submitted_total", "Orders submitted by terminal status"),
            &["status"],
        )
        .expect("static metric definition");
        let webhook_events_total = IntCounterVec::new(
            Opts::new("tradectl_webhook_events_total", "Broker webhook events ingested by outcome"),
            &["outcome"],
        )
        .expect("static metric definition");
        let reconciliation_cycles_total = IntCounterVec::new(
            Opts::new("tradectl_reconciliation_cycles_total", "Reconciliation cycles by outcome"),
            &["outcome"],
        )
        .expect("static metric definition");
        let circuit_breaker_state = IntGauge::new(
            "tradectl_circuit_breaker_state",
            "Circuit breaker state: 0=open, 1=quiet_period, 2=tripped",
        )
        .expect("static metric definition");
        let signals_generated_total = IntCounter::new(
            "tradectl_signals_generated_total",
            "Signals returned by the signal generation service",
        )
        .expect("static metric definition");
        let orchestration_runs_total = IntCounterVec::new(
            Opts::new("tradectl_orchestration_runs_total", "Orchestration runs by terminal status"),
            &["status"],
        )
        .expect("static metric definition");

        registry
            .register(Box::new(orders_submitted_total.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(webhook_events_total.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(reconciliation_cycles_total.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(circuit_breaker_state.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(signals_generated_total.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(orchestration_runs_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            orders_submitted_total,
            webhook_events_total,
            reconciliation_cycles_total,
            circuit_breaker_state,
            signals_generated_total,
            orchestration_runs_total,
        }
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("text encoding of a gathered metric family cannot fail");
        String::from_utf8(buffer).expect("prometheus text encoder emits valid utf-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
