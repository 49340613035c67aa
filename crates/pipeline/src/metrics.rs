//! Prometheus metrics for the ingestion pipeline
//!
//! Publish failures are deliberately a counter, not only a log line, so an
//! external telemetry collaborator can observe the fire-and-forget path.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

const LABEL_TOPIC: &str = "topic";
const LABEL_PATH: &str = "path";
const LABEL_OUTCOME: &str = "outcome";
const LABEL_WORKER: &str = "worker";

/// Total envelopes accepted by the durable log.
static LOG_PUBLISHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickflow_log_publishes_total",
        "Envelopes successfully published to the durable log",
        &[LABEL_TOPIC]
    )
    .expect("Failed to register log_publishes metric")
});

/// Total envelopes the durable log refused or lost on publish.
static LOG_PUBLISH_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickflow_log_publish_failures_total",
        "Envelopes that failed to publish to the durable log",
        &[LABEL_TOPIC]
    )
    .expect("Failed to register log_publish_failures metric")
});

/// Dispatch outcomes by delivery path.
static DISPATCH_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickflow_dispatch_outcomes_total",
        "Dispatch outcomes by delivery path",
        &[LABEL_PATH, LABEL_OUTCOME]
    )
    .expect("Failed to register dispatch_outcomes metric")
});

/// Acks withheld by log-consumer workers (each one triggers redelivery).
static ACKS_WITHHELD: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickflow_consumer_acks_withheld_total",
        "Messages left uncommitted for broker redelivery",
        &[LABEL_WORKER]
    )
    .expect("Failed to register acks_withheld metric")
});

pub fn record_publish(topic: &str) {
    LOG_PUBLISHES.with_label_values(&[topic]).inc();
}

pub fn record_publish_failure(topic: &str) {
    LOG_PUBLISH_FAILURES.with_label_values(&[topic]).inc();
}

pub fn publish_failures(topic: &str) -> u64 {
    LOG_PUBLISH_FAILURES.with_label_values(&[topic]).get()
}

pub fn record_dispatch(path: &str, outcome_label: &str) {
    DISPATCH_OUTCOMES
        .with_label_values(&[path, outcome_label])
        .inc();
}

pub fn record_ack_withheld(worker: usize) {
    ACKS_WITHHELD
        .with_label_values(&[&worker.to_string()])
        .inc();
}
