//! Prometheus counters for the webhook pipeline.
//!
//! Persistence is best-effort (the webhook sender always gets a success-shaped
//! answer), so `persistence_failures_total` is the place those failures show up.

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Prometheus content type for text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    received: IntCounterVec,
    ignored: IntCounterVec,
    saved: IntCounterVec,
    duplicate: IntCounterVec,
    persistence_failures: IntCounterVec,
    upstream_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let received = counter(
            &registry,
            "mention_relay_webhooks_received_total",
            "Webhook deliveries received, by event kind",
            &["kind"],
        )?;
        let ignored = counter(
            &registry,
            "mention_relay_events_ignored_total",
            "Events dropped before persistence",
            &["kind", "reason"],
        )?;
        let saved = counter(
            &registry,
            "mention_relay_events_saved_total",
            "Events persisted for the first time",
            &["kind"],
        )?;
        let duplicate = counter(
            &registry,
            "mention_relay_events_duplicate_total",
            "Redelivered events skipped by the unique key",
            &["kind"],
        )?;
        let persistence_failures = counter(
            &registry,
            "mention_relay_persistence_failures_total",
            "Storage errors absorbed while answering the webhook",
            &["kind"],
        )?;
        let upstream_failures = counter(
            &registry,
            "mention_relay_upstream_failures_total",
            "Failed outbound calls to Teamwork or the action API",
            &["call"],
        )?;

        Ok(Self {
            registry,
            received,
            ignored,
            saved,
            duplicate,
            persistence_failures,
            upstream_failures,
        })
    }

    pub fn webhook_received(&self, kind: &str) {
        self.received.with_label_values(&[kind]).inc();
    }

    pub fn ignored(&self, kind: &str, reason: &str) {
        self.ignored.with_label_values(&[kind, reason]).inc();
    }

    pub fn saved(&self, kind: &str) {
        self.saved.with_label_values(&[kind]).inc();
    }

    pub fn duplicate(&self, kind: &str) {
        self.duplicate.with_label_values(&[kind]).inc();
    }

    pub fn persistence_failure(&self, kind: &str) {
        self.persistence_failures.with_label_values(&[kind]).inc();
    }

    pub fn upstream_failure(&self, call: &str) {
        self.upstream_failures.with_label_values(&[call]).inc();
    }

    /// Render every registered metric in text exposition format.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("Prometheus output is not UTF-8")
    }
}

fn counter(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    let vec = IntCounterVec::new(Opts::new(name, help), labels)
        .with_context(|| format!("invalid metric definition {name}"))?;
    registry
        .register(Box::new(vec.clone()))
        .with_context(|| format!("failed to register metric {name}"))?;
    Ok(vec)
}
