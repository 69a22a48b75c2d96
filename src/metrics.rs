//! Metrics sinks.
//!
//! The cache core reports through the small [`MetricsSink`] interface so
//! deployments can choose their backend. [`PrometheusSink`] registers
//! collectors lazily in an owned registry and renders them in the text
//! exposition format for the `/metrics` endpoint.

use std::collections::HashMap;

use parking_lot::Mutex;
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use tracing::warn;

use crate::error::{Error, Result};

/// Destination for cache engine measurements.
pub trait MetricsSink: Send + Sync {
    fn inc_counter(&self, name: &str, help: &str);

    fn set_gauge(&self, name: &str, help: &str, value: f64);

    fn observe_histogram(&self, name: &str, help: &str, value: f64);

    fn close(&self) {}
}

/// Sink that drops every measurement.
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn inc_counter(&self, _name: &str, _help: &str) {}
    fn set_gauge(&self, _name: &str, _help: &str, _value: f64) {}
    fn observe_histogram(&self, _name: &str, _help: &str, _value: f64) {}
}

/// Prometheus-backed sink with lazily registered collectors.
#[derive(Default)]
pub struct PrometheusSink {
    registry: Registry,
    counters: Mutex<HashMap<String, IntCounter>>,
    gauges: Mutex<HashMap<String, Gauge>>,
    histograms: Mutex<HashMap<String, Histogram>>,
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry collectors are registered in.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all collectors in the text exposition format.
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|err| Error::Internal(format!("encoding metrics: {err}")))?;
        String::from_utf8(buffer).map_err(|err| Error::Internal(format!("encoding metrics: {err}")))
    }

    fn counter(&self, name: &str, help: &str) -> Option<IntCounter> {
        let mut counters = self.counters.lock();
        if let Some(counter) = counters.get(name) {
            return Some(counter.clone());
        }
        match IntCounter::new(name.to_string(), help.to_string()) {
            Ok(counter) => {
                if let Err(err) = self.registry.register(Box::new(counter.clone())) {
                    warn!(name, error = %err, "failed to register counter");
                }
                counters.insert(name.to_string(), counter.clone());
                Some(counter)
            }
            Err(err) => {
                warn!(name, error = %err, "invalid counter");
                None
            }
        }
    }

    fn gauge(&self, name: &str, help: &str) -> Option<Gauge> {
        let mut gauges = self.gauges.lock();
        if let Some(gauge) = gauges.get(name) {
            return Some(gauge.clone());
        }
        match Gauge::new(name.to_string(), help.to_string()) {
            Ok(gauge) => {
                if let Err(err) = self.registry.register(Box::new(gauge.clone())) {
                    warn!(name, error = %err, "failed to register gauge");
                }
                gauges.insert(name.to_string(), gauge.clone());
                Some(gauge)
            }
            Err(err) => {
                warn!(name, error = %err, "invalid gauge");
                None
            }
        }
    }

    fn histogram(&self, name: &str, help: &str) -> Option<Histogram> {
        let mut histograms = self.histograms.lock();
        if let Some(histogram) = histograms.get(name) {
            return Some(histogram.clone());
        }
        match Histogram::with_opts(HistogramOpts::new(name.to_string(), help.to_string())) {
            Ok(histogram) => {
                if let Err(err) = self.registry.register(Box::new(histogram.clone())) {
                    warn!(name, error = %err, "failed to register histogram");
                }
                histograms.insert(name.to_string(), histogram.clone());
                Some(histogram)
            }
            Err(err) => {
                warn!(name, error = %err, "invalid histogram");
                None
            }
        }
    }
}

impl MetricsSink for PrometheusSink {
    fn inc_counter(&self, name: &str, help: &str) {
        if let Some(counter) = self.counter(name, help) {
            counter.inc();
        }
    }

    fn set_gauge(&self, name: &str, help: &str, value: f64) {
        if let Some(gauge) = self.gauge(name, help) {
            gauge.set(value);
        }
    }

    fn observe_histogram(&self, name: &str, help: &str, value: f64) {
        if let Some(histogram) = self.histogram(name, help) {
            histogram.observe(value);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
