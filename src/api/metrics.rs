// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prometheus metrics for the extraction endpoints

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;

use crate::api::extract::response::ResponseStatus;
use crate::error::ErrorKind;

/// Processing-time buckets in seconds
const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0];

/// Request, error and latency metrics on a private registry
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    requests: IntCounterVec,
    errors: IntCounterVec,
    duration: Histogram,
    results: IntCounterVec,
    workers_available: IntGauge,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("label_scan_requests_total", "Extraction requests by outcome"),
            &["status"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("label_scan_errors_total", "Failed extractions by error kind"),
            &["kind"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "label_scan_processing_seconds",
                "End-to-end extraction time",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        let results = IntCounterVec::new(
            Opts::new("label_scan_results_total", "Returned detections by kind"),
            &["kind"],
        )?;
        let workers_available = IntGauge::new(
            "label_scan_workers_available",
            "Idle recognition workers at last scrape",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(results.clone()))?;
        registry.register(Box::new(workers_available.clone()))?;

        Ok(Self {
            registry,
            requests,
            errors,
            duration,
            results,
            workers_available,
        })
    }

    pub fn record_request(&self, status: ResponseStatus, elapsed: Duration) {
        let label = match status {
            ResponseStatus::Ok => "ok",
            ResponseStatus::Partial => "partial",
            ResponseStatus::Error => "error",
        };
        self.requests.with_label_values(&[label]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_error(&self, kind: ErrorKind) {
        self.errors.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_results(&self, text: usize, symbols: usize) {
        self.results.with_label_values(&["text"]).inc_by(text as u64);
        self.results.with_label_values(&["symbol"]).inc_by(symbols as u64);
    }

    pub fn set_workers_available(&self, available: usize) {
        self.workers_available.set(available as i64);
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics").finish_non_exhaustive()
    }
}
