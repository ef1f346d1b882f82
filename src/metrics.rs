//! Prometheus metrics for the scanner and its HTTP surface.

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::core::events::{ScanEvent, ScanObserver, SymbolOutcome};

pub struct Metrics {
    registry: Registry,
    pub http_requests_total: IntCounter,
    pub http_requests_in_flight: IntGauge,
    pub http_request_duration_seconds: Histogram,
    pub database_connected: Gauge,
    pub scan_running: IntGauge,
    pub scan_runs_total: IntCounterVec,
    pub symbols_processed_total: IntCounterVec,
    pub provider_fetches_total: IntCounterVec,
    pub matches_found_total: IntCounter,
    pub persist_failures_total: IntCounter,
    pub scan_backoffs_total: IntCounter,
    pub last_run_duration_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total =
            IntCounter::with_opts(Opts::new("http_requests_total", "Total HTTP requests"))?;
        let http_requests_in_flight = IntGauge::with_opts(Opts::new(
            "http_requests_in_flight",
            "HTTP requests currently being served",
        ))?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency",
        ))?;
        let database_connected = Gauge::with_opts(Opts::new(
            "database_connected",
            "1 when the result store is a live database",
        ))?;
        let scan_running =
            IntGauge::with_opts(Opts::new("scan_running", "1 while a scan is in progress"))?;
        let scan_runs_total = IntCounterVec::new(
            Opts::new("scan_runs_total", "Finished scan runs by status"),
            &["status"],
        )?;
        let symbols_processed_total = IntCounterVec::new(
            Opts::new("scan_symbols_processed_total", "Symbols processed by outcome"),
            &["outcome"],
        )?;
        let provider_fetches_total = IntCounterVec::new(
            Opts::new("provider_fetches_total", "Successful fetches by provider"),
            &["provider"],
        )?;
        let matches_found_total =
            IntCounter::with_opts(Opts::new("vcp_matches_found_total", "VCP matches found"))?;
        let persist_failures_total = IntCounter::with_opts(Opts::new(
            "scan_persist_failures_total",
            "Failed match writes",
        ))?;
        let scan_backoffs_total = IntCounter::with_opts(Opts::new(
            "scan_backoffs_total",
            "Inter-batch delays lengthened by a high error rate",
        ))?;
        let last_run_duration_seconds = Gauge::with_opts(Opts::new(
            "scan_last_run_duration_seconds",
            "Duration of the most recent scan",
        ))?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(database_connected.clone()))?;
        registry.register(Box::new(scan_running.clone()))?;
        registry.register(Box::new(scan_runs_total.clone()))?;
        registry.register(Box::new(symbols_processed_total.clone()))?;
        registry.register(Box::new(provider_fetches_total.clone()))?;
        registry.register(Box::new(matches_found_total.clone()))?;
        registry.register(Box::new(persist_failures_total.clone()))?;
        registry.register(Box::new(scan_backoffs_total.clone()))?;
        registry.register(Box::new(last_run_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_requests_in_flight,
            http_request_duration_seconds,
            database_connected,
            scan_running,
            scan_runs_total,
            symbols_processed_total,
            provider_fetches_total,
            matches_found_total,
            persist_failures_total,
            scan_backoffs_total,
            last_run_duration_seconds,
        })
    }

    /// Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Feeds scan events into [`Metrics`].
pub struct MetricsObserver {
    metrics: Arc<Metrics>,
}

impl MetricsObserver {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl ScanObserver for MetricsObserver {
    fn on_event(&self, event: &ScanEvent) {
        let m = &self.metrics;
        match event {
            ScanEvent::RunStarted { .. } => m.scan_running.set(1),
            ScanEvent::SymbolCompleted {
                provider, outcome, ..
            } => {
                m.provider_fetches_total
                    .with_label_values(&[provider.as_str()])
                    .inc();
                let label = match outcome {
                    SymbolOutcome::Matched { .. } => {
                        m.matches_found_total.inc();
                        "matched"
                    }
                    SymbolOutcome::Rejected { .. } => "rejected",
                    SymbolOutcome::InsufficientHistory { .. } => "insufficient_history",
                };
                m.symbols_processed_total.with_label_values(&[label]).inc();
            }
            ScanEvent::SymbolFailed { .. } => {
                m.symbols_processed_total.with_label_values(&["failed"]).inc();
            }
            ScanEvent::PersistFailed { .. } => m.persist_failures_total.inc(),
            ScanEvent::BackoffApplied { .. } => m.scan_backoffs_total.inc(),
            ScanEvent::RunFinished { summary } => {
                m.scan_running.set(0);
                m.scan_runs_total
                    .with_label_values(&[summary.status.as_str()])
                    .inc();
                m.last_run_duration_seconds
                    .set(summary.duration_ms as f64 / 1000.0);
            }
            _ => {}
        }
    }
}
