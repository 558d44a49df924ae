use prometheus::{
    Counter, Gauge, Registry, Opts,
    register_counter_with_registry, register_gauge_with_registry, Encoder, TextEncoder,
};
use std::sync::Arc;
use crate::{EmsError, Result};

/// Metrics collector for the event manager server
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Store metrics
    pub events_created: Counter,
    pub reservations_successful: Counter,
    pub reservations_failed: Counter,
    pub seats_reserved: Counter,

    // Protocol metrics
    pub requests: Counter,
    pub invalid_requests: Counter,
    pub transport_failures: Counter,
    pub active_sessions: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let events_created = register_counter_with_registry!(
            Opts::new("events_created_total", "Total number of events created"),
            registry
        )?;

        let reservations_successful = register_counter_with_registry!(
            Opts::new("reservations_successful_total", "Total number of successful reservations"),
            registry
        )?;

        let reservations_failed = register_counter_with_registry!(
            Opts::new("reservations_failed_total", "Total number of rejected reservations"),
            registry
        )?;

        let seats_reserved = register_counter_with_registry!(
            Opts::new("seats_reserved_total", "Total number of seats reserved"),
            registry
        )?;

        let requests = register_counter_with_registry!(
            Opts::new("requests_total", "Total number of session requests served"),
            registry
        )?;

        let invalid_requests = register_counter_with_registry!(
            Opts::new("invalid_requests_total", "Total number of malformed session requests"),
            registry
        )?;

        let transport_failures = register_counter_with_registry!(
            Opts::new("transport_failures_total", "Total number of sessions ended by a transport failure"),
            registry
        )?;

        let active_sessions = register_gauge_with_registry!(
            Opts::new("active_sessions", "Number of currently active sessions"),
            registry
        )?;

        Ok(Self {
            registry,
            events_created,
            reservations_successful,
            reservations_failed,
            seats_reserved,
            requests,
            invalid_requests,
            transport_failures,
            active_sessions,
        })
    }

    /// Counts an event that made it into the store.
    pub fn record_event_created(&self) {
        self.events_created.inc();
    }

    pub fn record_reservation_attempt(&self, success: bool, seats_count: usize) {
        if success {
            self.reservations_successful.inc();
            self.seats_reserved.inc_by(seats_count as f64);
        } else {
            self.reservations_failed.inc();
        }
    }

    /// Counts a decoded session request; `valid` is false for malformed frames.
    pub fn record_request(&self, valid: bool) {
        self.requests.inc();
        if !valid {
            self.invalid_requests.inc();
        }
    }

    pub fn record_transport_failure(&self) {
        self.transport_failures.inc();
    }

    pub fn update_active_sessions(&self, count: usize) {
        self.active_sessions.set(count as f64);
    }

    /// Export all metrics in the Prometheus text format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| EmsError::InvalidArgument(format!("Metrics are not UTF-8: {}", e)))
    }
}
