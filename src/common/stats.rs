//! Coordinator counters
//!
//! Plain atomic counters shared by every connection task. They are logged
//! when the server stops and exposed to tests through [`StatsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counter for tracking event counts
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge for tracking current values
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Per-process coordinator counters
#[derive(Debug)]
pub struct CoordinatorStats {
    pub connections: Counter,
    pub active_connections: Gauge,
    pub waits: Counter,
    pub completions: Counter,
    pub departures: Counter,
    pub protocol_errors: Counter,
    pub framing_errors: Counter,
    pub payload_errors: Counter,
    start_time: Instant,
}

/// Point-in-time copy of [`CoordinatorStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub connections: u64,
    pub active_connections: u64,
    pub waits: u64,
    pub completions: u64,
    pub departures: u64,
    pub protocol_errors: u64,
    pub framing_errors: u64,
    pub payload_errors: u64,
}

impl CoordinatorStats {
    pub fn new() -> Self {
        Self {
            connections: Counter::new(),
            active_connections: Gauge::new(),
            waits: Counter::new(),
            completions: Counter::new(),
            departures: Counter::new(),
            protocol_errors: Counter::new(),
            framing_errors: Counter::new(),
            payload_errors: Counter::new(),
            start_time: Instant::now(),
        }
    }

    /// Record a failed connection by error class
    pub fn record_error(&self, err: &crate::Error) {
        match err {
            crate::Error::Framing(_) => self.framing_errors.inc(),
            crate::Error::Payload(_) | crate::Error::Json(_) => self.payload_errors.inc(),
            crate::Error::Protocol(_) | crate::Error::WrongGroup { .. } => {
                self.protocol_errors.inc()
            }
            _ => {}
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections.get(),
            active_connections: self.active_connections.get(),
            waits: self.waits.get(),
            completions: self.completions.get(),
            departures: self.departures.get(),
            protocol_errors: self.protocol_errors.get(),
            framing_errors: self.framing_errors.get(),
            payload_errors: self.payload_errors.get(),
        }
    }

    /// Emit all counters as a single log line
    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            connections = s.connections,
            waits = s.waits,
            completions = s.completions,
            departures = s.departures,
            protocol_errors = s.protocol_errors,
            framing_errors = s.framing_errors,
            payload_errors = s.payload_errors,
            uptime_secs = self.uptime_seconds(),
            "Coordinator statistics"
        );
    }
}

impl Default for CoordinatorStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new();
        gauge.inc();
        gauge.inc();
        gauge.dec();
        assert_eq!(gauge.get(), 1);
    }

    #[test]
    fn test_record_error_by_class() {
        let stats = CoordinatorStats::new();
        stats.record_error(&crate::Error::Framing("bad".into()));
        stats.record_error(&crate::Error::Payload("short".into()));
        stats.record_error(&crate::Error::Protocol("mismatch".into()));
        stats.record_error(&crate::Error::WrongGroup {
            requested: "g2".into(),
            served: "g1".into(),
        });
        stats.record_error(&crate::Error::Internal("ignored".into()));

        let s = stats.snapshot();
        assert_eq!(s.framing_errors, 1);
        assert_eq!(s.payload_errors, 1);
        assert_eq!(s.protocol_errors, 2);
    }
}
