use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    messages_total: AtomicU64,
    registrations_total: AtomicU64,
    lookups_total: AtomicU64,
    lookup_misses_total: AtomicU64,
    finance_entries_total: AtomicU64,
    failures_total: AtomicU64,
    total_latency_millis: AtomicU64,
    latency_samples_total: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages_total: u64,
    pub registrations_total: u64,
    pub lookups_total: u64,
    pub lookup_misses_total: u64,
    pub finance_entries_total: u64,
    pub failures_total: u64,
    pub latency_samples_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_message(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_registration(&self) {
        self.registrations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_lookup(&self, hit: bool) {
        self.lookups_total.fetch_add(1, Ordering::Relaxed);
        if !hit {
            self.lookup_misses_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_finance_entry(&self) {
        self.finance_entries_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failure(&self) {
        self.failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        self.latency_samples_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.total_latency_millis.load(Ordering::Relaxed);
        let samples = self.latency_samples_total.load(Ordering::Relaxed);

        MetricsSnapshot {
            messages_total: self.messages_total.load(Ordering::Relaxed),
            registrations_total: self.registrations_total.load(Ordering::Relaxed),
            lookups_total: self.lookups_total.load(Ordering::Relaxed),
            lookup_misses_total: self.lookup_misses_total.load(Ordering::Relaxed),
            finance_entries_total: self.finance_entries_total.load(Ordering::Relaxed),
            failures_total: self.failures_total.load(Ordering::Relaxed),
            latency_samples_total: samples,
            avg_latency_millis: if samples == 0 {
                0.0
            } else {
                latency as f64 / samples as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,oficina_api=info,oficina_agents=info,oficina_storage=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();

        tracing::debug!(service = service_name, "tracing initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tracks_misses_and_latency() {
        let metrics = AppMetrics::default();
        metrics.inc_message();
        metrics.inc_message();
        metrics.inc_lookup(true);
        metrics.inc_lookup(false);
        metrics.observe_latency(Duration::from_millis(30));
        metrics.observe_latency(Duration::from_millis(10));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_total, 2);
        assert_eq!(snapshot.lookups_total, 2);
        assert_eq!(snapshot.lookup_misses_total, 1);
        assert_eq!(snapshot.latency_samples_total, 2);
        assert!((snapshot.avg_latency_millis - 20.0).abs() < f64::EPSILON);
    }
}
