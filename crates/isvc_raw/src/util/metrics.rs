use crate::util::errors::Error;
use prometheus::{histogram_opts, opts, HistogramVec, IntCounterVec, Registry};
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: IntCounterVec,
    pub failures: IntCounterVec,
    pub reconcile_duration: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        let reconcile_duration = HistogramVec::new(
            histogram_opts!(
                "isvc_raw_reconcile_duration_seconds",
                "The duration of a sub-resource reconcile to complete in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]),
            &["kind"],
        )
        .expect("valid histogram options");
        let failures = IntCounterVec::new(
            opts!("isvc_raw_reconciliation_errors_total", "sub-resource reconciliation errors"),
            &["kind", "component", "error"],
        )
        .expect("valid counter options");
        let reconciliations = IntCounterVec::new(
            opts!("isvc_raw_reconciliations_total", "sub-resource reconciliations"),
            &["kind"],
        )
        .expect("valid counter options");
        Metrics {
            reconciliations,
            failures,
            reconcile_duration,
        }
    }
}

impl Metrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.reconciliations.clone()))?;
        Ok(self)
    }

    pub fn reconcile_failure(&self, kind: &str, component: &str, e: &Error) {
        debug!(kind, component, error = %e.metric_label(), "recording reconcile failure");
        self.failures
            .with_label_values(&[kind, component, e.metric_label().as_ref()])
            .inc()
    }

    pub fn count_and_measure(&self, kind: &str) -> ReconcileMeasurer {
        self.reconciliations.with_label_values(&[kind]).inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.reconcile_duration.clone(),
            kind: kind.to_string(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    metric: HistogramVec,
    kind: String,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.with_label_values(&[self.kind.as_str()]).observe(duration);
    }
}
