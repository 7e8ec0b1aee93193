#[cfg(feature = "metrics")]
pub use prometheus_metrics::{TollgateMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram, Meter, MeterProvider},
    };
    use opentelemetry_prometheus::PrometheusExporter;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};

    pub static METRICS: Lazy<TollgateMetrics> = Lazy::new(TollgateMetrics::init);

    pub struct TollgateMetrics {
        pub exporter: Option<PrometheusExporter>,
        /// Registry the exporter writes into; see [`TollgateMetrics::render`]
        pub registry: Registry,
        provider: Option<SdkMeterProvider>,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub files_applied: Counter<u64>,
        pub files_failed: Counter<u64>,
        pub batch_duration: Histogram<f64>,
    }

    impl TollgateMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let exporter = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => Some(exporter),
                Err(e) => {
                    log::warn!("prometheus exporter unavailable: {}", e);
                    None
                }
            };
            let provider = exporter.clone().map(|exporter| {
                SdkMeterProvider::builder().with_reader(exporter).build()
            });
            let meter: Meter = match &provider {
                Some(provider) => provider.meter("tollgate"),
                None => global::meter("tollgate"),
            };

            let queries_total = meter.u64_counter("tollgate_queries_total")
                .with_description("Total statements sent to the store").build();

            let query_errors_total = meter.u64_counter("tollgate_query_errors_total")
                .with_description("Statements the store rejected").build();

            let query_duration = meter.f64_histogram("tollgate_query_duration_seconds")
                .with_description("Duration of store round trips").build();

            let files_applied = meter.u64_counter("tollgate_files_applied_total")
                .with_description("Migration files applied successfully").build();

            let files_failed = meter.u64_counter("tollgate_files_failed_total")
                .with_description("Migration files that failed to read or execute").build();

            let batch_duration = meter.f64_histogram("tollgate_batch_duration_seconds")
                .with_description("Duration of migration batches").build();

            Self {
                exporter,
                registry,
                provider,
                queries_total,
                query_errors_total,
                query_duration,
                files_applied,
                files_failed,
                batch_duration,
            }
        }

        pub fn record_query(&self, elapsed: std::time::Duration, ok: bool) {
            self.queries_total.add(1, &[]);
            if !ok {
                self.query_errors_total.add(1, &[]);
            }
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_file(&self, succeeded: bool) {
            if succeeded {
                self.files_applied.add(1, &[]);
            } else {
                self.files_failed.add(1, &[]);
            }
        }

        pub fn record_batch(&self, elapsed: std::time::Duration) {
            self.batch_duration.record(elapsed.as_secs_f64(), &[]);
        }

        /// Current values in the Prometheus text exposition format
        pub fn render(&self) -> String {
            if let Some(provider) = &self.provider {
                if let Err(e) = provider.force_flush() {
                    log::debug!("metrics flush failed: {}", e);
                }
            }
            let mut buf = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
                log::warn!("failed to encode metrics: {}", e);
            }
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::time::Duration;

        #[test]
        fn test_recorded_values_are_exported() {
            METRICS.record_file(true);
            METRICS.record_batch(Duration::from_millis(5));
            let text = METRICS.render();
            assert!(text.contains("tollgate_files_applied"));
            assert!(text.contains("tollgate_batch_duration_seconds"));
        }
    }
}

/// Span helpers for the `tracing` feature.
#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn batch_span(dir: &std::path::Path) -> Span {
        info_span!("tollgate.batch", dir = %dir.display())
    }

    pub fn file_span(filename: &str) -> Span {
        info_span!("tollgate.file", file = filename)
    }
}
