//! Query metrics and tracing spans.
//!
//! Both halves are feature gated: `metrics` records counters and durations on
//! the OpenTelemetry global meter, `tracing` opens spans around statements and
//! containment runs. With neither feature this module is empty.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<TetherMetrics> = Lazy::new(TetherMetrics::init);

#[cfg(feature = "metrics")]
pub struct TetherMetrics {
    pub queries_total: Counter<u64>,
    pub query_errors_total: Counter<u64>,
    pub eager_queries_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl TetherMetrics {
    pub fn init() -> Self {
        let meter = global::meter("tether");

        let queries_total = meter
            .u64_counter("tether_queries_total")
            .with_description("Total statements executed")
            .build();

        let query_errors_total = meter
            .u64_counter("tether_query_errors_total")
            .with_description("Statements that failed in the driver")
            .build();

        let eager_queries_total = meter
            .u64_counter("tether_eager_queries_total")
            .with_description("Follow-up statements issued for deferred associations")
            .build();

        let query_duration = meter
            .f64_histogram("tether_query_duration_seconds")
            .with_description("Duration of statements")
            .build();

        Self {
            queries_total,
            query_errors_total,
            eager_queries_total,
            query_duration,
        }
    }

    pub fn record_query(&self, elapsed: std::time::Duration) {
        self.queries_total.add(1, &[]);
        self.query_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_query_error(&self) {
        self.query_errors_total.add(1, &[]);
    }

    pub fn record_eager_query(&self) {
        self.eager_queries_total.add(1, &[]);
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    //! Span constructors shared by the executor and the containment engine.

    use tracing::{info_span, Span};

    pub fn execute_query_span(statement: &str) -> Span {
        info_span!("tether.execute_query", db.statement = %statement)
    }

    pub fn contain_span(repository: &str) -> Span {
        info_span!("tether.contain", repository = %repository)
    }

    pub fn eager_load_span(association: &str, keys: usize) -> Span {
        info_span!("tether.eager_load", association = %association, keys = keys)
    }
}
