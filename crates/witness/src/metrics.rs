use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static OUTCOMES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static SUBMISSIONS_TOTAL: OnceLock<IntCounter> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "omatrust_witness_http_requests_total",
                    "Witness HTTP request count.",
                ),
                &["route", "method", "status"],
            )
            .expect("create omatrust_witness_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "omatrust_witness_http_request_duration_seconds",
                    "Witness HTTP request duration in seconds.",
                )
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0,
                ]),
                &["route", "method", "outcome"],
            )
            .expect("create omatrust_witness_http_request_duration_seconds"),
        )
    })
}

fn outcomes_total() -> &'static IntCounterVec {
    OUTCOMES_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "omatrust_witness_outcomes_total",
                    "Witness request outcomes by result code.",
                ),
                &["code"],
            )
            .expect("create omatrust_witness_outcomes_total"),
        )
    })
}

fn submissions_total() -> &'static IntCounter {
    SUBMISSIONS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounter::new(
                "omatrust_witness_submissions_total",
                "Witness attestations confirmed on a ledger.",
            )
            .expect("create omatrust_witness_submissions_total"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

/// `code` is `OK`, `EXISTING`, or an error code.
pub fn observe_outcome(code: &str) {
    outcomes_total().with_label_values(&[code]).inc();
}

pub fn inc_submission() {
    submissions_total().inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_metrics_include_witness_collectors() {
        observe_http_request(
            "/v1/controller-witness",
            "POST",
            200,
            Duration::from_millis(3),
        );
        observe_outcome("EXISTING");
        inc_submission();

        let (body, content_type) = render().expect("metrics should render");
        let text = String::from_utf8(body).expect("metrics are utf-8");

        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("omatrust_witness_http_requests_total"));
        assert!(text.contains("omatrust_witness_outcomes_total{code=\"EXISTING\"}"));
        assert!(text.contains("omatrust_witness_submissions_total"));
    }
}
