//! Prometheus metrics for the message vault.
//!
//! Exposes:
//! - `datavault_messages_imported_total` (counter with source)
//! - `datavault_enrichment_total` (counter with status)
//! - `datavault_enrichment_inflight` (gauge)
//! - `datavault_search_duration_seconds` (histogram)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram, register_int_counter_vec, register_int_gauge, Encoder,
    Histogram, IntCounterVec, IntGauge, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Enrichment outcome label values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentStatus {
    /// Classified and embedded
    Ok,
    /// Finished terminally but with a degraded capability (no embedding)
    Degraded,
    /// Finished terminally with a recorded error
    Error,
}

impl EnrichmentStatus {
    fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Ok => "ok",
            EnrichmentStatus::Degraded => "degraded",
            EnrichmentStatus::Error => "error",
        }
    }
}

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static IMPORTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "datavault_messages_imported_total",
        "Total messages created by source",
        &["source"]
    )
    .expect("failed to register import counter")
});

static ENRICHMENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "datavault_enrichment_total",
        "Total enrichment runs by status",
        &["status"]
    )
    .expect("failed to register enrichment counter")
});

static ENRICHMENT_INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "datavault_enrichment_inflight",
        "Number of in-flight enrichment tasks"
    )
    .expect("failed to register inflight gauge")
});

static SEARCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    // Exponential buckets from 5ms up to ~20 seconds.
    let buckets =
        prometheus::exponential_buckets(0.005, 2.0, 12).expect("failed to create histogram buckets");
    register_histogram!(
        "datavault_search_duration_seconds",
        "Hybrid search duration in seconds",
        buckets
    )
    .expect("failed to register search duration histogram")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&IMPORTED_TOTAL);
    Lazy::force(&ENRICHMENT_TOTAL);
    Lazy::force(&ENRICHMENT_INFLIGHT);
    Lazy::force(&SEARCH_DURATION);
}

/// Count created messages by source ("import", "live").
pub fn record_messages_created(source: &'static str, count: u64) {
    init_collectors();
    IMPORTED_TOTAL.with_label_values(&[source]).inc_by(count);
}

/// Increment the inflight gauge when an enrichment task is scheduled.
pub fn record_enrichment_start() {
    init_collectors();
    ENRICHMENT_INFLIGHT.inc();
}

/// Record enrichment completion with its outcome.
pub fn record_enrichment_result(status: EnrichmentStatus) {
    init_collectors();
    ENRICHMENT_INFLIGHT.dec();
    ENRICHMENT_TOTAL.with_label_values(&[status.as_str()]).inc();
}

/// Record a search duration.
pub fn record_search_duration(duration: Duration) {
    init_collectors();
    SEARCH_DURATION.observe(duration.as_secs_f64());
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Full::from("encode error"))
            .unwrap());
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, encoder.format_type())
        .body(Full::from(buffer))
        .unwrap())
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .unwrap()),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    // Other test threads in this binary also drive enrichment, so counter
    // assertions are monotonic rather than exact.
    #[test]
    fn records_enrichment_lifecycle() {
        init_collectors();
        let ok_before = ENRICHMENT_TOTAL.with_label_values(&["ok"]).get();

        record_enrichment_start();
        record_enrichment_result(EnrichmentStatus::Ok);

        assert!(ENRICHMENT_TOTAL.with_label_values(&["ok"]).get() >= ok_before + 1);
    }

    #[test]
    fn records_degraded_and_error_statuses() {
        init_collectors();
        let degraded_before = ENRICHMENT_TOTAL.with_label_values(&["degraded"]).get();
        let error_before = ENRICHMENT_TOTAL.with_label_values(&["error"]).get();

        record_enrichment_start();
        record_enrichment_result(EnrichmentStatus::Degraded);
        record_enrichment_start();
        record_enrichment_result(EnrichmentStatus::Error);

        assert!(
            ENRICHMENT_TOTAL.with_label_values(&["degraded"]).get() >= degraded_before + 1
        );
        assert!(ENRICHMENT_TOTAL.with_label_values(&["error"]).get() >= error_before + 1);
    }

    #[test]
    fn records_created_messages_by_source() {
        init_collectors();
        let before = IMPORTED_TOTAL.with_label_values(&["test_source"]).get();

        record_messages_created("test_source", 3);

        assert_eq!(
            IMPORTED_TOTAL.with_label_values(&["test_source"]).get(),
            before + 3
        );
    }

    #[test]
    fn records_search_duration() {
        init_collectors();
        let before = SEARCH_DURATION.get_sample_count();

        record_search_duration(Duration::from_millis(25));

        assert!(SEARCH_DURATION.get_sample_count() >= before + 1);
        assert!(SEARCH_DURATION.get_sample_sum() >= 0.025);
    }

    #[test]
    fn enrichment_status_labels() {
        assert_eq!(EnrichmentStatus::Ok.as_str(), "ok");
        assert_eq!(EnrichmentStatus::Degraded.as_str(), "degraded");
        assert_eq!(EnrichmentStatus::Error.as_str(), "error");
    }

    #[test]
    fn init_collectors_can_be_called_multiple_times() {
        init_collectors();
        init_collectors();
        init_collectors();
        // Should not panic
    }

    #[tokio::test]
    async fn metrics_response_contains_registered_metrics() {
        record_messages_created("live", 1);

        let response = metrics_response().await.expect("metrics response");
        assert_eq!(response.status(), StatusCode::OK);

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect metrics body")
            .to_bytes();
        let text = String::from_utf8(body_bytes.to_vec()).expect("utf-8 metrics body");
        assert!(text.contains("datavault_messages_imported_total"));
        assert!(text.contains("datavault_enrichment_inflight"));
    }

    #[tokio::test]
    async fn metrics_response_has_correct_content_type() {
        let response = metrics_response().await.expect("metrics response");

        let content_type = response.headers().get(hyper::header::CONTENT_TYPE);
        assert!(content_type.is_some());

        let ct_str = content_type.unwrap().to_str().unwrap();
        assert!(ct_str.contains("text/plain") || ct_str.contains("text/"));
    }
}
