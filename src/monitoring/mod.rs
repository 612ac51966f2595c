//! Request metrics and business counters, exported in Prometheus format.

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::{web, Error, HttpResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::access::ResetReport;
use crate::error::AccessError;
use crate::AppState;

/// Installs the global Prometheus recorder. Returns `None` if one is
/// already installed.
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics recorder initialized");
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

pub async fn metrics_endpoint(state: web::Data<AppState>) -> HttpResponse {
    match state.prometheus.as_ref() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("Metrics not enabled or failed to initialize"),
    }
}

fn outcome(status: u16) -> &'static str {
    if status >= 500 {
        "error"
    } else if status >= 400 {
        "client_error"
    } else {
        "success"
    }
}

/// Counts and times every request, labelled by route pattern.
pub async fn track_requests(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let start = Instant::now();
    let method = req.method().to_string();
    // The route pattern keeps label cardinality bounded.
    let route = req.match_pattern().unwrap_or_else(|| "unmatched".to_string());

    let span = info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %method,
        path = %req.path(),
        route = %route,
    );

    async move {
        let result = next.call(req).await;
        let status = match &result {
            Ok(res) => res.status().as_u16(),
            Err(e) => e.as_response_error().status_code().as_u16(),
        };

        let labels = [
            ("method", method),
            ("path", route),
            ("status", status.to_string()),
        ];
        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());

        info!(
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            status_code = status,
            outcome = outcome(status),
            "Request finished"
        );

        result
    }
    .instrument(span)
    .await
}

pub fn record_access_denied(error: &AccessError) {
    let (reason, action, tier) = match error {
        AccessError::QuotaExceeded { action, tier, .. } => ("quota_exceeded", action, tier),
        AccessError::TierRequired { action, tier } => ("tier_required", action, tier),
    };
    let labels = [
        ("reason", reason.to_string()),
        ("action", action.as_str().to_string()),
        ("tier", tier.as_str().to_string()),
    ];
    metrics::counter!("access_denied_total", &labels).increment(1);
}

pub fn record_usage_reset(report: &ResetReport) {
    metrics::counter!("usage_reset_runs_total").increment(1);
    metrics::counter!("usage_reset_users_total", "result" => "reset").increment(report.reset as u64);
    metrics::counter!("usage_reset_users_total", "result" => "skipped").increment(report.skipped as u64);
    metrics::counter!("usage_reset_users_total", "result" => "failed").increment(report.failed as u64);
}

pub fn record_download(industry: &str, format: &str) {
    let labels = [("industry", industry.to_string()), ("format", format.to_string())];
    metrics::counter!("template_downloads_total", &labels).increment(1);
}

pub fn record_ai_stage(stage: &str, ok: bool, elapsed: Duration) {
    let labels = [
        ("stage", stage.to_string()),
        ("result", if ok { "ok" } else { "error" }.to_string()),
    ];
    metrics::counter!("ai_stage_total", &labels).increment(1);
    metrics::histogram!("ai_stage_duration_seconds", &labels).record(elapsed.as_secs_f64());
}

pub fn record_ai_generation(format: &str) {
    metrics::counter!("ai_documents_generated_total", "format" => format.to_string()).increment(1);
}

pub fn record_ai_suggestion() {
    metrics::counter!("ai_suggestions_total").increment(1);
}

pub fn record_export(platform: &str, ok: bool) {
    let labels = [
        ("platform", platform.to_string()),
        ("result", if ok { "ok" } else { "error" }.to_string()),
    ];
    metrics::counter!("platform_exports_total", &labels).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_buckets() {
        assert_eq!(outcome(200), "success");
        assert_eq!(outcome(403), "client_error");
        assert_eq!(outcome(502), "error");
    }

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        record_download("Healthcare", "xlsx");
        record_ai_stage("analyze", true, Duration::from_millis(5));
        record_usage_reset(&ResetReport { reset: 1, skipped: 0, failed: 0 });
    }
}
