use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;

use crate::metrics::{MetricsSnapshot, ProbeMetrics};

pub const SERVICE_TYPE: &str = "uppe-probe";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    status: u16,
    message: &'static str,
    service_type: &'static str,
    metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionBody {
    probe_version: &'static str,
}

fn status(metrics: &ProbeMetrics) -> HttpResponse {
    HttpResponse::Ok().json(StatusBody {
        status: 200,
        message: "Service Status - OK",
        service_type: SERVICE_TYPE,
        metrics: metrics.snapshot(),
    })
}

fn version() -> HttpResponse {
    HttpResponse::Ok().json(VersionBody { probe_version: env!("CARGO_PKG_VERSION") })
}

/// Liveness route, with the counters of every cycle run so far
#[get("/status")]
pub async fn status_route(metrics: web::Data<ProbeMetrics>) -> impl Responder {
    status(&metrics)
}

/// Same as `/status`, under the prefix the ingress forwards
#[get("/probe/status")]
pub async fn probe_status_route(metrics: web::Data<ProbeMetrics>) -> impl Responder {
    status(&metrics)
}

#[get("/version")]
pub async fn version_route() -> impl Responder {
    version()
}

#[get("/probe/version")]
pub async fn probe_version_route() -> impl Responder {
    version()
}
