use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::modules::batch::services::BatchOrchestrator;

/// Readiness probe response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
}

/// GET /health - store reachability and the rolling 24h failure count.
/// 200 while Healthy or Degraded, 503 when Unhealthy.
pub async fn health_check(orchestrator: web::Data<BatchOrchestrator>) -> impl Responder {
    let report = orchestrator.health_status().await;

    if report.is_serving() {
        HttpResponse::Ok().json(report)
    } else {
        tracing::error!(detail = ?report.detail, "Health check failed");
        HttpResponse::ServiceUnavailable().json(report)
    }
}

/// GET /ready - Readiness probe
pub async fn readiness_check(orchestrator: web::Data<BatchOrchestrator>) -> impl Responder {
    let ready = orchestrator.is_ready().await;
    let response = ReadinessResponse { ready };

    if ready {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

/// Configure health check routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/ready", web::get().to(readiness_check));
}
