use actix_web::{web, HttpRequest, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::core::{Clock, Result};
use crate::middleware::correlation_id;
use crate::modules::batch::services::BatchOrchestrator;

#[derive(Debug, Default, Deserialize)]
pub struct DueRunRequest {
    /// Defaults to today
    pub date: Option<NaiveDate>,
}

/// POST /jobs/due
pub async fn run_due(
    req: HttpRequest,
    orchestrator: web::Data<BatchOrchestrator>,
    clock: web::Data<dyn Clock>,
    body: Option<web::Json<DueRunRequest>>,
) -> Result<HttpResponse> {
    let correlation_id = correlation_id(&req);
    let date = body
        .and_then(|b| b.into_inner().date)
        .unwrap_or_else(|| clock.today());

    tracing::info!(%date, correlation_id = %correlation_id, "Due run triggered over HTTP");

    let result = orchestrator.process_due(date, &correlation_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// POST /jobs/retries
pub async fn run_retries(
    req: HttpRequest,
    orchestrator: web::Data<BatchOrchestrator>,
) -> Result<HttpResponse> {
    let correlation_id = correlation_id(&req);
    let result = orchestrator.process_retries(&correlation_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// POST /jobs/overdue
pub async fn run_overdue(
    req: HttpRequest,
    orchestrator: web::Data<BatchOrchestrator>,
) -> Result<HttpResponse> {
    let correlation_id = correlation_id(&req);
    let result = orchestrator.process_overdue(&correlation_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/jobs")
            .route("/due", web::post().to(run_due))
            .route("/retries", web::post().to(run_retries))
            .route("/overdue", web::post().to(run_overdue)),
    );
}
