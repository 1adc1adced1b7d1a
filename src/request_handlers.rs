// src/request_handlers.rs - Buyer request endpoints (public submission/lookup, admin workflow)

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

use crate::AppState;
use crate::audit::{audit, AuditAction, AuditEntity};
use crate::auth::get_current_admin;
use crate::error::ApiResult;
use crate::handlers::ApiResponse;
use crate::models::{RequestDetail, RequestDraft, RequestListQuery, TransitionRequest};
use crate::pagination::Pagination;

#[derive(Debug, Serialize)]
struct RequestList {
    requests: Vec<RequestDetail>,
    pagination: Pagination,
}

// ==================== PUBLIC ====================

pub async fn submit_request(
    app_state: web::Data<Arc<AppState>>,
    draft: web::Json<RequestDraft>,
) -> ApiResult<HttpResponse> {
    let submitted = app_state.workflow.submit(draft.into_inner()).await?;
    let message = format!("Request {} submitted successfully", submitted.request_code);
    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(submitted, message)))
}

pub async fn get_request(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let code = path.into_inner();
    let detail = app_state.workflow.verify(&code).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(detail)))
}

// ==================== ADMIN ====================

pub async fn list_requests(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<RequestListQuery>,
) -> ApiResult<HttpResponse> {
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let (requests, pagination) = app_state
        .workflow
        .list(query.status, search, query.page, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(RequestList { requests, pagination })))
}

pub async fn get_request_with_history(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let code = path.into_inner();
    let request = app_state.workflow.get_with_history(&code).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(request)))
}

pub async fn update_request_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<TransitionRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let claims = get_current_admin(&http_request)?;
    let code = path.into_inner();
    let note = body.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let updated = app_state
        .workflow
        .transition(&code, body.status, &claims.username, note)
        .await?;

    audit(
        &app_state.db_pool,
        &claims.sub,
        AuditAction::StatusChange,
        AuditEntity::BuyerRequest,
        &code,
        &format!("Status changed to {}", updated.request.status),
        &http_request,
    )
    .await;

    let message = format!("Request {} is now {}", code, updated.request.status);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(updated, message)))
}
