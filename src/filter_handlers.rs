// src/filter_handlers.rs - Admin management of per-industry filter definitions

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::audit::{audit, AuditAction, AuditEntity};
use crate::auth::get_current_admin;
use crate::catalog::decode_filter_definitions;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::industry_handlers::fetch_industry;
use crate::models::{
    check_filter_options, CreateFilterDefinitionRequest, FilterDefinition, FilterDefinitionRow,
    UpdateFilterDefinitionRequest,
};
use crate::validator::CustomValidate;

fn clean_options(options: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(options.len());
    for option in options {
        let option = option.trim().to_string();
        if !cleaned.contains(&option) {
            cleaned.push(option);
        }
    }
    cleaned
}

fn encode_options(options: &[String]) -> ApiResult<String> {
    serde_json::to_string(options)
        .map_err(|e| ApiError::InternalServerError(format!("Failed to encode filter options: {}", e)))
}

async fn fetch_filter(pool: &SqlitePool, id: &str) -> ApiResult<FilterDefinition> {
    let row = sqlx::query_as::<_, FilterDefinitionRow>("SELECT * FROM filter_definitions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Filter definition"))?;

    decode_filter_definitions(vec![row])?
        .pop()
        .ok_or_else(|| ApiError::not_found("Filter definition"))
}

pub async fn list_industry_filters(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let industry_id = path.into_inner();
    fetch_industry(pool, &industry_id).await?;

    let rows = sqlx::query_as::<_, FilterDefinitionRow>(
        "SELECT * FROM filter_definitions WHERE industry_id = ? ORDER BY display_order ASC, label ASC",
    )
        .bind(&industry_id)
        .fetch_all(pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(decode_filter_definitions(rows)?)))
}

pub async fn create_filter(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<CreateFilterDefinitionRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    body.custom_validate().into_result()?;
    let claims = get_current_admin(&http_request)?;
    let pool = &app_state.db_pool;
    let industry_id = path.into_inner();
    let body = body.into_inner();

    let industry = fetch_industry(pool, &industry_id).await?;

    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM filter_definitions WHERE industry_id = ? AND filter_key = ?",
    )
        .bind(&industry_id)
        .bind(&body.key)
        .fetch_one(pool)
        .await?;
    if taken > 0 {
        return Err(ApiError::Conflict(format!(
            "Filter '{}' already exists for industry '{}'",
            body.key, industry.name
        )));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let options = clean_options(body.options);

    sqlx::query(
        r#"INSERT INTO filter_definitions
           (id, industry_id, filter_key, label, filter_type, options, display_order, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
        .bind(&id)
        .bind(&industry_id)
        .bind(&body.key)
        .bind(body.label.trim())
        .bind(body.filter_type.as_ref())
        .bind(encode_options(&options)?)
        .bind(body.display_order.unwrap_or(0))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    audit(
        pool, &claims.sub, AuditAction::Create, AuditEntity::FilterDefinition, &id,
        &format!("Created {} filter '{}' for industry '{}'", body.filter_type, body.key, industry.name),
        &http_request,
    ).await;

    let filter = fetch_filter(pool, &id).await?;
    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        filter,
        "Filter created successfully".to_string(),
    )))
}

pub async fn update_filter(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<UpdateFilterDefinitionRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let claims = get_current_admin(&http_request)?;
    let pool = &app_state.db_pool;
    let id = path.into_inner();
    let body = body.into_inner();

    let existing = fetch_filter(pool, &id).await?;

    let filter_type = body.filter_type.unwrap_or(existing.filter_type);
    let options = match body.options {
        Some(options) => clean_options(options),
        // Switching to boolean drops the old options
        None if !filter_type.has_options() => Vec::new(),
        None => existing.options,
    };
    check_filter_options(filter_type, &options).map_err(|e| ApiError::validation("options", e))?;

    sqlx::query(
        r#"UPDATE filter_definitions
           SET label = ?, filter_type = ?, options = ?, display_order = ?, updated_at = ?
           WHERE id = ?"#,
    )
        .bind(body.label.as_deref().map(str::trim).unwrap_or(&existing.label))
        .bind(filter_type.as_ref())
        .bind(encode_options(&options)?)
        .bind(body.display_order.unwrap_or(existing.display_order))
        .bind(Utc::now())
        .bind(&id)
        .execute(pool)
        .await?;

    audit(
        pool, &claims.sub, AuditAction::Update, AuditEntity::FilterDefinition, &id,
        &format!("Updated filter '{}'", existing.key), &http_request,
    ).await;

    let filter = fetch_filter(pool, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        filter,
        "Filter updated successfully".to_string(),
    )))
}

pub async fn delete_filter(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_admin(&http_request)?;
    let pool = &app_state.db_pool;
    let id = path.into_inner();

    let existing = fetch_filter(pool, &id).await?;

    sqlx::query("DELETE FROM filter_definitions WHERE id = ?")
        .bind(&id)
        .execute(pool)
        .await?;

    audit(
        pool, &claims.sub, AuditAction::Delete, AuditEntity::FilterDefinition, &id,
        &format!("Deleted filter '{}'", existing.key), &http_request,
    ).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Filter deleted successfully".to_string(),
    )))
}
