// src/industry_handlers.rs - Admin industry management

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::audit::{audit, AuditAction, AuditEntity};
use crate::auth::get_current_admin;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{slugify, CreateIndustryRequest, Industry, UpdateIndustryRequest};
use crate::validator::{CustomValidate, FieldValidator};

pub(crate) async fn fetch_industry(pool: &SqlitePool, id: &str) -> ApiResult<Industry> {
    sqlx::query_as::<_, Industry>(
        r#"SELECT i.*,
                  (SELECT COUNT(*) FROM materials m
                    WHERE m.industry_id = i.id AND m.is_active = 1) AS material_count
           FROM industries i WHERE i.id = ?"#,
    )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::industry_not_found(id))
}

async fn ensure_slug_free(pool: &SqlitePool, slug: &str, except_id: Option<&str>) -> ApiResult<()> {
    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM industries WHERE slug = ? AND id <> COALESCE(?, '')",
    )
        .bind(slug)
        .bind(except_id)
        .fetch_one(pool)
        .await?;

    if taken > 0 {
        return Err(ApiError::Conflict(format!("Industry slug '{}' is already in use", slug)));
    }
    Ok(())
}

pub async fn list_all_industries(app_state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let industries = app_state.catalog.all_industries().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(industries)))
}

pub async fn create_industry(
    app_state: web::Data<Arc<AppState>>,
    body: web::Json<CreateIndustryRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    body.custom_validate().into_result()?;
    let claims = get_current_admin(&http_request)?;
    let pool = &app_state.db_pool;

    let name = body.name.trim().to_string();
    let slug = body
        .slug
        .as_deref()
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| slugify(&name));
    ensure_slug_free(pool, &slug, None).await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO industries (id, name, slug, description, icon, display_order, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
        .bind(&id)
        .bind(&name)
        .bind(&slug)
        .bind(&body.description)
        .bind(&body.icon)
        .bind(body.display_order.unwrap_or(0))
        .bind(body.is_active.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    audit(
        pool, &claims.sub, AuditAction::Create, AuditEntity::Industry, &id,
        &format!("Created industry '{}' ({})", name, slug), &http_request,
    ).await;
    log::info!("Admin {} created industry {}", claims.username, slug);

    let industry = fetch_industry(pool, &id).await?;
    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        industry,
        "Industry created successfully".to_string(),
    )))
}

pub async fn update_industry(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<UpdateIndustryRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let claims = get_current_admin(&http_request)?;
    let pool = &app_state.db_pool;
    let id = path.into_inner();

    let existing = fetch_industry(pool, &id).await?;

    let name = body.name.as_deref().map(str::trim).unwrap_or(&existing.name).to_string();
    FieldValidator::not_empty(&name, "Name").map_err(|e| ApiError::validation("name", e))?;

    let slug = match body.slug.as_deref().map(str::trim) {
        Some(slug) => {
            FieldValidator::slug(slug).map_err(|e| ApiError::validation("slug", e))?;
            slug.to_string()
        }
        None => existing.slug.clone(),
    };
    if slug != existing.slug {
        ensure_slug_free(pool, &slug, Some(&id)).await?;
    }

    sqlx::query(
        r#"UPDATE industries
           SET name = ?, slug = ?, description = ?, icon = ?, display_order = ?, is_active = ?, updated_at = ?
           WHERE id = ?"#,
    )
        .bind(&name)
        .bind(&slug)
        .bind(body.description.as_ref().or(existing.description.as_ref()))
        .bind(body.icon.as_ref().or(existing.icon.as_ref()))
        .bind(body.display_order.unwrap_or(existing.display_order))
        .bind(body.is_active.unwrap_or(existing.is_active))
        .bind(Utc::now())
        .bind(&id)
        .execute(pool)
        .await?;

    audit(
        pool, &claims.sub, AuditAction::Update, AuditEntity::Industry, &id,
        &format!("Updated industry '{}'", name), &http_request,
    ).await;

    let industry = fetch_industry(pool, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        industry,
        "Industry updated successfully".to_string(),
    )))
}

pub async fn delete_industry(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_admin(&http_request)?;
    let pool = &app_state.db_pool;
    let id = path.into_inner();

    let industry = fetch_industry(pool, &id).await?;

    let material_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM materials WHERE industry_id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    if material_count > 0 {
        return Err(ApiError::Conflict(format!(
            "Cannot delete industry '{}': {} material(s) still reference it",
            industry.name, material_count
        )));
    }

    sqlx::query("DELETE FROM industries WHERE id = ?")
        .bind(&id)
        .execute(pool)
        .await?;

    audit(
        pool, &claims.sub, AuditAction::Delete, AuditEntity::Industry, &id,
        &format!("Deleted industry '{}'", industry.name), &http_request,
    ).await;
    log::info!("Admin {} deleted industry {}", claims.username, industry.slug);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Industry deleted successfully".to_string(),
    )))
}

pub async fn toggle_industry_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_admin(&http_request)?;
    let pool = &app_state.db_pool;
    let id = path.into_inner();

    let existing = fetch_industry(pool, &id).await?;
    let is_active = !existing.is_active;

    sqlx::query("UPDATE industries SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(is_active)
        .bind(Utc::now())
        .bind(&id)
        .execute(pool)
        .await?;

    audit(
        pool, &claims.sub, AuditAction::ToggleStatus, AuditEntity::Industry, &id,
        &format!("Industry '{}' {}", existing.name, if is_active { "activated" } else { "deactivated" }),
        &http_request,
    ).await;

    let industry = fetch_industry(pool, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(industry)))
}
