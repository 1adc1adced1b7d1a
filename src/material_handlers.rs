// src/material_handlers.rs - Admin material management

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::audit::{audit, AuditAction, AuditEntity};
use crate::auth::get_current_admin;
use crate::catalog::store::{decode_material, material_row_by_id};
use crate::catalog_handlers::MaterialListQuery;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{normalize_certifications, CreateMaterialRequest, Material, UpdateMaterialRequest};
use crate::validator::{CustomValidate, FieldValidator};

async fn fetch_material(pool: &SqlitePool, id: &str) -> ApiResult<Material> {
    let mut conn = pool.acquire().await?;
    let row = material_row_by_id(&mut conn, id)
        .await?
        .ok_or_else(|| ApiError::material_not_found(id))?;
    decode_material(row)
}

async fn ensure_industry_exists(pool: &SqlitePool, industry_id: &str) -> ApiResult<()> {
    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM industries WHERE id = ?")
        .bind(industry_id)
        .fetch_one(pool)
        .await?;
    if exists == 0 {
        return Err(ApiError::validation("industry_id", format!("Industry '{}' does not exist", industry_id)));
    }
    Ok(())
}

async fn ensure_code_free(pool: &SqlitePool, code: &str, except_id: Option<&str>) -> ApiResult<()> {
    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM materials WHERE material_code = ? AND id <> COALESCE(?, '')",
    )
        .bind(code)
        .bind(except_id)
        .fetch_one(pool)
        .await?;
    if taken > 0 {
        return Err(ApiError::Conflict(format!("Material code '{}' already exists", code)));
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> ApiResult<String> {
    serde_json::to_string(value)
        .map_err(|e| ApiError::InternalServerError(format!("Failed to encode material field: {}", e)))
}

pub async fn list_materials_admin(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<MaterialListQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner().into_query(true)?;
    let page = app_state.catalog.list_materials(&query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page)))
}

pub async fn get_material_admin(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let material = fetch_material(&app_state.db_pool, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(material)))
}

pub async fn create_material(
    app_state: web::Data<Arc<AppState>>,
    body: web::Json<CreateMaterialRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    body.custom_validate().into_result()?;
    let claims = get_current_admin(&http_request)?;
    let pool = &app_state.db_pool;
    let body = body.into_inner();

    let code = body.material_code.trim().to_string();
    ensure_industry_exists(pool, &body.industry_id).await?;
    ensure_code_free(pool, &code, None).await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let images: Vec<String> = body.images.iter().map(|i| i.trim().to_string()).collect();

    sqlx::query(
        r#"INSERT INTO materials (
            id, material_code, name, description, images, available_quantity, unit,
            minimum_order_quantity, industry_id, supply_region, certifications, attributes,
            is_featured, is_active, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
        .bind(&id)
        .bind(&code)
        .bind(body.name.trim())
        .bind(&body.description)
        .bind(to_json(&images)?)
        .bind(body.available_quantity)
        .bind(body.unit.trim())
        .bind(body.minimum_order_quantity.unwrap_or(0.0))
        .bind(&body.industry_id)
        .bind(&body.supply_region)
        .bind(to_json(&normalize_certifications(body.certifications))?)
        .bind(to_json(&body.attributes)?)
        .bind(body.is_featured.unwrap_or(false))
        .bind(body.is_active.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    audit(
        pool, &claims.sub, AuditAction::Create, AuditEntity::Material, &id,
        &format!("Created material {} '{}'", code, body.name.trim()), &http_request,
    ).await;
    log::info!("Admin {} created material {}", claims.username, code);

    let material = fetch_material(pool, &id).await?;
    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        material,
        "Material created successfully".to_string(),
    )))
}

pub async fn update_material(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<UpdateMaterialRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let claims = get_current_admin(&http_request)?;
    let pool = &app_state.db_pool;
    let id = path.into_inner();
    let body = body.into_inner();

    let existing = fetch_material(pool, &id).await?;

    let code = body.material_code.as_deref().map(str::trim).unwrap_or(&existing.material_code).to_string();
    FieldValidator::not_empty(&code, "Material code").map_err(|e| ApiError::validation("material_code", e))?;
    if code != existing.material_code {
        ensure_code_free(pool, &code, Some(&id)).await?;
    }

    let industry_id = body.industry_id.unwrap_or_else(|| existing.industry.id.clone());
    if industry_id != existing.industry.id {
        ensure_industry_exists(pool, &industry_id).await?;
    }

    let attributes = body.attributes.unwrap_or(existing.attributes);
    for key in attributes.keys() {
        FieldValidator::filter_key(key).map_err(|e| ApiError::validation("attributes", format!("'{}': {}", key, e)))?;
    }
    let certifications = body
        .certifications
        .map(normalize_certifications)
        .unwrap_or(existing.certifications);

    sqlx::query(
        r#"UPDATE materials SET
            material_code = ?, name = ?, description = ?, images = ?, available_quantity = ?,
            unit = ?, minimum_order_quantity = ?, industry_id = ?, supply_region = ?,
            certifications = ?, attributes = ?, is_featured = ?, is_active = ?, updated_at = ?
           WHERE id = ?"#,
    )
        .bind(&code)
        .bind(body.name.as_deref().map(str::trim).unwrap_or(&existing.name))
        .bind(body.description.or(existing.description))
        .bind(to_json(&body.images.unwrap_or(existing.images))?)
        .bind(body.available_quantity.unwrap_or(existing.available_quantity))
        .bind(body.unit.as_deref().map(str::trim).unwrap_or(&existing.unit))
        .bind(body.minimum_order_quantity.unwrap_or(existing.minimum_order_quantity))
        .bind(&industry_id)
        .bind(body.supply_region.or(existing.supply_region))
        .bind(to_json(&certifications)?)
        .bind(to_json(&attributes)?)
        .bind(body.is_featured.unwrap_or(existing.is_featured))
        .bind(body.is_active.unwrap_or(existing.is_active))
        .bind(Utc::now())
        .bind(&id)
        .execute(pool)
        .await?;

    audit(
        pool, &claims.sub, AuditAction::Update, AuditEntity::Material, &id,
        &format!("Updated material {}", code), &http_request,
    ).await;

    let material = fetch_material(pool, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        material,
        "Material updated successfully".to_string(),
    )))
}

pub async fn delete_material(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_admin(&http_request)?;
    let pool = &app_state.db_pool;
    let id = path.into_inner();

    let material = fetch_material(pool, &id).await?;

    let request_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM buyer_requests WHERE material_id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    if request_count > 0 {
        return Err(ApiError::Conflict(format!(
            "Cannot delete material {}: {} buyer request(s) reference it. Deactivate it instead.",
            material.material_code, request_count
        )));
    }

    sqlx::query("DELETE FROM materials WHERE id = ?")
        .bind(&id)
        .execute(pool)
        .await?;

    audit(
        pool, &claims.sub, AuditAction::Delete, AuditEntity::Material, &id,
        &format!("Deleted material {}", material.material_code), &http_request,
    ).await;
    log::info!("Admin {} deleted material {}", claims.username, material.material_code);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Material deleted successfully".to_string(),
    )))
}
