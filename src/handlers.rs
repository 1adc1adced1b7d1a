// src/handlers.rs
use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use crate::error::ApiResult;
use crate::models::{DashboardStats, StatusCount};

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }

    /// A failed read that still carries an empty result for the client to render.
    pub fn degraded(data: T, message: String) -> Self {
        Self {
            success: false,
            data: Some(data),
            message: Some(message),
        }
    }
}

// ==================== DASHBOARD ====================

pub async fn get_dashboard_stats(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;

    let (total_industries, active_industries): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM industries",
    )
        .fetch_one(pool)
        .await?;

    let (total_materials, active_materials, featured_materials): (i64, i64, i64) = sqlx::query_as(
        r#"SELECT COUNT(*),
                  COALESCE(SUM(is_active), 0),
                  COALESCE(SUM(CASE WHEN is_featured = 1 AND is_active = 1 THEN 1 ELSE 0 END), 0)
           FROM materials"#,
    )
        .fetch_one(pool)
        .await?;

    let requests_by_status: Vec<StatusCount> = sqlx::query_as(
        "SELECT status, COUNT(*) AS count FROM buyer_requests GROUP BY status ORDER BY status",
    )
        .fetch_all(pool)
        .await?;

    let open_requests = requests_by_status
        .iter()
        .filter(|s| s.status != "Completed" && s.status != "Cancelled")
        .map(|s| s.count)
        .sum();

    let stats = DashboardStats {
        total_industries,
        active_industries,
        total_materials,
        active_materials,
        featured_materials,
        open_requests,
        requests_by_status,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}
