// src/audit.rs
//! Admin activity trail stored in `audit_logs`.

use actix_web::HttpRequest;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    ToggleStatus,
    StatusChange,
    Login,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum AuditEntity {
    Industry,
    Material,
    FilterDefinition,
    BuyerRequest,
    Admin,
}

fn client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info().realip_remote_addr().map(|s| s.to_string())
}

fn user_agent(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

pub async fn log_activity(
    pool: &SqlitePool,
    admin_id: Option<&str>,
    action: AuditAction,
    entity: AuditEntity,
    entity_id: Option<&str>,
    description: Option<&str>,
    changes: Option<&serde_json::Value>,
    request: Option<&HttpRequest>,
) -> Result<(), sqlx::Error> {
    let changes = changes.map(|c| c.to_string());

    sqlx::query(
        r#"INSERT INTO audit_logs
           (id, user_id, action, entity_type, entity_id, description, changes, ip_address, user_agent, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(admin_id)
    .bind(action.as_ref())
    .bind(entity.as_ref())
    .bind(entity_id)
    .bind(description)
    .bind(changes)
    .bind(request.and_then(client_ip))
    .bind(request.and_then(user_agent))
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Records an admin mutation. Failures are logged, never returned: the
/// mutation has already happened.
pub async fn audit(
    pool: &SqlitePool,
    admin_id: &str,
    action: AuditAction,
    entity: AuditEntity,
    entity_id: &str,
    description: &str,
    request: &HttpRequest,
) {
    if let Err(e) = log_activity(
        pool,
        Some(admin_id),
        action,
        entity,
        Some(entity_id),
        Some(description),
        None,
        Some(request),
    )
    .await
    {
        log::error!("Failed to write audit log for {} {}: {}", entity, entity_id, e);
    }
}
