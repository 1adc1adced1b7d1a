// src/auth_handlers.rs - Admin session handlers

use actix_web::{web, HttpRequest, HttpResponse};
use validator::Validate;
use std::sync::Arc;
use chrono::{Duration, Utc};

use crate::audit::{audit, AuditAction, AuditEntity};
use crate::handlers::ApiResponse;
use crate::auth::{Admin, AdminInfo, AuthService, LoginRequest, LoginResponse, get_current_admin};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

fn invalid_credentials() -> ApiError {
    ApiError::AuthError("Invalid username or password".to_string())
}

pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let pool = &app_state.db_pool;
    let auth_config = &app_state.config.auth;

    let mut admin = Admin::find_by_username(pool, request.username.trim())
        .await?
        .ok_or_else(invalid_credentials)?;

    if !admin.is_active {
        return Err(invalid_credentials());
    }

    if admin.is_locked() {
        return Err(ApiError::AuthError("Account is temporarily locked. Try again later.".to_string()));
    }

    // An expired lock starts a fresh attempt window
    if admin.locked_until.map(|until| Utc::now() >= until).unwrap_or(false) {
        admin.reset_failed_attempts(pool).await?;
    }

    let password_ok = auth_service
        .verify_password(&request.password, &admin.password_hash)
        .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))?;

    if !password_ok {
        admin.increment_failed_attempts(pool).await?;

        if admin.failed_login_attempts >= i64::from(auth_config.max_login_attempts) {
            let minutes = auth_config.lockout_duration_minutes as i64;
            admin.lock_for_duration(pool, Duration::minutes(minutes)).await?;
            log::warn!("Admin {} locked after {} failed logins", admin.username, admin.failed_login_attempts);
            return Err(ApiError::AuthError(format!(
                "Account locked due to too many failed attempts. Try again in {} minutes.",
                minutes
            )));
        }

        return Err(invalid_credentials());
    }

    admin.reset_failed_attempts(pool).await?;
    admin.update_last_login(pool).await?;

    let token = auth_service.generate_token(&admin)?;
    let username = admin.username.clone();

    audit(
        pool, &admin.id, AuditAction::Login, AuditEntity::Admin, &admin.id,
        &format!("Admin {} logged in", username), &http_request,
    ).await;

    let response = LoginResponse {
        token,
        expires_in: auth_service.token_lifetime_secs(),
        admin: admin.into(),
    };

    log::info!("Admin {} logged in successfully", username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        response,
        "Login successful".to_string(),
    )))
}

pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_admin(&http_request)?;
    let admin = Admin::find_by_id(&app_state.db_pool, &claims.sub).await?;
    let info: AdminInfo = admin.into();
    Ok(HttpResponse::Ok().json(ApiResponse::success(info)))
}
