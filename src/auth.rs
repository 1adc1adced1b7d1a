use bcrypt::{hash, verify};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;
use actix_web::web;
use actix_web::HttpMessage;
use validator::Validate;
use actix_web::{HttpRequest, dev::ServiceRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use crate::error::{ApiError, ApiResult};

// ======== ADMIN MODEL ========

/// Backoffice account. Every admin may manage the catalog and buyer requests.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Admin {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub failed_login_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub admin: AdminInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<Admin> for AdminInfo {
    fn from(admin: Admin) -> Self {
        Self {
            id: admin.id,
            username: admin.username,
            email: admin.email,
            last_login: admin.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // admin id
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiration_hours: i64,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_expiration_hours: i64, bcrypt_cost: u32) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_expiration_hours,
            bcrypt_cost,
        }
    }

    pub fn token_lifetime_secs(&self) -> i64 {
        self.token_expiration_hours * 3600
    }

    pub fn hash_password(&self, password: &str) -> ApiResult<String> {
        validate_password_strength(password)?;
        hash(password, self.bcrypt_cost)
            .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
        verify(password, hash)
    }

    pub fn generate_token(&self, admin: &Admin) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.token_expiration_hours);

        let claims = Claims {
            sub: admin.id.clone(),
            username: admin.username.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::AuthError("Failed to generate token".to_string()))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                match err.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature =>
                        ApiError::AuthError("Token expired".to_string()),
                    jsonwebtoken::errors::ErrorKind::InvalidToken =>
                        ApiError::AuthError("Invalid token".to_string()),
                    _ =>
                        ApiError::AuthError("Token verification failed".to_string()),
                }
            })
    }
}

// ======== PASSWORD VALIDATION ========

fn validate_password_strength(password: &str) -> ApiResult<()> {
    let message = if password.len() < 8 {
        "Password must be at least 8 characters"
    } else if !password.chars().any(|c| c.is_ascii_uppercase()) {
        "Password must contain at least one uppercase letter"
    } else if !password.chars().any(|c| c.is_ascii_lowercase()) {
        "Password must contain at least one lowercase letter"
    } else if !password.chars().any(|c| c.is_ascii_digit()) {
        "Password must contain at least one digit"
    } else {
        return Ok(());
    };
    Err(ApiError::validation("password", message))
}

// ======== ADMIN METHODS ========

impl Admin {
    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> ApiResult<Option<Admin>> {
        let admin = sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;
        Ok(admin)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<Admin> {
        sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Admin"))
    }

    pub async fn count(pool: &SqlitePool) -> ApiResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admins")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    pub async fn create(
        pool: &SqlitePool,
        username: &str,
        email: &str,
        password: &str,
        auth_service: &AuthService,
    ) -> ApiResult<Admin> {
        let now = Utc::now();
        let admin = Admin {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: auth_service.hash_password(password)?,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
            failed_login_attempts: 0,
            locked_until: None,
        };

        sqlx::query(
            r#"INSERT INTO admins (
                id, username, email, password_hash, is_active,
                created_at, updated_at, failed_login_attempts, locked_until
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
            .bind(&admin.id)
            .bind(&admin.username)
            .bind(&admin.email)
            .bind(&admin.password_hash)
            .bind(admin.is_active)
            .bind(admin.created_at)
            .bind(admin.updated_at)
            .bind(admin.failed_login_attempts)
            .bind(admin.locked_until)
            .execute(pool)
            .await?;

        Ok(admin)
    }

    pub async fn update_last_login(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query("UPDATE admins SET last_login = ? WHERE id = ?")
            .bind(now)
            .bind(&self.id)
            .execute(pool)
            .await?;
        self.last_login = Some(now);
        Ok(())
    }

    // Lockout management
    pub fn is_locked(&self) -> bool {
        self.locked_until.map(|until| Utc::now() < until).unwrap_or(false)
    }

    pub async fn increment_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts += 1;
        sqlx::query("UPDATE admins SET failed_login_attempts = ? WHERE id = ?")
            .bind(self.failed_login_attempts)
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn lock_for_duration(&mut self, pool: &SqlitePool, duration: Duration) -> ApiResult<()> {
        self.locked_until = Some(Utc::now() + duration);
        sqlx::query("UPDATE admins SET locked_until = ? WHERE id = ?")
            .bind(self.locked_until)
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn reset_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts = 0;
        self.locked_until = None;
        sqlx::query(
            "UPDATE admins SET failed_login_attempts = 0, locked_until = NULL WHERE id = ?"
        )
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

// ======== HELPER FUNCTIONS ========

pub fn get_current_admin(req: &HttpRequest) -> ApiResult<Claims> {
    req.extensions()
        .get::<Claims>().cloned()
        .ok_or_else(|| ApiError::Unauthorized("No admin session found".to_string()))
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let auth_service = match req.app_data::<web::Data<std::sync::Arc<AuthService>>>() {
        Some(svc) => svc,
        None => {
            log::error!("AuthService not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    match auth_service.verify_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(req)
        }
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            Err((err.into(), req))
        }
    }
}
