// src/main.rs - Eco Marketplace API server
use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpServer,
};
use actix_web_httpauth::middleware::HttpAuthentication;
use actix_web::http::header;
use actix_cors::Cors;
use anyhow::Context;
use rand::Rng;
use rand::seq::SliceRandom;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Sqlite, SqlitePool,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Module declarations
mod audit;
mod auth;
mod auth_handlers;
mod catalog;
mod catalog_handlers;
mod config;
mod db;
mod error;
mod filter_handlers;
mod handlers;
mod industry_handlers;
mod material_handlers;
mod models;
mod monitoring;
mod notifications;
mod pagination;
mod request_handlers;
mod requests;
pub mod validator;

use crate::auth::{jwt_middleware, Admin, AuthService};
use crate::catalog::CatalogClient;
use crate::config::{load_config, Config};
use crate::error::ApiError;
use crate::monitoring::{start_maintenance_tasks, Metrics, RequestLogger};
use crate::notifications::NotificationDispatcher;
use crate::requests::RequestWorkflow;

// ==================== APP STATE ====================

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
    pub catalog: CatalogClient,
    pub workflow: RequestWorkflow,
}

impl AppState {
    pub fn new(
        db_pool: SqlitePool,
        config: Config,
        dispatcher: NotificationDispatcher,
        metrics: Arc<Metrics>,
    ) -> Self {
        let catalog = CatalogClient::new(db_pool.clone(), config.catalog.clone());
        let workflow = RequestWorkflow::new(db_pool.clone(), dispatcher.with_metrics(metrics.clone()))
            .with_metrics(metrics);
        Self { db_pool, config, catalog, workflow }
    }
}

// ==================== ROUTES ====================

pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check and metrics (no auth)
        .service(
            web::scope("/health")
                .route("", web::get().to(monitoring::health_check))
                .route("/ready", web::get().to(monitoring::readiness_check))
                .route("/metrics", web::get().to(monitoring::metrics_endpoint))
        )
        .service(
            web::scope("/api/v1")
                // Backoffice (bearer JWT)
                .service(
                    web::scope("/admin")
                        .wrap(HttpAuthentication::bearer(jwt_middleware))
                        .route("/me", web::get().to(auth_handlers::get_profile))
                        .route("/dashboard/stats", web::get().to(handlers::get_dashboard_stats))
                        .route("/industries", web::get().to(industry_handlers::list_all_industries))
                        .route("/industries", web::post().to(industry_handlers::create_industry))
                        .route("/industries/{id}", web::put().to(industry_handlers::update_industry))
                        .route("/industries/{id}", web::delete().to(industry_handlers::delete_industry))
                        .route("/industries/{id}/toggle-status", web::post().to(industry_handlers::toggle_industry_status))
                        .route("/industries/{id}/filters", web::get().to(filter_handlers::list_industry_filters))
                        .route("/industries/{id}/filters", web::post().to(filter_handlers::create_filter))
                        .route("/filters/{id}", web::put().to(filter_handlers::update_filter))
                        .route("/filters/{id}", web::delete().to(filter_handlers::delete_filter))
                        .route("/materials", web::get().to(material_handlers::list_materials_admin))
                        .route("/materials", web::post().to(material_handlers::create_material))
                        .route("/materials/{id}", web::get().to(material_handlers::get_material_admin))
                        .route("/materials/{id}", web::put().to(material_handlers::update_material))
                        .route("/materials/{id}", web::delete().to(material_handlers::delete_material))
                        .route("/requests", web::get().to(request_handlers::list_requests))
                        .route("/requests/{code}", web::get().to(request_handlers::get_request_with_history))
                        .route("/requests/{code}/status", web::post().to(request_handlers::update_request_status))
                )
                // Session
                .route("/auth/login", web::post().to(auth_handlers::login))
                // Public catalog and buyer requests
                .route("/industries", web::get().to(catalog_handlers::list_industries))
                .route("/industries/{slug}/filters", web::get().to(catalog_handlers::get_industry_filters))
                .route("/materials", web::get().to(catalog_handlers::list_materials))
                .route("/materials/{id}", web::get().to(catalog_handlers::get_material))
                .route("/requests", web::post().to(request_handlers::submit_request))
                .route("/requests/{code}", web::get().to(request_handlers::get_request))
        );
}

fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| ApiError::bad_request(&format!("Invalid request body: {}", err)).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(&format!("Invalid query string: {}", err)).into())
}

// ==================== MAIN ====================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (this calls load_env_file internally)
    let config = load_config()?;

    setup_logging(&config)?;
    config.print_startup_info();

    setup_database(&config.database.url).await?;
    let pool = create_database_pool(&config.database).await?;
    db::run_migrations(&pool).await.context("Database migrations failed")?;

    let auth_service = Arc::new(AuthService::new(
        &config.auth.jwt_secret,
        config.auth.token_expiration_hours,
        config.auth.bcrypt_cost,
    ));
    create_default_admin_if_needed(&pool, &auth_service).await?;

    let metrics_arc = Arc::new(Metrics::new());
    let metrics = web::Data::new(metrics_arc.clone());

    let dispatcher = NotificationDispatcher::from_config(&config.mail)
        .context("Failed to configure mail transport")?;
    let app_state = Arc::new(AppState::new(pool.clone(), config.clone(), dispatcher, metrics_arc.clone()));

    start_maintenance_tasks(pool.clone(), config.logging.audit_retention_days).await;

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    let server_config = config.server.clone();
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(setup_cors(&config))
            .wrap(setup_security_headers(&config.security))
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(RequestLogger::new(metrics_arc.clone()))
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(metrics.clone())
            .app_data(json_config(config.security.max_request_size))
            .app_data(query_config())
            .configure(configure_api)
    })
        .keep_alive(Duration::from_secs(server_config.keep_alive))
        .client_request_timeout(Duration::from_secs(server_config.client_timeout))
        .client_disconnect_timeout(Duration::from_secs(server_config.client_shutdown));

    if let Some(workers) = server_config.workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .run()
        .await
        .context("Server failed to run")?;

    Ok(())
}

// ==================== HELPER FUNCTIONS ====================

fn setup_cors(config: &Config) -> Cors {
    let allowed_origins = &config.security.allowed_origins;
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::USER_AGENT,
            header::REFERER,
        ])
        .expose_headers(vec![header::CONTENT_LENGTH])
        .max_age(3600);

    // Config::validate already rejects a wildcard in production
    if allowed_origins.iter().any(|o| o == "*") {
        log::warn!("Using wildcard CORS (*) in development mode");
        cors = cors.allow_any_origin().allow_any_header().allow_any_method();
    } else {
        for origin in allowed_origins.iter().filter(|o| !o.is_empty()) {
            cors = cors.allowed_origin(origin);
        }
    }

    cors
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(())
}

async fn setup_database(database_url: &str) -> anyhow::Result<()> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        log::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

async fn create_database_pool(db_config: &crate::config::DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&db_config.url)
        .with_context(|| format!("Invalid DATABASE_URL '{}'", db_config.url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.connect_timeout))
        .idle_timeout(Duration::from_secs(db_config.idle_timeout))
        .connect_with(options)
        .await
        .context("Failed to open database pool")?;
    Ok(pool)
}

fn setup_security_headers(config: &crate::config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("X-XSS-Protection", "1; mode=block"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload"
        ));
    }

    headers
}

/// Random password that satisfies the admin password policy.
fn generate_admin_password() -> String {
    const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
    const DIGITS: &[u8] = b"23456789";
    const SPECIALS: &[u8] = b"!@#$%^&*-_=+";

    let mut rng = rand::thread_rng();
    let mut pick = |set: &[u8]| set[rng.gen_range(0..set.len())] as char;

    let mut chars: Vec<char> = vec![pick(UPPER), pick(LOWER), pick(DIGITS), pick(SPECIALS)];
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIALS].concat();
    for _ in 0..12 {
        chars.push(pick(&all));
    }

    chars.shuffle(&mut rand::thread_rng());
    chars.into_iter().collect()
}

async fn create_default_admin_if_needed(
    pool: &SqlitePool,
    auth_service: &AuthService,
) -> anyhow::Result<()> {
    if Admin::count(pool).await? > 0 {
        return Ok(());
    }

    let (password, generated) = match std::env::var("DEFAULT_ADMIN_PASSWORD") {
        Ok(password) => (password, false),
        Err(_) => (generate_admin_password(), true),
    };

    Admin::create(pool, "admin", "admin@ecotrade.local", &password, auth_service)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create default admin: {}", e))?;

    log::warn!("Default admin account created:");
    log::warn!("  Username: admin");
    if generated {
        log::warn!("  Password: {} (generated - CHANGE IMMEDIATELY!)", password);
    } else {
        log::warn!("  Password: taken from DEFAULT_ADMIN_PASSWORD");
    }

    Ok(())
}
