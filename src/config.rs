// src/config.rs - Configuration management
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::fs;
use std::time::Duration;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub mail: MailConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub keep_alive: u64,
    pub client_timeout: u64,
    pub client_shutdown: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub idle_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiration_hours: i64,
    pub bcrypt_cost: u32,
    pub max_login_attempts: u32,
    pub lockout_duration_minutes: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub max_request_size: usize,
    pub require_https: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub audit_retention_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    pub from_name: String,
    pub use_starttls: bool,
    pub timeout_secs: u64,
    /// Operations inbox that receives a copy of every confirmation.
    pub admin_copy_to: Option<String>,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    pub default_page_size: i64,
    pub max_page_size: i64,
    pub related_limit: i64,
}

// Test-friendly defaults; production values come from the TOML file or environment
impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev_only_secret_change_me_0123456789".to_string(),
            token_expiration_hours: 24,
            bcrypt_cost: 10,
            max_login_attempts: 5,
            lockout_duration_minutes: 15,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
            keep_alive: 30,
            client_timeout: 30,
            client_shutdown: 5,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:ecotrade.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
            idle_timeout: 600,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            max_request_size: 1024 * 1024,
            require_https: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            audit_retention_days: 90,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            username: None,
            password: None,
            from_email: "noreply@ecotrade.local".to_string(),
            from_name: "Eco Marketplace".to_string(),
            use_starttls: true,
            timeout_secs: 10,
            admin_copy_to: None,
            max_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_page_size: 12,
            max_page_size: 100,
            related_limit: 3,
        }
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

pub fn load_config() -> Result<Config> {
    load_env_file()?;

    let mut config = match env::var("CONFIG_FILE") {
        Ok(config_file) => Config::from_file(Path::new(&config_file))?,
        Err(_) => Config::default(),
    };

    override_with_env(&mut config, |key| env::var(key).ok())?;

    config.validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("Invalid value for {}: '{}'", key, value))
}

/// Applies environment overrides. `lookup` is `std::env::var` outside of tests.
fn override_with_env<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(env_name) = lookup("ECOTRADE_ENV") {
        config.environment = match env_name.trim() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
    }
    if let Some(host) = lookup("BIND_ADDRESS") {
        config.server.host = host;
    }
    if let Some(port) = lookup("ECOTRADE_PORT") {
        config.server.port = parse_var("ECOTRADE_PORT", &port)?;
    }
    if let Some(workers) = lookup("ECOTRADE_WORKERS") {
        config.server.workers = Some(parse_var("ECOTRADE_WORKERS", &workers)?);
    }
    if let Some(url) = lookup("DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(max_conn) = lookup("DATABASE_MAX_CONNECTIONS") {
        config.database.max_connections = parse_var("DATABASE_MAX_CONNECTIONS", &max_conn)?;
    }
    if let Some(jwt_secret) = lookup("JWT_SECRET") {
        config.auth.jwt_secret = jwt_secret;
    }
    if let Some(expiration) = lookup("AUTH_TOKEN_EXPIRATION_HOURS") {
        config.auth.token_expiration_hours = parse_var("AUTH_TOKEN_EXPIRATION_HOURS", &expiration)?;
    }
    if let Some(origins) = lookup("ALLOWED_ORIGINS") {
        config.security.allowed_origins = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(level) = lookup("RUST_LOG") {
        config.logging.level = level;
    }
    if let Some(enabled) = lookup("MAIL_ENABLED") {
        config.mail.enabled = parse_var("MAIL_ENABLED", &enabled)?;
    }
    if let Some(host) = lookup("SMTP_HOST") {
        config.mail.smtp_host = host;
    }
    if let Some(port) = lookup("SMTP_PORT") {
        config.mail.smtp_port = parse_var("SMTP_PORT", &port)?;
    }
    if let Some(username) = lookup("SMTP_USERNAME") {
        config.mail.username = Some(username);
    }
    if let Some(password) = lookup("SMTP_PASSWORD") {
        config.mail.password = Some(password);
    }
    if let Some(from) = lookup("MAIL_FROM") {
        config.mail.from_email = from;
    }
    if let Some(copy_to) = lookup("MAIL_ADMIN_COPY_TO") {
        let copy_to = copy_to.trim().to_string();
        config.mail.admin_copy_to = if copy_to.is_empty() { None } else { Some(copy_to) };
    }

    Ok(())
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long (current: {})",
                self.auth.jwt_secret.len()
            ));
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(anyhow::anyhow!(
                "max_connections ({}) must be >= min_connections ({})",
                self.database.max_connections,
                self.database.min_connections
            ));
        }

        if self.catalog.max_page_size < 1
            || self.catalog.default_page_size < 1
            || self.catalog.default_page_size > self.catalog.max_page_size
        {
            return Err(anyhow::anyhow!(
                "catalog.default_page_size ({}) must be between 1 and max_page_size ({})",
                self.catalog.default_page_size,
                self.catalog.max_page_size
            ));
        }

        if self.mail.enabled {
            if self.mail.smtp_host.trim().is_empty() {
                return Err(anyhow::anyhow!("SMTP_HOST is required when mail is enabled"));
            }
            if self.mail.from_email.trim().is_empty() {
                return Err(anyhow::anyhow!("MAIL_FROM is required when mail is enabled"));
            }
        }

        if self.mail.max_attempts == 0 {
            return Err(anyhow::anyhow!("mail.max_attempts must be at least 1"));
        }

        if self.is_production() && self.security.allowed_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!("Wildcard CORS origin is not allowed in production"));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn print_startup_info(&self) {
        log::info!("♻️  Eco Marketplace starting up...");
        log::info!("🌐 Server: {}:{}", self.server.host, self.server.port);
        log::info!("💾 Database: {}",
            if self.database.url.starts_with("sqlite") { "SQLite" } else { "Unknown" });
        log::info!("🔒 Auth: JWT ({}h expiration)", self.auth.token_expiration_hours);
        log::info!("📊 Logging: {} level", self.logging.level);
        if self.mail.enabled {
            log::info!("📧 Mail: SMTP via {}:{}", self.mail.smtp_host, self.mail.smtp_port);
        } else {
            log::warn!("📧 Mail: disabled, notifications will only be logged");
        }

        if !self.is_production() {
            log::warn!("🚧 Running in development mode");
        }

        if self.security.require_https {
            log::info!("🔒 HTTPS enforcement enabled");
        } else if self.is_production() {
            log::warn!("⚠️  HTTPS not required in production mode");
        }
    }
}

pub fn load_env_file() -> Result<()> {
    if let Ok(env_file) = env::var("ENV_FILE") {
        dotenvy::from_filename(&env_file)
            .with_context(|| format!("Failed to load environment file: {}", env_file))?;
    } else if Path::new(".env").exists() {
        dotenvy::dotenv().context("Failed to load .env file")?;
    }
    Ok(())
}
