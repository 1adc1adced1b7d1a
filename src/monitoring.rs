// src/monitoring.rs
use actix_web::{HttpResponse, web};
use serde::Serialize;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use std::time::Instant;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::time::{interval, sleep, Duration};

use crate::AppState;

#[derive(Debug, Clone)]
pub struct Metrics {
    pub started_at: Instant,
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub requests_submitted: Arc<AtomicU64>,
    pub notifications_sent: Arc<AtomicU64>,
    pub notifications_failed: Arc<AtomicU64>,
    pub response_times: Arc<std::sync::Mutex<Vec<u64>>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            requests_submitted: Arc::new(AtomicU64::new(0)),
            notifications_sent: Arc::new(AtomicU64::new(0)),
            notifications_failed: Arc::new(AtomicU64::new(0)),
            response_times: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn increment_requests(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_submissions(&self) {
        self.requests_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_notifications_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_notifications_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_time(&self, time_ms: u64) {
        if let Ok(mut times) = self.response_times.lock() {
            times.push(time_ms);
            if times.len() > 1000 {
                times.remove(0);
            }
        }
    }

    pub fn average_response_time(&self) -> f64 {
        match self.response_times.lock() {
            Ok(times) if !times.is_empty() => times.iter().sum::<u64>() as f64 / times.len() as f64,
            _ => 0.0,
        }
    }

    pub fn snapshot(&self) -> MetricsResponse {
        MetricsResponse {
            requests_total: self.request_count.load(Ordering::Relaxed),
            errors_total: self.error_count.load(Ordering::Relaxed),
            avg_response_time_ms: self.average_response_time(),
            requests_submitted: self.requests_submitted.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub requests_total: u64,
    pub errors_total: u64,
    pub avg_response_time_ms: f64,
    pub requests_submitted: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub uptime_seconds: u64,
}

pub async fn health_check(metrics: web::Data<Arc<Metrics>>) -> HttpResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: metrics.started_at.elapsed().as_secs(),
    };

    HttpResponse::Ok().json(response)
}

pub async fn readiness_check(app_state: web::Data<Arc<AppState>>) -> HttpResponse {
    match sqlx::query("SELECT 1").fetch_one(&app_state.db_pool).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ready",
            "database": "connected"
        })),
        Err(e) => {
            log::warn!("Readiness probe failed: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "not ready",
                "database": "disconnected"
            }))
        }
    }
}

pub async fn metrics_endpoint(metrics: web::Data<Arc<Metrics>>) -> HttpResponse {
    HttpResponse::Ok().json(metrics.snapshot())
}

pub struct RequestLogger {
    metrics: Arc<Metrics>,
}

impl RequestLogger {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl<S, B> actix_web::dev::Transform<S, actix_web::dev::ServiceRequest> for RequestLogger
where
    S: actix_web::dev::Service<
        actix_web::dev::ServiceRequest,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequestLoggerMiddleware {
            service,
            metrics: self.metrics.clone(),
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
    metrics: Arc<Metrics>,
}

impl<S, B> actix_web::dev::Service<actix_web::dev::ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: actix_web::dev::Service<
        actix_web::dev::ServiceRequest,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, ctx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: actix_web::dev::ServiceRequest) -> Self::Future {
        let start_time = std::time::Instant::now();
        let metrics = self.metrics.clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            metrics.increment_requests();
            let res = fut.await;
            let elapsed = start_time.elapsed().as_millis() as u64;
            metrics.record_response_time(elapsed);

            if let Ok(ref response) = res {
                if response.status().is_client_error() || response.status().is_server_error() {
                    metrics.increment_errors();
                }
            }
            res
        })
    }
}

pub async fn start_maintenance_tasks(pool: SqlitePool, audit_retention_days: i64) {
    tokio::spawn(async move {
        cleanup_old_audit_logs(pool, audit_retention_days).await;
    });
}

async fn cleanup_old_audit_logs(pool: SqlitePool, retention_days: i64) {
    let mut interval = interval(Duration::from_secs(24 * 3600));

    loop {
        interval.tick().await;
        log::info!("Starting daily cleanup of audit logs...");
        match prune_audit_logs(&pool, retention_days).await {
            Ok(0) => {}
            Ok(total_deleted) => {
                log::info!("Cleaned up {} old audit log entries in chunks", total_deleted)
            }
            Err(e) => log::error!("Failed to cleanup audit logs chunk: {}", e),
        }
    }
}

/// Deletes audit rows older than `retention_days` in chunks of 1000.
pub async fn prune_audit_logs(pool: &SqlitePool, retention_days: i64) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    let mut total_deleted = 0;

    loop {
        let res = sqlx::query(
            "DELETE FROM audit_logs
             WHERE id IN (
                 SELECT id FROM audit_logs
                 WHERE created_at < ?
                 LIMIT 1000
             )",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;

        let count = res.rows_affected();
        total_deleted += count;
        if count < 1000 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    Ok(total_deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.increment_requests();
        metrics.increment_requests();
        metrics.increment_submissions();
        metrics.increment_notifications_failed();
        metrics.record_response_time(10);
        metrics.record_response_time(30);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.requests_submitted, 1);
        assert_eq!(snapshot.notifications_sent, 0);
        assert_eq!(snapshot.notifications_failed, 1);
        assert_eq!(snapshot.avg_response_time_ms, 20.0);
    }

    #[test]
    fn test_response_time_window_is_bounded() {
        let metrics = Metrics::new();
        for i in 0..1500 {
            metrics.record_response_time(i);
        }
        assert_eq!(metrics.response_times.lock().unwrap().len(), 1000);
    }

    #[actix_rt::test]
    async fn test_prune_keeps_recent_entries() {
        let pool = test_pool().await;
        let old = Utc::now() - chrono::Duration::days(120);
        let recent = Utc::now() - chrono::Duration::days(5);

        for (id, at) in [("old", old), ("recent", recent)] {
            sqlx::query(
                "INSERT INTO audit_logs (id, user_id, action, entity_type, created_at) VALUES (?, 'admin', 'update', 'material', ?)",
            )
            .bind(id)
            .bind(at)
            .execute(&pool)
            .await
            .unwrap();
        }

        let deleted = prune_audit_logs(&pool, 90).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining: Vec<String> = sqlx::query_scalar("SELECT id FROM audit_logs")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, vec!["recent".to_string()]);
    }
}
