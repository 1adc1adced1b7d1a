// src/models/mod.rs

pub mod buyer_request;
pub mod filter;
pub mod industry;
pub mod material;

// Re-export so models are reachable as crate::models::StructName
pub use buyer_request::*;
pub use filter::*;
pub use industry::*;
pub use material::*;

use serde::Serialize;

// ==================== COMMON / SHARED ====================

/// Counters for the admin dashboard.
#[derive(Debug, Serialize, Default)]
pub struct DashboardStats {
    pub total_industries: i64,
    pub active_industries: i64,
    pub total_materials: i64,
    pub active_materials: i64,
    pub featured_materials: i64,
    pub open_requests: i64,
    pub requests_by_status: Vec<StatusCount>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}
