// src/db.rs - Database migrations and setup

use sqlx::SqlitePool;
use anyhow::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    // Backoffice accounts
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS admins (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE CHECK(length(username) >= 3 AND length(username) <= 50),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            last_login DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until DATETIME
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS industries (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 100),
            slug TEXT NOT NULL UNIQUE CHECK(length(slug) > 0 AND length(slug) <= 100),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            icon TEXT CHECK(icon IS NULL OR length(icon) <= 500),
            display_order INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    // images, certifications and attributes hold JSON documents
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS materials (
            id TEXT PRIMARY KEY,
            material_code TEXT NOT NULL UNIQUE CHECK(length(material_code) > 0 AND length(material_code) <= 50),
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            description TEXT CHECK(description IS NULL OR length(description) <= 5000),
            images TEXT NOT NULL DEFAULT '[]' CHECK(json_valid(images)),
            available_quantity REAL NOT NULL DEFAULT 0 CHECK(available_quantity >= 0),
            unit TEXT NOT NULL CHECK(length(unit) > 0 AND length(unit) <= 20),
            minimum_order_quantity REAL NOT NULL DEFAULT 0 CHECK(minimum_order_quantity >= 0),
            industry_id TEXT NOT NULL,
            supply_region TEXT CHECK(supply_region IS NULL OR length(supply_region) <= 255),
            certifications TEXT NOT NULL DEFAULT '[]' CHECK(json_valid(certifications)),
            attributes TEXT NOT NULL DEFAULT '{}' CHECK(json_valid(attributes)),
            is_featured INTEGER NOT NULL DEFAULT 0 CHECK(is_featured IN (0, 1)),
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (industry_id) REFERENCES industries (id) ON DELETE RESTRICT
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS filter_definitions (
            id TEXT PRIMARY KEY,
            industry_id TEXT NOT NULL,
            filter_key TEXT NOT NULL CHECK(length(filter_key) > 0 AND length(filter_key) <= 64),
            label TEXT NOT NULL CHECK(length(label) > 0 AND length(label) <= 100),
            filter_type TEXT NOT NULL CHECK(filter_type IN ('select', 'multiselect', 'boolean')),
            options TEXT NOT NULL DEFAULT '[]' CHECK(json_valid(options)),
            display_order INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (industry_id) REFERENCES industries (id) ON DELETE CASCADE,
            UNIQUE(industry_id, filter_key)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Buyer requests are never deleted; the material/industry references are RESTRICT
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS buyer_requests (
            id TEXT PRIMARY KEY,
            request_code TEXT NOT NULL UNIQUE,
            buyer_name TEXT NOT NULL CHECK(length(buyer_name) > 0 AND length(buyer_name) <= 255),
            buyer_email TEXT CHECK(buyer_email IS NULL OR length(buyer_email) <= 255),
            buyer_mobile TEXT CHECK(buyer_mobile IS NULL OR length(buyer_mobile) <= 30),
            country_code TEXT CHECK(country_code IS NULL OR length(country_code) <= 8),
            company_name TEXT NOT NULL CHECK(length(company_name) > 0 AND length(company_name) <= 255),
            material_id TEXT NOT NULL,
            industry_id TEXT NOT NULL,
            requested_quantity REAL NOT NULL CHECK(requested_quantity > 0),
            requested_unit TEXT NOT NULL CHECK(length(requested_unit) > 0 AND length(requested_unit) <= 20),
            specifications TEXT CHECK(specifications IS NULL OR length(specifications) <= 2000),
            status TEXT NOT NULL DEFAULT 'Submitted' CHECK(
                status IN ('Submitted', 'Reviewed', 'Confirmed', 'Dispatched', 'Completed', 'Cancelled')
            ),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            reviewed_at DATETIME,
            confirmed_at DATETIME,
            dispatched_at DATETIME,
            completed_at DATETIME,
            cancelled_at DATETIME,
            CHECK(buyer_email IS NOT NULL OR buyer_mobile IS NOT NULL),
            FOREIGN KEY (material_id) REFERENCES materials (id) ON DELETE RESTRICT,
            FOREIGN KEY (industry_id) REFERENCES industries (id) ON DELETE RESTRICT
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_status_history (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            from_status TEXT,
            to_status TEXT NOT NULL,
            changed_by TEXT,
            note TEXT CHECK(note IS NULL OR length(note) <= 1000),
            changed_at DATETIME NOT NULL,
            FOREIGN KEY (request_id) REFERENCES buyer_requests (id) ON DELETE RESTRICT
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            description TEXT,
            changes TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    // ==================== CREATE INDEXES ====================

    let index_queries = [
        "CREATE INDEX IF NOT EXISTS idx_industries_order ON industries(display_order, name)",
        "CREATE INDEX IF NOT EXISTS idx_materials_industry ON materials(industry_id)",
        "CREATE INDEX IF NOT EXISTS idx_materials_featured ON materials(is_featured)",
        "CREATE INDEX IF NOT EXISTS idx_materials_active ON materials(is_active)",
        "CREATE INDEX IF NOT EXISTS idx_filter_definitions_industry ON filter_definitions(industry_id, display_order)",
        "CREATE INDEX IF NOT EXISTS idx_buyer_requests_status ON buyer_requests(status)",
        "CREATE INDEX IF NOT EXISTS idx_buyer_requests_material ON buyer_requests(material_id)",
        "CREATE INDEX IF NOT EXISTS idx_buyer_requests_created ON buyer_requests(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_status_history_request ON request_status_history(request_id, changed_at)",
        "CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_logs(entity_type, entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_logs(created_at)",
    ];

    for query in index_queries {
        sqlx::query(query).execute(pool).await?;
    }

    log::info!("Database migrations completed");
    Ok(())
}

/// Single-connection in-memory database with the full schema, for tests.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");
    pool
}
