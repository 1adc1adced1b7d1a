// src/catalog/mod.rs
//! Read side of the marketplace: industries, materials and per-industry filters.

pub mod filters;
pub mod store;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::CatalogConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{FilterDefinition, FilterDefinitionRow, Industry, Material, MaterialDetail, MaterialRow};
use crate::pagination::{like_pattern, OffsetQueryBuilder, PageRequest, Pagination};

pub use filters::FilterSelection;
use store::{decode_material, decode_materials, MATERIAL_COLUMNS, MATERIAL_FROM, PUBLICLY_VISIBLE};

/// One catalog listing request. Built per HTTP request and never shared.
#[derive(Debug, Clone, Default)]
pub struct MaterialQuery {
    pub industry_slug: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub featured_only: bool,
    pub search: Option<String>,
    pub filters: FilterSelection,
    /// Admin listings also see inactive materials and industries.
    pub include_inactive: bool,
}

#[derive(Debug, Serialize)]
pub struct MaterialPage {
    pub materials: Vec<Material>,
    pub pagination: Pagination,
}

#[derive(Clone)]
pub struct CatalogClient {
    pool: SqlitePool,
    config: CatalogConfig,
}

impl CatalogClient {
    pub fn new(pool: SqlitePool, config: CatalogConfig) -> Self {
        Self { pool, config }
    }

    /// Active industries by display order, then name, with their active material counts.
    pub async fn list_industries(&self) -> ApiResult<Vec<Industry>> {
        self.fetch_industries(false).await
    }

    /// Every industry, for the backoffice.
    pub async fn all_industries(&self) -> ApiResult<Vec<Industry>> {
        self.fetch_industries(true).await
    }

    async fn fetch_industries(&self, include_inactive: bool) -> ApiResult<Vec<Industry>> {
        let sql = format!(
            r#"SELECT i.*,
                      (SELECT COUNT(*) FROM materials m
                        WHERE m.industry_id = i.id AND m.is_active = 1) AS material_count
               FROM industries i
               {}
               ORDER BY i.display_order ASC, i.name ASC"#,
            if include_inactive { "" } else { "WHERE i.is_active = 1" }
        );

        sqlx::query_as::<_, Industry>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::catalog_unavailable)
    }

    pub async fn list_materials(&self, query: &MaterialQuery) -> ApiResult<MaterialPage> {
        let page = PageRequest::new(
            query.page,
            query.limit,
            self.config.default_page_size,
            self.config.max_page_size,
        );

        let mut builder = OffsetQueryBuilder::new(MATERIAL_FROM)
            .select(MATERIAL_COLUMNS)
            .order_by("m.is_featured DESC, m.created_at DESC, m.id ASC");

        if !query.include_inactive {
            builder.add_raw_condition(PUBLICLY_VISIBLE);
        }
        if let Some(slug) = query.industry_slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            builder.add_condition("i.slug = ?", slug.to_string());
        }
        if query.featured_only {
            builder.add_raw_condition("m.is_featured = 1");
        }
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = like_pattern(term);
            builder.add_condition_with_params(
                "(m.name LIKE ? ESCAPE '\\' OR m.material_code LIKE ? ESCAPE '\\' OR m.description LIKE ? ESCAPE '\\')",
                vec![pattern.clone(), pattern.clone(), pattern],
            );
        }
        query.filters.apply(&mut builder);

        let (count_sql, count_params) = builder.build_count();
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in &count_params {
            count_query = count_query.bind(param);
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::catalog_unavailable)?;

        let pagination = Pagination::from_total(total, &page);
        if total == 0 || pagination.is_past_end() {
            return Ok(MaterialPage { materials: Vec::new(), pagination });
        }

        let (sql, params) = builder.build_page();
        let mut rows_query = sqlx::query_as::<_, MaterialRow>(&sql);
        for param in &params {
            rows_query = rows_query.bind(param);
        }
        let rows = rows_query
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::catalog_unavailable)?;

        Ok(MaterialPage {
            materials: decode_materials(rows)?,
            pagination,
        })
    }

    /// A visible material plus up to `related_limit` other visible materials of its industry.
    pub async fn get_material_detail(&self, id: &str) -> ApiResult<MaterialDetail> {
        let sql = format!(
            "SELECT {} FROM {} WHERE m.id = ? AND {}",
            MATERIAL_COLUMNS, MATERIAL_FROM, PUBLICLY_VISIBLE
        );
        let row = sqlx::query_as::<_, MaterialRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::catalog_unavailable)?
            .ok_or_else(|| ApiError::material_not_found(id))?;
        let material = decode_material(row)?;

        let related_sql = format!(
            "SELECT {} FROM {} WHERE m.industry_id = ? AND m.id <> ? AND {} \
             ORDER BY m.is_featured DESC, m.created_at DESC, m.id ASC LIMIT ?",
            MATERIAL_COLUMNS, MATERIAL_FROM, PUBLICLY_VISIBLE
        );
        let related_rows = sqlx::query_as::<_, MaterialRow>(&related_sql)
            .bind(&material.industry.id)
            .bind(&material.id)
            .bind(self.config.related_limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::catalog_unavailable)?;

        Ok(MaterialDetail {
            material,
            related_materials: decode_materials(related_rows)?,
        })
    }

    /// Filter definitions of an active industry; empty for unknown slugs.
    pub async fn get_filter_definitions(&self, industry_slug: &str) -> ApiResult<Vec<FilterDefinition>> {
        let rows = sqlx::query_as::<_, FilterDefinitionRow>(
            r#"SELECT f.* FROM filter_definitions f
               JOIN industries i ON i.id = f.industry_id
               WHERE i.slug = ? AND i.is_active = 1
               ORDER BY f.display_order ASC, f.label ASC"#,
        )
            .bind(industry_slug)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::catalog_unavailable)?;

        decode_filter_definitions(rows)
    }
}

pub fn decode_filter_definitions(rows: Vec<FilterDefinitionRow>) -> ApiResult<Vec<FilterDefinition>> {
    rows.into_iter()
        .map(|row| {
            FilterDefinition::try_from(row).map_err(|e| {
                log::error!("Malformed filter definition: {}", e);
                ApiError::InternalServerError(e)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, test_pool};
    use chrono::Utc;
    use serde_json::json;

    async fn client() -> (CatalogClient, SqlitePool) {
        let pool = test_pool().await;
        (CatalogClient::new(pool.clone(), CatalogConfig::default()), pool)
    }

    fn ids(page: &MaterialPage) -> Vec<&str> {
        let mut ids: Vec<&str> = page.materials.iter().map(|m| m.id.as_str()).collect();
        ids.sort();
        ids
    }

    #[actix_rt::test]
    async fn test_any_selected_option_matches() {
        let (client, pool) = client().await;
        fixtures::colour_catalog(&pool).await;

        let query = MaterialQuery {
            filters: FilterSelection::new().with_options("colors", ["red", "green"]),
            ..Default::default()
        };
        let page = client.list_materials(&query).await.unwrap();
        assert_eq!(ids(&page), vec!["m1", "m2"]);
        assert_eq!(page.pagination.total, 2);
    }

    #[actix_rt::test]
    async fn test_numeric_attribute_matches_option_text() {
        let (client, pool) = client().await;
        fixtures::industry(&pool, "ind-film", "Films", "films", 1, true).await;

        let mut sheet = fixtures::MaterialFixture::new("f1", "PCR-F-001", "rLDPE Sheet", "ind-film");
        sheet.attributes = json!({"thickness": {"label": "Thickness", "value": 5, "unit": "mm"}});
        sheet.insert(&pool).await;

        let mut board = fixtures::MaterialFixture::new("f2", "PCR-F-002", "rPP Board", "ind-film");
        board.attributes = json!({"thickness": {"label": "Thickness", "value": 5.0, "unit": "mm"}});
        board.insert(&pool).await;

        let mut foil = fixtures::MaterialFixture::new("f3", "PCR-F-003", "rPET Foil", "ind-film");
        foil.attributes = json!({"thickness": {"label": "Thickness", "value": 2.5, "unit": "mm"}});
        foil.insert(&pool).await;

        let query = MaterialQuery {
            filters: FilterSelection::new().with_options("thickness", ["5"]),
            ..Default::default()
        };
        assert_eq!(ids(&client.list_materials(&query).await.unwrap()), vec!["f1", "f2"]);

        let query = MaterialQuery {
            filters: FilterSelection::new().with_options("thickness", ["2.5", "9"]),
            ..Default::default()
        };
        assert_eq!(ids(&client.list_materials(&query).await.unwrap()), vec!["f3"]);
    }

    #[actix_rt::test]
    async fn test_filters_and_across_keys() {
        let (client, pool) = client().await;
        fixtures::colour_catalog(&pool).await;

        let query = MaterialQuery {
            filters: FilterSelection::new()
                .with_options("colors", ["blue"])
                .with_flag("certified", true),
            ..Default::default()
        };
        assert_eq!(ids(&client.list_materials(&query).await.unwrap()), vec!["m1"]);

        let query = MaterialQuery {
            filters: FilterSelection::new()
                .with_options("colors", ["green"])
                .with_flag("certified", true),
            ..Default::default()
        };
        assert!(client.list_materials(&query).await.unwrap().materials.is_empty());
    }

    #[actix_rt::test]
    async fn test_scalar_attribute_and_unknown_key() {
        let (client, pool) = client().await;
        fixtures::industry(&pool, "ind-auto", "Automotive", "automotive", 2, true).await;
        let mut m = fixtures::MaterialFixture::new("m3", "PCR-003", "rPET Pellets", "ind-auto");
        m.attributes = json!({"grade": {"label": "Grade", "value": "food"}});
        m.insert(&pool).await;

        let query = MaterialQuery {
            filters: FilterSelection::new().with_options("grade", ["food", "industrial"]),
            ..Default::default()
        };
        assert_eq!(ids(&client.list_materials(&query).await.unwrap()), vec!["m3"]);

        let query = MaterialQuery {
            filters: FilterSelection::new().with_options("density", ["high"]),
            ..Default::default()
        };
        assert!(client.list_materials(&query).await.unwrap().materials.is_empty());
    }

    #[actix_rt::test]
    async fn test_page_beyond_last_is_empty() {
        let (client, pool) = client().await;
        fixtures::colour_catalog(&pool).await;

        let query = MaterialQuery { page: Some(5), limit: Some(1), ..Default::default() };
        let page = client.list_materials(&query).await.unwrap();
        assert!(page.materials.is_empty());
        assert_eq!(page.pagination.page, 5);
        assert_eq!(page.pagination.pages, 2);
        assert_eq!(page.pagination.total, 2);

        let query = MaterialQuery { page: Some(2), limit: Some(1), ..Default::default() };
        assert_eq!(client.list_materials(&query).await.unwrap().materials.len(), 1);
    }

    #[actix_rt::test]
    async fn test_industry_featured_and_search() {
        let (client, pool) = client().await;
        fixtures::colour_catalog(&pool).await;
        fixtures::industry(&pool, "ind-text", "Textiles", "textiles", 2, true).await;
        let mut fibre = fixtures::MaterialFixture::new("m4", "TX-100%", "Recycled Polyester Fibre", "ind-text");
        fibre.featured = true;
        fibre.insert(&pool).await;

        let by_industry = MaterialQuery { industry_slug: Some("textiles".into()), ..Default::default() };
        assert_eq!(ids(&client.list_materials(&by_industry).await.unwrap()), vec!["m4"]);

        let featured = MaterialQuery { featured_only: true, limit: Some(6), ..Default::default() };
        assert_eq!(ids(&client.list_materials(&featured).await.unwrap()), vec!["m4"]);

        let search = MaterialQuery { search: Some("flakes".into()), ..Default::default() };
        assert_eq!(ids(&client.list_materials(&search).await.unwrap()), vec!["m1"]);

        let wildcard = MaterialQuery { search: Some("%".into()), ..Default::default() };
        assert_eq!(ids(&client.list_materials(&wildcard).await.unwrap()), vec!["m4"]);
    }

    #[actix_rt::test]
    async fn test_inactive_materials_hidden_from_public() {
        let (client, pool) = client().await;
        fixtures::colour_catalog(&pool).await;
        let mut hidden = fixtures::MaterialFixture::new("m9", "PCR-009", "Withdrawn", "ind-pack");
        hidden.active = false;
        hidden.insert(&pool).await;

        let public = client.list_materials(&MaterialQuery::default()).await.unwrap();
        assert_eq!(public.pagination.total, 2);

        let admin = MaterialQuery { include_inactive: true, ..Default::default() };
        assert_eq!(client.list_materials(&admin).await.unwrap().pagination.total, 3);

        assert!(matches!(client.get_material_detail("m9").await, Err(ApiError::NotFound(_))));
    }

    #[actix_rt::test]
    async fn test_industries_ordered_and_counted() {
        let (client, pool) = client().await;
        fixtures::industry(&pool, "b", "Beverages", "beverages", 2, true).await;
        fixtures::industry(&pool, "a", "Automotive", "automotive", 2, true).await;
        fixtures::industry(&pool, "z", "Zinc", "zinc", 1, true).await;
        fixtures::industry(&pool, "off", "Dormant", "dormant", 0, false).await;
        fixtures::MaterialFixture::new("m1", "C-1", "Cans", "b").insert(&pool).await;

        let industries = client.list_industries().await.unwrap();
        let names: Vec<&str> = industries.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Zinc", "Automotive", "Beverages"]);
        assert_eq!(industries[2].material_count, 1);

        assert_eq!(client.all_industries().await.unwrap().len(), 4);
    }

    #[actix_rt::test]
    async fn test_material_detail_related_is_bounded() {
        let (client, pool) = client().await;
        fixtures::colour_catalog(&pool).await;
        for (id, code) in [("m5", "PCR-005"), ("m6", "PCR-006"), ("m7", "PCR-007")] {
            fixtures::MaterialFixture::new(id, code, "Sibling", "ind-pack").insert(&pool).await;
        }

        let detail = client.get_material_detail("m1").await.unwrap();
        assert_eq!(detail.material.id, "m1");
        assert_eq!(detail.related_materials.len(), 3);
        assert!(detail.related_materials.iter().all(|m| m.id != "m1"));
        assert!(detail.related_materials.iter().all(|m| m.industry.id == "ind-pack"));

        assert!(matches!(client.get_material_detail("missing").await, Err(ApiError::NotFound(_))));
    }

    #[actix_rt::test]
    async fn test_filter_definitions_by_slug() {
        let (client, pool) = client().await;
        fixtures::colour_catalog(&pool).await;
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO filter_definitions (id, industry_id, filter_key, label, filter_type, options, display_order, created_at, updated_at)
             VALUES ('f1', 'ind-pack', 'colors', 'Colors', 'multiselect', '[\"red\",\"green\",\"blue\"]', 1, ?, ?),
                    ('f0', 'ind-pack', 'certified', 'Certified', 'boolean', '[]', 0, ?, ?)",
        )
            .bind(now).bind(now).bind(now).bind(now)
            .execute(&pool)
            .await
            .unwrap();

        let defs = client.get_filter_definitions("packaging").await.unwrap();
        let keys: Vec<&str> = defs.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["certified", "colors"]);
        assert_eq!(defs[1].options, vec!["red", "green", "blue"]);

        assert!(client.get_filter_definitions("unknown").await.unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_store_failure_is_catalog_unavailable() {
        let (client, pool) = client().await;
        pool.close().await;

        let err = client.list_materials(&MaterialQuery::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::CatalogUnavailable(_)));
        assert!(err.is_retryable());
    }
}
