// src/catalog_handlers.rs - Public catalog endpoints

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::catalog::{FilterSelection, MaterialPage, MaterialQuery};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{FilterDefinition, Industry};
use crate::pagination::Pagination;

#[derive(Debug, Deserialize, Default)]
pub struct MaterialListQuery {
    pub industry: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub featured: Option<bool>,
    pub search: Option<String>,
    /// JSON object, e.g. `{"colors":["red","green"],"certified":true}`
    pub filters: Option<String>,
}

impl MaterialListQuery {
    pub fn into_query(self, include_inactive: bool) -> ApiResult<MaterialQuery> {
        Ok(MaterialQuery {
            filters: FilterSelection::parse(self.filters.as_deref())?,
            industry_slug: self.industry,
            page: self.page,
            limit: self.limit,
            featured_only: self.featured.unwrap_or(false),
            search: self.search,
            include_inactive,
        })
    }
}

#[derive(Debug, Serialize)]
struct IndustryList {
    industries: Vec<Industry>,
}

#[derive(Debug, Serialize)]
struct FilterList {
    filters: Vec<FilterDefinition>,
}

/// Catalog reads degrade to an empty result plus an error flag instead of failing outright.
fn degrade<T: Serialize>(result: ApiResult<T>, empty: impl FnOnce() -> T) -> ApiResult<HttpResponse> {
    match result {
        Ok(data) => Ok(HttpResponse::Ok().json(ApiResponse::success(data))),
        Err(err @ ApiError::CatalogUnavailable(_)) => Ok(HttpResponse::ServiceUnavailable()
            .json(ApiResponse::degraded(empty(), err.public_message()))),
        Err(err) => Err(err),
    }
}

pub async fn list_industries(app_state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let result = app_state
        .catalog
        .list_industries()
        .await
        .map(|industries| IndustryList { industries });
    degrade(result, || IndustryList { industries: Vec::new() })
}

pub async fn get_industry_filters(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let slug = path.into_inner();
    let result = app_state
        .catalog
        .get_filter_definitions(&slug)
        .await
        .map(|filters| FilterList { filters });
    degrade(result, || FilterList { filters: Vec::new() })
}

pub async fn list_materials(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<MaterialListQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner().into_query(false)?;
    let result = app_state.catalog.list_materials(&query).await;
    degrade(result, || MaterialPage {
        materials: Vec::new(),
        pagination: Pagination::default(),
    })
}

pub async fn get_material(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let detail = app_state.catalog.get_material_detail(&id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(detail)))
}
