// src/requests/ledger.rs
//! Persistence for buyer requests and their status history. Every function
//! takes a connection so callers decide the transaction boundary.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    BuyerRequest, BuyerRequestRow, IndustryRef, MaterialSummary, RequestDetail, RequestStatus,
    StatusChange,
};
use crate::pagination::{OffsetQueryBuilder, PageRequest, Pagination};

const DETAIL_FROM: &str = "buyer_requests r \
    JOIN materials m ON m.id = r.material_id \
    JOIN industries i ON i.id = r.industry_id";

const DETAIL_COLUMNS: &str = "r.*, m.material_code AS material_code, m.name AS material_name, \
    m.unit AS material_unit, i.name AS industry_name, i.slug AS industry_slug";

#[derive(Debug, sqlx::FromRow)]
pub struct RequestDetailRow {
    #[sqlx(flatten)]
    pub request: BuyerRequestRow,
    pub material_code: String,
    pub material_name: String,
    pub material_unit: String,
    pub industry_name: String,
    pub industry_slug: String,
}

impl TryFrom<RequestDetailRow> for RequestDetail {
    type Error = String;

    fn try_from(row: RequestDetailRow) -> Result<Self, Self::Error> {
        let request = BuyerRequest::try_from(row.request)?;
        Ok(Self {
            material: MaterialSummary {
                id: request.material_id.clone(),
                material_code: row.material_code,
                name: row.material_name,
                unit: row.material_unit,
            },
            industry: IndustryRef {
                id: request.industry_id.clone(),
                name: row.industry_name,
                slug: row.industry_slug,
            },
            request,
        })
    }
}

fn decode_detail(row: RequestDetailRow) -> ApiResult<RequestDetail> {
    RequestDetail::try_from(row).map_err(|e| {
        log::error!("Corrupt buyer request row: {}", e);
        ApiError::InternalServerError(e)
    })
}

pub async fn insert(conn: &mut SqliteConnection, request: &BuyerRequest) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO buyer_requests (
            id, request_code, buyer_name, buyer_email, buyer_mobile, country_code,
            company_name, material_id, industry_id, requested_quantity, requested_unit,
            specifications, status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
        .bind(&request.id)
        .bind(&request.request_code)
        .bind(&request.buyer_name)
        .bind(&request.buyer_email)
        .bind(&request.buyer_mobile)
        .bind(&request.country_code)
        .bind(&request.company_name)
        .bind(&request.material_id)
        .bind(&request.industry_id)
        .bind(request.requested_quantity)
        .bind(&request.requested_unit)
        .bind(&request.specifications)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn find_detail_by_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> Result<Option<RequestDetailRow>, sqlx::Error> {
    let sql = format!("SELECT {} FROM {} WHERE r.request_code = ?", DETAIL_COLUMNS, DETAIL_FROM);
    sqlx::query_as::<_, RequestDetailRow>(&sql)
        .bind(code)
        .fetch_optional(conn)
        .await
}

pub async fn detail_by_code(conn: &mut SqliteConnection, code: &str) -> ApiResult<Option<RequestDetail>> {
    find_detail_by_code(conn, code)
        .await
        .map_err(ApiError::persistence_failed)?
        .map(decode_detail)
        .transpose()
}

/// Moves a request from `from` to `to` and stamps the entered state's column.
/// Returns `false` when the row was no longer in `from`.
pub async fn apply_transition(
    conn: &mut SqliteConnection,
    request_id: &str,
    from: RequestStatus,
    to: RequestStatus,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "UPDATE buyer_requests SET status = ?, updated_at = ?, {} = ? WHERE id = ? AND status = ?",
        to.timestamp_column()
    );
    let result = sqlx::query(&sql)
        .bind(to.as_str())
        .bind(at)
        .bind(at)
        .bind(request_id)
        .bind(from.as_str())
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn record_history(
    conn: &mut SqliteConnection,
    request_id: &str,
    from: Option<RequestStatus>,
    to: RequestStatus,
    changed_by: Option<&str>,
    note: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO request_status_history (id, request_id, from_status, to_status, changed_by, note, changed_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
        .bind(Uuid::new_v4().to_string())
        .bind(request_id)
        .bind(from.map(|s| s.as_str()))
        .bind(to.as_str())
        .bind(changed_by)
        .bind(note)
        .bind(at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn history(conn: &mut SqliteConnection, request_id: &str) -> Result<Vec<StatusChange>, sqlx::Error> {
    sqlx::query_as::<_, StatusChange>(
        "SELECT * FROM request_status_history WHERE request_id = ? ORDER BY changed_at ASC, rowid ASC",
    )
        .bind(request_id)
        .fetch_all(conn)
        .await
}

/// Newest first, optionally narrowed to one status.
pub async fn list(
    conn: &mut SqliteConnection,
    status: Option<RequestStatus>,
    search: Option<&str>,
    page: PageRequest,
) -> ApiResult<(Vec<RequestDetail>, Pagination)> {
    let mut builder = OffsetQueryBuilder::new(DETAIL_FROM)
        .select(DETAIL_COLUMNS)
        .order_by("r.created_at DESC, r.id DESC");

    if let Some(status) = status {
        builder.add_condition("r.status = ?", status.as_str().to_string());
    }
    if let Some(term) = search {
        let pattern = crate::pagination::like_pattern(term);
        builder.add_condition_with_params(
            "(r.request_code LIKE ? ESCAPE '\\' OR r.company_name LIKE ? ESCAPE '\\' OR r.buyer_name LIKE ? ESCAPE '\\')",
            vec![pattern.clone(), pattern.clone(), pattern],
        );
    }

    let (count_sql, count_params) = builder.build_count();
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &count_params {
        count_query = count_query.bind(param);
    }
    let total = count_query
        .fetch_one(&mut *conn)
        .await
        .map_err(ApiError::persistence_failed)?;
    let pagination = Pagination::from_total(total, &page);

    if total == 0 || pagination.is_past_end() {
        return Ok((Vec::new(), pagination));
    }

    let (sql, params) = builder.build_page();
    let mut rows_query = sqlx::query_as::<_, RequestDetailRow>(&sql);
    for param in &params {
        rows_query = rows_query.bind(param);
    }
    let rows = rows_query
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await
        .map_err(ApiError::persistence_failed)?;

    let requests = rows.into_iter().map(decode_detail).collect::<ApiResult<Vec<_>>>()?;
    Ok((requests, pagination))
}
