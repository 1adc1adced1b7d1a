// src/catalog/store.rs
//! SQL shared by every reader of the `materials` table.

use sqlx::SqliteConnection;

use crate::error::{ApiError, ApiResult};
use crate::models::{Material, MaterialRow};

pub const MATERIAL_FROM: &str = "materials m JOIN industries i ON i.id = m.industry_id";

pub const MATERIAL_COLUMNS: &str = "m.id, m.material_code, m.name, m.description, m.images, \
    m.available_quantity, m.unit, m.minimum_order_quantity, m.industry_id, \
    i.name AS industry_name, i.slug AS industry_slug, m.supply_region, m.certifications, \
    m.attributes, m.is_featured, m.is_active, m.created_at, m.updated_at";

/// Visible to buyers: the material and its industry are both active.
pub const PUBLICLY_VISIBLE: &str = "m.is_active = 1 AND i.is_active = 1";

pub fn decode_material(row: MaterialRow) -> ApiResult<Material> {
    let id = row.id.clone();
    Material::try_from(row).map_err(|e| {
        log::error!("Material {} has malformed JSON columns: {}", id, e);
        ApiError::InternalServerError(format!("Malformed material record {}", id))
    })
}

pub fn decode_materials(rows: Vec<MaterialRow>) -> ApiResult<Vec<Material>> {
    rows.into_iter().map(decode_material).collect()
}

/// Loads a material regardless of visibility.
pub async fn material_row_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<MaterialRow>, sqlx::Error> {
    let sql = format!("SELECT {} FROM {} WHERE m.id = ?", MATERIAL_COLUMNS, MATERIAL_FROM);
    sqlx::query_as::<_, MaterialRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Loads a material only when buyers can see it.
pub async fn visible_material_row_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<MaterialRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM {} WHERE m.id = ? AND {}",
        MATERIAL_COLUMNS, MATERIAL_FROM, PUBLICLY_VISIBLE
    );
    sqlx::query_as::<_, MaterialRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
}
