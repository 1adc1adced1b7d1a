// src/models/filter.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};
use std::str::FromStr;

// ==================== FILTER TYPE ====================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FilterType {
    Select,
    Multiselect,
    Boolean,
}

impl FilterType {
    pub fn has_options(&self) -> bool {
        matches!(self, FilterType::Select | FilterType::Multiselect)
    }
}

// ==================== FILTER DEFINITION ====================

#[derive(Debug, sqlx::FromRow)]
pub struct FilterDefinitionRow {
    pub id: String,
    pub industry_id: String,
    pub filter_key: String,
    pub label: String,
    pub filter_type: String,
    pub options: String,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-industry facet buyers can narrow the catalog by.
#[derive(Debug, Serialize, Clone)]
pub struct FilterDefinition {
    pub id: String,
    pub industry_id: String,
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    pub options: Vec<String>,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<FilterDefinitionRow> for FilterDefinition {
    type Error = String;

    fn try_from(row: FilterDefinitionRow) -> Result<Self, Self::Error> {
        let filter_type = FilterType::from_str(&row.filter_type)
            .map_err(|_| format!("Unknown filter type '{}'", row.filter_type))?;
        let options: Vec<String> = serde_json::from_str(&row.options)
            .map_err(|e| format!("Malformed options for filter '{}': {}", row.filter_key, e))?;

        Ok(Self {
            id: row.id,
            industry_id: row.industry_id,
            key: row.filter_key,
            label: row.label,
            filter_type,
            options,
            display_order: row.display_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFilterDefinitionRequest {
    #[validate(length(min = 1, max = 64, message = "Key must be between 1 and 64 characters"))]
    pub key: String,

    #[validate(length(min = 1, max = 100, message = "Label must be between 1 and 100 characters"))]
    pub label: String,

    #[serde(rename = "type")]
    pub filter_type: FilterType,

    #[serde(default)]
    pub options: Vec<String>,

    pub display_order: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFilterDefinitionRequest {
    #[validate(length(min = 1, max = 100, message = "Label must be between 1 and 100 characters"))]
    pub label: Option<String>,

    #[serde(rename = "type")]
    pub filter_type: Option<FilterType>,

    pub options: Option<Vec<String>>,

    pub display_order: Option<i64>,
}

/// Options must be present for select types and absent for booleans.
pub fn check_filter_options(filter_type: FilterType, options: &[String]) -> Result<(), String> {
    if filter_type.has_options() {
        if options.is_empty() {
            return Err(format!("A {} filter needs at least one option", filter_type));
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err("Filter options cannot be blank".to_string());
        }
    } else if !options.is_empty() {
        return Err("A boolean filter cannot have options".to_string());
    }
    Ok(())
}
