// src/models/industry.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};

// ==================== INDUSTRY ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Industry {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub display_order: i64,
    pub is_active: bool,
    // Derived: number of active materials referencing this industry
    #[sqlx(default)]
    pub material_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact industry reference embedded in materials and requests.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IndustryRef {
    pub id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateIndustryRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 100, message = "Slug must be between 1 and 100 characters"))]
    pub slug: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 500, message = "Icon reference cannot exceed 500 characters"))]
    pub icon: Option<String>,

    pub display_order: Option<i64>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateIndustryRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Slug must be between 1 and 100 characters"))]
    pub slug: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 500, message = "Icon reference cannot exceed 500 characters"))]
    pub icon: Option<String>,

    pub display_order: Option<i64>,

    pub is_active: Option<bool>,
}

/// Lowercase, ASCII alphanumerics separated by single dashes.
/// "Food & Beverage Packaging" -> "food-beverage-packaging"
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Automotive"), "automotive");
        assert_eq!(slugify("Food & Beverage Packaging"), "food-beverage-packaging");
        assert_eq!(slugify("  Textiles -- Fibres  "), "textiles-fibres");
        assert_eq!(slugify("rPET 2024"), "rpet-2024");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_create_industry_validation() {
        let request = CreateIndustryRequest {
            name: String::new(),
            slug: None,
            description: None,
            icon: None,
            display_order: None,
            is_active: None,
        };
        assert!(request.validate().is_err());
    }
}
