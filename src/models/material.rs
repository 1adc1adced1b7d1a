// src/models/material.rs
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use validator::Validate;
use chrono::{DateTime, Utc};
use std::fmt;

use super::industry::IndustryRef;

// ==================== ATTRIBUTES ====================

/// Value of a dynamic material attribute. Stored as plain JSON, so a
/// multi-valued attribute is an array and a flag is a boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    /// Text rendering used on detail pages and in e-mails.
    pub fn display(&self) -> String {
        match self {
            AttributeValue::Flag(true) => "Yes".to_string(),
            AttributeValue::Flag(false) => "No".to_string(),
            AttributeValue::Number(n) => format_quantity(*n),
            AttributeValue::Text(s) => s.clone(),
            AttributeValue::List(values) => values.join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialAttribute {
    pub label: String,
    pub value: AttributeValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Ordered attribute map. Serialized as a JSON object whose keys keep
/// their insertion order, both on the wire and in the `attributes` column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    entries: Vec<(String, MaterialAttribute)>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, attribute: MaterialAttribute) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = attribute,
            None => self.entries.push((key, attribute)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MaterialAttribute> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MaterialAttribute)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for AttributeMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, attribute) in &self.entries {
            map.serialize_entry(key, attribute)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AttributeMapVisitor;

        impl<'de> Visitor<'de> for AttributeMapVisitor {
            type Value = AttributeMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of material attributes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut attributes = AttributeMap::new();
                while let Some((key, value)) = access.next_entry::<String, MaterialAttribute>()? {
                    attributes.insert(key, value);
                }
                Ok(attributes)
            }
        }

        deserializer.deserialize_map(AttributeMapVisitor)
    }
}

// ==================== MATERIAL ====================

/// Raw `materials` row joined with its industry. JSON columns are decoded
/// into [`Material`].
#[derive(Debug, sqlx::FromRow)]
pub struct MaterialRow {
    pub id: String,
    pub material_code: String,
    pub name: String,
    pub description: Option<String>,
    pub images: String,
    pub available_quantity: f64,
    pub unit: String,
    pub minimum_order_quantity: f64,
    pub industry_id: String,
    pub industry_name: String,
    pub industry_slug: String,
    pub supply_region: Option<String>,
    pub certifications: String,
    pub attributes: String,
    pub is_featured: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Material {
    pub id: String,
    pub material_code: String,
    pub name: String,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub available_quantity: f64,
    pub unit: String,
    pub minimum_order_quantity: f64,
    pub industry: IndustryRef,
    pub supply_region: Option<String>,
    pub certifications: Vec<String>,
    pub attributes: AttributeMap,
    pub is_featured: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<MaterialRow> for Material {
    type Error = serde_json::Error;

    fn try_from(row: MaterialRow) -> Result<Self, Self::Error> {
        Ok(Self {
            images: serde_json::from_str(&row.images)?,
            certifications: serde_json::from_str(&row.certifications)?,
            attributes: serde_json::from_str(&row.attributes)?,
            industry: IndustryRef {
                id: row.industry_id,
                name: row.industry_name,
                slug: row.industry_slug,
            },
            id: row.id,
            material_code: row.material_code,
            name: row.name,
            description: row.description,
            available_quantity: row.available_quantity,
            unit: row.unit,
            minimum_order_quantity: row.minimum_order_quantity,
            supply_region: row.supply_region,
            is_featured: row.is_featured,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct MaterialDetail {
    pub material: Material,
    pub related_materials: Vec<Material>,
}

// ==================== REQUESTS ====================

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateMaterialRequest {
    #[validate(length(min = 1, max = 50, message = "Material code must be between 1 and 50 characters"))]
    pub material_code: String,

    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[validate(length(max = 5000, message = "Description cannot exceed 5000 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    pub images: Vec<String>,

    #[validate(range(min = 0.0, message = "Available quantity cannot be negative"))]
    pub available_quantity: f64,

    #[validate(length(min = 1, max = 20, message = "Unit must be between 1 and 20 characters"))]
    pub unit: String,

    #[validate(range(min = 0.0, message = "Minimum order quantity cannot be negative"))]
    pub minimum_order_quantity: Option<f64>,

    pub industry_id: String,

    #[validate(length(max = 255, message = "Supply region cannot exceed 255 characters"))]
    pub supply_region: Option<String>,

    #[serde(default)]
    pub certifications: Vec<String>,

    #[serde(default)]
    pub attributes: AttributeMap,

    pub is_featured: Option<bool>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMaterialRequest {
    #[validate(length(min = 1, max = 50, message = "Material code must be between 1 and 50 characters"))]
    pub material_code: Option<String>,

    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 5000, message = "Description cannot exceed 5000 characters"))]
    pub description: Option<String>,

    pub images: Option<Vec<String>>,

    #[validate(range(min = 0.0, message = "Available quantity cannot be negative"))]
    pub available_quantity: Option<f64>,

    #[validate(length(min = 1, max = 20, message = "Unit must be between 1 and 20 characters"))]
    pub unit: Option<String>,

    #[validate(range(min = 0.0, message = "Minimum order quantity cannot be negative"))]
    pub minimum_order_quantity: Option<f64>,

    pub industry_id: Option<String>,

    #[validate(length(max = 255, message = "Supply region cannot exceed 255 characters"))]
    pub supply_region: Option<String>,

    pub certifications: Option<Vec<String>>,

    pub attributes: Option<AttributeMap>,

    pub is_featured: Option<bool>,

    pub is_active: Option<bool>,
}

/// Drops blanks and duplicates while keeping first-seen order.
pub fn normalize_certifications(certifications: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(certifications.len());
    for cert in certifications {
        let cert = cert.trim().to_string();
        if !cert.is_empty() && !seen.contains(&cert) {
            seen.push(cert);
        }
    }
    seen
}

/// Formats a quantity without a trailing ".0" for whole numbers: 150.0 -> "150", 2.5 -> "2.5".
pub fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 && quantity.abs() < 1e15 {
        format!("{}", quantity as i64)
    } else {
        format!("{}", quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(label: &str, value: AttributeValue) -> MaterialAttribute {
        MaterialAttribute { label: label.to_string(), value, unit: None }
    }

    #[test]
    fn test_attribute_map_preserves_insertion_order() {
        let json = r#"{
            "grade": {"label": "Grade", "value": "Food grade"},
            "colors": {"label": "Colors", "value": ["clear", "blue"]},
            "melt_flow": {"label": "Melt flow index", "value": 12.5, "unit": "g/10min"},
            "certified": {"label": "Certified", "value": true}
        }"#;

        let map: AttributeMap = serde_json::from_str(json).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["grade", "colors", "melt_flow", "certified"]);
        assert_eq!(map.get("certified").unwrap().value, AttributeValue::Flag(true));
        assert_eq!(map.get("melt_flow").unwrap().unit.as_deref(), Some("g/10min"));

        let out = serde_json::to_string(&map).unwrap();
        let grade_pos = out.find("grade").unwrap();
        let colors_pos = out.find("colors").unwrap();
        let certified_pos = out.find("certified").unwrap();
        assert!(grade_pos < colors_pos && colors_pos < certified_pos);
    }

    #[test]
    fn test_attribute_map_replace_keeps_position() {
        let mut map = AttributeMap::new();
        map.insert("a", attribute("A", AttributeValue::Flag(true)));
        map.insert("b", attribute("B", AttributeValue::Text("x".into())));
        map.insert("a", attribute("A2", AttributeValue::Flag(false)));

        assert_eq!(map.len(), 2);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a").unwrap().label, "A2");
    }

    #[test]
    fn test_attribute_value_display() {
        assert_eq!(AttributeValue::Flag(true).display(), "Yes");
        assert_eq!(AttributeValue::Number(3.0).display(), "3");
        assert_eq!(AttributeValue::List(vec!["red".into(), "blue".into()]).display(), "red, blue");
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(150.0), "150");
        assert_eq!(format_quantity(2.5), "2.5");
        assert_eq!(format_quantity(0.0), "0");
    }

    #[test]
    fn test_normalize_certifications() {
        let certs = vec![
            "GRS".to_string(),
            " ISCC PLUS ".to_string(),
            "GRS".to_string(),
            "".to_string(),
        ];
        assert_eq!(normalize_certifications(certs), vec!["GRS".to_string(), "ISCC PLUS".to_string()]);
    }
}
