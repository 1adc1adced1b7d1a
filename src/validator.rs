// src/validator.rs - Centralized validation module
use std::collections::BTreeMap;
use serde::Serialize;
use regex::Regex;
use lazy_static::lazy_static;
use crate::error::{field_errors_from, ApiError, ApiResult};
use crate::models::*;
use crate::models::format_quantity;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    static ref MOBILE_REGEX: Regex = Regex::new(r"^[0-9][0-9 -]{5,18}[0-9]$").unwrap();
    static ref COUNTRY_CODE_REGEX: Regex = Regex::new(r"^\+?[0-9]{1,4}$").unwrap();
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap();
    static ref FILTER_KEY_REGEX: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,63}$").unwrap();
}

// ==================== VALIDATION RESULT ====================

#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        for (field, errors) in other.errors {
            self.errors.entry(field).or_default().extend(errors);
        }
    }

    /// `Ok(())` when no field failed, otherwise the accumulated `ValidationFailed`.
    pub fn into_result(self) -> ApiResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ApiError::ValidationFailed(self.errors))
        }
    }
}

impl From<&validator::ValidationErrors> for ValidationResult {
    fn from(err: &validator::ValidationErrors) -> Self {
        Self { errors: field_errors_from(err) }
    }
}

// ==================== FIELD VALIDATORS ====================

pub struct FieldValidator;

impl FieldValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            Err(format!("{} cannot be empty", field))
        } else {
            Ok(())
        }
    }

    pub fn length(value: &str, field: &str, min: Option<usize>, max: Option<usize>) -> Result<(), String> {
        let len = value.chars().count();

        if let Some(min_len) = min {
            if len < min_len {
                return Err(format!("{} must be at least {} characters", field, min_len));
            }
        }

        if let Some(max_len) = max {
            if len > max_len {
                return Err(format!("{} must not exceed {} characters", field, max_len));
            }
        }

        Ok(())
    }

    pub fn range<T: PartialOrd + std::fmt::Display>(
        value: T,
        field: &str,
        min: Option<T>,
        max: Option<T>
    ) -> Result<(), String> {
        if let Some(min_val) = min {
            if value < min_val {
                return Err(format!("{} must be at least {}", field, min_val));
            }
        }

        if let Some(max_val) = max {
            if value > max_val {
                return Err(format!("{} must not exceed {}", field, max_val));
            }
        }

        Ok(())
    }

    pub fn email(value: &str) -> Result<(), String> {
        if EMAIL_REGEX.is_match(value) {
            Ok(())
        } else {
            Err("Invalid email format".to_string())
        }
    }

    pub fn mobile_number(value: &str) -> Result<(), String> {
        if MOBILE_REGEX.is_match(value) {
            Ok(())
        } else {
            Err("Invalid mobile number".to_string())
        }
    }

    pub fn country_code(value: &str) -> Result<(), String> {
        if COUNTRY_CODE_REGEX.is_match(value) {
            Ok(())
        } else {
            Err("Invalid country code (expected e.g. +91)".to_string())
        }
    }

    pub fn positive_quantity(value: f64, field: &str) -> Result<(), String> {
        if !value.is_finite() || value <= 0.0 {
            Err(format!("{} must be a positive number", field))
        } else if value > 1e12 {
            Err(format!("{} is too large", field))
        } else {
            Ok(())
        }
    }

    pub fn slug(value: &str) -> Result<(), String> {
        if SLUG_REGEX.is_match(value) {
            Ok(())
        } else {
            Err("Slug may only contain lowercase letters, digits and single dashes".to_string())
        }
    }

    pub fn filter_key(value: &str) -> Result<(), String> {
        if FILTER_KEY_REGEX.is_match(value) {
            Ok(())
        } else {
            Err("Filter key must start with a letter and contain only letters, digits and underscores".to_string())
        }
    }
}

// ==================== CUSTOM VALIDATION ====================

pub trait CustomValidate {
    fn custom_validate(&self) -> ValidationResult;
}

impl CustomValidate for CreateIndustryRequest {
    fn custom_validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Err(e) = FieldValidator::not_empty(&self.name, "Name") {
            result.add_error("name", e);
        }
        if let Some(ref slug) = self.slug {
            if let Err(e) = FieldValidator::slug(slug) {
                result.add_error("slug", e);
            }
        } else if slugify(&self.name).is_empty() {
            result.add_error("slug", "Name must contain at least one letter or digit");
        }

        result
    }
}

impl CustomValidate for CreateMaterialRequest {
    fn custom_validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Err(e) = FieldValidator::not_empty(&self.material_code, "Material code") {
            result.add_error("material_code", e);
        }
        if let Err(e) = FieldValidator::not_empty(&self.name, "Name") {
            result.add_error("name", e);
        }
        if self.images.iter().any(|i| i.trim().is_empty()) {
            result.add_error("images", "Image references cannot be blank");
        }
        for key in self.attributes.keys() {
            if let Err(e) = FieldValidator::filter_key(key) {
                result.add_error("attributes", format!("'{}': {}", key, e));
            }
        }

        result
    }
}

impl CustomValidate for CreateFilterDefinitionRequest {
    fn custom_validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Err(e) = FieldValidator::filter_key(&self.key) {
            result.add_error("key", e);
        }
        if let Err(e) = check_filter_options(self.filter_type, &self.options) {
            result.add_error("options", e);
        }

        result
    }
}

// ==================== BUSINESS VALIDATORS ====================

pub struct BusinessValidator;

impl BusinessValidator {
    /// Compares a draft against the material as currently stored.
    pub fn validate_order(
        requested_quantity: f64,
        requested_unit: &str,
        material_unit: &str,
        minimum_order_quantity: f64,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();

        if requested_unit != material_unit {
            result.add_error(
                "requested_unit",
                format!("This material is sold in {}", material_unit),
            );
        }

        if requested_quantity < minimum_order_quantity {
            result.add_error(
                "requested_quantity",
                format!(
                    "Minimum order quantity is {} {}",
                    format_quantity(minimum_order_quantity),
                    material_unit
                ),
            );
        }

        result
    }
}
