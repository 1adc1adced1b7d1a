// src/models/buyer_request.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};
use std::str::FromStr;

use super::industry::IndustryRef;
use crate::error::ApiError;
use crate::validator::{FieldValidator, ValidationResult};

// ==================== STATUS ====================

/// Lifecycle of a buyer request:
/// `Submitted -> Reviewed -> Confirmed -> Dispatched -> Completed`,
/// with `Cancelled` reachable from every non-terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    strum::Display, strum::EnumString, strum::AsRefStr, strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum RequestStatus {
    Submitted,
    Reviewed,
    Confirmed,
    Dispatched,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Submitted => "Submitted",
            RequestStatus::Reviewed => "Reviewed",
            RequestStatus::Confirmed => "Confirmed",
            RequestStatus::Dispatched => "Dispatched",
            RequestStatus::Completed => "Completed",
            RequestStatus::Cancelled => "Cancelled",
        }
    }

    /// Forward successor on the main path.
    pub fn next(&self) -> Option<RequestStatus> {
        match self {
            RequestStatus::Submitted => Some(RequestStatus::Reviewed),
            RequestStatus::Reviewed => Some(RequestStatus::Confirmed),
            RequestStatus::Confirmed => Some(RequestStatus::Dispatched),
            RequestStatus::Dispatched => Some(RequestStatus::Completed),
            RequestStatus::Completed | RequestStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    pub fn can_transition_to(&self, target: RequestStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == RequestStatus::Cancelled || self.next() == Some(target)
    }

    pub fn transition_to(&self, target: RequestStatus) -> Result<RequestStatus, ApiError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(ApiError::InvalidTransition { from: *self, to: target })
        }
    }

    /// Column recording when the request entered this state.
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            RequestStatus::Submitted => "created_at",
            RequestStatus::Reviewed => "reviewed_at",
            RequestStatus::Confirmed => "confirmed_at",
            RequestStatus::Dispatched => "dispatched_at",
            RequestStatus::Completed => "completed_at",
            RequestStatus::Cancelled => "cancelled_at",
        }
    }
}

// ==================== BUYER REQUEST ====================

#[derive(Debug, sqlx::FromRow)]
pub struct BuyerRequestRow {
    pub id: String,
    pub request_code: String,
    pub buyer_name: String,
    pub buyer_email: Option<String>,
    pub buyer_mobile: Option<String>,
    pub country_code: Option<String>,
    pub company_name: String,
    pub material_id: String,
    pub industry_id: String,
    pub requested_quantity: f64,
    pub requested_unit: String,
    pub specifications: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BuyerRequest {
    pub id: String,
    pub request_code: String,
    pub buyer_name: String,
    pub buyer_email: Option<String>,
    pub buyer_mobile: Option<String>,
    pub country_code: Option<String>,
    pub company_name: String,
    pub material_id: String,
    pub industry_id: String,
    pub requested_quantity: f64,
    pub requested_unit: String,
    pub specifications: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<BuyerRequestRow> for BuyerRequest {
    type Error = String;

    fn try_from(row: BuyerRequestRow) -> Result<Self, Self::Error> {
        let status = RequestStatus::from_str(&row.status)
            .map_err(|_| format!("Unknown request status '{}'", row.status))?;

        Ok(Self {
            id: row.id,
            request_code: row.request_code,
            buyer_name: row.buyer_name,
            buyer_email: row.buyer_email,
            buyer_mobile: row.buyer_mobile,
            country_code: row.country_code,
            company_name: row.company_name,
            material_id: row.material_id,
            industry_id: row.industry_id,
            requested_quantity: row.requested_quantity,
            requested_unit: row.requested_unit,
            specifications: row.specifications,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            reviewed_at: row.reviewed_at,
            confirmed_at: row.confirmed_at,
            dispatched_at: row.dispatched_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

/// Material fields denormalized onto a request for display.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MaterialSummary {
    pub id: String,
    pub material_code: String,
    pub name: String,
    pub unit: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: BuyerRequest,
    pub material: MaterialSummary,
    pub industry: IndustryRef,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct StatusChange {
    pub id: String,
    pub request_id: String,
    pub from_status: Option<String>,
    pub to_status: String,
    pub changed_by: Option<String>,
    pub note: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RequestWithHistory {
    #[serde(flatten)]
    pub detail: RequestDetail,
    pub history: Vec<StatusChange>,
}

#[derive(Debug, Serialize)]
pub struct SubmittedRequest {
    pub request_code: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

// ==================== DRAFT ====================

/// Buyer-submitted "request a quote" form.
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct RequestDraft {
    #[validate(length(max = 255, message = "Buyer name cannot exceed 255 characters"))]
    pub buyer_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub buyer_email: Option<String>,

    pub buyer_mobile: Option<String>,

    pub country_code: Option<String>,

    #[validate(length(max = 255, message = "Company name cannot exceed 255 characters"))]
    pub company_name: String,

    pub material_id: String,

    pub requested_quantity: f64,

    #[validate(length(max = 20, message = "Unit cannot exceed 20 characters"))]
    pub requested_unit: Option<String>,

    #[validate(length(max = 2000, message = "Specifications cannot exceed 2000 characters"))]
    pub specifications: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RequestDraft {
    /// Trims every text field; blank optional fields become `None`.
    pub fn normalized(self) -> Self {
        Self {
            buyer_name: self.buyer_name.trim().to_string(),
            buyer_email: trimmed(self.buyer_email),
            buyer_mobile: trimmed(self.buyer_mobile),
            country_code: trimmed(self.country_code),
            company_name: self.company_name.trim().to_string(),
            material_id: self.material_id.trim().to_string(),
            requested_quantity: self.requested_quantity,
            requested_unit: trimmed(self.requested_unit),
            specifications: trimmed(self.specifications),
        }
    }

    /// Checks every precondition that does not need the catalog.
    /// Expects a [`normalized`](Self::normalized) draft.
    pub fn check(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Err(e) = self.validate() {
            result.merge(ValidationResult::from(&e));
        }

        if let Err(msg) = FieldValidator::not_empty(&self.buyer_name, "Buyer name") {
            result.add_error("buyer_name", msg);
        }
        if let Err(msg) = FieldValidator::not_empty(&self.company_name, "Company name") {
            result.add_error("company_name", msg);
        }
        if let Err(msg) = FieldValidator::not_empty(&self.material_id, "Material") {
            result.add_error("material_id", msg);
        }

        match (&self.buyer_email, &self.buyer_mobile) {
            (None, None) => {
                result.add_error("buyer_email", "Please provide either email or mobile number");
                result.add_error("buyer_mobile", "Please provide either email or mobile number");
            }
            (_, Some(mobile)) => {
                if let Err(msg) = FieldValidator::mobile_number(mobile) {
                    result.add_error("buyer_mobile", msg);
                }
                match &self.country_code {
                    None => result.add_error("country_code", "Country code is required with a mobile number"),
                    Some(code) => {
                        if let Err(msg) = FieldValidator::country_code(code) {
                            result.add_error("country_code", msg);
                        }
                    }
                }
            }
            _ => {}
        }

        if let Err(msg) = FieldValidator::positive_quantity(self.requested_quantity, "Requested quantity") {
            result.add_error("requested_quantity", msg);
        }

        result
    }
}

// ==================== ADMIN COMMANDS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct TransitionRequest {
    pub status: RequestStatus,
    #[validate(length(max = 1000, message = "Note cannot exceed 1000 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<RequestStatus>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn draft() -> RequestDraft {
        RequestDraft {
            buyer_name: "Asha Rao".to_string(),
            buyer_email: Some("asha@packco.example".to_string()),
            buyer_mobile: None,
            country_code: None,
            company_name: "PackCo".to_string(),
            material_id: "mat-1".to_string(),
            requested_quantity: 150.0,
            requested_unit: None,
            specifications: None,
        }
    }

    #[test]
    fn test_forward_path() {
        assert!(RequestStatus::Submitted.can_transition_to(RequestStatus::Reviewed));
        assert!(RequestStatus::Reviewed.can_transition_to(RequestStatus::Confirmed));
        assert!(RequestStatus::Confirmed.can_transition_to(RequestStatus::Dispatched));
        assert!(RequestStatus::Dispatched.can_transition_to(RequestStatus::Completed));
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(matches!(
            RequestStatus::Submitted.transition_to(RequestStatus::Dispatched),
            Err(ApiError::InvalidTransition { from: RequestStatus::Submitted, to: RequestStatus::Dispatched })
        ));
        assert!(!RequestStatus::Confirmed.can_transition_to(RequestStatus::Reviewed));
        assert!(!RequestStatus::Reviewed.can_transition_to(RequestStatus::Reviewed));
        assert!(!RequestStatus::Submitted.can_transition_to(RequestStatus::Submitted));
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        for status in RequestStatus::iter().filter(|s| !s.is_terminal()) {
            assert!(status.can_transition_to(RequestStatus::Cancelled), "{} -> Cancelled", status);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for target in RequestStatus::iter() {
            assert!(!RequestStatus::Completed.can_transition_to(target));
            assert!(!RequestStatus::Cancelled.can_transition_to(target));
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in RequestStatus::iter() {
            assert_eq!(RequestStatus::from_str(status.as_str()).unwrap(), status);
            assert_eq!(status.to_string(), status.as_str());
        }
        assert_eq!(RequestStatus::from_str("confirmed").unwrap(), RequestStatus::Confirmed);
    }

    #[test]
    fn test_draft_with_email_only_is_valid() {
        assert!(draft().normalized().check().is_valid());
    }

    #[test]
    fn test_draft_without_contact_fails() {
        let mut d = draft();
        d.buyer_email = Some("   ".to_string());
        let result = d.normalized().check();
        assert!(!result.is_valid());
        assert!(result.errors.contains_key("buyer_email"));
        assert!(result.errors.contains_key("buyer_mobile"));
    }

    #[test]
    fn test_mobile_requires_country_code() {
        let mut d = draft();
        d.buyer_email = None;
        d.buyer_mobile = Some("9876543210".to_string());
        let result = d.clone().normalized().check();
        assert!(result.errors.contains_key("country_code"));

        d.country_code = Some("+91".to_string());
        assert!(d.normalized().check().is_valid());
    }

    #[test]
    fn test_blank_names_rejected() {
        let mut d = draft();
        d.buyer_name = "  ".to_string();
        d.company_name = String::new();
        let result = d.normalized().check();
        assert!(result.errors.contains_key("buyer_name"));
        assert!(result.errors.contains_key("company_name"));
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        for qty in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let mut d = draft();
            d.requested_quantity = qty;
            assert!(d.normalized().check().errors.contains_key("requested_quantity"));
        }
    }

    #[test]
    fn test_invalid_email_rejected() {
        let mut d = draft();
        d.buyer_email = Some("not-an-email".to_string());
        assert!(d.normalized().check().errors.contains_key("buyer_email"));
    }
}
