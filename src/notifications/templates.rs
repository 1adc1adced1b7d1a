// src/notifications/templates.rs
//! Deterministic rendering of buyer e-mails from a request and its material.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use tera::{Context, Tera};

use super::{DispatchError, NotificationEvent, RenderedEmail};
use crate::models::{format_quantity, RequestDetail, RequestStatus};

const BRAND: &str = "Eco Marketplace";
const FOOTER_BRAND: &str = "Eco Marketplace for PCR Materials";

lazy_static! {
    static ref TEMPLATES: Result<Tera, tera::Error> = {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("layout.html", include_str!("../../templates/email/layout.html")),
            ("request_created.html", include_str!("../../templates/email/request_created.html")),
            ("status_changed.html", include_str!("../../templates/email/status_changed.html")),
        ])
        .map(|_| tera)
    };
}

/// Headline and body copy for a status e-mail. `None` for statuses without
/// dedicated copy, which get the generic update message.
pub fn status_copy(status: RequestStatus) -> Option<(&'static str, &'static str)> {
    match status {
        RequestStatus::Reviewed => Some((
            "Your Request is Under Review",
            "Our team is currently reviewing your request. We will update you shortly with availability and pricing details.",
        )),
        RequestStatus::Confirmed => Some((
            "Your Request has been Confirmed!",
            "Great news! Your request has been confirmed. We are preparing your order and will dispatch it soon.",
        )),
        RequestStatus::Dispatched => Some((
            "Your Order has been Dispatched",
            "Your materials are on their way! You should receive them within the estimated delivery timeframe.",
        )),
        RequestStatus::Completed => Some((
            "Order Completed Successfully",
            "Your order has been completed. Thank you for choosing Eco Marketplace! We hope to serve you again.",
        )),
        RequestStatus::Cancelled => Some((
            "Request Cancelled",
            "Your request has been cancelled. If you have any questions, please contact our support team.",
        )),
        RequestStatus::Submitted => None,
    }
}

fn status_headline(status: RequestStatus) -> (String, String) {
    match status_copy(status) {
        Some((title, message)) => (title.to_string(), message.to_string()),
        None => (
            "Request Status Update".to_string(),
            format!("Your request status has been updated to {}.", status),
        ),
    }
}

fn date_only(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|at| at.format("%Y-%m-%d").to_string())
}

fn base_context(detail: &RequestDetail) -> Context {
    let request = &detail.request;
    let mut context = Context::new();
    context.insert("brand", FOOTER_BRAND);
    context.insert("buyer_name", &request.buyer_name);
    context.insert("request_code", &request.request_code);
    context.insert("material_name", non_blank(&detail.material.name));
    context.insert("material_code", non_blank(&detail.material.material_code));
    context.insert("industry_name", non_blank(&detail.industry.name));
    context.insert("company_name", &request.company_name);
    context.insert(
        "quantity",
        &format!("{} {}", format_quantity(request.requested_quantity), request.requested_unit),
    );
    context.insert("specifications", &request.specifications);
    context
}

fn non_blank(value: &str) -> &str {
    if value.trim().is_empty() { "N/A" } else { value }
}

fn render_template(name: &str, context: &Context) -> Result<String, DispatchError> {
    let tera = TEMPLATES
        .as_ref()
        .map_err(|e| DispatchError::Render(format!("templates failed to load: {}", e)))?;
    tera.render(name, context)
        .map_err(|e| DispatchError::Render(format!("{}: {}", name, e)))
}

/// Renders the e-mail for `event`. For `StatusChanged` the request's current
/// status is the one announced.
pub fn render(event: NotificationEvent, detail: &RequestDetail) -> Result<RenderedEmail, DispatchError> {
    let request = &detail.request;
    match event {
        NotificationEvent::Created => {
            let context = base_context(detail);
            Ok(RenderedEmail {
                subject: format!("Request Confirmation - {} | {}", request.request_code, BRAND),
                html: render_template("request_created.html", &context)?,
            })
        }
        NotificationEvent::StatusChanged => {
            let (headline, message) = status_headline(request.status);
            let mut context = base_context(detail);
            context.insert("headline", &headline);
            context.insert("message", &message);
            context.insert("status", request.status.as_str());
            context.insert("confirmed_on", &date_only(request.confirmed_at));
            context.insert("dispatched_on", &date_only(request.dispatched_at));
            Ok(RenderedEmail {
                subject: format!(
                    "Request Update: {} - {} | {}",
                    request.request_code, request.status, BRAND
                ),
                html: render_template("status_changed.html", &context)?,
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{BuyerRequest, IndustryRef, MaterialSummary};
    use chrono::TimeZone;

    pub(crate) fn sample_detail() -> RequestDetail {
        let created = Utc.with_ymd_and_hms(2024, 3, 9, 10, 30, 0).unwrap();
        RequestDetail {
            request: BuyerRequest {
                id: "req-1".into(),
                request_code: "REQ-20240309-ABCDEFGHJK".into(),
                buyer_name: "Asha Verma".into(),
                buyer_email: Some("asha@example.com".into()),
                buyer_mobile: None,
                country_code: None,
                company_name: "GreenPack Ltd".into(),
                material_id: "mat-1".into(),
                industry_id: "ind-pack".into(),
                requested_quantity: 150.0,
                requested_unit: "kg".into(),
                specifications: None,
                status: RequestStatus::Submitted,
                created_at: created,
                updated_at: created,
                reviewed_at: None,
                confirmed_at: None,
                dispatched_at: None,
                completed_at: None,
                cancelled_at: None,
            },
            material: MaterialSummary {
                id: "mat-1".into(),
                material_code: "PCR-PET-001".into(),
                name: "rPET Pellets".into(),
                unit: "kg".into(),
            },
            industry: IndustryRef {
                id: "ind-pack".into(),
                name: "Packaging".into(),
                slug: "packaging".into(),
            },
        }
    }

    #[test]
    fn test_confirmation_email_contents() {
        let email = render(NotificationEvent::Created, &sample_detail()).unwrap();

        assert_eq!(email.subject, "Request Confirmation - REQ-20240309-ABCDEFGHJK | Eco Marketplace");
        assert!(email.html.contains("REQ-20240309-ABCDEFGHJK"));
        assert!(email.html.contains("150 kg"));
        assert!(email.html.contains("rPET Pellets"));
        assert!(email.html.contains("PCR-PET-001"));
        assert!(email.html.contains("Packaging"));
        assert!(email.html.contains("Dear Asha Verma,"));
        assert!(!email.html.contains("Specifications:"));
    }

    #[test]
    fn test_specifications_and_missing_industry() {
        let mut detail = sample_detail();
        detail.request.specifications = Some("Food grade, IV 0.80".into());
        detail.industry.name = String::new();

        let email = render(NotificationEvent::Created, &detail).unwrap();
        assert!(email.html.contains("Specifications:"));
        assert!(email.html.contains("Food grade, IV 0.80"));
        // Autoescaping renders the slash as &#x2F;
        assert!(email.html.contains(r#"<td class="label">Industry:</td><td>N&#x2F;A</td>"#));
    }

    #[test]
    fn test_buyer_input_is_escaped() {
        let mut detail = sample_detail();
        detail.request.company_name = "<script>alert(1)</script>".into();

        let email = render(NotificationEvent::Created, &detail).unwrap();
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_status_email_uses_mapped_copy() {
        let mut detail = sample_detail();
        detail.request.status = RequestStatus::Dispatched;
        detail.request.confirmed_at = Some(Utc.with_ymd_and_hms(2024, 3, 11, 8, 0, 0).unwrap());
        detail.request.dispatched_at = Some(Utc.with_ymd_and_hms(2024, 3, 14, 16, 45, 0).unwrap());

        let email = render(NotificationEvent::StatusChanged, &detail).unwrap();
        assert_eq!(
            email.subject,
            "Request Update: REQ-20240309-ABCDEFGHJK - Dispatched | Eco Marketplace"
        );
        assert!(email.html.contains("Your Order has been Dispatched"));
        assert!(email.html.contains("Status: Dispatched"));
        assert!(email.html.contains("Confirmed On:"));
        assert!(email.html.contains("2024-03-11"));
        assert!(email.html.contains("2024-03-14"));
    }

    #[test]
    fn test_unmapped_status_falls_back_to_generic_copy() {
        assert!(status_copy(RequestStatus::Submitted).is_none());

        let email = render(NotificationEvent::StatusChanged, &sample_detail()).unwrap();
        assert!(email.html.contains("Request Status Update"));
        assert!(email.html.contains("Your request status has been updated to Submitted."));
        assert!(!email.html.contains("Confirmed On:"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let detail = sample_detail();
        assert_eq!(
            render(NotificationEvent::Created, &detail).unwrap(),
            render(NotificationEvent::Created, &detail).unwrap()
        );
    }
}
