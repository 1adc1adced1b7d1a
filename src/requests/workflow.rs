// src/requests/workflow.rs
//! Buyer request lifecycle: submission, lookup and admin status transitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::code::{generate_request_code, is_valid_request_code};
use super::ledger;
use crate::catalog::store::visible_material_row_by_id;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    BuyerRequest, IndustryRef, MaterialRow, MaterialSummary, RequestDetail, RequestDraft,
    RequestStatus, RequestWithHistory, SubmittedRequest,
};
use crate::monitoring::Metrics;
use crate::notifications::{NotificationDispatcher, NotificationEvent};
use crate::pagination::{PageRequest, Pagination};
use crate::validator::BusinessValidator;

const MAX_CODE_ATTEMPTS: usize = 5;
const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct RequestWorkflow {
    pool: SqlitePool,
    dispatcher: NotificationDispatcher,
    metrics: Option<Arc<Metrics>>,
}

impl RequestWorkflow {
    pub fn new(pool: SqlitePool, dispatcher: NotificationDispatcher) -> Self {
        Self { pool, dispatcher, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validates `draft` against the material as stored right now and records
    /// a new `Submitted` request. The confirmation e-mail is sent in the
    /// background; its outcome never affects the result.
    pub async fn submit(&self, draft: RequestDraft) -> ApiResult<SubmittedRequest> {
        let draft = draft.normalized();
        draft.check().into_result()?;

        let mut tx = self.pool.begin().await.map_err(ApiError::persistence_failed)?;

        // Minimum quantity is re-read inside the same transaction as the insert.
        let material = visible_material_row_by_id(&mut tx, &draft.material_id)
            .await
            .map_err(ApiError::persistence_failed)?
            .ok_or_else(|| ApiError::material_not_found(&draft.material_id))?;

        let requested_unit = draft
            .requested_unit
            .clone()
            .unwrap_or_else(|| material.unit.clone());
        BusinessValidator::validate_order(
            draft.requested_quantity,
            &requested_unit,
            &material.unit,
            material.minimum_order_quantity,
        )
        .into_result()?;

        let now = Utc::now();
        let mut request = BuyerRequest {
            id: Uuid::new_v4().to_string(),
            request_code: String::new(),
            buyer_name: draft.buyer_name,
            buyer_email: draft.buyer_email,
            buyer_mobile: draft.buyer_mobile,
            country_code: draft.country_code,
            company_name: draft.company_name,
            material_id: material.id.clone(),
            industry_id: material.industry_id.clone(),
            requested_quantity: draft.requested_quantity,
            requested_unit,
            specifications: draft.specifications,
            status: RequestStatus::Submitted,
            created_at: now,
            updated_at: now,
            reviewed_at: None,
            confirmed_at: None,
            dispatched_at: None,
            completed_at: None,
            cancelled_at: None,
        };

        insert_with_fresh_code(&mut tx, &mut request, now).await?;
        ledger::record_history(&mut tx, &request.id, None, RequestStatus::Submitted, None, None, now)
            .await
            .map_err(ApiError::persistence_failed)?;
        tx.commit().await.map_err(ApiError::persistence_failed)?;

        log::info!(
            "Request {} submitted for material {} ({} {})",
            request.request_code, material.material_code, request.requested_quantity, request.requested_unit
        );
        if let Some(metrics) = &self.metrics {
            metrics.increment_submissions();
        }

        let submitted = SubmittedRequest {
            request_code: request.request_code.clone(),
            status: request.status,
            created_at: request.created_at,
        };
        self.dispatcher
            .dispatch(NotificationEvent::Created, detail_from_material(request, material));

        Ok(submitted)
    }

    /// Buyer-facing lookup by exact request code.
    pub async fn verify(&self, code: &str) -> ApiResult<RequestDetail> {
        if !is_valid_request_code(code) {
            return Err(ApiError::request_not_found());
        }
        let mut conn = self.pool.acquire().await.map_err(ApiError::persistence_failed)?;
        ledger::detail_by_code(&mut conn, code)
            .await?
            .ok_or_else(ApiError::request_not_found)
    }

    /// Admin view: the request plus every status change, oldest first.
    pub async fn get_with_history(&self, code: &str) -> ApiResult<RequestWithHistory> {
        let mut conn = self.pool.acquire().await.map_err(ApiError::persistence_failed)?;
        let detail = ledger::detail_by_code(&mut conn, code)
            .await?
            .ok_or_else(ApiError::request_not_found)?;
        let history = ledger::history(&mut conn, &detail.request.id)
            .await
            .map_err(ApiError::persistence_failed)?;
        Ok(RequestWithHistory { detail, history })
    }

    /// Applies one admin-triggered status change and notifies the buyer.
    pub async fn transition(
        &self,
        code: &str,
        target: RequestStatus,
        changed_by: &str,
        note: Option<&str>,
    ) -> ApiResult<RequestDetail> {
        let mut tx = self.pool.begin().await.map_err(ApiError::persistence_failed)?;

        let current = ledger::detail_by_code(&mut tx, code)
            .await?
            .ok_or_else(ApiError::request_not_found)?;
        let from = current.request.status;
        from.transition_to(target)?;

        let now = Utc::now();
        let applied = ledger::apply_transition(&mut tx, &current.request.id, from, target, now)
            .await
            .map_err(ApiError::persistence_failed)?;
        if !applied {
            // Another admin moved it first.
            return Err(ApiError::InvalidTransition { from, to: target });
        }
        ledger::record_history(&mut tx, &current.request.id, Some(from), target, Some(changed_by), note, now)
            .await
            .map_err(ApiError::persistence_failed)?;

        let updated = ledger::detail_by_code(&mut tx, code)
            .await?
            .ok_or_else(ApiError::request_not_found)?;
        tx.commit().await.map_err(ApiError::persistence_failed)?;

        log::info!("Request {} moved from {} to {} by {}", code, from, target, changed_by);
        self.dispatcher
            .dispatch(NotificationEvent::StatusChanged, updated.clone());

        Ok(updated)
    }

    /// Admin listing, newest first.
    pub async fn list(
        &self,
        status: Option<RequestStatus>,
        search: Option<&str>,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> ApiResult<(Vec<RequestDetail>, Pagination)> {
        let page = PageRequest::new(page, limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
        let mut conn = self.pool.acquire().await.map_err(ApiError::persistence_failed)?;
        ledger::list(&mut conn, status, search, page).await
    }
}

/// Inserts `request`, drawing a new code whenever the previous one collides.
async fn insert_with_fresh_code(
    conn: &mut SqliteConnection,
    request: &mut BuyerRequest,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        request.request_code = generate_request_code(now);
        match ledger::insert(&mut *conn, request).await {
            Ok(()) => return Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() && attempt < MAX_CODE_ATTEMPTS => {
                log::warn!("Request code {} already taken, drawing another", request.request_code);
            }
            Err(e) => return Err(ApiError::persistence_failed(e)),
        }
    }
    Err(ApiError::InternalServerError("Could not allocate a request code".to_string()))
}

fn detail_from_material(request: BuyerRequest, material: MaterialRow) -> RequestDetail {
    RequestDetail {
        material: MaterialSummary {
            id: material.id,
            material_code: material.material_code,
            name: material.name,
            unit: material.unit,
        },
        industry: IndustryRef {
            id: material.industry_id,
            name: material.industry_name,
            slug: material.industry_slug,
        },
        request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;
    use crate::db::{fixtures, test_pool};
    use crate::notifications::dispatcher::testing::{fast_mail_config, FlakyTransport, RecordingTransport};
    use crate::notifications::transport::EmailTransport;

    struct Harness {
        pool: SqlitePool,
        workflow: RequestWorkflow,
        transport: Arc<RecordingTransport>,
    }

    async fn harness() -> Harness {
        let pool = test_pool().await;
        fixtures::industry(&pool, "ind-pack", "Packaging", "packaging", 1, true).await;
        let mut pellets = fixtures::MaterialFixture::new("mat-pet", "PCR-PET-001", "rPET Pellets", "ind-pack");
        pellets.minimum_order_quantity = 100.0;
        pellets.insert(&pool).await;
        let mut retired = fixtures::MaterialFixture::new("mat-old", "PCR-OLD-001", "Retired Flakes", "ind-pack");
        retired.active = false;
        retired.insert(&pool).await;

        let transport = Arc::new(RecordingTransport::default());
        let workflow = workflow_with(&pool, transport.clone(), &fast_mail_config());
        Harness { pool, workflow, transport }
    }

    fn workflow_with(pool: &SqlitePool, transport: Arc<dyn EmailTransport>, config: &MailConfig) -> RequestWorkflow {
        RequestWorkflow::new(pool.clone(), NotificationDispatcher::new(transport, config))
    }

    fn draft(quantity: f64) -> RequestDraft {
        RequestDraft {
            buyer_name: "Asha Verma".to_string(),
            buyer_email: Some("asha@greenpack.example".to_string()),
            buyer_mobile: None,
            country_code: None,
            company_name: "GreenPack Ltd".to_string(),
            material_id: "mat-pet".to_string(),
            requested_quantity: quantity,
            requested_unit: Some("kg".to_string()),
            specifications: None,
        }
    }

    async fn request_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM buyer_requests")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn wait_for_emails(transport: &RecordingTransport, expected: usize) {
        for _ in 0..100 {
            if transport.sent().len() >= expected {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("expected {} emails, got {}", expected, transport.sent().len());
    }

    fn field_errors(err: ApiError) -> Vec<String> {
        match err {
            ApiError::ValidationFailed(errors) => errors.into_keys().collect(),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn test_end_to_end_submission_for_rpet_pellets() {
        let h = harness().await;

        let submitted = h.workflow.submit(draft(150.0)).await.unwrap();
        assert!(is_valid_request_code(&submitted.request_code), "{}", submitted.request_code);
        assert_eq!(submitted.status, RequestStatus::Submitted);

        let stored = h.workflow.verify(&submitted.request_code).await.unwrap();
        assert_eq!(stored.request.status, RequestStatus::Submitted);
        assert_eq!(stored.request.industry_id, "ind-pack");
        assert_eq!(stored.material.name, "rPET Pellets");
        assert_eq!(stored.industry.slug, "packaging");

        wait_for_emails(&h.transport, 1).await;
        let (to, email) = &h.transport.sent()[0];
        assert_eq!(to, "asha@greenpack.example");
        assert!(email.subject.contains(&submitted.request_code));
        assert!(email.html.contains(&submitted.request_code));
        assert!(email.html.contains("150 kg"));
    }

    #[actix_rt::test]
    async fn test_missing_contact_persists_nothing() {
        let h = harness().await;
        let mut d = draft(150.0);
        d.buyer_email = None;

        let fields = field_errors(h.workflow.submit(d).await.unwrap_err());
        assert!(fields.contains(&"buyer_email".to_string()));
        assert_eq!(request_count(&h.pool).await, 0);
    }

    #[actix_rt::test]
    async fn test_minimum_order_quantity_boundary() {
        let h = harness().await;

        let fields = field_errors(h.workflow.submit(draft(99.5)).await.unwrap_err());
        assert_eq!(fields, vec!["requested_quantity".to_string()]);
        assert_eq!(request_count(&h.pool).await, 0);

        h.workflow.submit(draft(100.0)).await.unwrap();
        assert_eq!(request_count(&h.pool).await, 1);
    }

    #[actix_rt::test]
    async fn test_minimum_is_read_from_the_store() {
        let h = harness().await;
        sqlx::query("UPDATE materials SET minimum_order_quantity = 500 WHERE id = 'mat-pet'")
            .execute(&h.pool)
            .await
            .unwrap();

        let err = h.workflow.submit(draft(150.0)).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationFailed(_)));
    }

    #[actix_rt::test]
    async fn test_unit_defaults_to_material_unit() {
        let h = harness().await;
        let mut d = draft(150.0);
        d.requested_unit = None;
        let submitted = h.workflow.submit(d).await.unwrap();
        let stored = h.workflow.verify(&submitted.request_code).await.unwrap();
        assert_eq!(stored.request.requested_unit, "kg");

        let mut d = draft(150.0);
        d.requested_unit = Some("tonnes".to_string());
        let fields = field_errors(h.workflow.submit(d).await.unwrap_err());
        assert_eq!(fields, vec!["requested_unit".to_string()]);
    }

    #[actix_rt::test]
    async fn test_unknown_or_inactive_material_is_not_found() {
        let h = harness().await;
        fixtures::industry(&h.pool, "ind-off", "Retired Sector", "retired-sector", 9, false).await;
        fixtures::MaterialFixture::new("mat-x", "PCR-X-001", "Orphaned Regrind", "ind-off")
            .insert(&h.pool)
            .await;

        for id in ["mat-missing", "mat-old", "mat-x"] {
            let mut d = draft(150.0);
            d.material_id = id.to_string();
            assert!(matches!(h.workflow.submit(d).await, Err(ApiError::NotFound(_))), "{}", id);
        }
        assert_eq!(request_count(&h.pool).await, 0);
    }

    #[actix_rt::test]
    async fn test_duplicate_submissions_are_separate_requests() {
        let h = harness().await;
        let a = h.workflow.submit(draft(150.0)).await.unwrap();
        let b = h.workflow.submit(draft(150.0)).await.unwrap();
        assert_ne!(a.request_code, b.request_code);
        assert_eq!(request_count(&h.pool).await, 2);
    }

    #[actix_rt::test]
    async fn test_mobile_only_buyer_is_accepted_without_email() {
        let h = harness().await;
        let mut d = draft(150.0);
        d.buyer_email = None;
        d.buyer_mobile = Some("98765 43210".to_string());
        d.country_code = Some("+91".to_string());

        let submitted = h.workflow.submit(d).await.unwrap();
        let stored = h.workflow.verify(&submitted.request_code).await.unwrap();
        assert_eq!(stored.request.buyer_mobile.as_deref(), Some("98765 43210"));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(h.transport.sent().is_empty());
    }

    #[actix_rt::test]
    async fn test_dispatch_failure_does_not_fail_submission() {
        let h = harness().await;
        let failing = Arc::new(FlakyTransport::failing(u32::MAX));
        let workflow = workflow_with(&h.pool, failing.clone(), &fast_mail_config());

        let submitted = workflow.submit(draft(150.0)).await.unwrap();
        assert!(workflow.verify(&submitted.request_code).await.is_ok());
    }

    #[actix_rt::test]
    async fn test_verify_is_idempotent_and_exact() {
        let h = harness().await;
        let submitted = h.workflow.submit(draft(150.0)).await.unwrap();

        let first = h.workflow.verify(&submitted.request_code).await.unwrap();
        let second = h.workflow.verify(&submitted.request_code).await.unwrap();
        assert_eq!(first, second);

        let lowercase = submitted.request_code.to_lowercase();
        assert!(matches!(h.workflow.verify(&lowercase).await, Err(ApiError::NotFound(_))));
        assert!(matches!(h.workflow.verify("REQ-%").await, Err(ApiError::NotFound(_))));
        assert!(matches!(
            h.workflow.verify("REQ-20240309-ABCDEFGHJK").await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[actix_rt::test]
    async fn test_state_machine_through_the_store() {
        let h = harness().await;
        let code = h.workflow.submit(draft(150.0)).await.unwrap().request_code;

        let err = h
            .workflow
            .transition(&code, RequestStatus::Dispatched, "admin", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::InvalidTransition { from: RequestStatus::Submitted, to: RequestStatus::Dispatched }
        ));
        assert_eq!(h.workflow.verify(&code).await.unwrap().request.status, RequestStatus::Submitted);

        for target in [RequestStatus::Reviewed, RequestStatus::Confirmed, RequestStatus::Dispatched] {
            h.workflow.transition(&code, target, "admin", None).await.unwrap();
        }
        let dispatched = h.workflow.verify(&code).await.unwrap();
        assert!(dispatched.request.reviewed_at.is_some());
        assert!(dispatched.request.confirmed_at.is_some());
        assert!(dispatched.request.dispatched_at.is_some());
        assert!(dispatched.request.completed_at.is_none());

        let completed = h
            .workflow
            .transition(&code, RequestStatus::Completed, "admin", Some("Delivered to Pune plant"))
            .await
            .unwrap();
        assert_eq!(completed.request.status, RequestStatus::Completed);
        assert!(completed.request.completed_at.is_some());

        assert!(matches!(
            h.workflow.transition(&code, RequestStatus::Cancelled, "admin", None).await,
            Err(ApiError::InvalidTransition { from: RequestStatus::Completed, .. })
        ));

        let with_history = h.workflow.get_with_history(&code).await.unwrap();
        let path: Vec<&str> = with_history.history.iter().map(|c| c.to_status.as_str()).collect();
        assert_eq!(path, vec!["Submitted", "Reviewed", "Confirmed", "Dispatched", "Completed"]);
        assert_eq!(with_history.history[0].from_status, None);
        assert_eq!(with_history.history[4].note.as_deref(), Some("Delivered to Pune plant"));
        assert_eq!(with_history.history[4].changed_by.as_deref(), Some("admin"));
    }

    #[actix_rt::test]
    async fn test_cancel_from_submitted_notifies_buyer() {
        let h = harness().await;
        let code = h.workflow.submit(draft(150.0)).await.unwrap().request_code;
        wait_for_emails(&h.transport, 1).await;

        let cancelled = h
            .workflow
            .transition(&code, RequestStatus::Cancelled, "admin", None)
            .await
            .unwrap();
        assert_eq!(cancelled.request.status, RequestStatus::Cancelled);
        assert!(cancelled.request.cancelled_at.is_some());

        wait_for_emails(&h.transport, 2).await;
        let (_, email) = &h.transport.sent()[1];
        assert!(email.subject.contains("Cancelled"));
        assert!(email.html.contains("Request Cancelled"));
    }

    #[actix_rt::test]
    async fn test_transition_unknown_code_is_not_found() {
        let h = harness().await;
        assert!(matches!(
            h.workflow.transition("REQ-20240309-ABCDEFGHJK", RequestStatus::Reviewed, "admin", None).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[actix_rt::test]
    async fn test_list_filters_by_status() {
        let h = harness().await;
        let first = h.workflow.submit(draft(150.0)).await.unwrap().request_code;
        h.workflow.submit(draft(200.0)).await.unwrap();
        h.workflow.transition(&first, RequestStatus::Reviewed, "admin", None).await.unwrap();

        let (all, pagination) = h.workflow.list(None, None, None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(pagination.total, 2);

        let (reviewed, _) = h.workflow.list(Some(RequestStatus::Reviewed), None, None, None).await.unwrap();
        assert_eq!(reviewed.len(), 1);
        assert_eq!(reviewed[0].request.request_code, first);

        let (searched, _) = h.workflow.list(None, Some("GreenPack"), None, None).await.unwrap();
        assert_eq!(searched.len(), 2);

        let (past_end, pagination) = h.workflow.list(None, None, Some(5), Some(10)).await.unwrap();
        assert!(past_end.is_empty());
        assert_eq!(pagination.page, 5);
        assert_eq!(pagination.pages, 1);
    }

    #[actix_rt::test]
    async fn test_closed_store_is_a_retryable_failure() {
        let h = harness().await;
        h.pool.close().await;
        let err = h.workflow.submit(draft(150.0)).await.unwrap_err();
        assert!(matches!(err, ApiError::PersistenceFailed(_)));
        assert!(err.is_retryable());
    }
}
