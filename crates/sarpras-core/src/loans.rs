//! Equipment loan workflows.
//!
//! Submission is the hot path: every line is validated and its stock
//! reserved in one repository transaction, then the item and loan caches
//! are invalidated and the item listing prewarmed in the background.

use crate::cache::{cache_key, CacheError, CacheRegistry, TtlCache};
use crate::clock::SharedClock;
use crate::db::{
    ItemRepository, LineUpdateOutcome, LoanRepository, LoanSubmitOutcome, PaginatedResult,
    Pagination, UserRepository,
};
use crate::error::ServiceError;
use crate::models::{
    Item, LineDecision, LoanHeader, LoanLine, LoanRequestLine, LoanSubmission,
};
use chrono::NaiveDate;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// A new loan request before normalization.
#[derive(Debug, Clone)]
pub struct LoanRequest {
    pub borrower_id: Uuid,
    pub request_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub purpose: Option<String>,
    pub lines: Vec<LoanRequestLine>,
}

/// Loan workflows over the repositories, with cache maintenance.
pub struct LoanService<L: LoanRepository, I: ItemRepository, U: UserRepository> {
    loans: Arc<L>,
    items: Arc<I>,
    users: Arc<U>,
    registry: Arc<CacheRegistry>,
    clock: SharedClock,
}

impl<L, I, U> LoanService<L, I, U>
where
    L: LoanRepository + 'static,
    I: ItemRepository + 'static,
    U: UserRepository + 'static,
{
    pub fn new(
        loans: Arc<L>,
        items: Arc<I>,
        users: Arc<U>,
        registry: Arc<CacheRegistry>,
        clock: SharedClock,
    ) -> Self {
        Self {
            loans,
            items,
            users,
            registry,
            clock,
        }
    }

    async fn loan_cache(&self) -> Arc<TtlCache> {
        self.registry.get_or_create("peminjaman", None).await
    }

    async fn item_cache(&self) -> Arc<TtlCache> {
        self.registry.get_or_create("barang", None).await
    }

    async fn item_detail_cache(&self) -> Arc<TtlCache> {
        self.registry.get_or_create("barang:detail", None).await
    }

    /// Submits a loan request.
    ///
    /// Quantities default to 1. The repository validates stock and the
    /// duplicate-active rule atomically with the reservation; any failing
    /// line rejects the whole request and leaves stock untouched.
    #[instrument(skip(self, request), fields(borrower_id = %request.borrower_id))]
    pub async fn submit(
        &self,
        request: LoanRequest,
    ) -> Result<(LoanHeader, Vec<LoanLine>), ServiceError> {
        let borrower = self
            .users
            .get(request.borrower_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("account", request.borrower_id))?;
        if !borrower.identity().can_borrow() {
            return Err(ServiceError::Forbidden(
                "account is inactive or blocked".to_string(),
            ));
        }

        if request.lines.is_empty() {
            return Err(ServiceError::Validation(
                "loan request needs at least one item".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for line in &request.lines {
            if !seen.insert(line.item_id) {
                return Err(ServiceError::Validation(format!(
                    "item {} listed more than once",
                    line.item_id
                )));
            }
            if line.normalized_quantity() < 1 {
                return Err(ServiceError::Validation(
                    "quantity must be at least 1".to_string(),
                ));
            }
        }

        let submission = LoanSubmission {
            borrower_id: request.borrower_id,
            request_date: request.request_date,
            return_date: request.return_date,
            purpose: request.purpose,
            lines: request
                .lines
                .iter()
                .map(|line| (line.item_id, line.normalized_quantity()))
                .collect(),
        };

        let outcome = self.loans.submit(&submission, self.clock.now()).await?;
        let (header, lines) = match outcome {
            LoanSubmitOutcome::Created { header, lines } => (header, lines),
            LoanSubmitOutcome::ItemNotFound(item_id) => {
                return Err(ServiceError::not_found("item", item_id))
            }
            LoanSubmitOutcome::InsufficientStock {
                item_id,
                requested,
                available,
            } => {
                return Err(ServiceError::Conflict(format!(
                    "item {item_id} has {available} left, {requested} requested"
                )))
            }
            LoanSubmitOutcome::DuplicateActiveLoan { item_id } => {
                return Err(ServiceError::Conflict(format!(
                    "item {item_id} already has an active loan for this account"
                )))
            }
        };

        self.invalidate_after_stock_change().await;
        self.prewarm_items();
        Ok((header, lines))
    }

    /// Approves or rejects a single submitted line.
    #[instrument(skip(self))]
    pub async fn decide_line(
        &self,
        line_id: Uuid,
        decision: LineDecision,
        approver_id: Uuid,
    ) -> Result<(LoanHeader, LoanLine), ServiceError> {
        let approver = self
            .users
            .get(approver_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("account", approver_id))?;
        if !approver.identity().can_approve() {
            return Err(ServiceError::Forbidden(
                "account cannot verify loans".to_string(),
            ));
        }

        let outcome = self
            .loans
            .resolve_line(line_id, decision, approver_id, self.clock.now())
            .await?;
        let result = self.map_line_outcome(outcome)?;
        self.invalidate_after_stock_change().await;
        Ok(result)
    }

    /// Marks an approved line as returned; its stock goes back on the
    /// shelf.
    #[instrument(skip(self))]
    pub async fn return_line(
        &self,
        line_id: Uuid,
    ) -> Result<(LoanHeader, LoanLine), ServiceError> {
        let outcome = self.loans.return_line(line_id, self.clock.now()).await?;
        let result = self.map_line_outcome(outcome)?;
        self.invalidate_after_stock_change().await;
        Ok(result)
    }

    /// Gets a loan with its lines.
    pub async fn get(&self, id: Uuid) -> Result<(LoanHeader, Vec<LoanLine>), ServiceError> {
        self.loans
            .get_header(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("loan", id))
    }

    /// A borrower's loan history, cached per page.
    pub async fn history(
        &self,
        borrower_id: Uuid,
        pagination: Pagination,
    ) -> Result<PaginatedResult<LoanHeader>, ServiceError> {
        let key = cache_key(
            "peminjaman:history",
            Some(&json!({ "borrower": borrower_id, "page": pagination.page, "per_page": pagination.per_page })),
        );
        let loans = self.loans.clone();
        let pg = pagination.clone();
        let producer_key = key.clone();
        let bytes = self
            .loan_cache()
            .await
            .get_or_set(&key, None, || async move {
                let rows = loans
                    .list_for_borrower(borrower_id, &pg)
                    .await
                    .map_err(|e| CacheError::producer(&producer_key, e))?;
                serde_json::to_vec(&rows).map_err(CacheError::from)
            })
            .await?;
        let rows: Vec<LoanHeader> =
            serde_json::from_slice(&bytes).map_err(CacheError::from)?;
        let total = self.loans.count_for_borrower(borrower_id).await?;
        Ok(PaginatedResult::new(rows, total, &pagination))
    }

    /// A single item with its derived availability, cached longer than
    /// the listings.
    pub async fn item_detail(&self, item_id: Uuid) -> Result<Item, ServiceError> {
        let key = cache_key("barang:detail", Some(&json!({ "id": item_id })));
        let items = self.items.clone();
        let producer_key = key.clone();
        let bytes = self
            .item_detail_cache()
            .await
            .get_or_set(&key, None, || async move {
                let item = items
                    .get(item_id)
                    .await
                    .map_err(|e| CacheError::producer(&producer_key, e))?;
                serde_json::to_vec(&item).map_err(CacheError::from)
            })
            .await?;
        let item: Option<Item> = serde_json::from_slice(&bytes).map_err(CacheError::from)?;
        item.filter(|item| !item.is_deleted())
            .ok_or_else(|| ServiceError::not_found("item", item_id))
    }

    /// The item listing, cached per page.
    pub async fn list_items(
        &self,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Item>, ServiceError> {
        let key = cache_key(
            "barang:list",
            Some(&json!({ "page": pagination.page, "per_page": pagination.per_page })),
        );
        let items = self.items.clone();
        let pg = pagination.clone();
        let producer_key = key.clone();
        let bytes = self
            .item_cache()
            .await
            .get_or_set(&key, None, || async move {
                let rows = items
                    .list(&pg)
                    .await
                    .map_err(|e| CacheError::producer(&producer_key, e))?;
                serde_json::to_vec(&rows).map_err(CacheError::from)
            })
            .await?;
        let rows: Vec<Item> = serde_json::from_slice(&bytes).map_err(CacheError::from)?;
        let total = self.items.count().await?;
        Ok(PaginatedResult::new(rows, total, &pagination))
    }

    fn map_line_outcome(
        &self,
        outcome: LineUpdateOutcome,
    ) -> Result<(LoanHeader, LoanLine), ServiceError> {
        match outcome {
            LineUpdateOutcome::Updated { header, line } => Ok((header, line)),
            LineUpdateOutcome::LineNotFound(line_id) => {
                Err(ServiceError::not_found("loan_line", line_id))
            }
            LineUpdateOutcome::InvalidState { line_id, status } => Err(ServiceError::Conflict(
                format!("loan line {line_id} is already {status}"),
            )),
        }
    }

    /// Stock changed, so every cached item view and loan listing is
    /// stale.
    async fn invalidate_after_stock_change(&self) {
        let removed = self.item_cache().await.clear_pattern("barang").await
            + self.item_detail_cache().await.clear_pattern("barang").await
            + self.loan_cache().await.clear_pattern("peminjaman").await;
        debug!(removed, "invalidated item and loan caches");
    }

    /// Repopulates the first item-listing page in the background.
    /// Failures only log; the next reader would repopulate anyway.
    fn prewarm_items(&self) {
        let items = self.items.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let pg = Pagination::default();
            let key = cache_key(
                "barang:list",
                Some(&json!({ "page": pg.page, "per_page": pg.per_page })),
            );
            let rows = match items.list(&pg).await {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(error = %err, "item cache prewarm failed");
                    return;
                }
            };
            match serde_json::to_vec(&rows) {
                Ok(bytes) => {
                    let cache = registry.get_or_create("barang", None).await;
                    cache.set(&key, bytes, None).await;
                }
                Err(err) => warn!(error = %err, "item cache prewarm failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::db::mocks::MockStore;
    use crate::identity::{Account, Role};
    use crate::models::{Availability, LoanLineStatus, LoanStatus};
    use chrono::{Duration, Utc};

    struct Fixture {
        store: Arc<MockStore>,
        service: LoanService<MockStore, MockStore, MockStore>,
        borrower: Account,
        approver: Account,
        date: NaiveDate,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::at_system_time());
        let now = clock.now();
        let store = Arc::new(MockStore::new());
        let registry = Arc::new(CacheRegistry::new(clock.clone()));

        let borrower = Account::new("Borrower", Role::Borrower, now);
        store.insert_account(borrower.clone()).await;
        let approver = Account::new("Approver", Role::Approver, now);
        store.insert_account(approver.clone()).await;

        let service = LoanService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            registry,
            clock.clone(),
        );
        let date = (now + Duration::days(1)).date_naive();
        Fixture {
            store,
            service,
            borrower,
            approver,
            date,
        }
    }

    async fn seed_item(fx: &Fixture, name: &str, code: &str, stock: i64) -> Item {
        let item = Item::new(name, code, stock, Utc::now());
        fx.store.insert_item(item.clone()).await;
        item
    }

    fn request(fx: &Fixture, lines: Vec<LoanRequestLine>) -> LoanRequest {
        LoanRequest {
            borrower_id: fx.borrower.id,
            request_date: fx.date,
            return_date: None,
            purpose: Some("praktikum".to_string()),
            lines,
        }
    }

    fn line(item_id: Uuid, quantity: Option<i64>) -> LoanRequestLine {
        LoanRequestLine { item_id, quantity }
    }

    #[tokio::test]
    async fn test_submit_reserves_stock() {
        let fx = fixture().await;
        let item = seed_item(&fx, "Proyektor", "PRJ-1", 5).await;

        let (header, lines) = fx
            .service
            .submit(request(&fx, vec![line(item.id, Some(2))]))
            .await
            .unwrap();
        assert_eq!(header.status, LoanStatus::Submitted);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);

        let stored = fx.store.item_snapshot(item.id).await.unwrap();
        assert_eq!(stored.total_quantity, 3);
    }

    #[tokio::test]
    async fn test_quantity_defaults_to_one() {
        let fx = fixture().await;
        let item = seed_item(&fx, "Kabel HDMI", "HDMI-1", 4).await;

        let (_, lines) = fx
            .service
            .submit(request(&fx, vec![line(item.id, None)]))
            .await
            .unwrap();
        assert_eq!(lines[0].quantity, 1);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rejects_whole_request() {
        let fx = fixture().await;
        let plenty = seed_item(&fx, "Proyektor", "PRJ-1", 5).await;
        let scarce = seed_item(&fx, "Mixer", "MIX-1", 1).await;

        let err = fx
            .service
            .submit(request(
                &fx,
                vec![line(plenty.id, Some(2)), line(scarce.id, Some(3))],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // No line reserved anything.
        let stored = fx.store.item_snapshot(plenty.id).await.unwrap();
        assert_eq!(stored.total_quantity, 5);
    }

    #[tokio::test]
    async fn test_duplicate_active_loan_rejected() {
        let fx = fixture().await;
        let item = seed_item(&fx, "Proyektor", "PRJ-1", 5).await;

        fx.service
            .submit(request(&fx, vec![line(item.id, Some(1))]))
            .await
            .unwrap();
        let err = fx
            .service
            .submit(request(&fx, vec![line(item.id, Some(1))]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rejecting_line_restores_stock_and_derives_header() {
        let fx = fixture().await;
        let first = seed_item(&fx, "Proyektor", "PRJ-1", 5).await;
        let second = seed_item(&fx, "Mixer", "MIX-1", 2).await;

        let (_, lines) = fx
            .service
            .submit(request(
                &fx,
                vec![line(first.id, Some(2)), line(second.id, Some(1))],
            ))
            .await
            .unwrap();

        let approved_line = lines.iter().find(|l| l.item_id == first.id).unwrap();
        let rejected_line = lines.iter().find(|l| l.item_id == second.id).unwrap();

        fx.service
            .decide_line(approved_line.id, LineDecision::Approve, fx.approver.id)
            .await
            .unwrap();
        let (header, rejected) = fx
            .service
            .decide_line(rejected_line.id, LineDecision::Reject, fx.approver.id)
            .await
            .unwrap();

        assert_eq!(rejected.status, LoanLineStatus::Rejected);
        assert_eq!(header.status, LoanStatus::PartiallyApproved);
        assert_eq!(header.decided_by, Some(fx.approver.id));

        let stored = fx.store.item_snapshot(second.id).await.unwrap();
        assert_eq!(stored.total_quantity, 2);
    }

    #[tokio::test]
    async fn test_line_resolves_once() {
        let fx = fixture().await;
        let item = seed_item(&fx, "Proyektor", "PRJ-1", 5).await;
        let (_, lines) = fx
            .service
            .submit(request(&fx, vec![line(item.id, Some(1))]))
            .await
            .unwrap();

        fx.service
            .decide_line(lines[0].id, LineDecision::Approve, fx.approver.id)
            .await
            .unwrap();
        let err = fx
            .service
            .decide_line(lines[0].id, LineDecision::Reject, fx.approver.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_return_restores_stock_and_completes_header() {
        let fx = fixture().await;
        let item = seed_item(&fx, "Proyektor", "PRJ-1", 5).await;
        let (_, lines) = fx
            .service
            .submit(request(&fx, vec![line(item.id, Some(3))]))
            .await
            .unwrap();
        fx.service
            .decide_line(lines[0].id, LineDecision::Approve, fx.approver.id)
            .await
            .unwrap();

        let (header, returned) = fx.service.return_line(lines[0].id).await.unwrap();
        assert_eq!(returned.status, LoanLineStatus::Returned);
        assert_eq!(header.status, LoanStatus::Completed);

        let stored = fx.store.item_snapshot(item.id).await.unwrap();
        assert_eq!(stored.total_quantity, 5);
    }

    #[tokio::test]
    async fn test_item_detail_reflects_derived_availability() {
        let fx = fixture().await;
        let item = seed_item(&fx, "Mixer", "MIX-1", 1).await;

        let detail = fx.service.item_detail(item.id).await.unwrap();
        assert_eq!(detail.availability(), Availability::Available);

        fx.service
            .submit(request(&fx, vec![line(item.id, Some(1))]))
            .await
            .unwrap();

        // Submission invalidated the detail cache, so the next read sees
        // the reserved stock.
        let detail = fx.service.item_detail(item.id).await.unwrap();
        assert_eq!(detail.availability(), Availability::Unavailable);
    }

    #[tokio::test]
    async fn test_empty_request_is_validation_error() {
        let fx = fixture().await;
        let err = fx.service.submit(request(&fx, vec![])).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_repeated_item_in_request_is_validation_error() {
        let fx = fixture().await;
        let item = seed_item(&fx, "Proyektor", "PRJ-1", 5).await;
        let err = fx
            .service
            .submit(request(
                &fx,
                vec![line(item.id, Some(1)), line(item.id, Some(1))],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_blocked_borrower_cannot_submit() {
        let fx = fixture().await;
        let item = seed_item(&fx, "Proyektor", "PRJ-1", 5).await;

        let mut blocked = Account::new("Blocked", Role::Borrower, Utc::now());
        blocked.blocked = true;
        fx.store.insert_account(blocked.clone()).await;

        let mut req = request(&fx, vec![line(item.id, Some(1))]);
        req.borrower_id = blocked.id;
        let err = fx.service.submit(req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_history_pages_through_loans() {
        let fx = fixture().await;
        let a = seed_item(&fx, "Proyektor", "PRJ-1", 5).await;
        let b = seed_item(&fx, "Mixer", "MIX-1", 5).await;

        fx.service
            .submit(request(&fx, vec![line(a.id, Some(1))]))
            .await
            .unwrap();
        fx.service
            .submit(request(&fx, vec![line(b.id, Some(1))]))
            .await
            .unwrap();

        let page = fx
            .service
            .history(fx.borrower.id, Pagination::new(1, 1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.total, 2);
        assert!(page.has_next_page());
    }
}
