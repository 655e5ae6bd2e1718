//! Equipment loan data models.
//!
//! A loan is a header plus one line per borrowed item. Lines are verified
//! individually; the header status is always derived from the aggregate of
//! its lines, never set directly.

use super::InvalidTransition;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a single loan line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoanLineStatus {
    /// Submitted, awaiting verification.
    Submitted,
    /// Approved by a verifier.
    Approved,
    /// Rejected by a verifier; the reserved stock was restored.
    Rejected,
    /// Returned by the borrower; the stock was restored.
    Returned,
}

impl LoanLineStatus {
    /// Stable string used in the database.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LoanLineStatus::Submitted => "submitted",
            LoanLineStatus::Approved => "approved",
            LoanLineStatus::Rejected => "rejected",
            LoanLineStatus::Returned => "returned",
        }
    }

    /// Parses the database representation.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(LoanLineStatus::Submitted),
            "approved" => Some(LoanLineStatus::Approved),
            "rejected" => Some(LoanLineStatus::Rejected),
            "returned" => Some(LoanLineStatus::Returned),
            _ => None,
        }
    }

    /// Returns true once a verifier has resolved this line.
    ///
    /// A resolved line cannot be re-verified.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, LoanLineStatus::Submitted)
    }

    /// Returns true while the line holds reserved stock.
    pub fn is_active(&self) -> bool {
        matches!(self, LoanLineStatus::Submitted | LoanLineStatus::Approved)
    }

    /// Validates a lifecycle transition.
    ///
    /// Verification moves `Submitted` to `Approved` or `Rejected` exactly
    /// once; the borrower's return moves `Approved` to `Returned`.
    pub fn can_transition_to(&self, next: LoanLineStatus) -> bool {
        use LoanLineStatus::*;
        matches!(
            (self, next),
            (Submitted, Approved) | (Submitted, Rejected) | (Approved, Returned)
        )
    }

    /// Validates a transition, returning a typed error on violation.
    pub fn transition_to(&self, next: LoanLineStatus) -> Result<LoanLineStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition::new(self, next))
        }
    }
}

impl std::fmt::Display for LoanLineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanLineStatus::Submitted => write!(f, "Submitted"),
            LoanLineStatus::Approved => write!(f, "Approved"),
            LoanLineStatus::Rejected => write!(f, "Rejected"),
            LoanLineStatus::Returned => write!(f, "Returned"),
        }
    }
}

/// Status of a loan header, derived from its lines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// All lines awaiting verification.
    Submitted,
    /// At least one line approved, none rejected.
    Approved,
    /// At least one line rejected, none approved.
    Rejected,
    /// Lines resolved both ways.
    PartiallyApproved,
    /// Every approved line has been returned.
    Completed,
}

impl LoanStatus {
    /// Stable string used in the database.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LoanStatus::Submitted => "submitted",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::PartiallyApproved => "partially_approved",
            LoanStatus::Completed => "completed",
        }
    }

    /// Parses the database representation.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(LoanStatus::Submitted),
            "approved" => Some(LoanStatus::Approved),
            "rejected" => Some(LoanStatus::Rejected),
            "partially_approved" => Some(LoanStatus::PartiallyApproved),
            "completed" => Some(LoanStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanStatus::Submitted => write!(f, "Submitted"),
            LoanStatus::Approved => write!(f, "Approved"),
            LoanStatus::Rejected => write!(f, "Rejected"),
            LoanStatus::PartiallyApproved => write!(f, "Partially Approved"),
            LoanStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// Derives the header status from its line statuses.
///
/// Returned lines count as approvals for the partial/approved split; a loan
/// where every line is returned or rejected, with at least one return, is
/// `Completed`.
pub fn derive_header_status(lines: &[LoanLineStatus]) -> LoanStatus {
    let any_returned = lines.iter().any(|s| matches!(s, LoanLineStatus::Returned));
    let all_finished = lines
        .iter()
        .all(|s| matches!(s, LoanLineStatus::Returned | LoanLineStatus::Rejected));
    if !lines.is_empty() && any_returned && all_finished {
        return LoanStatus::Completed;
    }

    let any_approved = lines
        .iter()
        .any(|s| matches!(s, LoanLineStatus::Approved | LoanLineStatus::Returned));
    let any_rejected = lines.iter().any(|s| matches!(s, LoanLineStatus::Rejected));

    match (any_approved, any_rejected) {
        (true, true) => LoanStatus::PartiallyApproved,
        (true, false) => LoanStatus::Approved,
        (false, true) => LoanStatus::Rejected,
        (false, false) => LoanStatus::Submitted,
    }
}

/// Verifier decision on a single loan line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LineDecision {
    Approve,
    Reject,
}

impl LineDecision {
    /// Status a `Submitted` line moves to under this decision.
    pub fn target_status(&self) -> LoanLineStatus {
        match self {
            LineDecision::Approve => LoanLineStatus::Approved,
            LineDecision::Reject => LoanLineStatus::Rejected,
        }
    }
}

/// A loan header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanHeader {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable loan code (unique).
    pub code: String,
    /// Who is borrowing.
    pub borrower_id: Uuid,
    /// Date the loan starts.
    pub request_date: NaiveDate,
    /// Planned return date, if stated.
    pub return_date: Option<NaiveDate>,
    /// What the equipment is for.
    pub purpose: Option<String>,
    /// Derived status, recomputed whenever a line resolves.
    pub status: LoanStatus,
    /// Verifier identity, stamped alongside line decisions.
    pub decided_by: Option<Uuid>,
    /// When the last verification decision was made.
    pub decided_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl LoanHeader {
    /// Creates a new header in `Submitted` status with a generated code.
    pub fn submitted(
        borrower_id: Uuid,
        request_date: NaiveDate,
        return_date: Option<NaiveDate>,
        purpose: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            code: loan_code(request_date, id),
            borrower_id,
            request_date,
            return_date,
            purpose,
            status: LoanStatus::Submitted,
            decided_by: None,
            decided_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single borrowed-item line under a loan header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanLine {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning loan header.
    pub header_id: Uuid,
    /// Borrowed item.
    pub item_id: Uuid,
    /// Units borrowed (at least 1).
    pub quantity: i64,
    /// Line status.
    pub status: LoanLineStatus,
    /// Verifier identity, stamped on resolution.
    pub decided_by: Option<Uuid>,
    /// When the decision was made.
    pub decided_at: Option<DateTime<Utc>>,
}

impl LoanLine {
    /// Creates a new line in `Submitted` status.
    pub fn submitted(header_id: Uuid, item_id: Uuid, quantity: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            header_id,
            item_id,
            quantity,
            status: LoanLineStatus::Submitted,
            decided_by: None,
            decided_at: None,
        }
    }
}

/// One requested item line as it arrives from the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRequestLine {
    /// Item to borrow.
    pub item_id: Uuid,
    /// Requested units; omitted means 1.
    pub quantity: Option<i64>,
}

impl LoanRequestLine {
    /// Normalizes the requested quantity (default 1).
    pub fn normalized_quantity(&self) -> i64 {
        self.quantity.unwrap_or(1)
    }
}

/// A validated loan submission handed to the repository.
#[derive(Debug, Clone)]
pub struct LoanSubmission {
    pub borrower_id: Uuid,
    pub request_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub purpose: Option<String>,
    /// Normalized `(item_id, quantity)` pairs, quantity >= 1.
    pub lines: Vec<(Uuid, i64)>,
}

/// Generates a human-readable loan code from the request date and id.
fn loan_code(date: NaiveDate, id: Uuid) -> String {
    let short = id.simple().to_string()[..8].to_uppercase();
    format!("PJM-{}-{}", date.format("%Y%m%d"), short)
}
