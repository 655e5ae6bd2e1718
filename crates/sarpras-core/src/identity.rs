//! Authenticated identity context.
//!
//! The HTTP layer resolves authentication and hands the core a trusted
//! [`Identity`] per request. The core never re-authenticates; it only
//! enforces role and account-status gates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular user who can borrow rooms and equipment.
    Borrower,
    /// Staff member who verifies loan and booking requests.
    Approver,
    /// Full administrative access.
    Admin,
}

impl Role {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Role::Borrower => "borrower",
            Role::Approver => "approver",
            Role::Admin => "admin",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "borrower" => Some(Role::Borrower),
            "approver" => Some(Role::Approver),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Borrower => write!(f, "Borrower"),
            Role::Approver => write!(f, "Approver"),
            Role::Admin => write!(f, "Admin"),
        }
    }
}

/// Per-request identity context, already authenticated upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Unique identifier of the account.
    pub id: Uuid,
    /// Display name.
    pub display_name: String,
    /// User role.
    pub role: Role,
    /// Whether the account is enabled.
    pub active: bool,
    /// Whether the account is blocked (e.g. from repeated cancellations).
    pub blocked: bool,
}

impl Identity {
    /// Returns true if this identity may submit loan or booking requests.
    pub fn can_borrow(&self) -> bool {
        self.active && !self.blocked
    }

    /// Returns true if this identity may verify requests.
    pub fn can_approve(&self) -> bool {
        self.active && matches!(self.role, Role::Approver | Role::Admin)
    }
}

/// A persisted user account with its standing flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: Uuid,
    /// Display name.
    pub display_name: String,
    /// User role.
    pub role: Role,
    /// Whether the account is enabled.
    pub active: bool,
    /// Whether the account is blocked.
    pub blocked: bool,
    /// Warnings accumulated from cancelled requests.
    pub warning_count: i64,
    /// Account creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new active, unblocked account.
    pub fn new(display_name: impl Into<String>, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            role,
            active: true,
            blocked: false,
            warning_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the trusted identity view of this account.
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            display_name: self.display_name.clone(),
            role: self.role,
            active: self.active,
            blocked: self.blocked,
        }
    }
}
