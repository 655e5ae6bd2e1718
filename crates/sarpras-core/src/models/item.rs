//! Equipment item data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived availability of an item.
///
/// Always computed from the current stock level, never stored or set
/// independently: `Available` iff `total_quantity > 0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable,
}

impl Availability {
    /// Computes availability from a stock level.
    pub fn from_stock(total_quantity: i64) -> Self {
        if total_quantity > 0 {
            Availability::Available
        } else {
            Availability::Unavailable
        }
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Available => write!(f, "Available"),
            Availability::Unavailable => write!(f, "Unavailable"),
        }
    }
}

/// A borrowable equipment item with finite stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier.
    pub id: Uuid,
    /// Item name.
    pub name: String,
    /// Short item code (unique).
    pub code: String,
    /// Units currently in stock (never negative).
    pub total_quantity: i64,
    /// Soft-delete marker; deleted items cannot be borrowed.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Creates a new item with the given stock.
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        total_quantity: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            code: code.into(),
            total_quantity,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the derived availability for the current stock.
    pub fn availability(&self) -> Availability {
        Availability::from_stock(self.total_quantity)
    }

    /// Returns true if this item has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_is_derived_from_stock() {
        let mut item = Item::new("Proyektor", "PRJ-01", 2, Utc::now());
        assert_eq!(item.availability(), Availability::Available);

        item.total_quantity = 0;
        assert_eq!(item.availability(), Availability::Unavailable);

        item.total_quantity = 1;
        assert_eq!(item.availability(), Availability::Available);
    }

    #[test]
    fn test_soft_delete_marker() {
        let mut item = Item::new("Kabel HDMI", "HDMI-03", 5, Utc::now());
        assert!(!item.is_deleted());
        item.deleted_at = Some(Utc::now());
        assert!(item.is_deleted());
    }
}
