//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{DomainError, Expense, ExpenseId, ExpenseSet, Group, GroupId, Notification};

/// Result of an insert. `created` is false when the idempotency key already
/// existed and the stored record was returned instead.
#[derive(Debug, Clone)]
pub struct StoredExpense {
    pub expense: Expense,
    pub version: u64,
    pub created: bool,
}

/// Ledger persistence. Every write bumps the group version by one.
///
/// Writes take `expected_version`: `Some(v)` fails with
/// `DomainError::StaleSnapshot` (and writes nothing) unless the group is still
/// at `v`; `None` skips the check.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Group with its current members and owner.
    async fn fetch_group(&self, group_id: &GroupId) -> Result<Group, DomainError>;

    /// All expense records of the group (settlements included) and the
    /// version they were read at.
    async fn fetch_expenses(&self, group_id: &GroupId) -> Result<ExpenseSet, DomainError>;

    /// Insert a record. An existing idempotency key in the same group wins
    /// over the version check and is returned as-is.
    async fn insert_expense(
        &self,
        expense: &Expense,
        expected_version: Option<u64>,
    ) -> Result<StoredExpense, DomainError>;

    /// Replace an existing record (same id). Returns the new version.
    async fn replace_expense(
        &self,
        expense: &Expense,
        expected_version: Option<u64>,
    ) -> Result<u64, DomainError>;

    /// Remove a record. Returns the new version.
    async fn delete_expense(
        &self,
        group_id: &GroupId,
        expense_id: ExpenseId,
        expected_version: Option<u64>,
    ) -> Result<u64, DomainError>;
}

/// Notification sink. Fire-and-forget from the caller's point of view:
/// errors are logged by the use cases, never propagated.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create_notifications(&self, notifications: &[Notification])
    -> Result<(), DomainError>;
}
