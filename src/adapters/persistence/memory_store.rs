//! In-memory `LedgerStore`. Used by tests and embedders without a database.
//!
//! Version checks and idempotency lookups run under one write lock, so the
//! semantics match the SQLite adapter's transactions.

use crate::domain::{DomainError, Expense, ExpenseId, ExpenseSet, Group, GroupId};
use crate::ports::{LedgerStore, StoredExpense};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug)]
struct GroupState {
    group: Group,
    expenses: Vec<Expense>,
    version: u64,
}

impl GroupState {
    fn check_version(&self, expected: Option<u64>) -> Result<(), DomainError> {
        match expected {
            Some(expected) if expected != self.version => Err(DomainError::StaleSnapshot {
                expected,
                actual: self.version,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: RwLock<HashMap<GroupId, GroupState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a group's membership. Keeps its records and version.
    pub async fn save_group(&self, group: Group) {
        let mut groups = self.groups.write().await;
        match groups.get_mut(&group.id) {
            Some(state) => state.group = group,
            None => {
                groups.insert(
                    group.id.clone(),
                    GroupState {
                        group,
                        expenses: Vec::new(),
                        version: 0,
                    },
                );
            }
        }
    }

    fn missing(group_id: &GroupId) -> DomainError {
        DomainError::NotFound(format!("group {group_id}"))
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryStore {
    async fn fetch_group(&self, group_id: &GroupId) -> Result<Group, DomainError> {
        let groups = self.groups.read().await;
        groups
            .get(group_id)
            .map(|state| state.group.clone())
            .ok_or_else(|| Self::missing(group_id))
    }

    async fn fetch_expenses(&self, group_id: &GroupId) -> Result<ExpenseSet, DomainError> {
        let groups = self.groups.read().await;
        let state = groups.get(group_id).ok_or_else(|| Self::missing(group_id))?;
        Ok(ExpenseSet {
            expenses: state.expenses.clone(),
            version: state.version,
        })
    }

    async fn insert_expense(
        &self,
        expense: &Expense,
        expected_version: Option<u64>,
    ) -> Result<StoredExpense, DomainError> {
        expense.validate()?;
        let mut groups = self.groups.write().await;
        let state = groups
            .get_mut(&expense.group_id)
            .ok_or_else(|| Self::missing(&expense.group_id))?;

        if let Some(key) = &expense.idempotency_key {
            let existing = state
                .expenses
                .iter()
                .find(|e| e.idempotency_key.as_ref() == Some(key));
            if let Some(existing) = existing {
                return Ok(StoredExpense {
                    expense: existing.clone(),
                    version: state.version,
                    created: false,
                });
            }
        }

        state.check_version(expected_version)?;
        if state.expenses.iter().any(|e| e.id == expense.id) {
            return Err(DomainError::Persistence(format!(
                "expense {} already exists",
                expense.id
            )));
        }
        state.expenses.push(expense.clone());
        state.version += 1;
        Ok(StoredExpense {
            expense: expense.clone(),
            version: state.version,
            created: true,
        })
    }

    async fn replace_expense(
        &self,
        expense: &Expense,
        expected_version: Option<u64>,
    ) -> Result<u64, DomainError> {
        expense.validate()?;
        let mut groups = self.groups.write().await;
        let state = groups
            .get_mut(&expense.group_id)
            .ok_or_else(|| Self::missing(&expense.group_id))?;

        state.check_version(expected_version)?;
        let slot = state
            .expenses
            .iter_mut()
            .find(|e| e.id == expense.id)
            .ok_or_else(|| DomainError::NotFound(format!("expense {}", expense.id)))?;
        *slot = expense.clone();
        state.version += 1;
        Ok(state.version)
    }

    async fn delete_expense(
        &self,
        group_id: &GroupId,
        expense_id: ExpenseId,
        expected_version: Option<u64>,
    ) -> Result<u64, DomainError> {
        let mut groups = self.groups.write().await;
        let state = groups
            .get_mut(group_id)
            .ok_or_else(|| Self::missing(group_id))?;

        state.check_version(expected_version)?;
        let before = state.expenses.len();
        state.expenses.retain(|e| e.id != expense_id);
        if state.expenses.len() == before {
            return Err(DomainError::NotFound(format!("expense {expense_id}")));
        }
        state.version += 1;
        Ok(state.version)
    }
}
