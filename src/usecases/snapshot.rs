//! Read side shared by the use cases: group + expense records + folded
//! balances, all at one store version.

use crate::domain::{Balances, DomainError, Expense, ExpenseId, Group, GroupId, MemberId, fold_group};
use crate::ports::LedgerStore;
use serde::Serialize;

pub(crate) struct GroupSnapshot {
    pub group: Group,
    pub expenses: Vec<Expense>,
    pub version: u64,
    pub balances: Balances,
}

impl GroupSnapshot {
    pub async fn load(store: &dyn LedgerStore, group_id: &GroupId) -> Result<Self, DomainError> {
        let group = store.fetch_group(group_id).await?;
        let set = store.fetch_expenses(group_id).await?;
        let balances = fold_group(&group, &set.expenses);
        Ok(Self {
            group,
            expenses: set.expenses,
            version: set.version,
            balances,
        })
    }

    /// Current member, or someone the group's history still refers to.
    pub fn is_addressable(&self, member: &MemberId) -> bool {
        self.group.is_member(member) || self.balances.contains(member)
    }

    pub fn find(&self, expense_id: ExpenseId) -> Result<&Expense, DomainError> {
        self.expenses
            .iter()
            .find(|e| e.id == expense_id)
            .ok_or_else(|| {
                DomainError::NotFound(format!(
                    "expense {expense_id} in group {}",
                    self.group.id
                ))
            })
    }

    /// Version to send with a write: the caller's, or the one just read.
    ///
    /// A caller-supplied version is not compared here; the store does it after
    /// its idempotency lookup so retries of an applied write still succeed.
    pub fn expected(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or(self.version)
    }

    /// Balances after `writes` writes that ended at `new_version`.
    ///
    /// When the writes landed directly on this snapshot the fold is done
    /// locally (snapshot plus change); otherwise the group is read again.
    pub async fn balances_after<'a, I>(
        &'a self,
        store: &dyn LedgerStore,
        (writes, new_version): (u64, u64),
        extra: I,
        without: Option<ExpenseId>,
    ) -> Result<Balances, DomainError>
    where
        I: IntoIterator<Item = &'a Expense>,
    {
        if new_version == self.version + writes {
            let kept = self.expenses.iter().filter(|e| Some(e.id) != without);
            return Ok(fold_group(&self.group, kept.chain(extra)));
        }
        let fresh = Self::load(store, &self.group.id).await?;
        Ok(fresh.balances)
    }
}

/// Balances and the store version they were folded at.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerView {
    pub balances: Balances,
    pub version: u64,
}
