//! Expense recording: create, re-split, delete, read the ledger.
//!
//! Every mutation returns the refolded balances and the new group version.

use crate::domain::{
    Balances, DomainError, Expense, ExpenseId, ForeignAmount, Group, GroupId, MemberId, Money,
    Notification, NotificationKind, SplitRule, resolve,
};
use crate::ports::{LedgerStore, NotificationSink};
use crate::usecases::fanout::deliver;
use crate::usecases::snapshot::{GroupSnapshot, LedgerView};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Amount as entered: in the group's home currency, or in a foreign
/// currency together with the rate snapshot supplied by the caller.
#[derive(Debug, Clone)]
pub enum DraftAmount {
    Home(Money),
    Foreign(ForeignAmount),
}

/// Expense input for create and update.
#[derive(Debug, Clone)]
pub struct ExpenseDraft {
    pub payer: MemberId,
    pub amount: DraftAmount,
    pub rule: SplitRule,
    pub category: String,
    pub description: String,
    pub idempotency_key: Option<String>,
    pub expected_version: Option<u64>,
}

impl ExpenseDraft {
    pub fn new(payer: impl Into<MemberId>, total: Money, rule: SplitRule) -> Self {
        Self::with_amount(payer.into(), DraftAmount::Home(total), rule)
    }

    pub fn foreign(payer: impl Into<MemberId>, amount: ForeignAmount, rule: SplitRule) -> Self {
        Self::with_amount(payer.into(), DraftAmount::Foreign(amount), rule)
    }

    fn with_amount(payer: MemberId, amount: DraftAmount, rule: SplitRule) -> Self {
        Self {
            payer,
            amount,
            rule,
            category: "general".to_string(),
            description: String::new(),
            idempotency_key: None,
            expected_version: None,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Stored expense plus the refolded ledger.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerUpdate {
    pub expense: Expense,
    pub balances: Balances,
    pub version: u64,
    pub created: bool,
}

pub struct ExpenseService {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl ExpenseService {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    pub async fn ledger(&self, group_id: &GroupId) -> Result<LedgerView, DomainError> {
        let snapshot = GroupSnapshot::load(&*self.store, group_id).await?;
        Ok(LedgerView {
            balances: snapshot.balances,
            version: snapshot.version,
        })
    }

    pub async fn create_expense(
        &self,
        group_id: &GroupId,
        draft: ExpenseDraft,
        acting_user: &MemberId,
    ) -> Result<LedgerUpdate, DomainError> {
        let snapshot = GroupSnapshot::load(&*self.store, group_id).await?;
        ensure_member(&snapshot.group, acting_user)?;

        let expected = snapshot.expected(draft.expected_version);
        let expense = build_expense(&snapshot.group, ExpenseId::new(), draft, acting_user)?;

        let stored = self.store.insert_expense(&expense, Some(expected)).await?;
        if !stored.created {
            info!(group_id = %group_id, expense_id = %stored.expense.id, "Expense already recorded for idempotency key");
            let fresh = GroupSnapshot::load(&*self.store, group_id).await?;
            return Ok(LedgerUpdate {
                expense: stored.expense,
                balances: fresh.balances,
                version: fresh.version,
                created: false,
            });
        }

        info!(
            group_id = %group_id,
            expense_id = %stored.expense.id,
            payer = %stored.expense.payer_id,
            total = %stored.expense.total,
            mode = stored.expense.split_mode.as_str(),
            version = stored.version,
            "Expense recorded"
        );

        let balances = snapshot
            .balances_after(&*self.store, (1, stored.version), [&stored.expense], None)
            .await?;
        deliver(
            &*self.notifier,
            group_id,
            expense_notifications(&snapshot.group, &stored.expense, acting_user),
        )
        .await;

        Ok(LedgerUpdate {
            expense: stored.expense,
            balances,
            version: stored.version,
            created: true,
        })
    }

    /// Re-split an ordinary expense. Settlements are immutable records.
    pub async fn update_expense(
        &self,
        group_id: &GroupId,
        expense_id: ExpenseId,
        draft: ExpenseDraft,
        acting_user: &MemberId,
    ) -> Result<LedgerUpdate, DomainError> {
        let snapshot = GroupSnapshot::load(&*self.store, group_id).await?;
        ensure_member(&snapshot.group, acting_user)?;

        let existing = snapshot.find(expense_id)?;
        if existing.is_settlement {
            return Err(DomainError::InvalidSettlement(format!(
                "settlement {expense_id} cannot be edited; delete and record it again"
            )));
        }

        let expected = snapshot.expected(draft.expected_version);
        let mut expense = build_expense(&snapshot.group, expense_id, draft, acting_user)?;
        expense.created_by = existing.created_by.clone();
        expense.created_at = existing.created_at;
        expense.idempotency_key = existing.idempotency_key.clone();

        let version = self.store.replace_expense(&expense, Some(expected)).await?;
        info!(group_id = %group_id, expense_id = %expense_id, version, "Expense updated");

        let balances = snapshot
            .balances_after(&*self.store, (1, version), [&expense], Some(expense_id))
            .await?;
        Ok(LedgerUpdate {
            expense,
            balances,
            version,
            created: false,
        })
    }

    /// Delete a record. Ordinary expenses: any current member. Settlements:
    /// only their payer or the group owner.
    pub async fn delete_expense(
        &self,
        group_id: &GroupId,
        expense_id: ExpenseId,
        acting_user: &MemberId,
    ) -> Result<LedgerView, DomainError> {
        let snapshot = GroupSnapshot::load(&*self.store, group_id).await?;
        let existing = snapshot.find(expense_id)?;
        let group = &snapshot.group;

        if existing.is_settlement {
            if &existing.payer_id != acting_user && !group.is_owner(acting_user) {
                warn!(group_id = %group_id, expense_id = %expense_id, acting = %acting_user, "Settlement deletion rejected");
                return Err(DomainError::PermissionDenied(format!(
                    "only {} or the group owner may delete settlement {expense_id}",
                    existing.payer_id
                )));
            }
        } else {
            ensure_member(group, acting_user)?;
        }

        let version = self
            .store
            .delete_expense(group_id, expense_id, Some(snapshot.version))
            .await?;
        info!(
            group_id = %group_id,
            expense_id = %expense_id,
            settlement = existing.is_settlement,
            version,
            "Expense deleted"
        );

        let balances = snapshot
            .balances_after(&*self.store, (1, version), std::iter::empty(), Some(expense_id))
            .await?;
        Ok(LedgerView { balances, version })
    }
}

fn ensure_member(group: &Group, member: &MemberId) -> Result<(), DomainError> {
    if group.is_member(member) {
        Ok(())
    } else {
        Err(DomainError::PermissionDenied(format!(
            "{member} is not a member of group {}",
            group.id
        )))
    }
}

/// Validate the draft against the group and resolve its splits.
fn build_expense(
    group: &Group,
    id: ExpenseId,
    draft: ExpenseDraft,
    acting_user: &MemberId,
) -> Result<Expense, DomainError> {
    if !group.is_member(&draft.payer) {
        return Err(DomainError::UnknownMember(draft.payer));
    }
    if let Some(stranger) = draft
        .rule
        .participants()
        .into_iter()
        .find(|p| !group.is_member(p))
    {
        return Err(DomainError::UnknownMember(stranger.clone()));
    }

    let (total, foreign) = match draft.amount {
        DraftAmount::Home(total) => (total, None),
        DraftAmount::Foreign(foreign) => (foreign.to_home(&group.home_currency)?, Some(foreign)),
    };
    if !total.is_positive() {
        return Err(DomainError::InvalidAmount(format!(
            "expense total must be > 0, got {total}"
        )));
    }
    if total > Money::MAX_RECORDABLE {
        return Err(DomainError::InvalidAmount(format!(
            "expense total {total} exceeds the maximum of {}",
            Money::MAX_RECORDABLE
        )));
    }
    let splits = resolve(total, &draft.rule)?;

    Ok(Expense {
        id,
        group_id: group.id.clone(),
        payer_id: draft.payer,
        total,
        currency: group.home_currency.clone(),
        foreign,
        category: draft.category,
        description: draft.description,
        split_mode: draft.rule.mode(),
        splits,
        is_settlement: false,
        idempotency_key: draft.idempotency_key,
        created_by: acting_user.clone(),
        created_at: Utc::now(),
    })
}

/// One notification per participant other than the acting user.
fn expense_notifications(
    group: &Group,
    expense: &Expense,
    acting_user: &MemberId,
) -> Vec<Notification> {
    let payer = group.display_name(&expense.payer_id);
    let total = expense.total.format(&expense.currency);
    expense
        .splits
        .iter()
        .filter(|(member, _)| *member != acting_user)
        .map(|(member, share)| Notification {
            user_id: member.clone(),
            group_id: group.id.clone(),
            kind: NotificationKind::ExpenseAdded,
            title: format!("New expense: {}", expense.category),
            body: format!(
                "{payer} paid {total}, your share is {}",
                share.format(&expense.currency)
            ),
            metadata: json!({
                "expense_id": expense.id.to_string(),
                "payer": expense.payer_id,
                "amount": expense.total.minor(),
                "share": share.minor(),
                "currency": expense.currency.as_str(),
            }),
        })
        .collect()
}
