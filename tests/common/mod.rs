//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use group_ledger::adapters::notifications::MemoryNotificationSink;
use group_ledger::adapters::persistence::MemoryStore;
use group_ledger::domain::{
    CurrencyCode, DomainError, Expense, ExpenseId, ExpenseSet, Group, GroupId, Member, MemberId,
    Money, SplitRule,
};
use group_ledger::ports::{LedgerStore, StoredExpense};
use group_ledger::usecases::{ExpenseDraft, ExpenseService, LedgerUpdate, SettlementService};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const GROUP: &str = "trip";

/// Group "trip" in EUR. The first id is the owner; display names are the ids
/// capitalised.
pub fn group(ids: &[&str]) -> Group {
    let mut members = ids.iter().map(|id| Member::new(*id, capitalise(id)));
    let owner = members.next().expect("at least one member");
    members.fold(
        Group::new(GROUP, owner, CurrencyCode::new("EUR").unwrap()),
        Group::with_member,
    )
}

fn capitalise(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn id(s: &str) -> MemberId {
    MemberId::from(s)
}

pub fn gid() -> GroupId {
    GroupId::from(GROUP)
}

pub struct Ledger<S> {
    pub store: Arc<S>,
    pub sink: Arc<MemoryNotificationSink>,
    pub expenses: ExpenseService,
    pub settlements: SettlementService,
}

impl<S: LedgerStore + 'static> Ledger<S> {
    pub fn over(store: Arc<S>) -> Self {
        let sink = Arc::new(MemoryNotificationSink::new());
        Self {
            expenses: ExpenseService::new(store.clone(), sink.clone()),
            settlements: SettlementService::new(store.clone(), sink.clone()),
            store,
            sink,
        }
    }

    /// Record `total` paid by `payer`, split equally among `among`.
    pub async fn pay(&self, payer: &str, total: i64, among: &[&str]) -> LedgerUpdate {
        let draft = ExpenseDraft::new(
            payer,
            Money::new(total),
            SplitRule::equal(among.iter().copied()),
        );
        self.expenses
            .create_expense(&gid(), draft, &id(payer))
            .await
            .unwrap()
    }

    pub async fn records(&self) -> Vec<Expense> {
        self.store.fetch_expenses(&gid()).await.unwrap().expenses
    }
}

pub async fn memory_ledger(ids: &[&str]) -> Ledger<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.save_group(group(ids)).await;
    Ledger::over(store)
}

/// Store whose inserts start failing after `allowed` successful ones.
pub struct FlakyStore {
    pub inner: MemoryStore,
    allowed: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, allowed: usize) -> Self {
        Self {
            inner,
            allowed: AtomicUsize::new(allowed),
        }
    }

    pub fn allow(&self, n: usize) {
        self.allowed.store(n, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl LedgerStore for FlakyStore {
    async fn fetch_group(&self, group_id: &GroupId) -> Result<Group, DomainError> {
        self.inner.fetch_group(group_id).await
    }

    async fn fetch_expenses(&self, group_id: &GroupId) -> Result<ExpenseSet, DomainError> {
        self.inner.fetch_expenses(group_id).await
    }

    async fn insert_expense(
        &self,
        expense: &Expense,
        expected_version: Option<u64>,
    ) -> Result<StoredExpense, DomainError> {
        let remaining = self.allowed.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(DomainError::Persistence("disk full".to_string()));
        }
        self.allowed.store(remaining - 1, Ordering::SeqCst);
        self.inner.insert_expense(expense, expected_version).await
    }

    async fn replace_expense(
        &self,
        expense: &Expense,
        expected_version: Option<u64>,
    ) -> Result<u64, DomainError> {
        self.inner.replace_expense(expense, expected_version).await
    }

    async fn delete_expense(
        &self,
        group_id: &GroupId,
        expense_id: ExpenseId,
        expected_version: Option<u64>,
    ) -> Result<u64, DomainError> {
        self.inner.delete_expense(group_id, expense_id, expected_version).await
    }
}
