//! Settlement authorization and recording.
//!
//! - `suggest_settlements`: fold + simplify, no writes
//! - `settle_debt`: authorize, validate, persist one settlement, notify
//! - `settle_all`: apply the caller's share of the simplified plan in order,
//!   stopping at the first failure

use crate::domain::{
    Balances, DomainError, Expense, GroupId, MemberId, Money, Notification, NotificationKind,
    Transfer, simplify,
};
use crate::ports::{LedgerStore, NotificationSink};
use crate::usecases::fanout::deliver;
use crate::usecases::snapshot::GroupSnapshot;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Manual "settle this debt" request: `from` pays `amount` to `to`.
#[derive(Debug, Clone)]
pub struct SettleDebt {
    pub group_id: GroupId,
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Money,
    pub acting_user: MemberId,
    pub idempotency_key: Option<String>,
    pub expected_version: Option<u64>,
}

impl SettleDebt {
    pub fn new(
        group_id: impl Into<GroupId>,
        from: impl Into<MemberId>,
        to: impl Into<MemberId>,
        amount: Money,
        acting_user: impl Into<MemberId>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            from: from.into(),
            to: to.into(),
            amount,
            acting_user: acting_user.into(),
            idempotency_key: None,
            expected_version: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Fail with `StaleSnapshot` unless the group is still at `version`.
    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Stored settlement plus the refolded ledger.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementReceipt {
    pub settlement: Expense,
    pub balances: Balances,
    pub version: u64,
    /// False when an earlier request with the same idempotency key was found.
    pub created: bool,
}

/// Simplifier output for a group, not yet applied.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementPlan {
    pub transfers: Vec<Transfer>,
    pub balances: Balances,
    pub version: u64,
}

/// Outcome of a fully applied `settle_all`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSettlement {
    pub applied: Vec<Expense>,
    /// Plan entries the caller was not allowed to apply.
    pub skipped: Vec<Transfer>,
    pub balances: Balances,
    pub version: u64,
}

pub struct SettlementService {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl SettlementService {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    /// Current balances and the transfers that would settle them.
    pub async fn suggest_settlements(
        &self,
        group_id: &GroupId,
    ) -> Result<SettlementPlan, DomainError> {
        let snapshot = GroupSnapshot::load(&*self.store, group_id).await?;
        let transfers = simplify(&snapshot.balances);
        debug!(group_id = %group_id, count = transfers.len(), version = snapshot.version, "Settlement plan computed");
        Ok(SettlementPlan {
            transfers,
            balances: snapshot.balances,
            version: snapshot.version,
        })
    }

    /// Record one settlement. Allowed for the debtor and the group owner.
    pub async fn settle_debt(&self, cmd: SettleDebt) -> Result<SettlementReceipt, DomainError> {
        let snapshot = GroupSnapshot::load(&*self.store, &cmd.group_id).await?;
        let group = &snapshot.group;

        if cmd.acting_user != cmd.from && !group.is_owner(&cmd.acting_user) {
            warn!(
                group_id = %cmd.group_id,
                acting = %cmd.acting_user,
                from = %cmd.from,
                "Settlement rejected: not the debtor or the owner"
            );
            return Err(DomainError::PermissionDenied(format!(
                "{} may not settle debts of {}",
                cmd.acting_user, cmd.from
            )));
        }
        for id in [&cmd.from, &cmd.to] {
            if !snapshot.is_addressable(id) {
                return Err(DomainError::UnknownMember(id.clone()));
            }
        }

        let settlement = Expense::settlement(
            group,
            cmd.from.clone(),
            cmd.to.clone(),
            cmd.amount,
            cmd.acting_user.clone(),
            Utc::now(),
        )?
        .with_idempotency_key(cmd.idempotency_key.clone());

        let stored = self
            .store
            .insert_expense(&settlement, Some(snapshot.expected(cmd.expected_version)))
            .await?;

        if !stored.created {
            info!(
                group_id = %cmd.group_id,
                expense_id = %stored.expense.id,
                "Settlement already recorded for idempotency key"
            );
            let fresh = GroupSnapshot::load(&*self.store, &cmd.group_id).await?;
            return Ok(SettlementReceipt {
                settlement: stored.expense,
                balances: fresh.balances,
                version: fresh.version,
                created: false,
            });
        }

        info!(
            group_id = %cmd.group_id,
            from = %cmd.from,
            to = %cmd.to,
            amount = %cmd.amount,
            version = stored.version,
            "Settlement recorded"
        );

        let balances = snapshot
            .balances_after(&*self.store, (1, stored.version), [&stored.expense], None)
            .await?;
        deliver(
            &*self.notifier,
            &cmd.group_id,
            settlement_notifications(&snapshot, &stored.expense),
        )
        .await;

        Ok(SettlementReceipt {
            settlement: stored.expense,
            balances,
            version: stored.version,
            created: true,
        })
    }

    /// Apply the simplified plan: every transfer for the owner, only the
    /// caller's own debts for anyone else.
    ///
    /// Sequential; the first failure stops the batch with
    /// `DomainError::PartialBatchFailure` and earlier settlements stay recorded.
    pub async fn settle_all(
        &self,
        group_id: &GroupId,
        acting_user: &MemberId,
    ) -> Result<BatchSettlement, DomainError> {
        let snapshot = GroupSnapshot::load(&*self.store, group_id).await?;
        let group = &snapshot.group;
        if !group.is_member(acting_user) {
            return Err(DomainError::PermissionDenied(format!(
                "{acting_user} is not a member of group {group_id}"
            )));
        }

        let plan = simplify(&snapshot.balances);
        let is_owner = group.is_owner(acting_user);
        let (allowed, skipped): (Vec<_>, Vec<_>) = plan
            .into_iter()
            .enumerate()
            .partition(|(_, t)| is_owner || &t.from == acting_user);

        info!(
            group_id = %group_id,
            acting = %acting_user,
            planned = allowed.len(),
            skipped = skipped.len(),
            version = snapshot.version,
            "Settling all debts"
        );

        let mut applied: Vec<Expense> = Vec::with_capacity(allowed.len());
        let mut version = snapshot.version;

        for (index, transfer) in allowed {
            let key = format!("settle-all:{group_id}:{}:{index}", snapshot.version);
            let result = self.apply_transfer(&snapshot, &transfer, acting_user, key, version).await;

            match result {
                Ok((expense, new_version)) => {
                    version = new_version;
                    deliver(
                        &*self.notifier,
                        group_id,
                        settlement_notifications(&snapshot, &expense),
                    )
                    .await;
                    applied.push(expense);
                }
                Err(source) => {
                    warn!(
                        group_id = %group_id,
                        applied = applied.len(),
                        transfer = %transfer,
                        error = %source,
                        "Batch settlement stopped"
                    );
                    return Err(DomainError::PartialBatchFailure {
                        applied: applied.len(),
                        failed: transfer,
                        source: Box::new(source),
                    });
                }
            }
        }

        let balances = snapshot
            .balances_after(&*self.store, (applied.len() as u64, version), &applied, None)
            .await?;

        info!(group_id = %group_id, applied = applied.len(), version, "Batch settlement complete");

        Ok(BatchSettlement {
            applied,
            skipped: skipped.into_iter().map(|(_, t)| t).collect(),
            balances,
            version,
        })
    }

    async fn apply_transfer(
        &self,
        snapshot: &GroupSnapshot,
        transfer: &Transfer,
        acting_user: &MemberId,
        key: String,
        expected_version: u64,
    ) -> Result<(Expense, u64), DomainError> {
        let settlement = Expense::settlement(
            &snapshot.group,
            transfer.from.clone(),
            transfer.to.clone(),
            transfer.amount,
            acting_user.clone(),
            Utc::now(),
        )?
        .with_idempotency_key(Some(key));

        let stored = self
            .store
            .insert_expense(&settlement, Some(expected_version))
            .await?;
        debug!(
            transfer = %transfer,
            version = stored.version,
            created = stored.created,
            "Batch settlement applied"
        );
        Ok((stored.expense, stored.version))
    }
}

/// "X paid Y amount", one notification per current member.
fn settlement_notifications(snapshot: &GroupSnapshot, settlement: &Expense) -> Vec<Notification> {
    let group = &snapshot.group;
    let Some((creditor, amount)) = settlement.settlement_creditor() else {
        return Vec::new();
    };
    let from = group.display_name(&settlement.payer_id);
    let to = group.display_name(creditor);
    let body = format!("{from} paid {to} {}", amount.format(&group.home_currency));

    group
        .member_ids()
        .map(|member| Notification {
            user_id: member.clone(),
            group_id: group.id.clone(),
            kind: NotificationKind::SettlementRecorded,
            title: "Settlement recorded".to_string(),
            body: body.clone(),
            metadata: json!({
                "expense_id": settlement.id.to_string(),
                "from": settlement.payer_id,
                "to": creditor,
                "amount": amount.minor(),
                "currency": group.home_currency.as_str(),
            }),
        })
        .collect()
}
