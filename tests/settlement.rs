mod common;

use common::{FlakyStore, Ledger, gid, group, id, memory_ledger};
use group_ledger::adapters::persistence::MemoryStore;
use group_ledger::domain::{DomainError, Money, NotificationKind, Transfer};
use group_ledger::usecases::SettleDebt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn transfer(from: &str, to: &str, amount: i64) -> Transfer {
    Transfer {
        from: id(from),
        to: id(to),
        amount: Money::new(amount),
    }
}

#[tokio::test]
async fn equal_dinner_settles_with_three_transfers() {
    let ledger = memory_ledger(&["a", "b", "c", "d"]).await;
    let update = ledger.pay("a", 1000, &["a", "b", "c", "d"]).await;

    assert_eq!(update.balances.get(&id("a")), Money::new(750));
    for m in ["b", "c", "d"] {
        assert_eq!(update.balances.get(&id(m)), Money::new(-250));
    }

    let plan = ledger.settlements.suggest_settlements(&gid()).await.unwrap();
    assert_eq!(
        plan.transfers,
        vec![
            transfer("b", "a", 250),
            transfer("c", "a", 250),
            transfer("d", "a", 250),
        ]
    );
    assert_eq!(plan.version, update.version);
    // suggesting writes nothing
    assert_eq!(ledger.records().await.len(), 1);
}

#[tokio::test]
async fn debtor_settles_and_everyone_is_notified() {
    let ledger = memory_ledger(&["a", "b", "c", "d"]).await;
    ledger.pay("a", 1000, &["a", "b", "c", "d"]).await;

    let receipt = ledger
        .settlements
        .settle_debt(SettleDebt::new("trip", "b", "a", Money::new(250), "b"))
        .await
        .unwrap();

    assert!(receipt.created);
    assert!(receipt.settlement.is_settlement);
    assert_eq!(receipt.settlement.payer_id, id("b"));
    assert_eq!(
        receipt.settlement.settlement_creditor(),
        Some((&id("a"), Money::new(250)))
    );
    assert_eq!(receipt.balances.get(&id("a")), Money::new(500));
    assert_eq!(receipt.balances.get(&id("b")), Money::ZERO);
    assert_eq!(receipt.version, 2);

    let settlements: Vec<_> = ledger
        .sink
        .sent()
        .await
        .into_iter()
        .filter(|n| n.kind == NotificationKind::SettlementRecorded)
        .collect();
    assert_eq!(settlements.len(), 4);
    assert!(settlements.iter().all(|n| n.body == "B paid A 2.50 EUR"));
    assert_eq!(settlements[0].metadata["amount"], 250);
}

#[tokio::test]
async fn owner_may_settle_on_behalf_of_debtor() {
    let ledger = memory_ledger(&["a", "b", "c"]).await;
    ledger.pay("b", 300, &["a", "b", "c"]).await;

    let receipt = ledger
        .settlements
        .settle_debt(SettleDebt::new("trip", "c", "b", Money::new(100), "a"))
        .await
        .unwrap();
    assert_eq!(receipt.settlement.created_by, id("a"));
    assert_eq!(receipt.balances.get(&id("c")), Money::ZERO);
}

#[tokio::test]
async fn third_party_cannot_settle_and_nothing_is_written() {
    let ledger = memory_ledger(&["a", "b", "c", "d"]).await;
    ledger.pay("a", 1000, &["a", "b", "c", "d"]).await;

    let err = ledger
        .settlements
        .settle_debt(SettleDebt::new("trip", "b", "a", Money::new(250), "c"))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::PermissionDenied(_)));
    assert_eq!(ledger.records().await.len(), 1);
    assert!(
        ledger
            .sink
            .sent()
            .await
            .iter()
            .all(|n| n.kind != NotificationKind::SettlementRecorded)
    );
}

#[tokio::test]
async fn malformed_settlements_are_rejected() {
    let ledger = memory_ledger(&["a", "b"]).await;
    let s = &ledger.settlements;

    let zero = s
        .settle_debt(SettleDebt::new("trip", "b", "a", Money::ZERO, "b"))
        .await;
    assert!(matches!(zero, Err(DomainError::InvalidSettlement(_))));

    let negative = s
        .settle_debt(SettleDebt::new("trip", "b", "a", Money::new(-5), "b"))
        .await;
    assert!(matches!(negative, Err(DomainError::InvalidSettlement(_))));

    let self_pay = s
        .settle_debt(SettleDebt::new("trip", "b", "b", Money::new(5), "b"))
        .await;
    assert!(matches!(self_pay, Err(DomainError::InvalidSettlement(_))));

    let stranger = s
        .settle_debt(SettleDebt::new("trip", "b", "zed", Money::new(5), "b"))
        .await;
    assert!(matches!(stranger, Err(DomainError::UnknownMember(m)) if m == id("zed")));

    assert!(ledger.records().await.is_empty());
}

#[tokio::test]
async fn stale_snapshot_is_rejected_without_writing() {
    let ledger = memory_ledger(&["a", "b"]).await;
    let first = ledger.pay("a", 100, &["b"]).await;
    ledger.pay("a", 40, &["b"]).await;

    let err = ledger
        .settlements
        .settle_debt(
            SettleDebt::new("trip", "b", "a", Money::new(100), "b").expecting_version(first.version),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DomainError::StaleSnapshot {
            expected: 1,
            actual: 2
        }
    ));
    assert_eq!(ledger.records().await.len(), 2);
}

#[tokio::test]
async fn retry_with_same_key_returns_the_first_settlement() {
    let ledger = memory_ledger(&["a", "b"]).await;
    ledger.pay("a", 100, &["b"]).await;

    let cmd = SettleDebt::new("trip", "b", "a", Money::new(100), "b")
        .with_idempotency_key("pay-1")
        .expecting_version(1);
    let first = ledger.settlements.settle_debt(cmd.clone()).await.unwrap();
    // the retry carries the now stale version; the key still wins
    let retry = ledger.settlements.settle_debt(cmd).await.unwrap();

    assert!(first.created);
    assert!(!retry.created);
    assert_eq!(retry.settlement.id, first.settlement.id);
    assert_eq!(retry.version, first.version);
    assert!(retry.balances.is_settled());
    assert_eq!(ledger.records().await.len(), 2);
}

#[tokio::test]
async fn failing_notification_sink_does_not_fail_settlement() {
    let ledger = memory_ledger(&["a", "b"]).await;
    ledger.pay("a", 100, &["b"]).await;
    ledger.sink.set_failing(true);

    let receipt = ledger
        .settlements
        .settle_debt(SettleDebt::new("trip", "b", "a", Money::new(100), "b"))
        .await
        .unwrap();

    assert!(receipt.balances.is_settled());
    assert_eq!(ledger.records().await.len(), 2);
}

#[tokio::test]
async fn departed_member_can_still_be_settled_by_owner() {
    let ledger = memory_ledger(&["a", "b", "c"]).await;
    ledger.pay("a", 300, &["a", "b", "c"]).await;
    ledger.store.save_group(group(&["a", "b"])).await;

    let view = ledger.expenses.ledger(&gid()).await.unwrap();
    assert_eq!(view.balances.get(&id("c")), Money::new(-100));

    let receipt = ledger
        .settlements
        .settle_debt(SettleDebt::new("trip", "c", "a", Money::new(100), "a"))
        .await
        .unwrap();
    assert_eq!(receipt.balances.get(&id("c")), Money::ZERO);
}

#[tokio::test]
async fn owner_settles_everything_in_one_batch() {
    let ledger = memory_ledger(&["a", "b", "c", "d"]).await;
    let update = ledger.pay("a", 1000, &["a", "b", "c", "d"]).await;

    let batch = ledger.settlements.settle_all(&gid(), &id("a")).await.unwrap();

    assert_eq!(batch.applied.len(), 3);
    assert!(batch.skipped.is_empty());
    assert!(batch.balances.is_settled());
    assert_eq!(batch.version, update.version + 3);
    assert_eq!(
        batch.applied[0].idempotency_key.as_deref(),
        Some(format!("settle-all:trip:{}:0", update.version).as_str())
    );

    let view = ledger.expenses.ledger(&gid()).await.unwrap();
    assert!(view.balances.is_settled());
    assert_eq!(view.version, batch.version);
}

#[tokio::test]
async fn member_batch_only_covers_own_debts() {
    let ledger = memory_ledger(&["a", "b", "c", "d"]).await;
    ledger.pay("a", 1000, &["a", "b", "c", "d"]).await;

    let batch = ledger.settlements.settle_all(&gid(), &id("c")).await.unwrap();

    assert_eq!(batch.applied.len(), 1);
    assert_eq!(batch.applied[0].payer_id, id("c"));
    assert_eq!(
        batch.skipped,
        vec![transfer("b", "a", 250), transfer("d", "a", 250)]
    );
    assert_eq!(batch.balances.get(&id("a")), Money::new(500));
    assert_eq!(batch.balances.get(&id("c")), Money::ZERO);
}

#[tokio::test]
async fn batch_stops_at_first_failure_and_keeps_earlier_settlements() {
    let inner = MemoryStore::new();
    inner.save_group(group(&["a", "b", "c", "d"])).await;
    let store = Arc::new(FlakyStore::new(inner, 1));
    let ledger = Ledger::over(store.clone());
    ledger.pay("a", 1000, &["a", "b", "c", "d"]).await;

    // the expense used the only allowed insert; allow one settlement
    store.allow(1);
    let err = ledger
        .settlements
        .settle_all(&gid(), &id("a"))
        .await
        .unwrap_err();

    match err {
        DomainError::PartialBatchFailure {
            applied,
            failed,
            source,
        } => {
            assert_eq!(applied, 1);
            assert_eq!(failed, transfer("c", "a", 250));
            assert!(matches!(*source, DomainError::Persistence(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let records = ledger.records().await;
    assert_eq!(records.len(), 2);
    assert!(records[1].is_settlement);

    let view = ledger.expenses.ledger(&gid()).await.unwrap();
    assert_eq!(view.balances.get(&id("b")), Money::ZERO);
    assert_eq!(view.balances.get(&id("c")), Money::new(-250));
}

#[tokio::test]
async fn non_member_cannot_run_batch() {
    let ledger = memory_ledger(&["a", "b"]).await;
    ledger.pay("a", 100, &["b"]).await;
    let err = ledger
        .settlements
        .settle_all(&gid(), &id("mallory"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::PermissionDenied(_)));
}

#[tokio::test]
async fn random_histories_settle_completely() {
    let members = ["a", "b", "c", "d", "e", "f"];
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..20 {
        let ledger = memory_ledger(&members).await;
        for _ in 0..rng.random_range(1..15) {
            let payer = members[rng.random_range(0..members.len())];
            let among: Vec<&str> = members
                .iter()
                .copied()
                .filter(|_| rng.random_bool(0.6))
                .collect();
            if among.is_empty() {
                continue;
            }
            ledger.pay(payer, rng.random_range(1..50_000), &among).await;
        }

        let plan = ledger.settlements.suggest_settlements(&gid()).await.unwrap();
        assert_eq!(plan.balances.sum(), Money::ZERO);
        assert!(plan.transfers.len() <= plan.balances.nonzero_count().saturating_sub(1));

        let batch = ledger.settlements.settle_all(&gid(), &id("a")).await.unwrap();
        assert_eq!(batch.applied.len(), plan.transfers.len());
        assert!(batch.balances.is_settled());
    }
}
