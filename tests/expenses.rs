mod common;

use chrono::Utc;
use common::{gid, id, memory_ledger};
use group_ledger::domain::{
    CurrencyCode, DomainError, ExchangeRate, ForeignAmount, MemberId, Money, NotificationKind,
    Percentage, SplitMode, SplitRule, SplitValidationError,
};
use group_ledger::usecases::{ExpenseDraft, SettleDebt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

fn eur() -> CurrencyCode {
    CurrencyCode::new("EUR").unwrap()
}

fn percentages(entries: &[(&str, &str)]) -> SplitRule {
    SplitRule::Percentage {
        shares: entries
            .iter()
            .map(|(m, p)| (id(m), p.parse::<Percentage>().unwrap()))
            .collect(),
    }
}

#[tokio::test]
async fn thirds_by_percentage_split_exactly() {
    let ledger = memory_ledger(&["a", "b", "c"]).await;
    let draft = ExpenseDraft::new(
        "a",
        Money::new(300),
        percentages(&[("a", "33.33"), ("b", "33.33"), ("c", "33.34")]),
    )
    .category("groceries");

    let update = ledger
        .expenses
        .create_expense(&gid(), draft, &id("a"))
        .await
        .unwrap();

    assert_eq!(update.expense.split_mode, SplitMode::Percentage);
    for m in ["a", "b", "c"] {
        assert_eq!(update.expense.splits.get(&id(m)), Some(Money::new(100)));
    }
    assert_eq!(update.balances.get(&id("a")), Money::new(200));
    assert_eq!(update.balances.sum(), Money::ZERO);
}

#[tokio::test]
async fn fixed_amounts_absorb_one_unit() {
    let ledger = memory_ledger(&["a", "b"]).await;
    let amounts: BTreeMap<MemberId, Money> =
        [(id("a"), Money::new(333)), (id("b"), Money::new(666))].into();
    let draft = ExpenseDraft::new("a", Money::new(1000), SplitRule::FixedAmount { amounts });

    let update = ledger
        .expenses
        .create_expense(&gid(), draft, &id("a"))
        .await
        .unwrap();
    assert_eq!(update.expense.splits.get(&id("b")), Some(Money::new(667)));
    assert_eq!(update.expense.splits.total(), Money::new(1000));
}

#[tokio::test]
async fn foreign_amount_is_converted_with_the_snapshot() {
    let ledger = memory_ledger(&["a", "b"]).await;
    let usd = CurrencyCode::new("USD").unwrap();
    let rate = ExchangeRate::parse(usd.clone(), eur(), "0.9235", Utc::now()).unwrap();
    let foreign = ForeignAmount {
        amount: usd.parse_amount("12.99").unwrap(),
        currency: usd,
        rate,
    };

    let update = ledger
        .expenses
        .create_expense(
            &gid(),
            ExpenseDraft::foreign("a", foreign.clone(), SplitRule::equal(["a", "b"])),
            &id("a"),
        )
        .await
        .unwrap();

    // 12.99 * 0.9235 = 11.996265 -> 12.00
    assert_eq!(update.expense.total, Money::new(1200));
    assert_eq!(update.expense.currency, eur());
    assert_eq!(update.expense.foreign, Some(foreign));
    assert_eq!(update.balances.get(&id("b")), Money::new(-600));
}

#[tokio::test]
async fn rate_into_another_currency_is_rejected() {
    let ledger = memory_ledger(&["a", "b"]).await;
    let usd = CurrencyCode::new("USD").unwrap();
    let gbp = CurrencyCode::new("GBP").unwrap();
    let foreign = ForeignAmount {
        amount: Money::new(1000),
        currency: usd.clone(),
        rate: ExchangeRate::parse(usd, gbp, "0.79", Utc::now()).unwrap(),
    };

    let err = ledger
        .expenses
        .create_expense(
            &gid(),
            ExpenseDraft::foreign("a", foreign, SplitRule::equal(["a", "b"])),
            &id("a"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Currency(_)));
    assert!(ledger.records().await.is_empty());
}

#[tokio::test]
async fn invalid_input_is_rejected_before_persisting() {
    let ledger = memory_ledger(&["a", "b"]).await;
    let e = &ledger.expenses;

    let bad_pct = e
        .create_expense(
            &gid(),
            ExpenseDraft::new("a", Money::new(100), percentages(&[("a", "50"), ("b", "40")])),
            &id("a"),
        )
        .await;
    assert!(matches!(
        bad_pct,
        Err(DomainError::Validation(
            SplitValidationError::PercentagesDoNotSum100 { .. }
        ))
    ));

    let stranger = e
        .create_expense(
            &gid(),
            ExpenseDraft::new("a", Money::new(100), SplitRule::equal(["a", "zed"])),
            &id("a"),
        )
        .await;
    assert!(matches!(stranger, Err(DomainError::UnknownMember(m)) if m == id("zed")));

    let outsider = e
        .create_expense(
            &gid(),
            ExpenseDraft::new("a", Money::new(100), SplitRule::equal(["a", "b"])),
            &id("zed"),
        )
        .await;
    assert!(matches!(outsider, Err(DomainError::PermissionDenied(_))));

    let zero = e
        .create_expense(
            &gid(),
            ExpenseDraft::new("a", Money::ZERO, SplitRule::equal(["a", "b"])),
            &id("a"),
        )
        .await;
    assert!(matches!(zero, Err(DomainError::InvalidAmount(_))));

    // two of these by one payer would overflow the balance fold
    let huge = e
        .create_expense(
            &gid(),
            ExpenseDraft::new("a", Money::new(i64::MAX / 2 + 1), SplitRule::equal(["a", "b"])),
            &id("a"),
        )
        .await;
    assert!(matches!(huge, Err(DomainError::InvalidAmount(_))));

    assert!(ledger.records().await.is_empty());
}

#[tokio::test]
async fn participants_other_than_the_author_are_notified() {
    let ledger = memory_ledger(&["a", "b", "c"]).await;
    ledger.pay("a", 300, &["a", "b", "c"]).await;

    let sent = ledger.sink.sent().await;
    let users: Vec<&str> = sent.iter().map(|n| n.user_id.as_str()).collect();
    assert_eq!(users, vec!["b", "c"]);
    assert!(sent.iter().all(|n| n.kind == NotificationKind::ExpenseAdded));
    assert_eq!(sent[0].body, "A paid 3.00 EUR, your share is 1.00 EUR");
}

#[tokio::test]
async fn update_resplits_and_bumps_version() {
    let ledger = memory_ledger(&["a", "b", "c"]).await;
    let created = ledger.pay("a", 300, &["a", "b", "c"]).await;

    let draft = ExpenseDraft::new("a", Money::new(300), SplitRule::equal(["a", "b"]))
        .expecting_version(created.version);
    let updated = ledger
        .expenses
        .update_expense(&gid(), created.expense.id, draft, &id("b"))
        .await
        .unwrap();

    assert_eq!(updated.version, created.version + 1);
    assert_eq!(updated.expense.id, created.expense.id);
    assert_eq!(updated.expense.created_by, id("a"));
    assert_eq!(updated.balances.get(&id("b")), Money::new(-150));
    assert_eq!(updated.balances.get(&id("c")), Money::ZERO);
    assert_eq!(ledger.records().await.len(), 1);
}

#[tokio::test]
async fn settlements_cannot_be_edited() {
    let ledger = memory_ledger(&["a", "b"]).await;
    ledger.pay("a", 100, &["b"]).await;
    let receipt = ledger
        .settlements
        .settle_debt(SettleDebt::new("trip", "b", "a", Money::new(100), "b"))
        .await
        .unwrap();

    let err = ledger
        .expenses
        .update_expense(
            &gid(),
            receipt.settlement.id,
            ExpenseDraft::new("b", Money::new(50), SplitRule::equal(["a"])),
            &id("b"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidSettlement(_)));
}

#[tokio::test]
async fn deleting_removes_the_effect() {
    let ledger = memory_ledger(&["a", "b"]).await;
    let created = ledger.pay("a", 100, &["b"]).await;

    let view = ledger
        .expenses
        .delete_expense(&gid(), created.expense.id, &id("b"))
        .await
        .unwrap();
    assert!(view.balances.is_settled());
    assert_eq!(view.version, 2);

    let missing = ledger
        .expenses
        .delete_expense(&gid(), created.expense.id, &id("b"))
        .await;
    assert!(matches!(missing, Err(DomainError::NotFound(_))));
}

#[tokio::test]
async fn settlement_deletion_is_limited_to_payer_and_owner() {
    let ledger = memory_ledger(&["a", "b", "c"]).await;
    ledger.pay("a", 300, &["a", "b", "c"]).await;
    let receipt = ledger
        .settlements
        .settle_debt(SettleDebt::new("trip", "b", "a", Money::new(100), "b"))
        .await
        .unwrap();

    let denied = ledger
        .expenses
        .delete_expense(&gid(), receipt.settlement.id, &id("c"))
        .await;
    assert!(matches!(denied, Err(DomainError::PermissionDenied(_))));
    assert_eq!(ledger.records().await.len(), 2);

    let view = ledger
        .expenses
        .delete_expense(&gid(), receipt.settlement.id, &id("b"))
        .await
        .unwrap();
    assert_eq!(view.balances.get(&id("b")), Money::new(-100));
}

#[tokio::test]
async fn idempotent_create_does_not_duplicate() {
    let ledger = memory_ledger(&["a", "b"]).await;
    let draft = ExpenseDraft::new("a", Money::new(100), SplitRule::equal(["a", "b"]))
        .with_idempotency_key("receipt-17");

    let first = ledger
        .expenses
        .create_expense(&gid(), draft.clone(), &id("a"))
        .await
        .unwrap();
    let second = ledger
        .expenses
        .create_expense(&gid(), draft, &id("a"))
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(second.expense.id, first.expense.id);
    assert_eq!(second.balances, first.balances);
    assert_eq!(ledger.records().await.len(), 1);
}

#[tokio::test]
async fn opposite_expenses_leave_nothing_to_settle() {
    let ledger = memory_ledger(&["a", "b"]).await;
    ledger.pay("a", 100, &["b"]).await;
    let update = ledger.pay("b", 100, &["a"]).await;

    assert!(update.balances.is_settled());
    let plan = ledger.settlements.suggest_settlements(&gid()).await.unwrap();
    assert!(plan.transfers.is_empty());
}

#[tokio::test]
async fn random_histories_fold_to_zero_sum() {
    let members = ["ann", "ben", "cat", "dan", "eve"];
    let mut rng = StdRng::seed_from_u64(7);
    let ledger = memory_ledger(&members).await;

    for _ in 0..200 {
        let payer = members[rng.random_range(0..members.len())];
        let rule = if rng.random_bool(0.5) {
            let among: Vec<&str> = members
                .iter()
                .copied()
                .filter(|_| rng.random_bool(0.7))
                .collect();
            if among.is_empty() {
                continue;
            }
            SplitRule::equal(among)
        } else {
            // 40/30/30 over three random distinct members
            let mut picked = members.to_vec();
            while picked.len() > 3 {
                picked.remove(rng.random_range(0..picked.len()));
            }
            percentages(&[(picked[0], "40"), (picked[1], "30"), (picked[2], "30")])
        };
        let draft = ExpenseDraft::new(payer, Money::new(rng.random_range(1..100_000)), rule);
        let update = ledger
            .expenses
            .create_expense(&gid(), draft, &id(payer))
            .await
            .unwrap();

        assert_eq!(update.balances.sum(), Money::ZERO);
        assert_eq!(update.expense.splits.total(), update.expense.total);
    }

    let once = ledger.expenses.ledger(&gid()).await.unwrap();
    let twice = ledger.expenses.ledger(&gid()).await.unwrap();
    assert_eq!(once.balances, twice.balances);
}
