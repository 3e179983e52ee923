//! Debt simplification: greedy largest-creditor / largest-debtor matching.
//!
//! Finding the true minimum number of transfers is NP-hard; the greedy match
//! is bounded by `nonzero members - 1` transfers, which is what groups need.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::warn;

use super::balance::Balances;
use super::entities::{MemberId, Transfer};
use super::money::Money;

/// Heap entry. Larger amount first, then smaller member id.
#[derive(Debug, PartialEq, Eq)]
struct Party {
    amount: i64,
    id: Reverse<MemberId>,
}

impl Party {
    fn new(id: MemberId, amount: i64) -> Self {
        Self {
            amount,
            id: Reverse(id),
        }
    }
}

impl Ord for Party {
    fn cmp(&self, other: &Self) -> Ordering {
        self.amount
            .cmp(&other.amount)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Party {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Propose transfers that bring every balance to zero.
///
/// Every transfer has a positive amount and always runs from a debtor to a
/// creditor. If the balances do not sum to zero the residual is first taken
/// off the creditors (surplus) or the debtors (deficit), largest first, so the
/// plan still closes exactly.
pub fn simplify(balances: &Balances) -> Vec<Transfer> {
    let mut amounts: Vec<(MemberId, i64)> = balances
        .iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(id, amount)| (id.clone(), amount.minor()))
        .collect();

    let residual = balances.sum().minor();
    if residual != 0 {
        if residual.unsigned_abs() > amounts.len() as u64 {
            warn!(
                residual,
                members = amounts.len(),
                "Balances do not sum to zero beyond rounding tolerance"
            );
        }
        absorb_residual(&mut amounts, residual);
    }

    let mut creditors = BinaryHeap::new();
    let mut debtors = BinaryHeap::new();
    for (id, amount) in amounts {
        match amount.cmp(&0) {
            Ordering::Greater => creditors.push(Party::new(id, amount)),
            Ordering::Less => debtors.push(Party::new(id, -amount)),
            Ordering::Equal => {}
        }
    }

    let mut transfers = Vec::new();
    while let (Some(creditor), Some(debtor)) = (creditors.pop(), debtors.pop()) {
        let settle = creditor.amount.min(debtor.amount);
        transfers.push(Transfer {
            from: debtor.id.0.clone(),
            to: creditor.id.0.clone(),
            amount: Money::new(settle),
        });

        if creditor.amount > settle {
            creditors.push(Party::new(creditor.id.0, creditor.amount - settle));
        }
        if debtor.amount > settle {
            debtors.push(Party::new(debtor.id.0, debtor.amount - settle));
        }
    }

    transfers
}

/// Shrink the creditors (residual > 0) or the debtors (residual < 0) toward
/// zero until the amounts sum to zero. The largest party absorbs first, ties
/// to the smallest id, and nobody crosses zero: an excess moves on to the
/// next party on the same side.
fn absorb_residual(amounts: &mut [(MemberId, i64)], residual: i64) {
    let sign = residual.signum();
    let mut side: Vec<&mut (MemberId, i64)> = amounts
        .iter_mut()
        .filter(|(_, a)| a.signum() == sign)
        .collect();
    side.sort_by(|x, y| {
        y.1.abs()
            .cmp(&x.1.abs())
            .then_with(|| x.0.cmp(&y.0))
    });

    let mut remaining = residual.unsigned_abs();
    for (_, amount) in side {
        if remaining == 0 {
            break;
        }
        let taken = remaining.min(amount.unsigned_abs());
        remaining -= taken;
        // taken <= |amount| <= i64::MAX
        *amount -= sign * taken as i64;
    }
}
