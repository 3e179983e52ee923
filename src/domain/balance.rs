//! Balance aggregation: a pure fold over a group's expense records.
//!
//! Positive balance = the group owes the member; negative = the member owes.
//! Nothing is cached. Every mutation is followed by a fresh fold.

use serde::Serialize;
use std::collections::BTreeMap;

use super::entities::{Expense, Group, MemberId, Transfer};
use super::money::Money;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Balances(BTreeMap<MemberId, Money>);

impl Balances {
    pub fn get(&self, member: &MemberId) -> Money {
        self.0.get(member).copied().unwrap_or(Money::ZERO)
    }

    /// Members seen in the fold, including departed members with history.
    pub fn contains(&self, member: &MemberId) -> bool {
        self.0.contains_key(member)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MemberId, Money)> {
        self.0.iter().map(|(id, amount)| (id, *amount))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zero for any history of exact splits.
    pub fn sum(&self) -> Money {
        self.0.values().sum()
    }

    pub fn nonzero_count(&self) -> usize {
        self.0.values().filter(|m| !m.is_zero()).count()
    }

    pub fn is_settled(&self) -> bool {
        self.nonzero_count() == 0
    }

    /// Apply settlement transfers: the debtor's balance rises, the creditor's
    /// falls, exactly as recording the settlement expense would.
    pub fn apply(&mut self, transfers: &[Transfer]) {
        for t in transfers {
            *self.0.entry(t.from.clone()).or_default() += t.amount;
            *self.0.entry(t.to.clone()).or_default() -= t.amount;
        }
    }

    pub fn as_map(&self) -> &BTreeMap<MemberId, Money> {
        &self.0
    }
}

impl FromIterator<(MemberId, Money)> for Balances {
    fn from_iter<T: IntoIterator<Item = (MemberId, Money)>>(iter: T) -> Self {
        let mut map = BTreeMap::new();
        for (id, amount) in iter {
            *map.entry(id).or_insert(Money::ZERO) += amount;
        }
        Self(map)
    }
}

/// Fold `expenses` into balances, starting every id in `members` at zero.
///
/// Split owners who are not in `members` (people who left the group) still get
/// an entry, so their historical balance stays addressable.
pub fn fold<'a, M, E>(members: M, expenses: E) -> Balances
where
    M: IntoIterator<Item = &'a MemberId>,
    E: IntoIterator<Item = &'a Expense>,
{
    let mut balances: BTreeMap<MemberId, Money> = members
        .into_iter()
        .map(|id| (id.clone(), Money::ZERO))
        .collect();

    for expense in expenses {
        *balances.entry(expense.payer_id.clone()).or_default() += expense.total;
        for (member, share) in expense.splits.iter() {
            *balances.entry(member.clone()).or_default() -= share;
        }
    }

    Balances(balances)
}

/// [`fold`] over the group's current members.
pub fn fold_group<'a, E>(group: &'a Group, expenses: E) -> Balances
where
    E: IntoIterator<Item = &'a Expense>,
{
    fold(group.member_ids(), expenses)
}
