//! Split resolution: turn an expense total and a split rule into exact
//! per-member shares.
//!
//! Every resolved [`Splits`] sums to the expense total exactly. Rounding
//! remainders go to deterministic recipients (id order, or the largest share)
//! so recomputing a split always gives the same answer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::entities::{MemberId, SplitMode};
use super::errors::{DomainError, SplitValidationError};
use super::money::{Money, div_round_half_away, format_scaled, parse_scaled};

/// Allowed deviation of a percentage split from 100%, in basis points (0.1%).
const PERCENT_TOLERANCE_BP: i64 = 10;

/// Allowed deviation of a fixed-amount split from the total, in minor units.
const FIXED_TOLERANCE_MINOR: i64 = 1;

/// Percentage with two decimals, stored as basis points (`33.33%` = `3333`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(i64);

impl Percentage {
    pub const HUNDRED: Percentage = Percentage(10_000);

    pub const fn from_basis_points(bp: i64) -> Self {
        Self(bp)
    }

    pub const fn basis_points(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", format_scaled(self.0, 2))
    }
}

impl FromStr for Percentage {
    type Err = SplitValidationError;

    /// Parses `"33.33"` or `"33,33"` (at most two decimals, optional `%`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('%');
        parse_scaled(trimmed, 2)
            .map(Self)
            .map_err(|reason| SplitValidationError::InvalidPercentage(format!("{reason}: {s:?}")))
    }
}

/// How an expense total is divided, with the mode-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SplitRule {
    Equal { participants: Vec<MemberId> },
    Percentage { shares: BTreeMap<MemberId, Percentage> },
    FixedAmount { amounts: BTreeMap<MemberId, Money> },
}

impl SplitRule {
    pub fn equal<I, M>(participants: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MemberId>,
    {
        Self::Equal {
            participants: participants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn mode(&self) -> SplitMode {
        match self {
            Self::Equal { .. } => SplitMode::Equal,
            Self::Percentage { .. } => SplitMode::Percentage,
            Self::FixedAmount { .. } => SplitMode::FixedAmount,
        }
    }

    pub fn participants(&self) -> Vec<&MemberId> {
        match self {
            Self::Equal { participants } => participants.iter().collect(),
            Self::Percentage { shares } => shares.keys().collect(),
            Self::FixedAmount { amounts } => amounts.keys().collect(),
        }
    }
}

/// Resolved shares of an expense. Sums to the expense total exactly.
///
/// Only built by [`resolve`], [`Splits::single`] (settlements) or
/// [`Splits::from_stored`] (store loaders), so an unchecked map never reaches
/// the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Splits(BTreeMap<MemberId, Money>);

impl Splits {
    /// One share holding the whole amount.
    pub fn single(member: MemberId, amount: Money) -> Self {
        Self(BTreeMap::from([(member, amount)]))
    }

    /// Rebuild from a persisted map, re-checking the record invariants.
    pub fn from_stored(shares: BTreeMap<MemberId, Money>, total: Money) -> Result<Self, DomainError> {
        if let Some((member, amount)) = shares.iter().find(|(_, a)| a.is_negative()) {
            return Err(SplitValidationError::NegativeShare {
                member: member.clone(),
                amount: *amount,
            }
            .into());
        }
        let sum: Money = shares.values().sum();
        if sum != total {
            return Err(DomainError::InvalidAmount(format!(
                "stored splits sum to {sum}, total is {total}"
            )));
        }
        Ok(Self(shares))
    }

    pub fn total(&self) -> Money {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, member: &MemberId) -> Option<Money> {
        self.0.get(member).copied()
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.0.contains_key(member)
    }

    /// Shares in canonical (id-ascending) order.
    pub fn iter(&self) -> impl Iterator<Item = (&MemberId, Money)> {
        self.0.iter().map(|(id, amount)| (id, *amount))
    }

    pub fn as_map(&self) -> &BTreeMap<MemberId, Money> {
        &self.0
    }
}

/// Resolve `total` into exact per-member shares according to `rule`.
pub fn resolve(total: Money, rule: &SplitRule) -> Result<Splits, SplitValidationError> {
    if total.is_negative() {
        return Err(SplitValidationError::NegativeTotal(total));
    }
    let shares = match rule {
        SplitRule::Equal { participants } => resolve_equal(total, participants)?,
        SplitRule::Percentage { shares } => resolve_percentage(total, shares)?,
        SplitRule::FixedAmount { amounts } => resolve_fixed(total, amounts)?,
    };
    ensure_non_negative(&shares)?;
    let splits = Splits(shares);
    debug_assert_eq!(splits.total(), total);
    Ok(splits)
}

fn resolve_equal(
    total: Money,
    participants: &[MemberId],
) -> Result<BTreeMap<MemberId, Money>, SplitValidationError> {
    if participants.is_empty() {
        return Err(SplitValidationError::EmptyParticipantSet);
    }
    let mut canonical = BTreeSet::new();
    for participant in participants {
        if !canonical.insert(participant) {
            return Err(SplitValidationError::DuplicateParticipant(
                participant.clone(),
            ));
        }
    }

    let n = canonical.len() as i64;
    let base = total.minor() / n;
    let remainder = total.minor() - base * n;

    Ok(canonical
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let extra = if (i as i64) < remainder { 1 } else { 0 };
            (id.clone(), Money::new(base + extra))
        })
        .collect())
}

fn resolve_percentage(
    total: Money,
    percentages: &BTreeMap<MemberId, Percentage>,
) -> Result<BTreeMap<MemberId, Money>, SplitValidationError> {
    if percentages.is_empty() {
        return Err(SplitValidationError::EmptyParticipantSet);
    }
    let pct_sum: i128 = percentages
        .values()
        .map(|p| i128::from(p.basis_points()))
        .sum();
    let hundred = i128::from(Percentage::HUNDRED.basis_points());
    if (pct_sum - hundred).abs() > i128::from(PERCENT_TOLERANCE_BP) {
        return Err(match i64::try_from(pct_sum) {
            Ok(bp) => SplitValidationError::PercentagesDoNotSum100 {
                total: Percentage::from_basis_points(bp),
            },
            Err(_) => SplitValidationError::InvalidPercentage("percentage sum out of range".into()),
        });
    }

    let mut shares = BTreeMap::new();
    for (id, pct) in percentages {
        let raw = div_round_half_away(
            i128::from(total.minor()) * i128::from(pct.basis_points()),
            hundred,
        );
        let share = i64::try_from(raw).map_err(|_| {
            SplitValidationError::InvalidPercentage(format!("share of {id} at {pct} is out of range"))
        })?;
        shares.insert(id.clone(), Money::new(share));
    }
    // negative percentages are rejected here, before any residual moves
    ensure_non_negative(&shares)?;

    let allocated = shares
        .values()
        .try_fold(Money::ZERO, |acc, share| acc.checked_add(*share))
        .ok_or_else(|| SplitValidationError::InvalidPercentage("shares out of range".into()))?;
    absorb_into_largest(&mut shares, total - allocated);
    Ok(shares)
}

fn resolve_fixed(
    total: Money,
    amounts: &BTreeMap<MemberId, Money>,
) -> Result<BTreeMap<MemberId, Money>, SplitValidationError> {
    if amounts.is_empty() {
        return Err(SplitValidationError::EmptyParticipantSet);
    }
    ensure_non_negative(amounts)?;

    let actual: Money = amounts.values().sum();
    if (total - actual).abs().minor() > FIXED_TOLERANCE_MINOR {
        return Err(SplitValidationError::AmountsDoNotMatchTotal {
            expected: total,
            actual,
        });
    }

    let mut shares = amounts.clone();
    absorb_into_largest(&mut shares, total - actual);
    Ok(shares)
}

/// Fold `residual` into the shares, largest share first with ties to the
/// smallest member id.
///
/// A surplus goes entirely to the largest share. A deficit is taken one unit
/// at a time, cycling through the shares in that order and skipping any that
/// reached zero, so no share is pushed below zero while the shares still
/// cover it.
fn absorb_into_largest(shares: &mut BTreeMap<MemberId, Money>, residual: Money) {
    if residual.is_zero() {
        return;
    }
    let mut order: Vec<(MemberId, Money)> =
        shares.iter().map(|(id, amount)| (id.clone(), *amount)).collect();
    order.sort_by(|x, y| y.1.cmp(&x.1).then_with(|| x.0.cmp(&y.0)));

    if residual.is_positive() {
        if let Some(share) = order.first().and_then(|(id, _)| shares.get_mut(id)) {
            *share += residual;
        }
        return;
    }

    let mut remaining = -residual.minor();
    while remaining > 0 {
        let mut took = false;
        for (id, _) in &order {
            if remaining == 0 {
                break;
            }
            match shares.get_mut(id) {
                Some(share) if share.is_positive() => {
                    *share -= Money::new(1);
                    remaining -= 1;
                    took = true;
                }
                _ => {}
            }
        }
        if !took {
            break;
        }
    }
}

fn ensure_non_negative(shares: &BTreeMap<MemberId, Money>) -> Result<(), SplitValidationError> {
    match shares.iter().find(|(_, amount)| amount.is_negative()) {
        Some((member, amount)) => Err(SplitValidationError::NegativeShare {
            member: member.clone(),
            amount: *amount,
        }),
        None => Ok(()),
    }
}
