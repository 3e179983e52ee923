//! Domain entities. Pure data structures for the ledger.
//!
//! No storage or transport types here; adapters map their rows into these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::errors::DomainError;
use super::money::{CurrencyCode, ExchangeRate, Money};
use super::split::Splits;

/// Category stored on every settlement record.
pub const SETTLEMENT_CATEGORY: &str = "settlement";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Stable member identifier. Ordering on ids is the canonical order used
    /// for remainder distribution and tie-breaks.
    MemberId
);
string_id!(GroupId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(Uuid);

impl ExpenseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|_| DomainError::NotFound(format!("invalid expense id: {value}")))
    }
}

impl Default for ExpenseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub display_name: String,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A group of members sharing expenses in one home currency.
///
/// `members` holds the *current* members; people who left keep their
/// history in the expense records and stay addressable by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub owner_id: MemberId,
    pub home_currency: CurrencyCode,
    pub members: BTreeMap<MemberId, Member>,
}

impl Group {
    /// New group whose owner is its first member.
    pub fn new(id: impl Into<GroupId>, owner: Member, home_currency: CurrencyCode) -> Self {
        let owner_id = owner.id.clone();
        let mut members = BTreeMap::new();
        members.insert(owner.id.clone(), owner);
        Self {
            id: id.into(),
            owner_id,
            home_currency,
            members,
        }
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.members.insert(member.id.clone(), member);
        self
    }

    pub fn is_member(&self, id: &MemberId) -> bool {
        self.members.contains_key(id)
    }

    pub fn is_owner(&self, id: &MemberId) -> bool {
        &self.owner_id == id
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &MemberId> {
        self.members.keys()
    }

    /// Display name, falling back to the raw id for departed members.
    pub fn display_name<'a>(&'a self, id: &'a MemberId) -> &'a str {
        self.members
            .get(id)
            .map(|m| m.display_name.as_str())
            .unwrap_or(id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    Equal,
    Percentage,
    FixedAmount,
}

impl SplitMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Percentage => "percentage",
            Self::FixedAmount => "fixed_amount",
        }
    }
}

impl TryFrom<&str> for SplitMode {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "equal" => Ok(Self::Equal),
            "percentage" => Ok(Self::Percentage),
            "fixed_amount" => Ok(Self::FixedAmount),
            other => Err(DomainError::Persistence(format!(
                "invalid split mode: {other}"
            ))),
        }
    }
}

/// Original amount of an expense paid in a foreign currency, with the rate
/// snapshot used to convert it into the home currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignAmount {
    pub amount: Money,
    pub currency: CurrencyCode,
    pub rate: ExchangeRate,
}

impl ForeignAmount {
    /// Convert into `home` using the stored snapshot.
    pub fn to_home(&self, home: &CurrencyCode) -> Result<Money, DomainError> {
        if self.rate.from != self.currency {
            return Err(DomainError::Currency(format!(
                "rate converts from {}, amount is in {}",
                self.rate.from, self.currency
            )));
        }
        if &self.rate.to != home {
            return Err(DomainError::Currency(format!(
                "rate converts to {}, group currency is {home}",
                self.rate.to
            )));
        }
        self.rate.convert(self.amount)
    }
}

/// One ledger record. `total` is in the group's home currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    pub payer_id: MemberId,
    pub total: Money,
    pub currency: CurrencyCode,
    pub foreign: Option<ForeignAmount>,
    pub category: String,
    pub description: String,
    pub split_mode: SplitMode,
    pub splits: Splits,
    pub is_settlement: bool,
    pub idempotency_key: Option<String>,
    pub created_by: MemberId,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Settlement record: the debtor `from` pays `to`. Exactly one split entry.
    pub fn settlement(
        group: &Group,
        from: MemberId,
        to: MemberId,
        amount: Money,
        created_by: MemberId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::InvalidSettlement(format!(
                "amount must be > 0, got {amount}"
            )));
        }
        if amount > Money::MAX_RECORDABLE {
            return Err(DomainError::InvalidSettlement(format!(
                "amount {amount} exceeds the maximum of {}",
                Money::MAX_RECORDABLE
            )));
        }
        if from == to {
            return Err(DomainError::InvalidSettlement(format!(
                "{from} cannot settle with themselves"
            )));
        }
        Ok(Self {
            id: ExpenseId::new(),
            group_id: group.id.clone(),
            payer_id: from,
            total: amount,
            currency: group.home_currency.clone(),
            foreign: None,
            category: SETTLEMENT_CATEGORY.to_string(),
            description: String::new(),
            split_mode: SplitMode::FixedAmount,
            splits: Splits::single(to, amount),
            is_settlement: true,
            idempotency_key: None,
            created_by,
            created_at,
        })
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }

    /// Creditor and amount of a settlement record.
    pub fn settlement_creditor(&self) -> Option<(&MemberId, Money)> {
        if !self.is_settlement {
            return None;
        }
        self.splits.iter().next()
    }

    /// Check record-level invariants. Stores call this on every loaded row.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.total > Money::MAX_RECORDABLE {
            return Err(DomainError::InvalidAmount(format!(
                "expense {}: total {} exceeds the maximum of {}",
                self.id,
                self.total,
                Money::MAX_RECORDABLE
            )));
        }
        if self.splits.total() != self.total {
            return Err(DomainError::InvalidAmount(format!(
                "expense {}: splits sum to {}, total is {}",
                self.id,
                self.splits.total(),
                self.total
            )));
        }
        if self.is_settlement {
            if self.splits.len() != 1 {
                return Err(DomainError::InvalidSettlement(format!(
                    "settlement {} must have exactly one creditor, has {}",
                    self.id,
                    self.splits.len()
                )));
            }
            if self.splits.contains(&self.payer_id) {
                return Err(DomainError::InvalidSettlement(format!(
                    "settlement {} pays its own payer",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Settlement instruction: `from` pays `amount` to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Money,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.from, self.to, self.amount)
    }
}

/// Expense records of one group as read from the store, with the group
/// version they were read at.
#[derive(Debug, Clone, Default)]
pub struct ExpenseSet {
    pub expenses: Vec<Expense>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SettlementRecorded,
    ExpenseAdded,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SettlementRecorded => "settlement_recorded",
            Self::ExpenseAdded => "expense_added",
        }
    }
}

/// Message handed to the notification sink, one per recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub user_id: MemberId,
    pub group_id: GroupId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub metadata: serde_json::Value,
}
