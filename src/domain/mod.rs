//! Core domain layer. No external I/O dependencies.
//!
//! Entities and ledger rules live here. Dependencies flow inward.

pub mod balance;
pub mod entities;
pub mod errors;
pub mod money;
pub mod simplify;
pub mod split;

pub use balance::{Balances, fold, fold_group};
pub use entities::{
    Expense, ExpenseId, ExpenseSet, ForeignAmount, Group, GroupId, Member, MemberId,
    Notification, NotificationKind, SETTLEMENT_CATEGORY, SplitMode, Transfer,
};
pub use errors::{DomainError, SplitValidationError};
pub use money::{CurrencyCode, ExchangeRate, Money, RATE_SCALE};
pub use simplify::simplify;
pub use split::{Percentage, SplitRule, Splits, resolve};
