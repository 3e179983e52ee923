//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use thiserror::Error;

use super::entities::{MemberId, Transfer};
use super::money::Money;
use super::split::Percentage;

/// Malformed split input. Always rejected before anything is persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitValidationError {
    #[error("split has no participants")]
    EmptyParticipantSet,

    #[error("percentages sum to {total}, expected 100% (±0.1)")]
    PercentagesDoNotSum100 { total: Percentage },

    #[error("amounts sum to {actual}, expected {expected} (±1 minor unit)")]
    AmountsDoNotMatchTotal { expected: Money, actual: Money },

    #[error("share of {member} is negative: {amount}")]
    NegativeShare { member: MemberId, amount: Money },

    #[error("expense total is negative: {0}")]
    NegativeTotal(Money),

    #[error("participant {0} is listed more than once")]
    DuplicateParticipant(MemberId),

    #[error("invalid percentage: {0}")]
    InvalidPercentage(String),
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(#[from] SplitValidationError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Currency error: {0}")]
    Currency(String),

    #[error("Invalid settlement: {0}")]
    InvalidSettlement(String),

    #[error("Member {0} is not part of this group")]
    UnknownMember(MemberId),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The group's expense set changed since the caller's snapshot was read.
    #[error("Stale snapshot: expected group version {expected}, found {actual}")]
    StaleSnapshot { expected: u64, actual: u64 },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),

    /// A batch settlement stopped at `failed`; the `applied` settlements
    /// before it stay recorded.
    #[error("Batch settlement stopped after {applied} applied, failed on {failed}: {source}")]
    PartialBatchFailure {
        applied: usize,
        failed: Transfer,
        source: Box<DomainError>,
    },
}
