//! Application use cases. Orchestrate domain logic via ports.

mod fanout;
mod snapshot;

pub mod expense_service;
pub mod settlement_service;

pub use expense_service::{DraftAmount, ExpenseDraft, ExpenseService, LedgerUpdate};
pub use settlement_service::{
    BatchSettlement, SettleDebt, SettlementPlan, SettlementReceipt, SettlementService,
};
pub use snapshot::LedgerView;
