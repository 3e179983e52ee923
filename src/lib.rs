//! group-ledger: group-expense ledger with exact splits, balance folding and
//! debt settlement, in a hexagonal layout.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
