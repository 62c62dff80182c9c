//! # Credits
//!
//! - **denom**: identifier formats and address derivation
//! - **class**: credit types, classes, projects, batches, issuance
//! - **supply**: per-batch issued / retired / cancelled totals
//! - **balance**: the three-pool holder ledger

pub mod balance;
pub mod class;
pub mod denom;
pub mod supply;

pub use balance::{Balance, BatchTotals, Pool, Settlement};
pub use class::{Batch, BatchIssuance, CreateBatch, CreditClass, CreditType, Project};
pub use denom::BatchDenom;
pub use supply::BatchSupply;
