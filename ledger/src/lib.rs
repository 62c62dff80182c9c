// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Eco Ledger: Credit Accounting Core
//!
//! The bookkeeping layer for environmental credits. Every credit batch, every
//! holder balance, and every unit of escrow passes through this crate. The
//! marketplace and basket crates sit on top of it and never touch storage
//! except through the interfaces defined here.
//!
//! ## Architecture
//!
//! - **math**: exact decimal amounts. No floats, ever.
//! - **store**: the persistence boundary: a key-value trait, sled and
//!   in-memory backends, a transactional write cache, typed tables with
//!   secondary indexes, and cursor pagination.
//! - **credit**: credit types, classes, projects, batches, batch supply,
//!   and the three-pool balance ledger (tradable / escrowed / retired).
//! - **bank**: the payment-token collaborator used for sale proceeds and
//!   basket pool tokens.
//! - **config** / **logging** / **error**: the ambient stack.
//!
//! ## Design Philosophy
//!
//! 1. Credit mass is conserved. No operation creates or destroys credits
//!    except issuance and cancellation, and both are reflected in supply.
//! 2. Validate first, mutate second. Every public operation runs inside a
//!    write cache that only commits when the whole operation succeeded.
//! 3. Reference data (credit types, allow-lists) lives in the store and is
//!    passed in explicitly, never hidden in globals.

pub mod bank;
pub mod config;
pub mod context;
pub mod credit;
pub mod error;
pub mod logging;
pub mod math;
pub mod store;

pub use context::Context;
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use math::Dec;
