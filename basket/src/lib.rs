// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Eco Basket: Pooled Credits
//!
//! A basket accepts credits from many batches that share a credit type and
//! satisfy the basket's admission rules, and hands out a fungible pool token
//! in return. Pool tokens can later be exchanged back for credits, oldest
//! batches first.
//!
//! - **basket**: the basket record, its allowed classes, admission rules,
//!   and the pool-token denom format.
//! - **projector**: per-(basket, batch) holdings kept alongside the ledger.
//! - **keeper**: create, put and take.
//!
//! For every basket, the sum of its batch holdings scaled by `10^exponent`
//! equals the circulating supply of its pool token.

pub mod basket;
pub mod keeper;
pub mod projector;

pub use basket::{Basket, BasketClass, CreateBasket, DateCriteria};
pub use keeper::{BasketCredit, BasketKeeper, TakeOutcome};
pub use projector::BasketBalance;
