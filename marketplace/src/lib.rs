// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Eco Market: Credit Marketplace
//!
//! Sellers list credits for sale against allow-listed payment tokens; buyers
//! fill those listings directly. Built on `eco-ledger`: credits offered for
//! sale sit in the seller's escrowed pool until the order is filled,
//! cancelled, or expires.
//!
//! - **market**: the payment-denom allow-list and lazily created markets,
//!   one per (credit type, payment denom) pair.
//! - **sell_order**: the persisted order record and request types.
//! - **manager**: the order lifecycle: sell, update, cancel, expire, fill.
//!
//! ## Order Lifecycle
//!
//! ```text
//! Sell ──► Open ──► partially filled ──► Open
//!           │                              │
//!           ├──► filled to zero ──► closed ◄┘
//!           ├──► Cancel ──► closed (escrow back to tradable)
//!           └──► ExpireSweep ──► removed (escrow back to tradable)
//! ```
//!
//! Every public mutating operation is all-or-nothing: it runs inside a write
//! cache and commits only if every step succeeded.

pub mod manager;
pub mod market;
pub mod sell_order;

pub use manager::{FillOutcome, SellOrderManager};
pub use market::{AllowedDenom, Market};
pub use sell_order::{BuyDirect, SellOrder, SellOrderRequest, UpdateSellOrder};
