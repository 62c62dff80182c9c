//! # Balance Ledger
//!
//! Every holder's stake in a batch is one [`Balance`] row with three pools:
//!
//! - **tradable**: free to send, sell, or retire
//! - **escrowed**: locked behind an open sell order
//! - **retired**: permanently claimed, never moves again
//!
//! The pool arithmetic lives on `Balance` itself and is pure; the store
//! functions below load a row, apply one change, and write it back inside
//! the caller's transaction. None of them commit on their own. The
//! holder-facing operations at the bottom (`send`, `retire`, `cancel`) each
//! run in their own write cache.
//!
//! Any credit landing in a retired pool is also moved from the batch
//! supply's tradable total to its retired total, so
//! `Σ(tradable + escrowed) = supply.tradable` and `Σ retired = supply.retired`
//! hold after every operation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::class::{batch_by_denom, credit_type_of_batch, Batch};
use super::denom::validate_address;
use super::supply;
use crate::config::{prefix, PaginationConfig};
use crate::context::Context;
use crate::error::{LedgerError, LedgerResult};
use crate::math::Dec;
use crate::store::keys::KeyBuilder;
use crate::store::table::{self, Scope};
use crate::store::{atomic, IndexKey, KvStore, PageRequest, PageResponse, Record};

const BY_BATCH: u8 = 1;

/// Pool a debit is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pool {
    Tradable,
    Escrowed,
}

/// Pool a credit lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Settlement {
    Tradable,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub holder: String,
    pub batch_key: u64,
    pub tradable_amount: Dec,
    pub escrowed_amount: Dec,
    pub retired_amount: Dec,
}

impl Record for Balance {
    const TABLE: u8 = prefix::BALANCE;
    const NAME: &'static str = "balance";

    fn primary_key(&self) -> Vec<u8> {
        balance_key(&self.holder, self.batch_key)
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![IndexKey::multi(
            BY_BATCH,
            KeyBuilder::new().u64(self.batch_key).build(),
        )]
    }
}

fn balance_key(holder: &str, batch_key: u64) -> Vec<u8> {
    KeyBuilder::new().str(holder).u64(batch_key).build()
}

impl Balance {
    pub fn empty(holder: &str, batch_key: u64) -> Self {
        Self {
            holder: holder.to_string(),
            batch_key,
            tradable_amount: Dec::ZERO,
            escrowed_amount: Dec::ZERO,
            retired_amount: Dec::ZERO,
        }
    }

    /// Moves `amount` from tradable to escrowed.
    pub fn escrow(&mut self, amount: Dec, denom: &str) -> LedgerResult<()> {
        self.debit(Pool::Tradable, amount, denom)?;
        self.escrowed_amount = self.escrowed_amount.checked_add(amount)?;
        Ok(())
    }

    /// Moves `amount` out of escrow into `to`.
    pub fn release(&mut self, amount: Dec, to: Settlement, denom: &str) -> LedgerResult<()> {
        self.debit(Pool::Escrowed, amount, denom)?;
        self.credit(amount, to)
    }

    pub fn debit(&mut self, pool: Pool, amount: Dec, denom: &str) -> LedgerResult<()> {
        match pool {
            Pool::Tradable => {
                self.tradable_amount = self.tradable_amount.checked_sub(amount)?.ok_or_else(|| {
                    LedgerError::InsufficientFunds {
                        holder: self.holder.clone(),
                        denom: denom.to_string(),
                        available: self.tradable_amount,
                        requested: amount,
                    }
                })?;
            }
            Pool::Escrowed => {
                self.escrowed_amount = self.escrowed_amount.checked_sub(amount)?.ok_or_else(|| {
                    LedgerError::InsufficientEscrow {
                        holder: self.holder.clone(),
                        denom: denom.to_string(),
                        available: self.escrowed_amount,
                        requested: amount,
                    }
                })?;
            }
        }
        Ok(())
    }

    pub fn credit(&mut self, amount: Dec, to: Settlement) -> LedgerResult<()> {
        match to {
            Settlement::Tradable => {
                self.tradable_amount = self.tradable_amount.checked_add(amount)?;
            }
            Settlement::Retired => {
                self.retired_amount = self.retired_amount.checked_add(amount)?;
            }
        }
        Ok(())
    }

    /// tradable + escrowed + retired.
    pub fn total(&self) -> LedgerResult<Dec> {
        self.tradable_amount
            .checked_add(self.escrowed_amount)?
            .checked_add(self.retired_amount)
    }
}

// ---------------------------------------------------------------------------
// Store operations (caller's transaction)
// ---------------------------------------------------------------------------

/// The holder's balance in `batch`. `NotFound` if the holder never held it.
pub fn get_balance(store: &dyn KvStore, holder: &str, batch: &Batch) -> LedgerResult<Balance> {
    table::get(store, &balance_key(holder, batch.key))?
        .ok_or_else(|| LedgerError::not_found(Balance::NAME, format!("{holder}/{}", batch.denom)))
}

/// Like [`get_balance`], but an absent row reads as all-zero.
pub fn balance_or_empty(store: &dyn KvStore, holder: &str, batch_key: u64) -> LedgerResult<Balance> {
    Ok(table::get(store, &balance_key(holder, batch_key))?
        .unwrap_or_else(|| Balance::empty(holder, batch_key)))
}

/// Locks `amount` of the holder's tradable credits.
pub fn move_to_escrow(
    store: &mut dyn KvStore,
    holder: &str,
    batch: &Batch,
    amount: Dec,
) -> LedgerResult<()> {
    let mut bal = balance_or_empty(store, holder, batch.key)?;
    bal.escrow(amount, &batch.denom)?;
    table::save(store, &bal)?;
    debug!(holder, batch_denom = %batch.denom, amount = %amount, "credits escrowed");
    Ok(())
}

/// Unlocks `amount` of the holder's escrow into `to`.
pub fn release_escrow(
    store: &mut dyn KvStore,
    holder: &str,
    batch: &Batch,
    amount: Dec,
    to: Settlement,
) -> LedgerResult<()> {
    let mut bal = balance_or_empty(store, holder, batch.key)?;
    bal.release(amount, to, &batch.denom)?;
    table::save(store, &bal)?;
    if to == Settlement::Retired {
        supply::record_retirement(store, batch.key, amount)?;
    }
    debug!(holder, batch_denom = %batch.denom, amount = %amount, ?to, "escrow released");
    Ok(())
}

/// Debits `from`'s `pool` and credits `to`'s `settle` pool. Credits never
/// land in the recipient's escrow.
pub fn transfer(
    store: &mut dyn KvStore,
    from: &str,
    to: &str,
    batch: &Batch,
    amount: Dec,
    pool: Pool,
    settle: Settlement,
) -> LedgerResult<()> {
    let mut source = balance_or_empty(store, from, batch.key)?;
    source.debit(pool, amount, &batch.denom)?;
    table::save(store, &source)?;

    credit(store, to, batch.key, amount, settle)?;
    if settle == Settlement::Retired {
        supply::record_retirement(store, batch.key, amount)?;
    }
    debug!(
        from,
        to,
        batch_denom = %batch.denom,
        amount = %amount,
        ?pool,
        ?settle,
        "credits transferred"
    );
    Ok(())
}

/// Adds `amount` to a holder's pool without touching supply. Issuance and
/// transfers account for supply themselves.
pub(crate) fn credit(
    store: &mut dyn KvStore,
    holder: &str,
    batch_key: u64,
    amount: Dec,
    to: Settlement,
) -> LedgerResult<()> {
    let mut bal = balance_or_empty(store, holder, batch_key)?;
    bal.credit(amount, to)?;
    table::save(store, &bal)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Holder operations
// ---------------------------------------------------------------------------

/// Sends tradable credits from the caller to `recipient`; `retired` of them
/// are retired on receipt.
pub fn send(
    store: &mut dyn KvStore,
    ctx: &Context,
    recipient: &str,
    batch_denom: &str,
    tradable: Dec,
    retired: Dec,
) -> LedgerResult<()> {
    validate_address(recipient)?;
    if ctx.actor == recipient {
        return Err(LedgerError::InvalidRequest(
            "sender and recipient must differ".into(),
        ));
    }
    if tradable.is_zero() && retired.is_zero() {
        return Err(LedgerError::InvalidAmount("nothing to send".into()));
    }
    atomic(store, |tx| {
        let batch = batch_by_denom(tx, batch_denom)?;
        let precision = credit_type_of_batch(tx, &batch)?.precision;
        tradable.ensure_precision(precision)?;
        retired.ensure_precision(precision)?;
        let sender = ctx.actor.as_str();
        if tradable.is_positive() {
            let to = Settlement::Tradable;
            transfer(tx, sender, recipient, &batch, tradable, Pool::Tradable, to)?;
        }
        if retired.is_positive() {
            let to = Settlement::Retired;
            transfer(tx, sender, recipient, &batch, retired, Pool::Tradable, to)?;
        }
        Ok::<_, LedgerError>(())
    })?;
    info!(
        sender = %ctx.actor,
        recipient,
        batch_denom,
        tradable = %tradable,
        retired = %retired,
        "credits sent"
    );
    Ok(())
}

/// Retires `amount` of the caller's tradable credits.
pub fn retire(
    store: &mut dyn KvStore,
    ctx: &Context,
    batch_denom: &str,
    amount: Dec,
) -> LedgerResult<()> {
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount("retire amount must be positive".into()));
    }
    atomic(store, |tx| {
        let batch = batch_by_denom(tx, batch_denom)?;
        amount.ensure_precision(credit_type_of_batch(tx, &batch)?.precision)?;
        let mut bal = balance_or_empty(tx, &ctx.actor, batch.key)?;
        bal.debit(Pool::Tradable, amount, &batch.denom)?;
        bal.credit(amount, Settlement::Retired)?;
        table::save(tx, &bal)?;
        supply::record_retirement(tx, batch.key, amount)
    })?;
    info!(holder = %ctx.actor, batch_denom, amount = %amount, "credits retired");
    Ok(())
}

/// Destroys `amount` of the caller's tradable credits.
pub fn cancel(
    store: &mut dyn KvStore,
    ctx: &Context,
    batch_denom: &str,
    amount: Dec,
) -> LedgerResult<()> {
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount("cancel amount must be positive".into()));
    }
    atomic(store, |tx| {
        let batch = batch_by_denom(tx, batch_denom)?;
        amount.ensure_precision(credit_type_of_batch(tx, &batch)?.precision)?;
        let mut bal = balance_or_empty(tx, &ctx.actor, batch.key)?;
        bal.debit(Pool::Tradable, amount, &batch.denom)?;
        table::save(tx, &bal)?;
        supply::record_cancellation(tx, batch.key, amount)
    })?;
    info!(holder = %ctx.actor, batch_denom, amount = %amount, "credits cancelled");
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Holder balances of one batch, in holder order.
pub fn balances_by_batch(
    store: &dyn KvStore,
    batch_denom: &str,
    page: &PageRequest,
    limits: &PaginationConfig,
) -> LedgerResult<(Vec<Balance>, PageResponse)> {
    let batch = batch_by_denom(store, batch_denom)?;
    Ok(table::list(
        store,
        Scope::Index(BY_BATCH),
        &KeyBuilder::new().u64(batch.key).build(),
        page,
        limits,
    )?)
}

/// Per-pool sums over every holder of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchTotals {
    pub tradable: Dec,
    pub escrowed: Dec,
    pub retired: Dec,
}

pub fn batch_total(store: &dyn KvStore, batch_key: u64) -> LedgerResult<BatchTotals> {
    let mut totals = BatchTotals::default();
    let prefix = KeyBuilder::new().u64(batch_key).build();
    for entry in table::scan_prefix::<Balance>(store, Scope::Index(BY_BATCH), &prefix)? {
        let (_, bal) = entry?;
        totals.tradable = totals.tradable.checked_add(bal.tradable_amount)?;
        totals.escrowed = totals.escrowed.checked_add(bal.escrowed_amount)?;
        totals.retired = totals.retired.checked_add(bal.retired_amount)?;
    }
    Ok(totals)
}
