//! Per-batch supply totals.
//!
//! `tradable_amount` counts every unretired credit still in circulation,
//! including credits sitting in escrow. Together with `retired_amount` it
//! always equals issued minus cancelled.

use serde::{Deserialize, Serialize};

use crate::config::prefix;
use crate::error::{LedgerError, LedgerResult};
use crate::math::Dec;
use crate::store::keys::KeyBuilder;
use crate::store::{table, KvStore, Record};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSupply {
    pub batch_key: u64,
    pub tradable_amount: Dec,
    pub retired_amount: Dec,
    pub cancelled_amount: Dec,
}

impl Record for BatchSupply {
    const TABLE: u8 = prefix::BATCH_SUPPLY;
    const NAME: &'static str = "batch supply";

    fn primary_key(&self) -> Vec<u8> {
        supply_key(self.batch_key)
    }
}

fn supply_key(batch_key: u64) -> Vec<u8> {
    KeyBuilder::new().u64(batch_key).build()
}

impl BatchSupply {
    pub fn empty(batch_key: u64) -> Self {
        Self {
            batch_key,
            tradable_amount: Dec::ZERO,
            retired_amount: Dec::ZERO,
            cancelled_amount: Dec::ZERO,
        }
    }

    /// Issued minus cancelled.
    pub fn outstanding(&self) -> LedgerResult<Dec> {
        self.tradable_amount.checked_add(self.retired_amount)
    }
}

pub fn batch_supply(store: &dyn KvStore, batch_key: u64) -> LedgerResult<BatchSupply> {
    Ok(table::must_get(
        store,
        &supply_key(batch_key),
        &batch_key.to_string(),
    )?)
}

/// Adds newly issued credits.
pub(crate) fn record_issuance(
    store: &mut dyn KvStore,
    batch_key: u64,
    tradable: Dec,
    retired: Dec,
) -> LedgerResult<()> {
    let mut supply = table::get::<BatchSupply>(store, &supply_key(batch_key))?
        .unwrap_or_else(|| BatchSupply::empty(batch_key));
    supply.tradable_amount = supply.tradable_amount.checked_add(tradable)?;
    supply.retired_amount = supply.retired_amount.checked_add(retired)?;
    table::save(store, &supply)?;
    Ok(())
}

/// Shifts `amount` from circulation into the retired total.
pub(crate) fn record_retirement(
    store: &mut dyn KvStore,
    batch_key: u64,
    amount: Dec,
) -> LedgerResult<()> {
    let mut supply = batch_supply(store, batch_key)?;
    supply.tradable_amount = supply
        .tradable_amount
        .checked_sub(amount)?
        .ok_or_else(|| drift(batch_key, "retirement"))?;
    supply.retired_amount = supply.retired_amount.checked_add(amount)?;
    table::update(store, &supply)?;
    Ok(())
}

/// Removes `amount` from circulation for good.
pub(crate) fn record_cancellation(
    store: &mut dyn KvStore,
    batch_key: u64,
    amount: Dec,
) -> LedgerResult<()> {
    let mut supply = batch_supply(store, batch_key)?;
    supply.tradable_amount = supply
        .tradable_amount
        .checked_sub(amount)?
        .ok_or_else(|| drift(batch_key, "cancellation"))?;
    supply.cancelled_amount = supply.cancelled_amount.checked_add(amount)?;
    table::update(store, &supply)?;
    Ok(())
}

/// Holder balances were checked first, so supply running short means the
/// two tables disagree.
fn drift(batch_key: u64, op: &str) -> LedgerError {
    tracing::error!(batch_key, op, "batch supply smaller than holder balances");
    LedgerError::Internal(format!("supply accounting mismatch on {op}"))
}
