//! # Bank: Payment Token Collaborator
//!
//! Sale proceeds and basket pool tokens are fungible coins, not credits. The
//! credit core does not own coins; it talks to whatever implements [`Bank`].
//!
//! [`StoreBank`] is the provided implementation. It keeps coin balances and
//! per-denom supply in the same store as the ledger, so a payment commits or
//! rolls back together with the credit movement it pays for.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::prefix;
use crate::error::{LedgerError, LedgerResult};
use crate::math::Dec;
use crate::store::keys::KeyBuilder;
use crate::store::{table, KvStore, Record};

/// Minimum and maximum length of a coin denomination.
const DENOM_MIN_LEN: usize = 3;
const DENOM_MAX_LEN: usize = 128;

/// An amount of a fungible token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: Dec,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: Dec) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Checks a coin denomination: a letter followed by letters, digits, or
/// one of `/ : . _ -`, 3 to 128 characters in total.
pub fn validate_coin_denom(denom: &str) -> LedgerResult<()> {
    let mut chars = denom.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let body_ok = chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c));
    if !starts_with_letter
        || !body_ok
        || denom.len() < DENOM_MIN_LEN
        || denom.len() > DENOM_MAX_LEN
    {
        return Err(LedgerError::InvalidRequest(format!(
            "invalid coin denom {denom:?}"
        )));
    }
    Ok(())
}

/// Coin accounting used by the marketplace and baskets.
///
/// Every method runs against the caller's store handle, which is normally
/// the write cache of the enclosing transaction.
pub trait Bank {
    fn balance(&self, store: &dyn KvStore, address: &str, denom: &str) -> LedgerResult<Dec>;

    /// Moves `coin` from `from` to `to`. `InsufficientFunds` if `from` is
    /// short.
    fn send(&self, store: &mut dyn KvStore, from: &str, to: &str, coin: &Coin)
        -> LedgerResult<()>;

    /// Creates `coin` out of nothing and credits it to `to`.
    fn mint(&self, store: &mut dyn KvStore, to: &str, coin: &Coin) -> LedgerResult<()>;

    /// Destroys `coin` held by `from`. `InsufficientFunds` if `from` is short.
    fn burn(&self, store: &mut dyn KvStore, from: &str, coin: &Coin) -> LedgerResult<()>;

    /// Total amount of `denom` in existence.
    fn supply(&self, store: &dyn KvStore, denom: &str) -> LedgerResult<Dec>;
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinBalance {
    pub address: String,
    pub denom: String,
    pub amount: Dec,
}

impl Record for CoinBalance {
    const TABLE: u8 = prefix::COIN_BALANCE;
    const NAME: &'static str = "coin balance";

    fn primary_key(&self) -> Vec<u8> {
        balance_key(&self.address, &self.denom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinSupply {
    pub denom: String,
    pub amount: Dec,
}

impl Record for CoinSupply {
    const TABLE: u8 = prefix::COIN_SUPPLY;
    const NAME: &'static str = "coin supply";

    fn primary_key(&self) -> Vec<u8> {
        KeyBuilder::new().str(&self.denom).build()
    }
}

fn balance_key(address: &str, denom: &str) -> Vec<u8> {
    KeyBuilder::new().str(address).str(denom).build()
}

// ---------------------------------------------------------------------------
// StoreBank
// ---------------------------------------------------------------------------

/// [`Bank`] backed by the ledger's own store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreBank;

impl StoreBank {
    pub fn new() -> Self {
        Self
    }

    fn credit(store: &mut dyn KvStore, address: &str, coin: &Coin) -> LedgerResult<()> {
        let current = Self::read_balance(store, address, &coin.denom)?;
        let row = CoinBalance {
            address: address.to_string(),
            denom: coin.denom.clone(),
            amount: current.checked_add(coin.amount)?,
        };
        table::save(store, &row)?;
        Ok(())
    }

    fn debit(store: &mut dyn KvStore, address: &str, coin: &Coin) -> LedgerResult<()> {
        let current = Self::read_balance(store, address, &coin.denom)?;
        let remaining =
            current
                .checked_sub(coin.amount)?
                .ok_or_else(|| LedgerError::InsufficientFunds {
                    holder: address.to_string(),
                    denom: coin.denom.clone(),
                    available: current,
                    requested: coin.amount,
                })?;
        let row = CoinBalance {
            address: address.to_string(),
            denom: coin.denom.clone(),
            amount: remaining,
        };
        if remaining.is_zero() {
            if table::get::<CoinBalance>(store, &row.primary_key())?.is_some() {
                table::delete::<CoinBalance>(store, &row.primary_key())?;
            }
        } else {
            table::save(store, &row)?;
        }
        Ok(())
    }

    fn read_balance(store: &dyn KvStore, address: &str, denom: &str) -> LedgerResult<Dec> {
        Ok(table::get::<CoinBalance>(store, &balance_key(address, denom))?
            .map(|b| b.amount)
            .unwrap_or(Dec::ZERO))
    }

    fn adjust_supply(
        store: &mut dyn KvStore,
        denom: &str,
        f: impl FnOnce(Dec) -> LedgerResult<Dec>,
    ) -> LedgerResult<()> {
        let key = KeyBuilder::new().str(denom).build();
        let current = table::get::<CoinSupply>(store, &key)?
            .map(|s| s.amount)
            .unwrap_or(Dec::ZERO);
        let row = CoinSupply {
            denom: denom.to_string(),
            amount: f(current)?,
        };
        table::save(store, &row)?;
        Ok(())
    }
}

impl Bank for StoreBank {
    fn balance(&self, store: &dyn KvStore, address: &str, denom: &str) -> LedgerResult<Dec> {
        Self::read_balance(store, address, denom)
    }

    fn send(
        &self,
        store: &mut dyn KvStore,
        from: &str,
        to: &str,
        coin: &Coin,
    ) -> LedgerResult<()> {
        if coin.amount.is_zero() {
            return Ok(());
        }
        Self::debit(store, from, coin)?;
        Self::credit(store, to, coin)?;
        debug!(from, to, coin = %coin, "coins sent");
        Ok(())
    }

    fn mint(&self, store: &mut dyn KvStore, to: &str, coin: &Coin) -> LedgerResult<()> {
        validate_coin_denom(&coin.denom)?;
        if coin.amount.is_zero() {
            return Ok(());
        }
        Self::credit(store, to, coin)?;
        Self::adjust_supply(store, &coin.denom, |s| s.checked_add(coin.amount))?;
        debug!(to, coin = %coin, "coins minted");
        Ok(())
    }

    fn burn(&self, store: &mut dyn KvStore, from: &str, coin: &Coin) -> LedgerResult<()> {
        if coin.amount.is_zero() {
            return Ok(());
        }
        Self::debit(store, from, coin)?;
        Self::adjust_supply(store, &coin.denom, |s| {
            s.checked_sub(coin.amount)?.ok_or_else(|| {
                LedgerError::Internal(format!("burn exceeds supply of {}", coin.denom))
            })
        })?;
        debug!(from, coin = %coin, "coins burned");
        Ok(())
    }

    fn supply(&self, store: &dyn KvStore, denom: &str) -> LedgerResult<Dec> {
        let key = KeyBuilder::new().str(denom).build();
        Ok(table::get::<CoinSupply>(store, &key)?
            .map(|s| s.amount)
            .unwrap_or(Dec::ZERO))
    }
}
