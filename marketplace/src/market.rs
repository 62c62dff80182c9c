//! # Market Registry
//!
//! Payment tokens are gated by an allow-list managed by the governance
//! authority. A market pairs a credit type with one allow-listed payment
//! denom; it is created the first time someone lists credits of that type
//! for that denom, and never deleted.
//!
//! Lazy creation is an insert against the unique (credit type, denom)
//! index. If another writer got there first the insert fails with
//! `AlreadyExists` and the loser reads the winner's row instead, so two
//! markets for one pair can never exist.

use serde::{Deserialize, Serialize};
use tracing::info;

use eco_ledger::bank::validate_coin_denom;
use eco_ledger::config::{prefix, PaginationConfig, SI_EXPONENTS};
use eco_ledger::credit::denom::validate_credit_type_abbrev;
use eco_ledger::store::keys::KeyBuilder;
use eco_ledger::store::table::{self, Scope};
use eco_ledger::store::{atomic, IndexKey, KvStore, PageRequest, PageResponse, Record, StoreError};
use eco_ledger::{Context, LedgerError, LedgerResult};

const BY_PAIR: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: u64,
    pub credit_type_abbrev: String,
    pub bank_denom: String,
    /// Reserved; always 0.
    pub precision_modifier: u32,
}

impl Record for Market {
    const TABLE: u8 = prefix::MARKET;
    const NAME: &'static str = "market";

    fn primary_key(&self) -> Vec<u8> {
        KeyBuilder::new().u64(self.id).build()
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![IndexKey::unique(
            BY_PAIR,
            pair_key(&self.credit_type_abbrev, &self.bank_denom),
        )]
    }
}

fn pair_key(credit_type_abbrev: &str, bank_denom: &str) -> Vec<u8> {
    KeyBuilder::new()
        .str(credit_type_abbrev)
        .str(bank_denom)
        .build()
}

/// A payment token sellers may ask for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedDenom {
    pub bank_denom: String,
    /// Denom shown to users, e.g. `REGEN` for `uregen`.
    pub display_denom: String,
    /// `bank_denom` units per `display_denom`, as a power of ten.
    pub exponent: u32,
}

impl Record for AllowedDenom {
    const TABLE: u8 = prefix::ALLOWED_DENOM;
    const NAME: &'static str = "allowed denom";

    fn primary_key(&self) -> Vec<u8> {
        KeyBuilder::new().str(&self.bank_denom).build()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Returns the market for the pair, creating it if the denom is
/// allow-listed. Runs inside the caller's transaction.
pub fn resolve(
    store: &mut dyn KvStore,
    credit_type_abbrev: &str,
    bank_denom: &str,
) -> LedgerResult<Market> {
    if let Some(existing) = market_by_pair(store, credit_type_abbrev, bank_denom)? {
        return Ok(existing);
    }
    if !is_denom_allowed(store, bank_denom)? {
        return Err(LedgerError::DenomNotAllowed(bank_denom.to_string()));
    }

    let market = Market {
        id: table::next_id::<Market>(store)?,
        credit_type_abbrev: credit_type_abbrev.to_string(),
        bank_denom: bank_denom.to_string(),
        precision_modifier: 0,
    };
    match table::insert(store, &market) {
        Ok(()) => {
            info!(
                market_id = market.id,
                credit_type = credit_type_abbrev,
                bank_denom,
                "market created"
            );
            Ok(market)
        }
        Err(StoreError::AlreadyExists { .. }) => {
            market_by_pair(store, credit_type_abbrev, bank_denom)?.ok_or_else(|| {
                LedgerError::Internal(format!(
                    "market for {credit_type_abbrev}/{bank_denom} vanished after conflict"
                ))
            })
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Allow-list administration
// ---------------------------------------------------------------------------

fn ensure_authority(ctx: &Context, authority: &str) -> LedgerResult<()> {
    if ctx.actor != authority {
        return Err(LedgerError::unauthorized(
            &ctx.actor,
            "is not the governance authority",
        ));
    }
    Ok(())
}

/// Adds a payment denom to the allow-list. Existing markets and orders are
/// unaffected.
pub fn add_allowed_denom(
    store: &mut dyn KvStore,
    ctx: &Context,
    authority: &str,
    denom: AllowedDenom,
) -> LedgerResult<()> {
    ensure_authority(ctx, authority)?;
    validate_coin_denom(&denom.bank_denom)?;
    validate_coin_denom(&denom.display_denom)?;
    if !SI_EXPONENTS.contains(&denom.exponent) {
        return Err(LedgerError::InvalidRequest(format!(
            "exponent {} has no SI prefix",
            denom.exponent
        )));
    }

    atomic(store, |tx| {
        table::insert(tx, &denom).map_err(|e| match e {
            StoreError::AlreadyExists { .. } => LedgerError::AlreadyExists {
                entity: AllowedDenom::NAME,
                id: denom.bank_denom.clone(),
            },
            other => other.into(),
        })
    })?;
    info!(
        bank_denom = %denom.bank_denom,
        display_denom = %denom.display_denom,
        exponent = denom.exponent,
        "denom allow-listed"
    );
    Ok(())
}

/// Removes a payment denom from the allow-list. Markets and open orders in
/// that denom stay as they are; new listings in it are refused.
pub fn remove_allowed_denom(
    store: &mut dyn KvStore,
    ctx: &Context,
    authority: &str,
    bank_denom: &str,
) -> LedgerResult<()> {
    ensure_authority(ctx, authority)?;
    atomic(store, |tx| {
        let key = KeyBuilder::new().str(bank_denom).build();
        table::delete::<AllowedDenom>(tx, &key).map_err(|e| match e {
            StoreError::NotFound { .. } => LedgerError::not_found(AllowedDenom::NAME, bank_denom),
            other => other.into(),
        })
    })?;
    info!(bank_denom, "denom removed from allow-list");
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn is_denom_allowed(store: &dyn KvStore, bank_denom: &str) -> LedgerResult<bool> {
    Ok(table::get::<AllowedDenom>(store, &KeyBuilder::new().str(bank_denom).build())?.is_some())
}

pub fn market(store: &dyn KvStore, id: u64) -> LedgerResult<Market> {
    Ok(table::must_get(
        store,
        &KeyBuilder::new().u64(id).build(),
        &id.to_string(),
    )?)
}

pub fn market_by_pair(
    store: &dyn KvStore,
    credit_type_abbrev: &str,
    bank_denom: &str,
) -> LedgerResult<Option<Market>> {
    validate_credit_type_abbrev(credit_type_abbrev)?;
    Ok(table::get_by_unique(
        store,
        BY_PAIR,
        &pair_key(credit_type_abbrev, bank_denom),
    )?)
}

pub fn markets(
    store: &dyn KvStore,
    page: &PageRequest,
    limits: &PaginationConfig,
) -> LedgerResult<(Vec<Market>, PageResponse)> {
    Ok(table::list(store, Scope::Primary, &[], page, limits)?)
}

pub fn allowed_denoms(
    store: &dyn KvStore,
    page: &PageRequest,
    limits: &PaginationConfig,
) -> LedgerResult<(Vec<AllowedDenom>, PageResponse)> {
    Ok(table::list(store, Scope::Primary, &[], page, limits)?)
}
