//! # Basket Keeper
//!
//! Creates baskets and moves credits in and out of them. Credits deposited
//! into a basket move to the basket's derived address in the balance
//! ledger; the depositor receives `amount × 10^exponent` pool tokens.
//! Taking burns pool tokens and pays out credits, oldest batches first.
//!
//! Every operation runs in its own write cache: ledger balances, basket
//! rows and pool-token balances commit together or not at all.

use tracing::info;

use eco_ledger::bank::{Bank, Coin};
use eco_ledger::config::{LedgerConfig, SI_EXPONENTS};
use eco_ledger::credit::balance::{self, Pool, Settlement};
use eco_ledger::credit::class::{batch_by_denom, class_by_id, class_of_batch, credit_type};
use eco_ledger::credit::denom::validate_address;
use eco_ledger::store::keys::KeyBuilder;
use eco_ledger::store::table::{self, Scope};
use eco_ledger::store::{atomic, KvStore, PageRequest, PageResponse, Record, StoreError};
use eco_ledger::{Context, Dec, LedgerError, LedgerResult};

use crate::basket::{
    basket_class_key, format_basket_denom, validate_basket_name, Basket, BasketClass,
    CreateBasket, BY_DENOM,
};
use crate::projector::{self, BasketBalance};

/// Credits of one batch offered to a basket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketCredit {
    pub batch_denom: String,
    pub amount: Dec,
}

impl BasketCredit {
    pub fn new(batch_denom: impl Into<String>, amount: Dec) -> Self {
        Self {
            batch_denom: batch_denom.into(),
            amount,
        }
    }
}

/// Credits paid out by a `take`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeOutcome {
    /// Per-batch amounts, in the order they were drawn.
    pub credits: Vec<BasketCredit>,
    pub retired: bool,
}

pub struct BasketKeeper<B: Bank> {
    bank: B,
    config: LedgerConfig,
}

impl<B: Bank> BasketKeeper<B> {
    pub fn new(bank: B, config: LedgerConfig) -> Self {
        Self { bank, config }
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Registers a new basket curated by the caller. Returns its pool-token
    /// denom.
    pub fn create(&self, store: &mut dyn KvStore, ctx: &Context, req: &CreateBasket) -> LedgerResult<String> {
        validate_address(&ctx.actor)?;
        validate_basket_name(&req.name)?;
        if !SI_EXPONENTS.contains(&req.exponent) {
            return Err(LedgerError::InvalidRequest(format!(
                "exponent {} has no SI prefix",
                req.exponent
            )));
        }
        if let Some(criteria) = &req.date_criteria {
            criteria.validate()?;
        }
        if req.allowed_classes.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "basket must allow at least one credit class".into(),
            ));
        }

        let denom = format_basket_denom(&req.name, &req.credit_type_abbrev, req.exponent)?;
        let basket = atomic(store, |tx| {
            let ctype = credit_type(tx, &req.credit_type_abbrev)?;
            if req.exponent < ctype.precision {
                return Err(LedgerError::InvalidRequest(format!(
                    "exponent {} is below credit type precision {}",
                    req.exponent, ctype.precision
                )));
            }

            let basket = Basket {
                id: table::next_id::<Basket>(tx)?,
                basket_denom: denom.clone(),
                name: req.name.clone(),
                curator: ctx.actor.clone(),
                credit_type_abbrev: req.credit_type_abbrev.clone(),
                exponent: req.exponent,
                disable_auto_retire: req.disable_auto_retire,
                date_criteria: req.date_criteria,
            };
            table::insert(tx, &basket).map_err(|e| match e {
                StoreError::AlreadyExists { .. } => LedgerError::AlreadyExists {
                    entity: Basket::NAME,
                    id: denom.clone(),
                },
                other => other.into(),
            })?;

            for class_id in &req.allowed_classes {
                let class = class_by_id(tx, class_id)?;
                if class.credit_type_abbrev != req.credit_type_abbrev {
                    return Err(LedgerError::InvalidRequest(format!(
                        "class {class_id} has credit type {}, basket requires {}",
                        class.credit_type_abbrev, req.credit_type_abbrev
                    )));
                }
                table::save(
                    tx,
                    &BasketClass {
                        basket_id: basket.id,
                        class_id: class_id.clone(),
                    },
                )?;
            }
            Ok(basket)
        })?;

        info!(
            basket_id = basket.id,
            basket_denom = %basket.basket_denom,
            curator = %basket.curator,
            exponent = basket.exponent,
            "basket created"
        );
        Ok(denom)
    }

    // -----------------------------------------------------------------------
    // Put
    // -----------------------------------------------------------------------

    /// Deposits the caller's tradable credits and mints pool tokens to the
    /// caller. Returns the pool tokens minted.
    pub fn put(
        &self,
        store: &mut dyn KvStore,
        ctx: &Context,
        basket_denom: &str,
        credits: &[BasketCredit],
    ) -> LedgerResult<Coin> {
        self.check_batch_size(credits.len())?;

        let minted = atomic(store, |tx| {
            let basket = load_basket(tx, basket_denom)?;
            let holder = basket.address();
            let min_start = basket
                .date_criteria
                .map(|c| c.min_start_date(ctx.block_time))
                .transpose()?;

            let mut deposited = Dec::ZERO;
            for credit in credits {
                let batch = batch_by_denom(tx, &credit.batch_denom)?;
                let class = class_of_batch(tx, &batch)?;
                if class.credit_type_abbrev != basket.credit_type_abbrev {
                    return Err(LedgerError::InvalidRequest(format!(
                        "batch {} has credit type {}, basket {} holds {}",
                        batch.denom,
                        class.credit_type_abbrev,
                        basket.basket_denom,
                        basket.credit_type_abbrev
                    )));
                }
                if table::get::<BasketClass>(tx, &basket_class_key(basket.id, &class.id))?.is_none() {
                    return Err(LedgerError::InvalidRequest(format!(
                        "class {} is not accepted by basket {}",
                        class.id, basket.basket_denom
                    )));
                }
                if let Some(min) = min_start {
                    if batch.start_date < min {
                        return Err(LedgerError::InvalidRequest(format!(
                            "batch {} starts {}, basket {} accepts batches from {}",
                            batch.denom, batch.start_date, basket.basket_denom, min
                        )));
                    }
                }

                projector::put(tx, basket.id, &batch.denom, credit.amount)?;
                balance::transfer(
                    tx,
                    &ctx.actor,
                    &holder,
                    &batch,
                    credit.amount,
                    Pool::Tradable,
                    Settlement::Tradable,
                )?;
                deposited = deposited.checked_add(credit.amount)?;
            }

            let tokens = deposited.scale_up(basket.exponent)?;
            if !tokens.is_integer() {
                return Err(LedgerError::Internal(format!(
                    "{deposited} credits do not convert to whole {} tokens",
                    basket.basket_denom
                )));
            }
            let coin = Coin::new(basket.basket_denom.clone(), tokens);
            self.bank.mint(tx, &ctx.actor, &coin)?;
            Ok(coin)
        })?;

        info!(
            owner = %ctx.actor,
            basket_denom,
            batches = credits.len(),
            minted = %minted,
            "credits put into basket"
        );
        Ok(minted)
    }

    // -----------------------------------------------------------------------
    // Take
    // -----------------------------------------------------------------------

    /// Burns `amount` of the caller's pool tokens and pays out the matching
    /// credits, oldest batch start date first. Baskets that keep
    /// auto-retire on require `retire_on_take`.
    pub fn take(
        &self,
        store: &mut dyn KvStore,
        ctx: &Context,
        basket_denom: &str,
        amount: Dec,
        retire_on_take: bool,
    ) -> LedgerResult<TakeOutcome> {
        if !amount.is_positive() || !amount.is_integer() {
            return Err(LedgerError::InvalidAmount(format!(
                "pool token amount must be a positive whole number, got {amount}"
            )));
        }

        let outcome = atomic(store, |tx| {
            let basket = load_basket(tx, basket_denom)?;
            if !basket.disable_auto_retire && !retire_on_take {
                return Err(LedgerError::InvalidRequest(format!(
                    "basket {basket_denom} requires credits to be retired on take"
                )));
            }
            let precision = credit_type(tx, &basket.credit_type_abbrev)?.precision;
            let wanted = amount.scale_down(basket.exponent)?;
            wanted.ensure_precision(precision)?;

            self.bank
                .burn(tx, &ctx.actor, &Coin::new(basket.basket_denom.clone(), amount))?;

            let settle = if retire_on_take {
                Settlement::Retired
            } else {
                Settlement::Tradable
            };
            let holder = basket.address();
            let mut remaining = wanted;
            let mut credits = Vec::new();
            for row in projector::oldest_first(tx, basket.id)? {
                if remaining.is_zero() {
                    break;
                }
                let draw = row.balance.min(remaining);
                let batch = batch_by_denom(tx, &row.batch_denom)?;
                projector::take(tx, basket.id, &row.batch_denom, draw)?;
                balance::transfer(tx, &holder, &ctx.actor, &batch, draw, Pool::Tradable, settle)?;
                remaining = remaining.checked_sub(draw)?.unwrap_or(Dec::ZERO);
                credits.push(BasketCredit::new(row.batch_denom, draw));
            }
            if !remaining.is_zero() {
                return Err(LedgerError::InsufficientBalance {
                    basket: basket_denom.to_string(),
                    denom: basket_denom.to_string(),
                    available: wanted.checked_sub(remaining)?.unwrap_or(Dec::ZERO),
                    requested: wanted,
                });
            }
            Ok(TakeOutcome {
                credits,
                retired: settle == Settlement::Retired,
            })
        })?;

        info!(
            owner = %ctx.actor,
            basket_denom,
            burned = %amount,
            batches = outcome.credits.len(),
            retired = outcome.retired,
            "credits taken from basket"
        );
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn basket(&self, store: &dyn KvStore, basket_denom: &str) -> LedgerResult<Basket> {
        load_basket(store, basket_denom)
    }

    pub fn baskets(&self, store: &dyn KvStore, page: &PageRequest) -> LedgerResult<(Vec<Basket>, PageResponse)> {
        Ok(table::list(store, Scope::Primary, &[], page, &self.config.pagination)?)
    }

    /// Class ids the basket accepts.
    pub fn basket_classes(&self, store: &dyn KvStore, basket_denom: &str) -> LedgerResult<Vec<String>> {
        let basket = load_basket(store, basket_denom)?;
        let prefix = KeyBuilder::new().u64(basket.id).build();
        Ok(table::collect_prefix::<BasketClass>(store, Scope::Primary, &prefix)?
            .into_iter()
            .map(|c| c.class_id)
            .collect())
    }

    /// The basket's holding of one batch; zero if it holds none.
    pub fn basket_balance(&self, store: &dyn KvStore, basket_id: u64, batch_denom: &str) -> LedgerResult<Dec> {
        projector::balance(store, basket_id, batch_denom)
    }

    pub fn basket_balances(
        &self,
        store: &dyn KvStore,
        basket_id: u64,
        page: &PageRequest,
    ) -> LedgerResult<(Vec<BasketBalance>, PageResponse)> {
        projector::list_balances(store, basket_id, page, &self.config.pagination)
    }

    fn check_batch_size(&self, n: usize) -> LedgerResult<()> {
        let max = self.config.basket.max_credits_per_request;
        if n == 0 {
            return Err(LedgerError::InvalidRequest("no credits given".into()));
        }
        if n > max {
            return Err(LedgerError::InvalidRequest(format!(
                "{n} credit entries exceed the per-request limit of {max}"
            )));
        }
        Ok(())
    }
}

fn load_basket(store: &dyn KvStore, basket_denom: &str) -> LedgerResult<Basket> {
    table::get_by_unique(store, BY_DENOM, &KeyBuilder::new().str(basket_denom).build())?
        .ok_or_else(|| LedgerError::not_found(Basket::NAME, basket_denom))
}
