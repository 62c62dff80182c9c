//! # Sell Order Manager
//!
//! Owns the order lifecycle. Listing credits moves them from the seller's
//! tradable pool into escrow; every later step (update, cancel, expiry,
//! fill) moves exactly the escrow the order holds, so an order's `quantity`
//! and the escrow backing it never drift apart.
//!
//! Each public operation runs in its own write cache. Batched calls (`sell`
//! with many orders, `update_many`, `buy_direct_many`) are a single unit:
//! one bad entry rejects the whole call and nothing is written.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use eco_ledger::bank::{validate_coin_denom, Bank, Coin};
use eco_ledger::config::LedgerConfig;
use eco_ledger::credit::balance::{self, Pool, Settlement};
use eco_ledger::credit::class::{batch_by_denom, batch_by_key, credit_type_of_batch};
use eco_ledger::credit::denom::validate_address;
use eco_ledger::store::keys::{encode_time, KeyBuilder};
use eco_ledger::store::table::{self, Scope};
use eco_ledger::store::{atomic, prefix_end, KvStore, PageRequest, PageResponse, StoreResult};
use eco_ledger::{Context, Dec, LedgerError, LedgerResult};

use crate::market;
use crate::sell_order::{
    order_key, BuyDirect, SellOrder, SellOrderRequest, UpdateSellOrder, BY_BATCH, BY_EXPIRATION,
    BY_SELLER,
};

/// Result of filling (part of) one sell order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillOutcome {
    pub sell_order_id: u64,
    pub filled: Dec,
    /// Quantity left on the order after this fill.
    pub remaining: Dec,
    /// `true` if the fill emptied the order and it was removed.
    pub closed: bool,
    /// What the buyer paid: `filled × ask_amount` in the market's denom.
    pub total_cost: Coin,
    /// `true` if the credits landed in the buyer's retired pool.
    pub retired: bool,
}

pub struct SellOrderManager<B: Bank> {
    bank: B,
    config: LedgerConfig,
}

impl<B: Bank> SellOrderManager<B> {
    pub fn new(bank: B, config: LedgerConfig) -> Self {
        Self { bank, config }
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Sell
    // -----------------------------------------------------------------------

    /// Lists credits for sale. Returns the new order ids in request order.
    pub fn sell(
        &self,
        store: &mut dyn KvStore,
        ctx: &Context,
        orders: &[SellOrderRequest],
    ) -> LedgerResult<Vec<u64>> {
        self.check_batch_size(orders.len())?;
        let ids = atomic(store, |tx| {
            orders
                .iter()
                .map(|req| self.sell_one(tx, ctx, req))
                .collect::<LedgerResult<Vec<u64>>>()
        })?;
        info!(seller = %ctx.actor, order_ids = ?ids, "sell orders created");
        Ok(ids)
    }

    fn sell_one(
        &self,
        tx: &mut dyn KvStore,
        ctx: &Context,
        req: &SellOrderRequest,
    ) -> LedgerResult<u64> {
        let batch = batch_by_denom(tx, &req.batch_denom)?;
        let ctype = credit_type_of_batch(tx, &batch)?;
        ensure_quantity(req.quantity, ctype.precision)?;
        validate_price(&req.ask_price)?;
        if let Some(expiration) = req.expiration {
            ensure_future(expiration, ctx.block_time)?;
        }
        ensure_denom_allowed(tx, &req.ask_price.denom)?;
        let mkt = market::resolve(tx, &ctype.abbreviation, &req.ask_price.denom)?;

        balance::move_to_escrow(tx, &ctx.actor, &batch, req.quantity)?;

        let order = SellOrder {
            id: table::next_id::<SellOrder>(tx)?,
            seller: ctx.actor.clone(),
            batch_key: batch.key,
            quantity: req.quantity,
            ask_amount: req.ask_price.amount,
            market_id: mkt.id,
            disable_auto_retire: req.disable_auto_retire,
            expiration: req.expiration,
            maker: true,
        };
        table::insert(tx, &order)?;
        debug!(
            order_id = order.id,
            batch_denom = %batch.denom,
            quantity = %order.quantity,
            ask = %req.ask_price,
            "sell order staged"
        );
        Ok(order.id)
    }

    // -----------------------------------------------------------------------
    // Cancel
    // -----------------------------------------------------------------------

    /// Cancels an order and returns its escrow to the seller's tradable pool.
    pub fn cancel(&self, store: &mut dyn KvStore, ctx: &Context, order_id: u64) -> LedgerResult<()> {
        let released = atomic(store, |tx| {
            let order = load_order(tx, order_id)?;
            ensure_seller(ctx, &order)?;
            let batch = batch_by_key(tx, order.batch_key)?;
            let to = Settlement::Tradable;
            balance::release_escrow(tx, &order.seller, &batch, order.quantity, to)?;
            table::delete::<SellOrder>(tx, &order_key(order_id))?;
            Ok::<_, LedgerError>(order.quantity)
        })?;
        info!(order_id, seller = %ctx.actor, released = %released, "sell order cancelled");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    pub fn update(
        &self,
        store: &mut dyn KvStore,
        ctx: &Context,
        update: UpdateSellOrder,
    ) -> LedgerResult<()> {
        self.update_many(store, ctx, std::slice::from_ref(&update))
    }

    /// Applies every update or none of them.
    pub fn update_many(
        &self,
        store: &mut dyn KvStore,
        ctx: &Context,
        updates: &[UpdateSellOrder],
    ) -> LedgerResult<()> {
        self.check_batch_size(updates.len())?;
        atomic(store, |tx| {
            updates
                .iter()
                .try_for_each(|u| self.update_one(tx, ctx, u))
        })?;
        info!(
            seller = %ctx.actor,
            order_ids = ?updates.iter().map(|u| u.sell_order_id).collect::<Vec<_>>(),
            "sell orders updated"
        );
        Ok(())
    }

    fn update_one(
        &self,
        tx: &mut dyn KvStore,
        ctx: &Context,
        upd: &UpdateSellOrder,
    ) -> LedgerResult<()> {
        let mut order = load_order(tx, upd.sell_order_id)?;
        ensure_seller(ctx, &order)?;
        let batch = batch_by_key(tx, order.batch_key)?;
        let ctype = credit_type_of_batch(tx, &batch)?;

        if let Some(new_quantity) = upd.new_quantity {
            ensure_quantity(new_quantity, ctype.precision)?;
            if let Some(increase) = new_quantity.checked_sub(order.quantity)? {
                if increase.is_positive() {
                    balance::move_to_escrow(tx, &order.seller, &batch, increase)?;
                }
            } else if let Some(decrease) = order.quantity.checked_sub(new_quantity)? {
                let to = Settlement::Tradable;
                balance::release_escrow(tx, &order.seller, &batch, decrease, to)?;
            }
            order.quantity = new_quantity;
        }

        if let Some(price) = &upd.new_ask_price {
            validate_price(price)?;
            ensure_denom_allowed(tx, &price.denom)?;
            let current = market::market(tx, order.market_id)?;
            if current.bank_denom != price.denom {
                order.market_id = market::resolve(tx, &ctype.abbreviation, &price.denom)?.id;
            }
            order.ask_amount = price.amount;
        }

        if let Some(flag) = upd.disable_auto_retire {
            order.disable_auto_retire = flag;
        }

        if let Some(expiration) = upd.new_expiration {
            ensure_future(expiration, ctx.block_time)?;
            order.expiration = Some(expiration);
        }

        table::update(tx, &order)?;
        debug!(order_id = order.id, quantity = %order.quantity, "sell order update staged");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    /// Removes every order whose expiration is at or before `block_time`,
    /// releasing its escrow. Orders are processed in (expiration, id) order;
    /// the returned ids follow that order.
    pub fn expire_sweep(
        &self,
        store: &mut dyn KvStore,
        block_time: DateTime<Utc>,
    ) -> LedgerResult<Vec<u64>> {
        let pruned = atomic(store, |tx| {
            let upper = prefix_end(&encode_time(&block_time));
            let expired = table::scan::<SellOrder>(
                tx,
                Scope::Index(BY_EXPIRATION),
                &[],
                upper.as_deref(),
            )?
            .map(|entry| entry.map(|(_, order)| order))
            .collect::<StoreResult<Vec<_>>>()?;

            let mut pruned = Vec::with_capacity(expired.len());
            for order in expired {
                let batch = batch_by_key(tx, order.batch_key)?;
                balance::release_escrow(
                    tx,
                    &order.seller,
                    &batch,
                    order.quantity,
                    Settlement::Tradable,
                )?;
                table::delete::<SellOrder>(tx, &order_key(order.id))?;
                debug!(order_id = order.id, seller = %order.seller, "sell order expired");
                pruned.push(order.id);
            }
            Ok::<_, LedgerError>(pruned)
        })?;
        if !pruned.is_empty() {
            info!(%block_time, count = pruned.len(), order_ids = ?pruned, "expired sell orders pruned");
        }
        Ok(pruned)
    }

    // -----------------------------------------------------------------------
    // Fill
    // -----------------------------------------------------------------------

    /// Buys credits from one sell order at its ask price.
    pub fn buy_direct(
        &self,
        store: &mut dyn KvStore,
        ctx: &Context,
        buy: &BuyDirect,
    ) -> LedgerResult<FillOutcome> {
        let mut outcomes = self.buy_direct_many(store, ctx, std::slice::from_ref(buy))?;
        outcomes
            .pop()
            .ok_or_else(|| LedgerError::Internal("fill produced no outcome".into()))
    }

    /// Fills several orders as one unit.
    pub fn buy_direct_many(
        &self,
        store: &mut dyn KvStore,
        ctx: &Context,
        buys: &[BuyDirect],
    ) -> LedgerResult<Vec<FillOutcome>> {
        self.check_batch_size(buys.len())?;
        validate_address(&ctx.actor)?;
        let outcomes = atomic(store, |tx| {
            buys.iter()
                .map(|buy| self.fill(tx, ctx, buy))
                .collect::<LedgerResult<Vec<_>>>()
        })?;
        for o in &outcomes {
            info!(
                order_id = o.sell_order_id,
                buyer = %ctx.actor,
                filled = %o.filled,
                remaining = %o.remaining,
                cost = %o.total_cost,
                retired = o.retired,
                closed = o.closed,
                "sell order filled"
            );
        }
        Ok(outcomes)
    }

    fn fill(&self, tx: &mut dyn KvStore, ctx: &Context, buy: &BuyDirect) -> LedgerResult<FillOutcome> {
        let mut order = load_order(tx, buy.sell_order_id)?;
        if order.seller == ctx.actor {
            return Err(LedgerError::InvalidRequest(format!(
                "seller cannot buy from own sell order {}",
                order.id
            )));
        }
        if let Some(expiration) = order.expiration.filter(|_| order.is_expired(&ctx.block_time)) {
            return Err(LedgerError::InvalidExpiration {
                expiration,
                block_time: ctx.block_time,
            });
        }

        let batch = batch_by_key(tx, order.batch_key)?;
        let ctype = credit_type_of_batch(tx, &batch)?;
        ensure_quantity(buy.quantity, ctype.precision)?;
        let remaining = order.quantity.checked_sub(buy.quantity)?.ok_or_else(|| {
            LedgerError::InvalidAmount(format!(
                "requested {} exceeds {} remaining on sell order {}",
                buy.quantity, order.quantity, order.id
            ))
        })?;

        let mkt = market::market(tx, order.market_id)?;
        if buy.bid_price.denom != mkt.bank_denom {
            return Err(LedgerError::InvalidRequest(format!(
                "bid denom {} does not match ask denom {}",
                buy.bid_price.denom, mkt.bank_denom
            )));
        }
        if buy.bid_price.amount < order.ask_amount {
            return Err(LedgerError::InvalidAmount(format!(
                "bid {} is below ask {}{}",
                buy.bid_price, order.ask_amount, mkt.bank_denom
            )));
        }
        let settle = settlement(order.disable_auto_retire, buy.disable_auto_retire)?;

        let total_cost = Coin::new(mkt.bank_denom, buy.quantity.checked_mul(order.ask_amount)?);
        self.bank.send(tx, &ctx.actor, &order.seller, &total_cost)?;
        balance::transfer(
            tx,
            &order.seller,
            &ctx.actor,
            &batch,
            buy.quantity,
            Pool::Escrowed,
            settle,
        )?;

        let closed = remaining.is_zero();
        if closed {
            table::delete::<SellOrder>(tx, &order_key(order.id))?;
        } else {
            order.quantity = remaining;
            table::update(tx, &order)?;
        }

        Ok(FillOutcome {
            sell_order_id: order.id,
            filled: buy.quantity,
            remaining,
            closed,
            total_cost,
            retired: settle == Settlement::Retired,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn sell_order(&self, store: &dyn KvStore, id: u64) -> LedgerResult<SellOrder> {
        load_order(store, id)
    }

    pub fn sell_orders(
        &self,
        store: &dyn KvStore,
        page: &PageRequest,
    ) -> LedgerResult<(Vec<SellOrder>, PageResponse)> {
        Ok(table::list(store, Scope::Primary, &[], page, &self.config.pagination)?)
    }

    pub fn sell_orders_by_seller(
        &self,
        store: &dyn KvStore,
        seller: &str,
        page: &PageRequest,
    ) -> LedgerResult<(Vec<SellOrder>, PageResponse)> {
        validate_address(seller)?;
        let prefix = KeyBuilder::new().str(seller).build();
        Ok(table::list(
            store,
            Scope::Index(BY_SELLER),
            &prefix,
            page,
            &self.config.pagination,
        )?)
    }

    pub fn sell_orders_by_batch(
        &self,
        store: &dyn KvStore,
        batch_denom: &str,
        page: &PageRequest,
    ) -> LedgerResult<(Vec<SellOrder>, PageResponse)> {
        let batch = batch_by_denom(store, batch_denom)?;
        let prefix = KeyBuilder::new().u64(batch.key).build();
        Ok(table::list(
            store,
            Scope::Index(BY_BATCH),
            &prefix,
            page,
            &self.config.pagination,
        )?)
    }

    fn check_batch_size(&self, n: usize) -> LedgerResult<()> {
        let max = self.config.marketplace.max_orders_per_request;
        if n == 0 {
            return Err(LedgerError::InvalidRequest("no orders given".into()));
        }
        if n > max {
            return Err(LedgerError::InvalidRequest(format!(
                "{n} orders exceed the per-request limit of {max}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_order(store: &dyn KvStore, id: u64) -> LedgerResult<SellOrder> {
    Ok(table::must_get(store, &order_key(id), &id.to_string())?)
}

fn ensure_seller(ctx: &Context, order: &SellOrder) -> LedgerResult<()> {
    if order.seller != ctx.actor {
        return Err(LedgerError::unauthorized(
            &ctx.actor,
            format!("is not the seller of sell order {}", order.id),
        ));
    }
    Ok(())
}

fn ensure_quantity(quantity: Dec, precision: u32) -> LedgerResult<()> {
    if quantity.is_zero() {
        return Err(LedgerError::InvalidAmount("quantity must be positive".into()));
    }
    quantity.ensure_precision(precision)
}

fn validate_price(price: &Coin) -> LedgerResult<()> {
    validate_coin_denom(&price.denom)?;
    if price.amount.is_zero() {
        return Err(LedgerError::InvalidAmount(format!(
            "ask price must be positive, got {price}"
        )));
    }
    Ok(())
}

fn ensure_future(expiration: DateTime<Utc>, block_time: DateTime<Utc>) -> LedgerResult<()> {
    if expiration <= block_time {
        return Err(LedgerError::InvalidExpiration {
            expiration,
            block_time,
        });
    }
    Ok(())
}

fn ensure_denom_allowed(store: &dyn KvStore, denom: &str) -> LedgerResult<()> {
    if !market::is_denom_allowed(store, denom)? {
        return Err(LedgerError::DenomNotAllowed(denom.to_string()));
    }
    Ok(())
}

/// Where purchased credits land. Orders that keep auto-retire on force
/// retirement; orders that disable it let the buyer pick.
fn settlement(order_disables: bool, buyer_disables: bool) -> LedgerResult<Settlement> {
    match (order_disables, buyer_disables) {
        (false, true) => Err(LedgerError::InvalidRequest(
            "sell order requires credits to be retired on purchase".into(),
        )),
        (true, true) => Ok(Settlement::Tradable),
        (_, false) => Ok(Settlement::Retired),
    }
}
