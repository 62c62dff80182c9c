//! Integration tests for the marketplace.
//!
//! Every test starts from the same world: carbon credits with precision 6,
//! one batch with 200 tradable credits held by Alice, and `regen` on the
//! payment allow-list.

use chrono::{DateTime, Duration, TimeZone, Utc};
use eco_ledger::bank::{Bank, Coin, StoreBank};
use eco_ledger::config::{LedgerConfig, DEFAULT_AUTHORITY};
use eco_ledger::credit::balance::{self, Balance};
use eco_ledger::credit::class::{self, BatchIssuance, CreateBatch, CreditType};
use eco_ledger::credit::{supply, Batch};
use eco_ledger::store::{KvStore, MemStore, PageRequest, SledStore};
use eco_ledger::{Context, Dec, ErrorKind};
use eco_market::market::{self, AllowedDenom};
use eco_market::{BuyDirect, SellOrderManager, SellOrderRequest, UpdateSellOrder};
use rust_decimal_macros::dec;

const ALICE: &str = "alice";
const BOB: &str = "bob";
const ISSUER: &str = "issuer";
const GOV: &str = DEFAULT_AUTHORITY;
const DENOM: &str = "C01-001-20200101-20210101-001";

fn d(v: rust_decimal::Decimal) -> Dec {
    Dec::from_decimal(v).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn ctx(actor: &str) -> Context {
    Context::new(actor, now())
}

fn manager() -> SellOrderManager<StoreBank> {
    SellOrderManager::new(StoreBank::new(), LedgerConfig::default())
}

fn allow(store: &mut dyn KvStore, denom: &str) {
    market::add_allowed_denom(
        store,
        &ctx(GOV),
        GOV,
        AllowedDenom {
            bank_denom: denom.into(),
            display_denom: denom.into(),
            exponent: 0,
        },
    )
    .unwrap();
}

fn seed(store: &mut dyn KvStore) -> Batch {
    class::add_credit_type(
        store,
        &ctx(GOV),
        GOV,
        CreditType {
            abbreviation: "C".into(),
            name: "carbon".into(),
            unit: "tonne".into(),
            precision: 6,
        },
    )
    .unwrap();
    class::create_class(store, &ctx(ISSUER), "C", "").unwrap();
    class::create_project(store, &ctx(ISSUER), "C01", "US-OR", "").unwrap();
    class::create_batch(
        store,
        &ctx(ISSUER),
        CreateBatch {
            project_id: "C01-001".into(),
            start_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            issuance: vec![BatchIssuance {
                recipient: ALICE.into(),
                tradable_amount: d(dec!(200)),
                retired_amount: Dec::ZERO,
            }],
            open: false,
            metadata: String::new(),
        },
    )
    .unwrap();
    allow(store, "regen");
    class::batch_by_denom(store, DENOM).unwrap()
}

fn listing(quantity: Dec, ask: &str, price: Dec) -> SellOrderRequest {
    SellOrderRequest {
        batch_denom: DENOM.into(),
        quantity,
        ask_price: Coin::new(ask, price),
        disable_auto_retire: false,
        expiration: None,
    }
}

fn alice(store: &dyn KvStore, batch: &Batch) -> Balance {
    balance::get_balance(store, ALICE, batch).unwrap()
}

fn assert_conserved(store: &dyn KvStore, batch: &Batch) {
    let totals = balance::batch_total(store, batch.key).unwrap();
    let supply = supply::batch_supply(store, batch.key).unwrap();
    assert_eq!(
        totals.tradable.checked_add(totals.escrowed).unwrap(),
        supply.tradable_amount
    );
    assert_eq!(totals.retired, supply.retired_amount);
}

/// Σ open order quantities for the batch equals Σ escrow.
fn assert_escrow_backs_orders(store: &dyn KvStore, mgr: &SellOrderManager<StoreBank>, batch: &Batch) {
    let (orders, _) = mgr.sell_orders(store, &PageRequest::first(1000)).unwrap();
    let mut listed = Dec::ZERO;
    for o in orders.iter().filter(|o| o.batch_key == batch.key) {
        listed = listed.checked_add(o.quantity).unwrap();
    }
    let totals = balance::batch_total(store, batch.key).unwrap();
    assert_eq!(listed, totals.escrowed);
}

// ---------------------------------------------------------------------------
// Sell
// ---------------------------------------------------------------------------

#[test]
fn alice_lists_half_her_credits() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    let mgr = manager();

    let ids = mgr
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(100)), "regen", d(dec!(100)))])
        .unwrap();
    assert_eq!(ids.len(), 1);

    let bal = alice(&store, &batch);
    assert_eq!(bal.tradable_amount, d(dec!(100)));
    assert_eq!(bal.escrowed_amount, d(dec!(100)));

    let m = market::market_by_pair(&store, "C", "regen").unwrap().unwrap();
    assert_eq!(m.precision_modifier, 0);
    let (all, _) = market::markets(&store, &PageRequest::default(), &mgr.config().pagination).unwrap();
    assert_eq!(all, vec![m.clone()]);

    let order = mgr.sell_order(&store, ids[0]).unwrap();
    assert_eq!(order.market_id, m.id);
    assert!(order.maker);
    assert_conserved(&store, &batch);
    assert_escrow_backs_orders(&store, &mgr, &batch);
}

#[test]
fn unlisted_ask_denom_changes_nothing() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    let keys_before = store.len();

    let err = manager()
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(100)), "xyz", d(dec!(100)))])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DenomNotAllowed);
    assert_eq!(store.len(), keys_before);
    assert_eq!(alice(&store, &batch).tradable_amount, d(dec!(200)));
    assert!(market::market_by_pair(&store, "C", "xyz").unwrap().is_none());
}

#[test]
fn third_listing_overdraws() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    let mgr = manager();
    let order = listing(d(dec!(100)), "regen", d(dec!(100)));

    mgr.sell(&mut store, &ctx(ALICE), &[order.clone(), order.clone()])
        .unwrap();
    let err = mgr.sell(&mut store, &ctx(ALICE), &[order]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    let bal = alice(&store, &batch);
    assert!(bal.tradable_amount.is_zero());
    assert_eq!(bal.escrowed_amount, d(dec!(200)));
}

#[test]
fn exact_balance_sells_but_one_more_unit_does_not() {
    let mut store = MemStore::new();
    seed(&mut store);
    let mgr = manager();

    let err = mgr
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(200.000001)), "regen", d(dec!(1)))])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    mgr.sell(&mut store, &ctx(ALICE), &[listing(d(dec!(200)), "regen", d(dec!(1)))])
        .unwrap();
}

#[test]
fn failing_entry_rolls_back_whole_request() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    let keys_before = store.len();

    let err = manager()
        .sell(
            &mut store,
            &ctx(ALICE),
            &[
                listing(d(dec!(50)), "regen", d(dec!(10))),
                listing(d(dec!(151)), "regen", d(dec!(10))),
            ],
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(store.len(), keys_before);
    assert!(market::market_by_pair(&store, "C", "regen").unwrap().is_none());
    assert_eq!(alice(&store, &batch).tradable_amount, d(dec!(200)));
}

#[test]
fn listing_validation() {
    let mut store = MemStore::new();
    seed(&mut store);
    let mgr = manager();
    let alice_ctx = ctx(ALICE);

    let too_precise = listing(d(dec!(1.0000001)), "regen", d(dec!(1)));
    assert_eq!(
        mgr.sell(&mut store, &alice_ctx, &[too_precise]).unwrap_err().kind(),
        ErrorKind::InvalidAmount
    );

    let zero_price = listing(d(dec!(1)), "regen", Dec::ZERO);
    assert_eq!(
        mgr.sell(&mut store, &alice_ctx, &[zero_price]).unwrap_err().kind(),
        ErrorKind::InvalidAmount
    );

    let mut past = listing(d(dec!(1)), "regen", d(dec!(1)));
    past.expiration = Some(now());
    assert_eq!(
        mgr.sell(&mut store, &alice_ctx, &[past]).unwrap_err().kind(),
        ErrorKind::InvalidExpiration
    );

    let mut unknown = listing(d(dec!(1)), "regen", d(dec!(1)));
    unknown.batch_denom = "C01-001-20200101-20210101-009".into();
    assert_eq!(
        mgr.sell(&mut store, &alice_ctx, &[unknown]).unwrap_err().kind(),
        ErrorKind::NotFound
    );

    assert_eq!(
        mgr.sell(&mut store, &alice_ctx, &[]).unwrap_err().kind(),
        ErrorKind::InvalidRequest
    );
}

#[test]
fn per_request_order_limit() {
    let mut store = MemStore::new();
    seed(&mut store);
    let mut config = LedgerConfig::default();
    config.marketplace.max_orders_per_request = 2;
    let mgr = SellOrderManager::new(StoreBank::new(), config);

    let order = listing(d(dec!(1)), "regen", d(dec!(1)));
    let err = mgr
        .sell(&mut store, &ctx(ALICE), &[order.clone(), order.clone(), order])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
}

#[test]
fn removed_denom_blocks_new_listings_only() {
    let mut store = MemStore::new();
    seed(&mut store);
    let mgr = manager();
    let id = mgr
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(10)), "regen", d(dec!(2)))])
        .unwrap()[0];

    market::remove_allowed_denom(&mut store, &ctx(GOV), GOV, "regen").unwrap();
    let err = mgr
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(10)), "regen", d(dec!(2)))])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DenomNotAllowed);

    // The existing order is still live and fillable.
    mgr.bank()
        .mint(&mut store, BOB, &Coin::new("regen", d(dec!(100))))
        .unwrap();
    let fill = mgr
        .buy_direct(
            &mut store,
            &ctx(BOB),
            &BuyDirect {
                sell_order_id: id,
                quantity: d(dec!(10)),
                bid_price: Coin::new("regen", d(dec!(2))),
                disable_auto_retire: false,
            },
        )
        .unwrap();
    assert!(fill.closed);
}

// ---------------------------------------------------------------------------
// Cancel & Update
// ---------------------------------------------------------------------------

#[test]
fn cancel_returns_escrow() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    let mgr = manager();
    let id = mgr
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(80)), "regen", d(dec!(5)))])
        .unwrap()[0];

    let err = mgr.cancel(&mut store, &ctx(BOB), id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    mgr.cancel(&mut store, &ctx(ALICE), id).unwrap();
    let bal = alice(&store, &batch);
    assert_eq!(bal.tradable_amount, d(dec!(200)));
    assert!(bal.escrowed_amount.is_zero());
    assert_eq!(
        mgr.sell_order(&store, id).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        mgr.cancel(&mut store, &ctx(ALICE), id).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn update_adjusts_escrow_both_ways() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    let mgr = manager();
    let id = mgr
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(100)), "regen", d(dec!(5)))])
        .unwrap()[0];

    let grow = UpdateSellOrder {
        sell_order_id: id,
        new_quantity: Some(d(dec!(150))),
        ..Default::default()
    };
    mgr.update(&mut store, &ctx(ALICE), grow).unwrap();
    assert_eq!(alice(&store, &batch).escrowed_amount, d(dec!(150)));

    let too_much = UpdateSellOrder {
        sell_order_id: id,
        new_quantity: Some(d(dec!(200.5))),
        ..Default::default()
    };
    let err = mgr.update(&mut store, &ctx(ALICE), too_much).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    let shrink = UpdateSellOrder {
        sell_order_id: id,
        new_quantity: Some(d(dec!(20))),
        ..Default::default()
    };
    mgr.update(&mut store, &ctx(ALICE), shrink).unwrap();
    let bal = alice(&store, &batch);
    assert_eq!(bal.tradable_amount, d(dec!(180)));
    assert_eq!(bal.escrowed_amount, d(dec!(20)));
    assert_eq!(mgr.sell_order(&store, id).unwrap().quantity, d(dec!(20)));
    assert_escrow_backs_orders(&store, &mgr, &batch);
}

#[test]
fn update_price_denom_resolves_new_market() {
    let mut store = MemStore::new();
    seed(&mut store);
    allow(&mut store, "uatom");
    let mgr = manager();
    let id = mgr
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(10)), "regen", d(dec!(5)))])
        .unwrap()[0];

    let reprice = UpdateSellOrder {
        sell_order_id: id,
        new_ask_price: Some(Coin::new("uatom", d(dec!(7.5)))),
        disable_auto_retire: Some(true),
        new_expiration: Some(now() + Duration::days(30)),
        ..Default::default()
    };
    mgr.update(&mut store, &ctx(ALICE), reprice).unwrap();

    let order = mgr.sell_order(&store, id).unwrap();
    let atom = market::market_by_pair(&store, "C", "uatom").unwrap().unwrap();
    assert_eq!(order.market_id, atom.id);
    assert_eq!(order.ask_amount, d(dec!(7.5)));
    assert!(order.disable_auto_retire);
    assert_eq!(order.expiration, Some(now() + Duration::days(30)));

    let bad_denom = UpdateSellOrder {
        sell_order_id: id,
        new_ask_price: Some(Coin::new("xyz", d(dec!(1)))),
        ..Default::default()
    };
    let err = mgr.update(&mut store, &ctx(ALICE), bad_denom).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DenomNotAllowed);
}

#[test]
fn update_rules() {
    let mut store = MemStore::new();
    seed(&mut store);
    let mgr = manager();
    let id = mgr
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(10)), "regen", d(dec!(5)))])
        .unwrap()[0];

    let by_bob = UpdateSellOrder {
        sell_order_id: id,
        new_quantity: Some(d(dec!(1))),
        ..Default::default()
    };
    assert_eq!(
        mgr.update(&mut store, &ctx(BOB), by_bob).unwrap_err().kind(),
        ErrorKind::Unauthorized
    );

    let stale = UpdateSellOrder {
        sell_order_id: id,
        new_expiration: Some(now() - Duration::seconds(1)),
        ..Default::default()
    };
    assert_eq!(
        mgr.update(&mut store, &ctx(ALICE), stale).unwrap_err().kind(),
        ErrorKind::InvalidExpiration
    );

    // update_many is all-or-nothing.
    let good = UpdateSellOrder {
        sell_order_id: id,
        new_quantity: Some(d(dec!(5))),
        ..Default::default()
    };
    let missing = UpdateSellOrder {
        sell_order_id: 999,
        ..Default::default()
    };
    let err = mgr
        .update_many(&mut store, &ctx(ALICE), &[good, missing])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(mgr.sell_order(&store, id).unwrap().quantity, d(dec!(10)));
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

/// Lists four orders: expiring at +3d, +1d, never, +1d. Returns their ids.
fn list_expiring(store: &mut dyn KvStore, mgr: &SellOrderManager<StoreBank>) -> Vec<u64> {
    let at = |days: i64| {
        let mut l = listing(d(dec!(10)), "regen", d(dec!(1)));
        l.expiration = (days > 0).then(|| now() + Duration::days(days));
        l
    };
    mgr.sell(store, &ctx(ALICE), &[at(3), at(1), at(0), at(1)])
        .unwrap()
}

#[test]
fn sweep_prunes_expired_in_expiration_then_id_order() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    let mgr = manager();
    let ids = list_expiring(&mut store, &mgr);

    let pruned = mgr
        .expire_sweep(&mut store, now() + Duration::days(1))
        .unwrap();
    assert_eq!(pruned, vec![ids[1], ids[3]]);

    let bal = alice(&store, &batch);
    assert_eq!(bal.escrowed_amount, d(dec!(20)));
    assert_eq!(bal.tradable_amount, d(dec!(180)));
    assert_escrow_backs_orders(&store, &mgr, &batch);

    // Nothing left at that time; later sweeps pick up the rest.
    assert!(mgr
        .expire_sweep(&mut store, now() + Duration::days(1))
        .unwrap()
        .is_empty());
    assert_eq!(
        mgr.expire_sweep(&mut store, now() + Duration::days(365)).unwrap(),
        vec![ids[0]]
    );
    assert!(mgr.sell_order(&store, ids[2]).is_ok());
}

#[test]
fn sweep_is_deterministic_across_stores() {
    let mgr = manager();
    let mut a = MemStore::new();
    let mut b = SledStore::open_temporary().unwrap();
    seed(&mut a);
    seed(&mut b);
    list_expiring(&mut a, &mgr);
    list_expiring(&mut b, &mgr);

    let at = now() + Duration::days(5);
    assert_eq!(
        mgr.expire_sweep(&mut a, at).unwrap(),
        mgr.expire_sweep(&mut b, at).unwrap()
    );
}

// ---------------------------------------------------------------------------
// Fill
// ---------------------------------------------------------------------------

fn fund_bob(store: &mut dyn KvStore, mgr: &SellOrderManager<StoreBank>, amount: Dec) {
    mgr.bank()
        .mint(store, BOB, &Coin::new("regen", amount))
        .unwrap();
}

fn buy(id: u64, quantity: Dec, bid: Dec, disable_auto_retire: bool) -> BuyDirect {
    BuyDirect {
        sell_order_id: id,
        quantity,
        bid_price: Coin::new("regen", bid),
        disable_auto_retire,
    }
}

#[test]
fn partial_fill_retires_and_pays_seller() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    let mgr = manager();
    fund_bob(&mut store, &mgr, d(dec!(5000)));
    let id = mgr
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(100)), "regen", d(dec!(100)))])
        .unwrap()[0];

    let outcome = mgr
        .buy_direct(&mut store, &ctx(BOB), &buy(id, d(dec!(10)), d(dec!(120)), false))
        .unwrap();
    assert_eq!(outcome.filled, d(dec!(10)));
    assert_eq!(outcome.remaining, d(dec!(90)));
    assert!(!outcome.closed);
    assert!(outcome.retired);
    assert_eq!(outcome.total_cost, Coin::new("regen", d(dec!(1000))));

    let bob = balance::get_balance(&store, BOB, &batch).unwrap();
    assert_eq!(bob.retired_amount, d(dec!(10)));
    assert!(bob.tradable_amount.is_zero());
    assert_eq!(alice(&store, &batch).escrowed_amount, d(dec!(90)));
    assert_eq!(mgr.bank().balance(&store, BOB, "regen").unwrap(), d(dec!(4000)));
    assert_eq!(mgr.bank().balance(&store, ALICE, "regen").unwrap(), d(dec!(1000)));
    assert_eq!(mgr.sell_order(&store, id).unwrap().quantity, d(dec!(90)));
    assert_conserved(&store, &batch);
    assert_escrow_backs_orders(&store, &mgr, &batch);
}

#[test]
fn buyer_cannot_opt_out_of_auto_retire() {
    let mut store = MemStore::new();
    seed(&mut store);
    let mgr = manager();
    fund_bob(&mut store, &mgr, d(dec!(100)));
    let id = mgr
        .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(10)), "regen", d(dec!(1)))])
        .unwrap()[0];

    let err = mgr
        .buy_direct(&mut store, &ctx(BOB), &buy(id, d(dec!(1)), d(dec!(1)), true))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
}

#[test]
fn full_fill_to_tradable_closes_order() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    let mgr = manager();
    fund_bob(&mut store, &mgr, d(dec!(100)));
    let mut l = listing(d(dec!(10)), "regen", d(dec!(2.5)));
    l.disable_auto_retire = true;
    let id = mgr.sell(&mut store, &ctx(ALICE), &[l]).unwrap()[0];

    let outcome = mgr
        .buy_direct(&mut store, &ctx(BOB), &buy(id, d(dec!(10)), d(dec!(2.5)), true))
        .unwrap();
    assert!(outcome.closed);
    assert!(!outcome.retired);
    assert!(outcome.remaining.is_zero());

    let bob = balance::get_balance(&store, BOB, &batch).unwrap();
    assert_eq!(bob.tradable_amount, d(dec!(10)));
    assert_eq!(
        mgr.sell_order(&store, id).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert!(alice(&store, &batch).escrowed_amount.is_zero());
    assert_conserved(&store, &batch);
}

#[test]
fn fill_rejections_leave_state_untouched() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    allow(&mut store, "uatom");
    let mgr = manager();
    fund_bob(&mut store, &mgr, d(dec!(50)));
    let mut l = listing(d(dec!(10)), "regen", d(dec!(10)));
    l.expiration = Some(now() + Duration::hours(1));
    let id = mgr.sell(&mut store, &ctx(ALICE), &[l]).unwrap()[0];
    let keys_before = store.len();

    let cases = [
        (ctx(BOB), buy(id, d(dec!(6)), d(dec!(10)), false), ErrorKind::InsufficientFunds),
        (ctx(BOB), buy(id, d(dec!(11)), d(dec!(10)), false), ErrorKind::InvalidAmount),
        (ctx(BOB), buy(id, d(dec!(1)), d(dec!(9.99)), false), ErrorKind::InvalidAmount),
        (ctx(ALICE), buy(id, d(dec!(1)), d(dec!(10)), false), ErrorKind::InvalidRequest),
        (ctx(BOB), buy(id + 1, d(dec!(1)), d(dec!(10)), false), ErrorKind::NotFound),
        (
            Context::new(BOB, now() + Duration::hours(1)),
            buy(id, d(dec!(1)), d(dec!(10)), false),
            ErrorKind::InvalidExpiration,
        ),
    ];
    for (who, order, expected) in cases {
        let err = mgr.buy_direct(&mut store, &who, &order).unwrap_err();
        assert_eq!(err.kind(), expected, "{order:?}");
    }

    let mut wrong_denom = buy(id, d(dec!(1)), d(dec!(10)), false);
    wrong_denom.bid_price.denom = "uatom".into();
    assert_eq!(
        mgr.buy_direct(&mut store, &ctx(BOB), &wrong_denom)
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidRequest
    );

    assert_eq!(store.len(), keys_before);
    assert_eq!(alice(&store, &batch).escrowed_amount, d(dec!(10)));
    assert_eq!(mgr.bank().balance(&store, BOB, "regen").unwrap(), d(dec!(50)));
}

// ---------------------------------------------------------------------------
// Queries & Persistence
// ---------------------------------------------------------------------------

#[test]
fn orders_by_seller_and_batch() {
    let mut store = MemStore::new();
    let batch = seed(&mut store);
    let mgr = manager();
    balance::send(&mut store, &ctx(ALICE), BOB, DENOM, d(dec!(50)), Dec::ZERO).unwrap();

    let order = listing(d(dec!(5)), "regen", d(dec!(1)));
    mgr.sell(&mut store, &ctx(ALICE), &[order.clone(), order.clone(), order.clone()])
        .unwrap();
    mgr.sell(&mut store, &ctx(BOB), &[order]).unwrap();

    let (first, resp) = mgr
        .sell_orders_by_seller(&store, ALICE, &PageRequest::first(2).with_total())
        .unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(resp.total, Some(3));
    let (rest, resp) = mgr
        .sell_orders_by_seller(&store, ALICE, &PageRequest::after(resp.next_key.unwrap(), 2))
        .unwrap();
    assert_eq!(rest.len(), 1);
    assert!(resp.next_key.is_none());
    assert!(first.iter().chain(&rest).all(|o| o.seller == ALICE));

    let (by_batch, _) = mgr
        .sell_orders_by_batch(&store, DENOM, &PageRequest::default())
        .unwrap();
    assert_eq!(by_batch.len(), 4);
    assert!(by_batch.iter().all(|o| o.batch_key == batch.key));
}

#[test]
fn orders_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager();
    let id = {
        let mut store = SledStore::open(dir.path()).unwrap();
        seed(&mut store);
        let id = mgr
            .sell(&mut store, &ctx(ALICE), &[listing(d(dec!(100)), "regen", d(dec!(100)))])
            .unwrap()[0];
        store.flush().unwrap();
        id
    };

    let mut store = SledStore::open(dir.path()).unwrap();
    let order = mgr.sell_order(&store, id).unwrap();
    assert_eq!(order.quantity, d(dec!(100)));
    mgr.cancel(&mut store, &ctx(ALICE), id).unwrap();
    let batch = class::batch_by_denom(&store, DENOM).unwrap();
    assert_eq!(alice(&store, &batch).tradable_amount, d(dec!(200)));
}
