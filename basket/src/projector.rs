//! # Basket Balance Projector
//!
//! How many credits of each batch a basket holds. The ledger already knows
//! this as the basket address's tradable balance; the projection keeps it
//! keyed by basket so listing a basket's contents, and finding its oldest
//! batches, is a single range scan.
//!
//! Rows are ordered by (basket id, batch denom). A secondary index orders
//! them by (basket id, batch start date) for oldest-first withdrawals. A row
//! that reaches zero is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use eco_ledger::config::{prefix, PaginationConfig};
use eco_ledger::credit::class::{batch_by_denom, credit_type_of_batch};
use eco_ledger::store::keys::KeyBuilder;
use eco_ledger::store::table::{self, Scope};
use eco_ledger::store::{IndexKey, KvStore, PageRequest, PageResponse, Record};
use eco_ledger::{Dec, LedgerError, LedgerResult};

use crate::basket::{basket_key, Basket};

const BY_START_DATE: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketBalance {
    pub basket_id: u64,
    pub batch_denom: String,
    pub balance: Dec,
    pub batch_start_date: DateTime<Utc>,
}

impl Record for BasketBalance {
    const TABLE: u8 = prefix::BASKET_BALANCE;
    const NAME: &'static str = "basket balance";

    fn primary_key(&self) -> Vec<u8> {
        row_key(self.basket_id, &self.batch_denom)
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![IndexKey::multi(
            BY_START_DATE,
            KeyBuilder::new()
                .u64(self.basket_id)
                .time(&self.batch_start_date)
                .build(),
        )]
    }
}

fn row_key(basket_id: u64, batch_denom: &str) -> Vec<u8> {
    KeyBuilder::new().u64(basket_id).str(batch_denom).build()
}

fn checked_amount(store: &dyn KvStore, batch_denom: &str, amount: Dec) -> LedgerResult<DateTime<Utc>> {
    let batch = batch_by_denom(store, batch_denom)?;
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "basket amount must be positive, got {amount}"
        )));
    }
    amount.ensure_precision(credit_type_of_batch(store, &batch)?.precision)?;
    Ok(batch.start_date)
}

/// Adds `amount` of `batch_denom` to the basket's row, creating it if
/// needed.
pub fn put(store: &mut dyn KvStore, basket_id: u64, batch_denom: &str, amount: Dec) -> LedgerResult<()> {
    let start_date = checked_amount(store, batch_denom, amount)?;
    let row = match table::get::<BasketBalance>(store, &row_key(basket_id, batch_denom))? {
        Some(mut row) => {
            row.balance = row.balance.checked_add(amount)?;
            row
        }
        None => BasketBalance {
            basket_id,
            batch_denom: batch_denom.to_string(),
            balance: amount,
            batch_start_date: start_date,
        },
    };
    table::save(store, &row)?;
    debug!(basket_id, batch_denom, amount = %amount, balance = %row.balance, "basket balance increased");
    Ok(())
}

/// Removes `amount` of `batch_denom` from the basket's row.
/// `InsufficientBalance` if the row holds less; a row left at zero is
/// deleted.
pub fn take(store: &mut dyn KvStore, basket_id: u64, batch_denom: &str, amount: Dec) -> LedgerResult<()> {
    let start_date = checked_amount(store, batch_denom, amount)?;
    let key = row_key(basket_id, batch_denom);
    let mut row = table::get::<BasketBalance>(store, &key)?
        .unwrap_or_else(|| BasketBalance {
            basket_id,
            batch_denom: batch_denom.to_string(),
            balance: Dec::ZERO,
            batch_start_date: start_date,
        });
    let available = row.balance;
    row.balance = available
        .checked_sub(amount)?
        .ok_or_else(|| LedgerError::InsufficientBalance {
            basket: basket_id.to_string(),
            denom: batch_denom.to_string(),
            available,
            requested: amount,
        })?;

    if row.balance.is_zero() {
        table::delete::<BasketBalance>(store, &key)?;
    } else {
        table::save(store, &row)?;
    }
    debug!(basket_id, batch_denom, amount = %amount, balance = %row.balance, "basket balance decreased");
    Ok(())
}

/// The basket's holding of one batch; zero if it holds none.
pub fn balance(store: &dyn KvStore, basket_id: u64, batch_denom: &str) -> LedgerResult<Dec> {
    Ok(table::get::<BasketBalance>(store, &row_key(basket_id, batch_denom))?
        .map(|row| row.balance)
        .unwrap_or(Dec::ZERO))
}

/// One page of the basket's rows in batch-denom order. `NotFound` if the
/// basket does not exist.
pub fn list_balances(
    store: &dyn KvStore,
    basket_id: u64,
    page: &PageRequest,
    limits: &PaginationConfig,
) -> LedgerResult<(Vec<BasketBalance>, PageResponse)> {
    if table::get::<Basket>(store, &basket_key(basket_id))?.is_none() {
        return Err(LedgerError::not_found(Basket::NAME, basket_id.to_string()));
    }
    let prefix = KeyBuilder::new().u64(basket_id).build();
    Ok(table::list(store, Scope::Primary, &prefix, page, limits)?)
}

/// Every row of the basket, oldest batch start date first. Rows sharing a
/// start date follow batch-denom order.
pub fn oldest_first(store: &dyn KvStore, basket_id: u64) -> LedgerResult<Vec<BasketBalance>> {
    let prefix = KeyBuilder::new().u64(basket_id).build();
    Ok(table::collect_prefix(store, Scope::Index(BY_START_DATE), &prefix)?)
}

/// Sum of every row of the basket.
pub fn total(store: &dyn KvStore, basket_id: u64) -> LedgerResult<Dec> {
    let prefix = KeyBuilder::new().u64(basket_id).build();
    let mut sum = Dec::ZERO;
    for entry in table::scan_prefix::<BasketBalance>(store, Scope::Primary, &prefix)? {
        let (_, row) = entry?;
        sum = sum.checked_add(row.balance)?;
    }
    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use eco_ledger::credit::class::{self, BatchIssuance, CreateBatch, CreditType};
    use eco_ledger::store::MemStore;
    use eco_ledger::{Context, ErrorKind};
    use rust_decimal_macros::dec;

    const GOV: &str = "eco1governance";

    fn d(v: rust_decimal::Decimal) -> Dec {
        Dec::from_decimal(v).unwrap()
    }

    fn ctx(actor: &str) -> Context {
        Context::new(actor, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn setup(store: &mut MemStore) -> String {
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
        class::create_class(store, &ctx("issuer"), "C", "").unwrap();
        class::create_project(store, &ctx("issuer"), "C01", "KE", "").unwrap();
        class::create_batch(
            store,
            &ctx("issuer"),
            CreateBatch {
                project_id: "C01-001".into(),
                start_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                end_date: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
                issuance: vec![BatchIssuance {
                    recipient: "alice".into(),
                    tradable_amount: Dec::from(10),
                    retired_amount: Dec::ZERO,
                }],
                open: false,
                metadata: String::new(),
            },
        )
        .unwrap()
    }

    #[test]
    fn put_accumulates_per_batch() {
        let mut store = MemStore::new();
        let denom = setup(&mut store);
        put(&mut store, 1, &denom, d(dec!(2.5))).unwrap();
        put(&mut store, 1, &denom, d(dec!(0.5))).unwrap();
        assert_eq!(balance(&store, 1, &denom).unwrap(), Dec::from(3));
        assert_eq!(balance(&store, 2, &denom).unwrap(), Dec::ZERO);
        assert_eq!(total(&store, 1).unwrap(), Dec::from(3));
    }

    #[test]
    fn put_rejects_zero_and_excess_precision() {
        let mut store = MemStore::new();
        let denom = setup(&mut store);
        for bad in [Dec::ZERO, d(dec!(0.0000001))] {
            let err = put(&mut store, 1, &denom, bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidAmount, "{bad}");
        }
        assert!(oldest_first(&store, 1).unwrap().is_empty());
    }

    #[test]
    fn put_unknown_batch_is_not_found() {
        let mut store = MemStore::new();
        setup(&mut store);
        let err = put(&mut store, 1, "C01-001-20200101-20210101-999", Dec::ONE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn take_beyond_row_fails_and_leaves_it() {
        let mut store = MemStore::new();
        let denom = setup(&mut store);
        put(&mut store, 1, &denom, Dec::from(4)).unwrap();

        let err = take(&mut store, 1, &denom, d(dec!(4.000001))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(balance(&store, 1, &denom).unwrap(), Dec::from(4));

        let err = take(&mut store, 2, &denom, Dec::ONE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert!(oldest_first(&store, 2).unwrap().is_empty());
    }

    #[test]
    fn take_to_zero_removes_row() {
        let mut store = MemStore::new();
        let denom = setup(&mut store);
        put(&mut store, 1, &denom, Dec::from(4)).unwrap();

        take(&mut store, 1, &denom, d(dec!(1.5))).unwrap();
        assert_eq!(balance(&store, 1, &denom).unwrap(), d(dec!(2.5)));

        take(&mut store, 1, &denom, d(dec!(2.5))).unwrap();
        assert!(table::get::<BasketBalance>(&store, &row_key(1, &denom)).unwrap().is_none());
        assert!(oldest_first(&store, 1).unwrap().is_empty());
        assert_eq!(total(&store, 1).unwrap(), Dec::ZERO);
    }

    #[test]
    fn list_balances_needs_a_basket() {
        let mut store = MemStore::new();
        let denom = setup(&mut store);
        put(&mut store, 7, &denom, Dec::ONE).unwrap();

        let limits = PaginationConfig::default();
        let err = list_balances(&store, 7, &PageRequest::default(), &limits).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        table::insert(
            &mut store,
            &Basket {
                id: 7,
                basket_denom: "eco.uC.NCT".into(),
                name: "NCT".into(),
                curator: "curator".into(),
                credit_type_abbrev: "C".into(),
                exponent: 6,
                disable_auto_retire: false,
                date_criteria: None,
            },
        )
        .unwrap();
        let (rows, _) = list_balances(&store, 7, &PageRequest::default(), &limits).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].batch_denom, denom);
        assert_eq!(rows[0].balance, Dec::ONE);
    }
}
