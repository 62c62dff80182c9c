//! Sell order record and the request shapes the manager accepts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eco_ledger::bank::Coin;
use eco_ledger::config::prefix;
use eco_ledger::store::keys::KeyBuilder;
use eco_ledger::store::{IndexKey, Record};
use eco_ledger::Dec;

pub(crate) const BY_SELLER: u8 = 1;
pub(crate) const BY_BATCH: u8 = 2;
/// Only orders that carry an expiration appear here, ordered by
/// (expiration, id).
pub(crate) const BY_EXPIRATION: u8 = 3;

/// An open offer to sell escrowed credits at a fixed price per credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOrder {
    pub id: u64,
    pub seller: String,
    pub batch_key: u64,
    /// Credits still for sale; equal to the seller's escrow held for this
    /// order.
    pub quantity: Dec,
    /// Price per credit in the market's bank denom.
    pub ask_amount: Dec,
    pub market_id: u64,
    /// `false` means credits are retired on fill and the buyer cannot opt
    /// out; `true` lets the buyer choose.
    pub disable_auto_retire: bool,
    pub expiration: Option<DateTime<Utc>>,
    pub maker: bool,
}

impl Record for SellOrder {
    const TABLE: u8 = prefix::SELL_ORDER;
    const NAME: &'static str = "sell order";

    fn primary_key(&self) -> Vec<u8> {
        order_key(self.id)
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        let mut keys = vec![
            IndexKey::multi(BY_SELLER, KeyBuilder::new().str(&self.seller).build()),
            IndexKey::multi(BY_BATCH, KeyBuilder::new().u64(self.batch_key).build()),
        ];
        if let Some(expiration) = &self.expiration {
            keys.push(IndexKey::multi(
                BY_EXPIRATION,
                KeyBuilder::new().time(expiration).build(),
            ));
        }
        keys
    }
}

pub(crate) fn order_key(id: u64) -> Vec<u8> {
    KeyBuilder::new().u64(id).build()
}

impl SellOrder {
    /// Expired orders can no longer be filled; the next sweep removes them.
    pub fn is_expired(&self, block_time: &DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| exp <= *block_time)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One listing in a `sell` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOrderRequest {
    pub batch_denom: String,
    pub quantity: Dec,
    /// Price per credit.
    pub ask_price: Coin,
    pub disable_auto_retire: bool,
    pub expiration: Option<DateTime<Utc>>,
}

/// Changes to one existing order. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSellOrder {
    pub sell_order_id: u64,
    pub new_quantity: Option<Dec>,
    pub new_ask_price: Option<Coin>,
    pub disable_auto_retire: Option<bool>,
    pub new_expiration: Option<DateTime<Utc>>,
}

/// A direct purchase from one sell order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyDirect {
    pub sell_order_id: u64,
    pub quantity: Dec,
    /// Highest price per credit the buyer accepts; its denom must match the
    /// order's market.
    pub bid_price: Coin,
    /// Asks to keep purchased credits tradable. Only honoured when the
    /// order itself disables auto-retire.
    pub disable_auto_retire: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order(expiration: Option<DateTime<Utc>>) -> SellOrder {
        SellOrder {
            id: 7,
            seller: "alice".into(),
            batch_key: 1,
            quantity: Dec::from(10),
            ask_amount: Dec::from(100),
            market_id: 1,
            disable_auto_retire: false,
            expiration,
            maker: true,
        }
    }

    #[test]
    fn expiration_index_only_for_expiring_orders() {
        assert_eq!(order(None).index_keys().len(), 2);
        let exp = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let keys = order(Some(exp)).index_keys();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[2].index, BY_EXPIRATION);
    }

    #[test]
    fn expiry_is_inclusive_of_block_time() {
        let exp = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let o = order(Some(exp));
        assert!(o.is_expired(&exp));
        assert!(!o.is_expired(&(exp - chrono::Duration::seconds(1))));
        assert!(!order(None).is_expired(&exp));
    }
}
