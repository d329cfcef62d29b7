//! The order-history store
//!
//! Folds book events into durable per-order records and the per-trader
//! open-volume ledger. All mutation happens under one write lock; the
//! validator reads absolute reservations through the same lock, so a
//! concurrent update can never be observed half-applied.
//!
//! # Logical key layout
//!
//! ```text
//! ord:<order-id>            bincode(Order)
//! oi:<order-id>             bincode(OrderInfo)
//! live:<order-id>           bincode(bool)          order rests on a book
//! ov:<addr>:<asset>         bincode(i64)           open volume
//! ovs:<addr>                bincode(u64)           asset index size
//! ova:<addr>:<n>            bincode(Asset)         asset index entry
//! aos:<addr>                bincode(u64)           order index size
//! ao:<addr>:<n>             bincode(OrderId)       order index entry
//! seq:<pair>                bincode(u64)           applied-event watermark
//! ```
//!
//! Only live orders contribute to open volume: a submitted order that
//! executes in full before ever resting reserves nothing, and its
//! executions must not release funds that were never reserved.

use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

use types::assets::Asset;
use types::events::Event;
use types::order::{Order, OrderId, PublicKey};
use types::portfolio::OpenPortfolio;

use crate::kv::KeyValueStore;
use crate::open_volume;
use crate::order_info::{collect_changes, OrderInfo, OrderStatus};

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Order {order_id} is not final and cannot be deleted")]
    NotFinal { order_id: OrderId },

    #[error("Order not found: {order_id}")]
    NotFound { order_id: OrderId },
}

/// Durable order history and open-volume ledger over a key-value store.
pub struct OrderHistory {
    kv: Mutex<Box<dyn KeyValueStore>>,
}

impl OrderHistory {
    pub fn new(kv: Box<dyn KeyValueStore>) -> Self {
        Self { kv: Mutex::new(kv) }
    }

    /// Apply one sequenced book event.
    ///
    /// Events at or below the pair's applied watermark are skipped, so
    /// journal replay after a crash is idempotent.
    pub fn process(&self, pair_key: &str, sequence: u64, event: &Event) -> Result<(), HistoryError> {
        let mut kv = self.kv.lock().expect("history lock poisoned");

        let seq_key = format!("seq:{}", pair_key);
        let applied: u64 = get_value(kv.as_ref(), &seq_key)?.unwrap_or(0);
        if sequence <= applied {
            return Ok(());
        }

        for (limit_order, diff) in collect_changes(event) {
            let order = limit_order.order().as_ref();
            let id = order.id();
            let addr = order.sender_public_key;

            let live_key = format!("live:{}", id);
            let was_live: bool = get_value(kv.as_ref(), &live_key)?.unwrap_or(false);
            let before: Option<OrderInfo> = get_value(kv.as_ref(), &format!("oi:{}", id))?;
            let after = diff.apply(before.clone(), order);

            let delta = match event {
                Event::OrderAdded { .. } => {
                    put_value(kv.as_mut(), &live_key, &true)?;
                    open_volume::accepted_delta(order, &after)
                }
                Event::OrderExecuted { .. } if was_live => {
                    if after.status().is_final() {
                        kv.delete(&live_key);
                    }
                    let before = before.clone().unwrap_or_else(|| OrderInfo::new(order));
                    open_volume::executed_delta(order, &before, &after)
                }
                Event::OrderCanceled { .. } if was_live => {
                    kv.delete(&live_key);
                    let before = before.clone().unwrap_or_else(|| OrderInfo::new(order));
                    open_volume::canceled_delta(order, &before)
                }
                // Never rested on a book: nothing was reserved
                _ => OpenPortfolio::empty(),
            };

            if before.is_none() {
                put_value(kv.as_mut(), &format!("ord:{}", id), order)?;
                append_order_index(kv.as_mut(), &addr, &id)?;
            }
            put_value(kv.as_mut(), &format!("oi:{}", id), &after)?;
            save_open_volume(kv.as_mut(), &addr, &delta)?;
        }

        put_value(kv.as_mut(), &seq_key, &sequence)?;
        Ok(())
    }

    /// Stored record for an order; the default (empty) record reads as
    /// `NotFound`.
    pub fn order_info(&self, id: &OrderId) -> OrderInfo {
        let kv = self.kv.lock().expect("history lock poisoned");
        get_value(kv.as_ref(), &format!("oi:{}", id))
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    pub fn status(&self, id: &OrderId) -> OrderStatus {
        self.order_info(id).status()
    }

    /// The stored signed order, if still retained.
    pub fn order(&self, id: &OrderId) -> Option<Order> {
        let kv = self.kv.lock().expect("history lock poisoned");
        get_value(kv.as_ref(), &format!("ord:{}", id)).ok().flatten()
    }

    /// Reserved funds of one trader in one asset. Never negative.
    pub fn open_volume(&self, addr: &PublicKey, asset: &Asset) -> u64 {
        let kv = self.kv.lock().expect("history lock poisoned");
        read_open_volume(kv.as_ref(), addr, asset)
    }

    /// All assets a trader has ever reserved, with current volumes.
    pub fn open_volumes(&self, addr: &PublicKey) -> Vec<(Asset, u64)> {
        let kv = self.kv.lock().expect("history lock poisoned");
        let count: u64 = get_value(kv.as_ref(), &format!("ovs:{}", addr))
            .ok()
            .flatten()
            .unwrap_or(0);
        (0..count)
            .filter_map(|n| {
                let asset: Asset =
                    get_value(kv.as_ref(), &format!("ova:{}:{}", addr, n)).ok().flatten()?;
                Some((asset, read_open_volume(kv.as_ref(), addr, &asset)))
            })
            .collect()
    }

    /// Ids of every order this trader has placed, in placement order.
    pub fn order_ids(&self, addr: &PublicKey) -> Vec<OrderId> {
        let kv = self.kv.lock().expect("history lock poisoned");
        let count: u64 = get_value(kv.as_ref(), &format!("aos:{}", addr))
            .ok()
            .flatten()
            .unwrap_or(0);
        (0..count)
            .filter_map(|n| get_value(kv.as_ref(), &format!("ao:{}:{}", addr, n)).ok().flatten())
            .collect()
    }

    /// Drop the stored order and record. Only permitted for terminal
    /// orders; open volume is untouched (already zero for them).
    pub fn delete_order(&self, addr: &PublicKey, id: &OrderId) -> Result<(), HistoryError> {
        let mut kv = self.kv.lock().expect("history lock poisoned");

        let stored: Option<Order> = get_value(kv.as_ref(), &format!("ord:{}", id))?;
        match stored {
            Some(order) if order.sender_public_key == *addr => {}
            _ => return Err(HistoryError::NotFound { order_id: *id }),
        }

        let info: OrderInfo = get_value(kv.as_ref(), &format!("oi:{}", id))?.unwrap_or_default();
        match info.status() {
            OrderStatus::Filled(_) | OrderStatus::Cancelled(_) => {
                kv.delete(&format!("ord:{}", id));
                kv.delete(&format!("oi:{}", id));
                Ok(())
            }
            _ => Err(HistoryError::NotFinal { order_id: *id }),
        }
    }
}

// ── Internal helpers ────────────────────────────────────────────────

fn get_value<T: serde::de::DeserializeOwned>(
    kv: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, HistoryError> {
    match kv.get(key) {
        None => Ok(None),
        Some(bytes) => bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| HistoryError::Serialization(e.to_string())),
    }
}

fn put_value<T: serde::Serialize>(
    kv: &mut dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), HistoryError> {
    let bytes = bincode::serialize(value).map_err(|e| HistoryError::Serialization(e.to_string()))?;
    kv.put(key, bytes);
    Ok(())
}

fn read_open_volume(kv: &dyn KeyValueStore, addr: &PublicKey, asset: &Asset) -> u64 {
    let volume: i64 = get_value(kv, &format!("ov:{}:{}", addr, asset))
        .ok()
        .flatten()
        .unwrap_or(0);
    volume.max(0) as u64
}

/// Fold a portfolio delta into the trader's open-volume slots, indexing
/// each asset on first sight.
fn save_open_volume(
    kv: &mut dyn KeyValueStore,
    addr: &PublicKey,
    delta: &OpenPortfolio,
) -> Result<(), HistoryError> {
    for (asset, change) in delta.iter() {
        let key = format!("ov:{}:{}", addr, asset);
        let known = kv.get(&key).is_some();
        let current: i64 = get_value(kv, &key)?.unwrap_or(0);
        let updated = current + change;
        if updated < 0 {
            warn!(%addr, %asset, updated, "open volume went negative, clamping");
        }
        put_value(kv, &key, &updated.max(0))?;

        if !known {
            let size_key = format!("ovs:{}", addr);
            let n: u64 = get_value(kv, &size_key)?.unwrap_or(0);
            put_value(kv, &format!("ova:{}:{}", addr, n), asset)?;
            put_value(kv, &size_key, &(n + 1))?;
        }
    }
    Ok(())
}

fn append_order_index(
    kv: &mut dyn KeyValueStore,
    addr: &PublicKey,
    id: &OrderId,
) -> Result<(), HistoryError> {
    let size_key = format!("aos:{}", addr);
    let n: u64 = get_value(kv, &size_key)?.unwrap_or(0);
    put_value(kv, &format!("ao:{}:{}", addr, n), id)?;
    put_value(kv, &size_key, &(n + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use types::assets::{AssetId, AssetPair};
    use types::limit_order::LimitOrder;
    use types::math::PRICE_CONSTANT;
    use types::order::OrderSide;

    use crate::kv::MemoryKv;

    fn btc() -> Asset {
        Asset::Issued(AssetId::new([0xB1; 32]))
    }

    fn make_order(seed: u8, side: OrderSide, price: u64, amount: u64) -> Order {
        let key = SigningKey::from_bytes(&[seed; 32]);
        Order::new(
            PublicKey::from(&key),
            PublicKey::from(&key),
            AssetPair::new(btc(), Asset::Native),
            side,
            price,
            amount,
            300_000,
            1_708_123_456_789,
            1_708_123_456_789 + 86_400_000,
        )
        .sign(&key)
    }

    fn history() -> OrderHistory {
        OrderHistory::new(Box::new(MemoryKv::new()))
    }

    #[test]
    fn test_added_order_is_accepted_and_reserved() {
        let history = history();
        let order = make_order(1, OrderSide::Buy, 10 * PRICE_CONSTANT, 100);
        let addr = order.sender_public_key;
        let lo = LimitOrder::new(order.clone());

        history
            .process("BTC-NATIVE", 1, &Event::OrderAdded { order: lo })
            .unwrap();

        assert_eq!(history.status(&order.id()), OrderStatus::Accepted);
        // buy: 1000 native spend + 300_000 native fee
        assert_eq!(history.open_volume(&addr, &Asset::Native), 301_000);
        assert_eq!(history.order_ids(&addr), vec![order.id()]);
        assert_eq!(history.order(&order.id()), Some(order));
    }

    #[test]
    fn test_execution_updates_both_sides() {
        let history = history();
        let buy = make_order(1, OrderSide::Buy, 10 * PRICE_CONSTANT, 100);
        let sell = make_order(2, OrderSide::Sell, 10 * PRICE_CONSTANT, 40);
        let buy_lo = LimitOrder::new(buy.clone());
        let sell_lo = LimitOrder::new(sell.clone());

        history
            .process("BTC-NATIVE", 1, &Event::OrderAdded { order: buy_lo.clone() })
            .unwrap();
        history
            .process(
                "BTC-NATIVE",
                2,
                &Event::OrderExecuted {
                    submitted: sell_lo,
                    counter: buy_lo,
                },
            )
            .unwrap();

        assert_eq!(history.status(&buy.id()), OrderStatus::PartiallyFilled(40));
        assert_eq!(history.status(&sell.id()), OrderStatus::Filled(40));
        // Seller never went through OrderAdded but is indexed anyway
        assert_eq!(history.order_ids(&sell.sender_public_key), vec![sell.id()]);

        // Seller never rested, so nothing was ever reserved for it
        assert_eq!(history.open_volume(&sell.sender_public_key, &btc()), 0);
        // Buyer's reservation shrank by the executed spend and fee
        let buyer_volume = history.open_volume(&buy.sender_public_key, &Asset::Native);
        assert_eq!(buyer_volume, (1000 - 400) + (300_000 - 120_000));
    }

    #[test]
    fn test_replay_below_watermark_is_idempotent() {
        let history = history();
        let order = make_order(1, OrderSide::Buy, 10 * PRICE_CONSTANT, 100);
        let lo = LimitOrder::new(order.clone());
        let addr = order.sender_public_key;
        let event = Event::OrderAdded { order: lo };

        history.process("BTC-NATIVE", 1, &event).unwrap();
        let volume = history.open_volume(&addr, &Asset::Native);

        // Re-applying the same sequence must change nothing
        history.process("BTC-NATIVE", 1, &event).unwrap();
        assert_eq!(history.open_volume(&addr, &Asset::Native), volume);
        assert_eq!(history.order_ids(&addr).len(), 1);
    }

    #[test]
    fn test_watermarks_are_per_pair() {
        let history = history();
        let a = make_order(1, OrderSide::Buy, 10 * PRICE_CONSTANT, 100);
        let b = make_order(2, OrderSide::Buy, 10 * PRICE_CONSTANT, 100);

        history
            .process("BTC-NATIVE", 5, &Event::OrderAdded { order: LimitOrder::new(a) })
            .unwrap();
        // Same sequence on a different pair still applies
        history
            .process("ETH-NATIVE", 5, &Event::OrderAdded { order: LimitOrder::new(b.clone()) })
            .unwrap();
        assert_eq!(history.status(&b.id()), OrderStatus::Accepted);
    }

    #[test]
    fn test_cancel_releases_open_volume() {
        let history = history();
        let order = make_order(1, OrderSide::Sell, 10 * PRICE_CONSTANT, 100);
        let addr = order.sender_public_key;
        let lo = LimitOrder::new(order.clone());

        history
            .process("BTC-NATIVE", 1, &Event::OrderAdded { order: lo.clone() })
            .unwrap();
        assert!(history.open_volume(&addr, &btc()) > 0);

        history
            .process(
                "BTC-NATIVE",
                2,
                &Event::OrderCanceled {
                    order: lo,
                    unmatchable: false,
                },
            )
            .unwrap();
        assert_eq!(history.open_volume(&addr, &btc()), 0);
        assert_eq!(history.open_volume(&addr, &Asset::Native), 0);
        assert_eq!(history.status(&order.id()), OrderStatus::Cancelled(0));
    }

    #[test]
    fn test_asset_index_lists_all_touched_assets() {
        let history = history();
        let order = make_order(1, OrderSide::Sell, 10 * PRICE_CONSTANT, 100);
        let addr = order.sender_public_key;

        history
            .process("BTC-NATIVE", 1, &Event::OrderAdded { order: LimitOrder::new(order) })
            .unwrap();

        let volumes = history.open_volumes(&addr);
        let assets: Vec<Asset> = volumes.iter().map(|(a, _)| *a).collect();
        assert!(assets.contains(&btc()));
        assert!(assets.contains(&Asset::Native));
    }

    #[test]
    fn test_delete_requires_final_status() {
        let history = history();
        let order = make_order(1, OrderSide::Buy, 10 * PRICE_CONSTANT, 100);
        let addr = order.sender_public_key;
        let lo = LimitOrder::new(order.clone());

        history
            .process("BTC-NATIVE", 1, &Event::OrderAdded { order: lo.clone() })
            .unwrap();
        assert!(matches!(
            history.delete_order(&addr, &order.id()),
            Err(HistoryError::NotFinal { .. })
        ));

        history
            .process(
                "BTC-NATIVE",
                2,
                &Event::OrderCanceled {
                    order: lo,
                    unmatchable: false,
                },
            )
            .unwrap();
        history.delete_order(&addr, &order.id()).unwrap();
        assert_eq!(history.status(&order.id()), OrderStatus::NotFound);
        assert!(history.order(&order.id()).is_none());
    }

    #[test]
    fn test_delete_unknown_order() {
        let history = history();
        let order = make_order(1, OrderSide::Buy, 10 * PRICE_CONSTANT, 100);
        assert!(matches!(
            history.delete_order(&order.sender_public_key, &order.id()),
            Err(HistoryError::NotFound { .. })
        ));
    }
}
