//! Bid (buy-side) ladder
//!
//! Price levels sorted so the highest bid matches first. `BTreeMap`
//! keeps iteration deterministic.

use std::collections::BTreeMap;

use types::limit_order::LimitOrder;
use types::order::OrderId;

use super::price_level::PriceLevel;

#[derive(Debug, Clone, Default)]
pub struct BidBook {
    levels: BTreeMap<u64, PriceLevel>,
}

impl BidBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: LimitOrder) {
        self.levels
            .entry(order.price())
            .or_insert_with(PriceLevel::new)
            .insert(order);
    }

    /// Highest price with resting orders.
    pub fn best_price(&self) -> Option<u64> {
        self.levels.keys().next_back().copied()
    }

    /// Front order of the best level.
    pub fn best_order(&self) -> Option<&LimitOrder> {
        self.levels.iter().next_back().and_then(|(_, level)| level.front())
    }

    /// Pop the front order of the best level, dropping the level if it
    /// empties.
    pub fn pop_best(&mut self) -> Option<LimitOrder> {
        let price = self.best_price()?;
        let level = self.levels.get_mut(&price)?;
        let order = level.pop_front();
        if level.is_empty() {
            self.levels.remove(&price);
        }
        order
    }

    pub fn remove(&mut self, id: &OrderId) -> Option<LimitOrder> {
        let price = self
            .levels
            .iter()
            .find(|(_, level)| level.contains(id))
            .map(|(price, _)| *price)?;
        let level = self.levels.get_mut(&price)?;
        let removed = level.remove(id);
        if level.is_empty() {
            self.levels.remove(&price);
        }
        removed
    }

    pub fn replace(&mut self, id: &OrderId, updated: LimitOrder) -> bool {
        self.levels
            .get_mut(&updated.price())
            .map(|level| level.replace(id, updated))
            .unwrap_or(false)
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.levels.values().any(|level| level.contains(id))
    }

    /// All bids, highest price first, FIFO within a level.
    pub fn orders(&self) -> Vec<LimitOrder> {
        self.levels
            .iter()
            .rev()
            .flat_map(|(_, level)| level.iter().cloned())
            .collect()
    }

    /// Aggregated `(price, total amount)` for the top `depth` levels.
    pub fn depth(&self, depth: usize) -> Vec<(u64, u64)> {
        self.levels
            .iter()
            .rev()
            .take(depth)
            .map(|(price, level)| (*price, level.total_amount()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use types::assets::{Asset, AssetId, AssetPair};
    use types::math::PRICE_CONSTANT;
    use types::order::{Order, OrderSide, PublicKey};

    fn bid(seed: u8, price: u64, amount: u64) -> LimitOrder {
        let key = SigningKey::from_bytes(&[seed; 32]);
        LimitOrder::new(
            Order::new(
                PublicKey::from(&key),
                PublicKey::from(&key),
                AssetPair::new(Asset::Issued(AssetId::new([0xB1; 32])), Asset::Native),
                OrderSide::Buy,
                price,
                amount,
                300_000,
                1_708_123_456_789 + seed as i64,
                1_708_123_456_789 + 86_400_000,
            )
            .sign(&key),
        )
    }

    #[test]
    fn test_best_is_highest_price() {
        let mut book = BidBook::new();
        book.insert(bid(1, 10 * PRICE_CONSTANT, 100));
        book.insert(bid(2, 12 * PRICE_CONSTANT, 50));
        book.insert(bid(3, 11 * PRICE_CONSTANT, 75));

        assert_eq!(book.best_price(), Some(12 * PRICE_CONSTANT));
        assert_eq!(book.best_order().unwrap().amount(), 50);
    }

    #[test]
    fn test_orders_sorted_descending() {
        let mut book = BidBook::new();
        book.insert(bid(1, 10 * PRICE_CONSTANT, 100));
        book.insert(bid(2, 12 * PRICE_CONSTANT, 50));
        book.insert(bid(3, 11 * PRICE_CONSTANT, 75));

        let prices: Vec<u64> = book.orders().iter().map(|o| o.price()).collect();
        assert_eq!(
            prices,
            vec![12 * PRICE_CONSTANT, 11 * PRICE_CONSTANT, 10 * PRICE_CONSTANT]
        );
    }

    #[test]
    fn test_pop_best_drops_empty_level() {
        let mut book = BidBook::new();
        book.insert(bid(1, 10 * PRICE_CONSTANT, 100));
        let popped = book.pop_best().unwrap();
        assert_eq!(popped.amount(), 100);
        assert!(book.is_empty());
    }

    #[test]
    fn test_remove_drops_empty_level() {
        let mut book = BidBook::new();
        let order = bid(1, 10 * PRICE_CONSTANT, 100);
        book.insert(order.clone());
        book.insert(bid(2, 11 * PRICE_CONSTANT, 50));

        assert!(book.remove(&order.id()).is_some());
        assert_eq!(book.best_price(), Some(11 * PRICE_CONSTANT));
    }

    #[test]
    fn test_depth_aggregates_levels() {
        let mut book = BidBook::new();
        book.insert(bid(1, 10 * PRICE_CONSTANT, 100));
        book.insert(bid(2, 10 * PRICE_CONSTANT, 50));
        book.insert(bid(3, 9 * PRICE_CONSTANT, 25));

        let depth = book.depth(1);
        assert_eq!(depth, vec![(10 * PRICE_CONSTANT, 150)]);
    }
}
