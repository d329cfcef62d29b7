//! Price level with time priority
//!
//! All resting orders at one price, ordered by `(timestamp, id)`. The
//! id tie-break makes replayed and live books identical even when two
//! orders share a timestamp.

use std::collections::VecDeque;

use types::limit_order::LimitOrder;
use types::order::OrderId;

#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    orders: VecDeque<LimitOrder>,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert in `(timestamp, id)` order. Live inserts arrive in time
    /// order and append in O(1); the walk only matters on restore.
    pub fn insert(&mut self, order: LimitOrder) {
        let key = |o: &LimitOrder| (o.order().timestamp, o.id());
        let new_key = key(&order);
        let mut idx = self.orders.len();
        while idx > 0 && key(&self.orders[idx - 1]) > new_key {
            idx -= 1;
        }
        self.orders.insert(idx, order);
    }

    pub fn front(&self) -> Option<&LimitOrder> {
        self.orders.front()
    }

    pub fn pop_front(&mut self) -> Option<LimitOrder> {
        self.orders.pop_front()
    }

    /// Replace the order with this id in place, keeping its position.
    pub fn replace(&mut self, id: &OrderId, updated: LimitOrder) -> bool {
        if let Some(slot) = self.orders.iter_mut().find(|o| o.id() == *id) {
            *slot = updated;
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, id: &OrderId) -> Option<LimitOrder> {
        let idx = self.orders.iter().position(|o| o.id() == *id)?;
        self.orders.remove(idx)
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.orders.iter().any(|o| o.id() == *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LimitOrder> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Total remaining amount at this level.
    pub fn total_amount(&self) -> u64 {
        self.orders.iter().map(|o| o.amount()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use types::assets::{Asset, AssetId, AssetPair};
    use types::math::PRICE_CONSTANT;
    use types::order::{Order, OrderSide, PublicKey};

    fn limit_at(seed: u8, timestamp: i64, amount: u64) -> LimitOrder {
        let key = SigningKey::from_bytes(&[seed; 32]);
        LimitOrder::new(
            Order::new(
                PublicKey::from(&key),
                PublicKey::from(&key),
                AssetPair::new(Asset::Issued(AssetId::new([0xB1; 32])), Asset::Native),
                OrderSide::Buy,
                10 * PRICE_CONSTANT,
                amount,
                300_000,
                timestamp,
                timestamp + 86_400_000,
            )
            .sign(&key),
        )
    }

    #[test]
    fn test_fifo_by_timestamp() {
        let mut level = PriceLevel::new();
        let first = limit_at(1, 1_000, 10);
        let second = limit_at(2, 2_000, 20);
        level.insert(second.clone());
        level.insert(first.clone());

        assert_eq!(level.front().unwrap().id(), first.id());
        assert_eq!(level.len(), 2);
        assert_eq!(level.total_amount(), 30);
    }

    #[test]
    fn test_id_breaks_timestamp_ties() {
        let mut level = PriceLevel::new();
        let a = limit_at(1, 1_000, 10);
        let b = limit_at(2, 1_000, 20);
        let (first, second) = if a.id() < b.id() { (a, b) } else { (b, a) };

        level.insert(second.clone());
        level.insert(first.clone());
        assert_eq!(level.front().unwrap().id(), first.id());

        // Insertion order must not matter
        let mut other = PriceLevel::new();
        other.insert(first.clone());
        other.insert(second);
        assert_eq!(other.front().unwrap().id(), first.id());
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut level = PriceLevel::new();
        let first = limit_at(1, 1_000, 10);
        let second = limit_at(2, 2_000, 20);
        level.insert(first.clone());
        level.insert(second);

        let reduced = first.partial(5, 150_000);
        assert!(level.replace(&first.id(), reduced));
        assert_eq!(level.front().unwrap().amount(), 5);
    }

    #[test]
    fn test_remove_by_id() {
        let mut level = PriceLevel::new();
        let first = limit_at(1, 1_000, 10);
        let second = limit_at(2, 2_000, 20);
        level.insert(first.clone());
        level.insert(second.clone());

        let removed = level.remove(&first.id()).unwrap();
        assert_eq!(removed.id(), first.id());
        assert_eq!(level.front().unwrap().id(), second.id());
        assert!(level.remove(&first.id()).is_none());
    }
}
