//! Ask (sell-side) ladder
//!
//! Price levels sorted so the lowest ask matches first.

use std::collections::BTreeMap;

use types::limit_order::LimitOrder;
use types::order::OrderId;

use super::price_level::PriceLevel;

#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<u64, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: LimitOrder) {
        self.levels
            .entry(order.price())
            .or_insert_with(PriceLevel::new)
            .insert(order);
    }

    /// Lowest price with resting orders.
    pub fn best_price(&self) -> Option<u64> {
        self.levels.keys().next().copied()
    }

    pub fn best_order(&self) -> Option<&LimitOrder> {
        self.levels.iter().next().and_then(|(_, level)| level.front())
    }

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

    /// All asks, lowest price first, FIFO within a level.
    pub fn orders(&self) -> Vec<LimitOrder> {
        self.levels
            .iter()
            .flat_map(|(_, level)| level.iter().cloned())
            .collect()
    }

    /// Aggregated `(price, total amount)` for the top `depth` levels.
    pub fn depth(&self, depth: usize) -> Vec<(u64, u64)> {
        self.levels
            .iter()
            .take(depth)
            .map(|(price, level)| (*price, level.total_amount()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
