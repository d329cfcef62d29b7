//! Order book storage for one asset pair
//!
//! Two price-indexed ladders of FIFO levels. Bids match best-first at
//! the highest price, asks at the lowest. Levels hold full `LimitOrder`
//! views because history updates and exchange transactions need the
//! original signed order.

pub mod ask_book;
pub mod bid_book;
pub mod price_level;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use price_level::PriceLevel;

use types::limit_order::LimitOrder;
use types::order::{OrderId, OrderSide};

/// In-memory book of one pair.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: BidBook,
    pub asks: AskBook,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert into the order's own side.
    pub fn insert(&mut self, order: LimitOrder) {
        match order.side() {
            OrderSide::Buy => self.bids.insert(order),
            OrderSide::Sell => self.asks.insert(order),
        }
    }

    /// Remove an order by id from whichever side holds it.
    pub fn remove(&mut self, id: &OrderId) -> Option<LimitOrder> {
        self.bids.remove(id).or_else(|| self.asks.remove(id))
    }

    /// Replace a resting order with its reduced view, keeping priority.
    pub fn replace(&mut self, id: &OrderId, updated: LimitOrder) -> bool {
        match updated.side() {
            OrderSide::Buy => self.bids.replace(id, updated),
            OrderSide::Sell => self.asks.replace(id, updated),
        }
    }

    /// Best resting order on the side opposite to `side`.
    pub fn best_counter(&self, side: OrderSide) -> Option<&LimitOrder> {
        match side {
            OrderSide::Buy => self.asks.best_order(),
            OrderSide::Sell => self.bids.best_order(),
        }
    }

    pub fn best_bid(&self) -> Option<u64> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<u64> {
        self.asks.best_price()
    }

    /// All orders of one side in matching priority order.
    pub fn side_orders(&self, side: OrderSide) -> Vec<LimitOrder> {
        match side {
            OrderSide::Buy => self.bids.orders(),
            OrderSide::Sell => self.asks.orders(),
        }
    }

    /// All orders, bids first, each side in priority order.
    pub fn all_orders(&self) -> Vec<LimitOrder> {
        let mut orders = self.bids.orders();
        orders.extend(self.asks.orders());
        orders
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.bids.contains(id) || self.asks.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// The book never rests crossed: best bid strictly below best ask.
    pub fn is_consistent(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid < ask,
            _ => true,
        }
    }

    /// Ladders in priority order, for snapshots.
    pub fn ladders(&self) -> (Vec<LimitOrder>, Vec<LimitOrder>) {
        (self.bids.orders(), self.asks.orders())
    }

    /// Rebuild from snapshot ladders.
    pub fn restore(bids: Vec<LimitOrder>, asks: Vec<LimitOrder>) -> Self {
        let mut book = Self::new();
        for order in bids.into_iter().chain(asks) {
            book.insert(order);
        }
        book
    }
}
