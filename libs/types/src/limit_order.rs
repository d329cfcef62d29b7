//! Side-tagged matching view of an order
//!
//! A `LimitOrder` is the mutable counterpart of a signed `Order` while it
//! rests on the book: it tracks the remaining amount and remaining
//! matcher fee and derives every quantity the matcher needs (spend,
//! receive, raw spend for reservations, execution amounts against a
//! counter order). The original `Order` is carried along because history
//! records and exchange transactions embed it verbatim.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::assets::Asset;
use crate::math;
use crate::order::{Order, OrderId, OrderSide};

/// Matching view of a live order: remaining amount/fee plus the signed
/// order it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitOrder {
    Buy {
        price: u64,
        amount: u64,
        fee: u64,
        order: Arc<Order>,
    },
    Sell {
        price: u64,
        amount: u64,
        fee: u64,
        order: Arc<Order>,
    },
}

impl LimitOrder {
    /// Build the matching view of a freshly accepted order.
    pub fn new(order: Order) -> Self {
        let order = Arc::new(order);
        match order.side {
            OrderSide::Buy => LimitOrder::Buy {
                price: order.price,
                amount: order.amount,
                fee: order.matcher_fee,
                order,
            },
            OrderSide::Sell => LimitOrder::Sell {
                price: order.price,
                amount: order.amount,
                fee: order.matcher_fee,
                order,
            },
        }
    }

    pub fn side(&self) -> OrderSide {
        match self {
            LimitOrder::Buy { .. } => OrderSide::Buy,
            LimitOrder::Sell { .. } => OrderSide::Sell,
        }
    }

    pub fn price(&self) -> u64 {
        match self {
            LimitOrder::Buy { price, .. } | LimitOrder::Sell { price, .. } => *price,
        }
    }

    /// Remaining amount-asset quantity.
    pub fn amount(&self) -> u64 {
        match self {
            LimitOrder::Buy { amount, .. } | LimitOrder::Sell { amount, .. } => *amount,
        }
    }

    /// Remaining matcher fee.
    pub fn fee(&self) -> u64 {
        match self {
            LimitOrder::Buy { fee, .. } | LimitOrder::Sell { fee, .. } => *fee,
        }
    }

    pub fn order(&self) -> &Arc<Order> {
        match self {
            LimitOrder::Buy { order, .. } | LimitOrder::Sell { order, .. } => order,
        }
    }

    pub fn id(&self) -> OrderId {
        self.order().id()
    }

    /// Remaining amount corrected to a settleable quantity at this
    /// order's own price.
    pub fn amount_of_amount_asset(&self) -> u64 {
        math::corrected_amount(self.amount(), self.price()).unwrap_or(0)
    }

    /// Price-asset quantity the remaining amount settles at this price.
    pub fn amount_of_price_asset(&self) -> u64 {
        math::amount_of_price_asset(self.amount(), self.price()).unwrap_or(0)
    }

    /// Smallest amount that settles at least one price-asset unit.
    pub fn min_amount_of_amount_asset(&self) -> u64 {
        math::min_amount_of_amount_asset(self.price()).unwrap_or(u64::MAX)
    }

    /// Amount executable against `counter`: this order's remaining
    /// amount corrected at the counter's price.
    pub fn execution_amount(&self, counter: &LimitOrder) -> u64 {
        math::corrected_amount(self.amount(), counter.price()).unwrap_or(0)
    }

    /// Quantity the sender spends if the remainder executes in full.
    pub fn spend_amount(&self) -> u64 {
        match self {
            LimitOrder::Buy { .. } => self.amount_of_price_asset(),
            LimitOrder::Sell { .. } => self.amount_of_amount_asset(),
        }
    }

    /// Quantity the sender receives if the remainder executes in full.
    pub fn receive_amount(&self) -> u64 {
        match self {
            LimitOrder::Buy { .. } => self.amount_of_amount_asset(),
            LimitOrder::Sell { .. } => self.amount_of_price_asset(),
        }
    }

    /// Uncorrected upper bound on spend, used for reservations.
    ///
    /// For a sell the full remaining amount is earmarked even if the tail
    /// cannot settle.
    pub fn raw_spend_amount(&self) -> u64 {
        match self {
            LimitOrder::Buy { .. } => self.amount_of_price_asset(),
            LimitOrder::Sell { amount, .. } => *amount,
        }
    }

    pub fn spend_asset(&self) -> Asset {
        self.order().spend_asset()
    }

    pub fn receive_asset(&self) -> Asset {
        self.order().receive_asset()
    }

    pub fn fee_asset(&self) -> Asset {
        self.order().fee_asset()
    }

    /// The same order with a reduced remainder after a partial execution.
    pub fn partial(&self, amount: u64, fee: u64) -> LimitOrder {
        match self {
            LimitOrder::Buy { price, order, .. } => LimitOrder::Buy {
                price: *price,
                amount,
                fee,
                order: Arc::clone(order),
            },
            LimitOrder::Sell { price, order, .. } => LimitOrder::Sell {
                price: *price,
                amount,
                fee,
                order: Arc::clone(order),
            },
        }
    }

    /// Whether the remainder is still matchable: positive, settleable,
    /// within bounds, with positive spend and receive legs.
    pub fn is_valid(&self) -> bool {
        let amount = self.amount();
        amount > 0
            && amount >= self.min_amount_of_amount_asset()
            && amount < math::MAX_AMOUNT
            && self.spend_amount() > 0
            && self.receive_amount() > 0
    }
}
