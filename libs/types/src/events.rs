//! Book events
//!
//! Every state change of an order book is one of these three events.
//! They are the unit of journaling, of history updates, and of recovery
//! replay, so they carry full `LimitOrder` views (pre-execution state for
//! `OrderExecuted`).

use serde::{Deserialize, Serialize};

use crate::limit_order::LimitOrder;
use crate::math;

/// A state-changing order book event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// An order was admitted to the book.
    OrderAdded { order: LimitOrder },

    /// The submitted order executed against the resting counter order.
    /// Both views are the states *before* the execution.
    OrderExecuted {
        submitted: LimitOrder,
        counter: LimitOrder,
    },

    /// An order left the book without (further) execution. `unmatchable`
    /// distinguishes dust removals from user/system cancels.
    OrderCanceled { order: LimitOrder, unmatchable: bool },
}

impl Event {
    /// Short tag used as the journal entry type.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::OrderAdded { .. } => "OrderAdded",
            Event::OrderExecuted { .. } => "OrderExecuted",
            Event::OrderCanceled { .. } => "OrderCanceled",
        }
    }
}

/// Executed amount for a `submitted`/`counter` pair: the submitted
/// remainder corrected at the counter's price, capped by the counter's
/// settleable remainder.
pub fn executed_amount(submitted: &LimitOrder, counter: &LimitOrder) -> u64 {
    submitted
        .execution_amount(counter)
        .min(counter.amount_of_amount_asset())
}

/// Fee charged to one side for executing `amount`, prorated on the
/// side's original order quantities.
pub fn executed_fee(order_amount: u64, order_fee: u64, amount: u64) -> u64 {
    math::partial_fee(order_fee, order_amount, amount).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{Asset, AssetId, AssetPair};
    use crate::math::PRICE_CONSTANT;
    use crate::order::{Order, OrderSide, PublicKey};
    use ed25519_dalek::SigningKey;

    fn make_limit(side: OrderSide, price: u64, amount: u64) -> LimitOrder {
        let key = SigningKey::from_bytes(&[7; 32]);
        LimitOrder::new(
            Order::new(
                PublicKey::from(&key),
                PublicKey::from(&key),
                AssetPair::new(Asset::Issued(AssetId::new([0xB1; 32])), Asset::Native),
                side,
                price,
                amount,
                300_000,
                1_708_123_456_789,
                1_708_123_456_789 + 86_400_000,
            )
            .sign(&key),
        )
    }

    #[test]
    fn test_executed_amount_capped_by_counter() {
        let submitted = make_limit(OrderSide::Sell, 10 * PRICE_CONSTANT, 100);
        let counter = make_limit(OrderSide::Buy, 10 * PRICE_CONSTANT, 40);
        assert_eq!(executed_amount(&submitted, &counter), 40);
    }

    #[test]
    fn test_executed_amount_capped_by_submitted() {
        let submitted = make_limit(OrderSide::Sell, 10 * PRICE_CONSTANT, 30);
        let counter = make_limit(OrderSide::Buy, 10 * PRICE_CONSTANT, 100);
        assert_eq!(executed_amount(&submitted, &counter), 30);
    }

    #[test]
    fn test_event_kind_tags() {
        let lo = make_limit(OrderSide::Buy, PRICE_CONSTANT, 10);
        assert_eq!(Event::OrderAdded { order: lo.clone() }.kind(), "OrderAdded");
        assert_eq!(
            Event::OrderCanceled {
                order: lo,
                unmatchable: false
            }
            .kind(),
            "OrderCanceled"
        );
    }
}
