//! Per-order history records and event diffs
//!
//! `OrderInfo` is the stored record of one order's lifetime; its status
//! is derived, never stored. Each book event is reduced to one
//! `OrderInfoDiff` per touched order; the fold of diffs along a single
//! order's event stream is associative, so replaying a journal yields
//! the same record as live processing.

use serde::{Deserialize, Serialize};

use types::events::{self, Event};
use types::limit_order::LimitOrder;
use types::order::Order;

/// Stored history record for one order.
///
/// `unsafe_total_spend` is internal accounting for the reservation
/// formulas and is deliberately not exposed by the store's queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    pub amount: u64,
    pub filled: u64,
    pub canceled: bool,
    pub min_amount: Option<u64>,
    pub remaining_fee: u64,
    pub(crate) unsafe_total_spend: u64,
}

impl OrderInfo {
    /// Fresh record for a newly seen order.
    pub fn new(order: &Order) -> Self {
        Self {
            amount: order.amount,
            filled: 0,
            canceled: false,
            min_amount: None,
            remaining_fee: order.matcher_fee,
            unsafe_total_spend: 0,
        }
    }

    /// Derived status.
    pub fn status(&self) -> OrderStatus {
        if self.amount == 0 {
            OrderStatus::NotFound
        } else if self.filled == self.amount {
            OrderStatus::Filled(self.filled)
        } else if self.canceled {
            OrderStatus::Cancelled(self.filled)
        } else if self.filled > 0 {
            OrderStatus::PartiallyFilled(self.filled)
        } else {
            OrderStatus::Accepted
        }
    }

    pub fn remaining_amount(&self) -> u64 {
        self.amount.saturating_sub(self.filled)
    }
}

/// Derived order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    NotFound,
    Accepted,
    PartiallyFilled(u64),
    Filled(u64),
    Cancelled(u64),
}

impl OrderStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled(_) | OrderStatus::Cancelled(_) | OrderStatus::NotFound
        )
    }
}

/// Per-order change extracted from one book event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderInfoDiff {
    /// First sighting of this order (index insertion point).
    pub is_new: bool,
    pub add_executed_amount: Option<u64>,
    pub executed_fee: Option<u64>,
    pub new_min_amount: Option<u64>,
    pub now_canceled: Option<bool>,
    /// Spend of the executed piece, accumulated into the stored total.
    pub last_spend: Option<u64>,
}

impl OrderInfoDiff {
    /// Fold this diff into a stored record (or a fresh one for an order
    /// seen for the first time).
    pub fn apply(&self, stored: Option<OrderInfo>, order: &Order) -> OrderInfo {
        let mut info = stored.unwrap_or_else(|| OrderInfo::new(order));
        if info.amount == 0 {
            // Record created by an executed/canceled event before an
            // OrderAdded was seen (possible on replay after compaction)
            info = OrderInfo::new(order);
        }
        if let Some(executed) = self.add_executed_amount {
            info.filled = info.filled.saturating_add(executed).min(info.amount);
        }
        if let Some(fee) = self.executed_fee {
            info.remaining_fee = info.remaining_fee.saturating_sub(fee);
        }
        if let Some(min_amount) = self.new_min_amount {
            info.min_amount = Some(min_amount);
        }
        if self.now_canceled == Some(true) {
            info.canceled = true;
        }
        if let Some(spend) = self.last_spend {
            info.unsafe_total_spend = info.unsafe_total_spend.saturating_add(spend);
        }
        info
    }
}

/// Reduce a book event to per-order diffs.
pub fn collect_changes(event: &Event) -> Vec<(LimitOrder, OrderInfoDiff)> {
    match event {
        Event::OrderAdded { order } => vec![(
            order.clone(),
            OrderInfoDiff {
                is_new: true,
                new_min_amount: Some(order.min_amount_of_amount_asset()),
                ..Default::default()
            },
        )],

        Event::OrderExecuted { submitted, counter } => {
            let executed = events::executed_amount(submitted, counter);
            [submitted, counter]
                .into_iter()
                .map(|lo| {
                    let fee = events::executed_fee(lo.order().amount, lo.order().matcher_fee, executed);
                    let executed_piece = lo.partial(executed, fee);
                    (
                        lo.clone(),
                        OrderInfoDiff {
                            is_new: false,
                            add_executed_amount: Some(executed),
                            executed_fee: Some(fee),
                            new_min_amount: Some(lo.min_amount_of_amount_asset()),
                            last_spend: Some(executed_piece.spend_amount()),
                            ..Default::default()
                        },
                    )
                })
                .collect()
        }

        Event::OrderCanceled { order, unmatchable } => vec![(
            order.clone(),
            OrderInfoDiff {
                // An unmatchable remainder is removed, not canceled
                now_canceled: Some(!unmatchable),
                ..Default::default()
            },
        )],
    }
}
