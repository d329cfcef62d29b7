//! Reservation accounting
//!
//! A live order reserves funds in up to two assets:
//!
//! - spend asset: the uncorrected spend upper bound minus what has
//!   already been spent;
//! - fee asset: the remaining matcher fee, reduced by the accrued
//!   receive quantity when the fee is paid in the asset the order
//!   receives, so a trader never reserves more fee than can still be
//!   owed.
//!
//! Open-volume deltas for an event are differences of this reservation
//! before and after the event, which keeps the ledger equal to the sum
//! of live reservations by construction.

use types::limit_order::LimitOrder;
use types::order::Order;
use types::portfolio::OpenPortfolio;

use crate::order_info::OrderInfo;

/// Current reservation of an order given its stored record.
///
/// Final orders reserve nothing.
pub fn reservation(order: &Order, info: &OrderInfo) -> OpenPortfolio {
    if info.amount == 0 || info.status().is_final() {
        return OpenPortfolio::empty();
    }

    let full = LimitOrder::new(order.clone());

    let spend_reserved = full.raw_spend_amount().saturating_sub(info.unsafe_total_spend);
    let mut portfolio = OpenPortfolio::single(full.spend_asset(), spend_reserved as i64);

    let fee_reserved = if full.fee_asset() == full.receive_asset() {
        let accrued_receive = full.partial(info.filled, 0).receive_amount();
        info.remaining_fee.saturating_sub(accrued_receive)
    } else {
        info.remaining_fee
    };
    portfolio.add(full.fee_asset(), fee_reserved as i64);
    portfolio
}

/// Open-volume delta of accepting a new order.
pub fn accepted_delta(order: &Order, info_after: &OrderInfo) -> OpenPortfolio {
    reservation(order, info_after)
}

/// Open-volume delta of one execution step for one side.
pub fn executed_delta(order: &Order, before: &OrderInfo, after: &OrderInfo) -> OpenPortfolio {
    diff(reservation(order, before), reservation(order, after))
}

/// Open-volume delta of removing an order (cancel, expiry or dust).
pub fn canceled_delta(order: &Order, before: &OrderInfo) -> OpenPortfolio {
    diff(reservation(order, before), OpenPortfolio::empty())
}

fn diff(before: OpenPortfolio, after: OpenPortfolio) -> OpenPortfolio {
    let mut delta = after;
    for (asset, reserved) in before.iter() {
        delta.add(*asset, -reserved);
    }
    delta
}
