//! Price-time priority matching
//!
//! The matching loop on an inbound order, cancellation, the expiry
//! sweep, and fact-replay of journaled events. All functions mutate the
//! book and return the events describing what happened, in commit
//! order; callers persist and account for them.

use tracing::debug;

use types::events::{self, Event};
use types::limit_order::LimitOrder;
use types::order::{OrderId, OrderSide};

use crate::book::OrderBook;

/// Whether an inbound order at `submitted_price` crosses a resting
/// counter at `counter_price`.
pub fn crosses(submitted_side: OrderSide, submitted_price: u64, counter_price: u64) -> bool {
    match submitted_side {
        OrderSide::Buy => submitted_price >= counter_price,
        OrderSide::Sell => submitted_price <= counter_price,
    }
}

/// Match `submitted` against the book.
///
/// Walks the opposite ladder best-first: executes while prices cross,
/// removes dust remainders as unmatchable, and rests whatever is left.
pub fn match_order(book: &mut OrderBook, submitted: LimitOrder) -> Vec<Event> {
    let mut submitted = submitted;
    let mut events = Vec::new();

    loop {
        let Some(counter) = book.best_counter(submitted.side()).cloned() else {
            events.push(Event::OrderAdded {
                order: submitted.clone(),
            });
            book.insert(submitted);
            break;
        };

        if !crosses(submitted.side(), submitted.price(), counter.price()) {
            events.push(Event::OrderAdded {
                order: submitted.clone(),
            });
            book.insert(submitted);
            break;
        }

        let executed = events::executed_amount(&submitted, &counter);
        if executed == 0 {
            // Rounding dust on one side; drop it and carry on
            if counter.amount_of_amount_asset() == 0 {
                book.remove(&counter.id());
                events.push(Event::OrderCanceled {
                    order: counter,
                    unmatchable: true,
                });
                continue;
            }
            events.push(Event::OrderCanceled {
                order: submitted,
                unmatchable: true,
            });
            break;
        }

        events.push(Event::OrderExecuted {
            submitted: submitted.clone(),
            counter: counter.clone(),
        });
        debug!(
            submitted = %submitted.id(),
            counter = %counter.id(),
            executed,
            price = counter.price(),
            "orders executed"
        );

        let submitted_fee =
            events::executed_fee(submitted.order().amount, submitted.order().matcher_fee, executed);
        let counter_fee =
            events::executed_fee(counter.order().amount, counter.order().matcher_fee, executed);

        let counter_remainder = counter.partial(
            counter.amount().saturating_sub(executed),
            counter.fee().saturating_sub(counter_fee),
        );
        if counter_remainder.amount() == 0 {
            book.remove(&counter.id());
        } else if counter_remainder.amount() < counter_remainder.min_amount_of_amount_asset()
            || !counter_remainder.is_valid()
        {
            book.remove(&counter.id());
            events.push(Event::OrderCanceled {
                order: counter_remainder,
                unmatchable: true,
            });
        } else {
            book.replace(&counter.id(), counter_remainder);
        }

        submitted = submitted.partial(
            submitted.amount().saturating_sub(executed),
            submitted.fee().saturating_sub(submitted_fee),
        );
        if submitted.amount() == 0 {
            break;
        }
        if submitted.amount() < submitted.min_amount_of_amount_asset() || !submitted.is_valid() {
            events.push(Event::OrderCanceled {
                order: submitted,
                unmatchable: true,
            });
            break;
        }
    }

    events
}

/// Remove an order by id from either side.
pub fn cancel_order(book: &mut OrderBook, id: &OrderId) -> Option<Event> {
    book.remove(id).map(|order| Event::OrderCanceled {
        order,
        unmatchable: false,
    })
}

/// Remove every order with `expiration <= now`.
pub fn expire_orders(book: &mut OrderBook, now: i64) -> Vec<Event> {
    let expired: Vec<LimitOrder> = book
        .all_orders()
        .into_iter()
        .filter(|o| o.order().expiration <= now)
        .collect();

    expired
        .into_iter()
        .filter_map(|order| cancel_order(book, &order.id()))
        .collect()
}

/// Replay one journaled event as a fact, without re-running matching.
pub fn apply_event(book: &mut OrderBook, event: &Event) {
    match event {
        Event::OrderAdded { order } => book.insert(order.clone()),
        Event::OrderExecuted { submitted, counter } => {
            let executed = events::executed_amount(submitted, counter);
            let fee =
                events::executed_fee(counter.order().amount, counter.order().matcher_fee, executed);
            let remainder = counter.partial(
                counter.amount().saturating_sub(executed),
                counter.fee().saturating_sub(fee),
            );
            if remainder.amount() == 0 {
                book.remove(&counter.id());
            } else {
                book.replace(&counter.id(), remainder);
            }
            // The submitted side only enters the book via its own
            // OrderAdded event
        }
        Event::OrderCanceled { order, .. } => {
            book.remove(&order.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use types::assets::{Asset, AssetId, AssetPair};
    use types::math::PRICE_CONSTANT;
    use types::order::{Order, PublicKey};

    fn limit(seed: u8, side: OrderSide, price: u64, amount: u64) -> LimitOrder {
        limit_at(seed, side, price, amount, 1_708_123_456_789 + seed as i64)
    }

    fn limit_at(seed: u8, side: OrderSide, price: u64, amount: u64, timestamp: i64) -> LimitOrder {
        let key = SigningKey::from_bytes(&[seed; 32]);
        LimitOrder::new(
            Order::new(
                PublicKey::from(&key),
                PublicKey::from(&key),
                AssetPair::new(Asset::Issued(AssetId::new([0xB1; 32])), Asset::Native),
                side,
                price,
                amount,
                300_000,
                timestamp,
                timestamp + 86_400_000,
            )
            .sign(&key),
        )
    }

    fn kinds(events: &[Event]) -> Vec<&'static str> {
        events.iter().map(|e| e.kind()).collect()
    }

    #[test]
    fn test_no_cross_rests_order() {
        let mut book = OrderBook::new();
        match_order(&mut book, limit(1, OrderSide::Sell, 12 * PRICE_CONSTANT, 100));
        let events = match_order(&mut book, limit(2, OrderSide::Buy, 10 * PRICE_CONSTANT, 100));

        assert_eq!(kinds(&events), vec!["OrderAdded"]);
        assert_eq!(book.best_bid(), Some(10 * PRICE_CONSTANT));
        assert_eq!(book.best_ask(), Some(12 * PRICE_CONSTANT));
        assert!(book.is_consistent());
    }

    #[test]
    fn test_full_fill_leaves_no_residue() {
        let mut book = OrderBook::new();
        match_order(&mut book, limit(1, OrderSide::Sell, 10 * PRICE_CONSTANT, 100));
        let events = match_order(&mut book, limit(2, OrderSide::Buy, 10 * PRICE_CONSTANT, 100));

        assert_eq!(kinds(&events), vec!["OrderExecuted"]);
        assert!(book.is_empty());
    }

    #[test]
    fn test_partial_fill_rests_remainder() {
        let mut book = OrderBook::new();
        match_order(&mut book, limit(1, OrderSide::Sell, 10 * PRICE_CONSTANT, 40));
        let events = match_order(&mut book, limit(2, OrderSide::Buy, 10 * PRICE_CONSTANT, 100));

        assert_eq!(kinds(&events), vec!["OrderExecuted", "OrderAdded"]);
        assert!(book.asks.is_empty());
        let rested = book.bids.best_order().unwrap();
        assert_eq!(rested.amount(), 60);
        // Fee prorated on the original amount: 300_000 * 40 / 100 charged
        assert_eq!(rested.fee(), 300_000 - 120_000);
    }

    #[test]
    fn test_execution_at_resting_price() {
        let mut book = OrderBook::new();
        match_order(&mut book, limit(1, OrderSide::Sell, 10 * PRICE_CONSTANT, 100));
        let events = match_order(&mut book, limit(2, OrderSide::Buy, 15 * PRICE_CONSTANT, 100));

        match &events[0] {
            Event::OrderExecuted { counter, .. } => {
                assert_eq!(counter.price(), 10 * PRICE_CONSTANT);
            }
            other => panic!("expected execution, got {:?}", other),
        }
    }

    #[test]
    fn test_sweeps_multiple_levels() {
        let mut book = OrderBook::new();
        match_order(&mut book, limit(1, OrderSide::Sell, 10 * PRICE_CONSTANT, 30));
        match_order(&mut book, limit(2, OrderSide::Sell, 11 * PRICE_CONSTANT, 30));
        match_order(&mut book, limit(3, OrderSide::Sell, 12 * PRICE_CONSTANT, 30));

        let events = match_order(&mut book, limit(4, OrderSide::Buy, 11 * PRICE_CONSTANT, 90));
        // Fills 10 and 11, rests the remaining 30 as a bid
        assert_eq!(
            kinds(&events),
            vec!["OrderExecuted", "OrderExecuted", "OrderAdded"]
        );
        assert_eq!(book.best_ask(), Some(12 * PRICE_CONSTANT));
        assert_eq!(book.bids.best_order().unwrap().amount(), 30);
        assert!(book.is_consistent());
    }

    #[test]
    fn test_price_time_priority_within_level() {
        let mut book = OrderBook::new();
        let first = limit_at(1, OrderSide::Sell, 10 * PRICE_CONSTANT, 50, 1_000);
        let second = limit_at(2, OrderSide::Sell, 10 * PRICE_CONSTANT, 50, 2_000);
        match_order(&mut book, first.clone());
        match_order(&mut book, second.clone());

        let events = match_order(&mut book, limit(3, OrderSide::Buy, 10 * PRICE_CONSTANT, 50));
        match &events[0] {
            Event::OrderExecuted { counter, .. } => assert_eq!(counter.id(), first.id()),
            other => panic!("expected execution, got {:?}", other),
        }
        assert_eq!(book.asks.best_order().unwrap().id(), second.id());
    }

    #[test]
    fn test_unmatchable_counter_remainder_removed() {
        // price 0.5: a counter remainder of 1 cannot settle and is
        // removed as unmatchable rather than resting
        let mut book = OrderBook::new();
        match_order(&mut book, limit(1, OrderSide::Sell, 50_000_000, 101));
        let events = match_order(&mut book, limit(2, OrderSide::Buy, 50_000_000, 100));

        assert_eq!(
            kinds(&events),
            vec!["OrderExecuted", "OrderCanceled"]
        );
        match &events[1] {
            Event::OrderCanceled { order, unmatchable } => {
                assert!(*unmatchable);
                assert_eq!(order.amount(), 1);
            }
            other => panic!("expected cancel, got {:?}", other),
        }
        assert!(book.is_empty());
    }

    #[test]
    fn test_cancel_emits_user_cancel() {
        let mut book = OrderBook::new();
        let order = limit(1, OrderSide::Buy, 10 * PRICE_CONSTANT, 100);
        match_order(&mut book, order.clone());

        let event = cancel_order(&mut book, &order.id()).unwrap();
        match event {
            Event::OrderCanceled { unmatchable, .. } => assert!(!unmatchable),
            other => panic!("expected cancel, got {:?}", other),
        }
        assert!(book.is_empty());
        assert!(cancel_order(&mut book, &order.id()).is_none());
    }

    #[test]
    fn test_expiry_sweep() {
        let mut book = OrderBook::new();
        let now = 1_708_123_456_789i64;
        let expiring = limit_at(1, OrderSide::Buy, 10 * PRICE_CONSTANT, 100, now - 86_400_000);
        let fresh = limit_at(2, OrderSide::Buy, 11 * PRICE_CONSTANT, 100, now);
        match_order(&mut book, expiring.clone());
        match_order(&mut book, fresh.clone());

        let events = expire_orders(&mut book, now);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::OrderCanceled { order, unmatchable } => {
                assert_eq!(order.id(), expiring.id());
                assert!(!unmatchable);
            }
            other => panic!("expected cancel, got {:?}", other),
        }
        assert!(book.contains(&fresh.id()));
    }

    #[test]
    fn test_replay_reproduces_live_book() {
        let run = || {
            let mut book = OrderBook::new();
            let mut events = Vec::new();
            events.extend(match_order(
                &mut book,
                limit(1, OrderSide::Sell, 10 * PRICE_CONSTANT, 40),
            ));
            events.extend(match_order(
                &mut book,
                limit(2, OrderSide::Sell, 11 * PRICE_CONSTANT, 60),
            ));
            events.extend(match_order(
                &mut book,
                limit(3, OrderSide::Buy, 10 * PRICE_CONSTANT, 100),
            ));
            events.extend(match_order(
                &mut book,
                limit(4, OrderSide::Buy, 11 * PRICE_CONSTANT, 50),
            ));
            (book, events)
        };

        let (live, events) = run();
        let mut replayed = OrderBook::new();
        for event in &events {
            apply_event(&mut replayed, event);
        }
        assert_eq!(live.ladders(), replayed.ladders());
    }
}
