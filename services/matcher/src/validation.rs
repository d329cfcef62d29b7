//! Placement and cancellation validation
//!
//! Stateless per call; every check reads current history and balances
//! through injected capabilities. Checks run in a fixed order and the
//! first failure wins, with stable reason strings the API edge maps to
//! client errors.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use order_history::{open_volume, OrderHistory, OrderInfo, OrderStatus};
use types::errors::MatcherError;
use types::order::{Order, OrderId, PublicKey, MIN_EXPIRATION_MARGIN_MS};

use crate::script::ScriptVerifier;
use crate::tx::UtxPool;

/// Time source, passed explicitly so nodes can substitute an
/// NTP-corrected clock.
pub trait Clock: Send + Sync {
    fn millis(&self) -> i64;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Validates placements and cancels against history, balances and the
/// script policy.
#[derive(Clone)]
pub struct OrderValidator {
    matcher_public_key: PublicKey,
    min_order_fee: u64,
    history: Arc<OrderHistory>,
    utx: Arc<dyn UtxPool>,
    scripts: ScriptVerifier,
    clock: Arc<dyn Clock>,
}

impl OrderValidator {
    pub fn new(
        matcher_public_key: PublicKey,
        min_order_fee: u64,
        history: Arc<OrderHistory>,
        utx: Arc<dyn UtxPool>,
        scripts: ScriptVerifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            matcher_public_key,
            min_order_fee,
            history,
            utx,
            scripts,
            clock,
        }
    }

    /// Validate a placement. First failure wins.
    pub fn validate_place(&self, order: &Order) -> Result<(), MatcherError> {
        let now = self.clock.millis();

        if order.matcher_public_key != self.matcher_public_key {
            return Err(MatcherError::validation("Incorrect matcher public key"));
        }

        if order.expiration <= now + MIN_EXPIRATION_MARGIN_MS {
            return Err(MatcherError::validation(
                "Order expiration should be > 1 min",
            ));
        }

        self.scripts.verify_order(order)?;

        if !order.is_valid_at(now) {
            return Err(MatcherError::validation("Invalid order"));
        }

        if order.matcher_fee < self.min_order_fee {
            return Err(MatcherError::validation(format!(
                "Order matcherFee should be >= {}",
                self.min_order_fee
            )));
        }

        if self.history.status(&order.id()) != OrderStatus::NotFound {
            return Err(MatcherError::validation("Order is already accepted"));
        }

        self.check_tradable_balance(order)?;

        if self.scripts.has_account_script(&order.sender_public_key)
            && !self.scripts.smart_account_trading_activated()
        {
            return Err(MatcherError::validation(
                "Trading on scripted account isn't allowed yet.",
            ));
        }

        Ok(())
    }

    /// Balance with reservations: the projected reservation of this
    /// order must fit inside the trader's unreserved spendable balance,
    /// asset by asset.
    fn check_tradable_balance(&self, order: &Order) -> Result<(), MatcherError> {
        let addr = order.sender_public_key;
        let projected = open_volume::accepted_delta(order, &OrderInfo::new(order));

        for (asset, required) in projected.iter() {
            let required = (*required).max(0) as u64;
            let spendable = self.utx.spendable_balance(&addr, asset);
            let reserved = self.history.open_volume(&addr, asset);
            let tradable = spendable.saturating_sub(reserved);
            if tradable < required {
                return Err(MatcherError::validation(format!(
                    "Not enough tradable balance: need {} of asset {}, tradable {} (spendable {}, reserved {})",
                    required, asset, tradable, spendable, reserved
                )));
            }
        }
        Ok(())
    }

    /// Validate a cancel request; returns the stored order on success.
    pub fn validate_cancel(
        &self,
        order_id: &OrderId,
        sender: &PublicKey,
    ) -> Result<Order, MatcherError> {
        let Some(order) = self.history.order(order_id) else {
            return Err(MatcherError::cancel_rejected("Order not found"));
        };
        match self.history.status(order_id) {
            OrderStatus::NotFound => {
                return Err(MatcherError::cancel_rejected("Order not found"));
            }
            OrderStatus::Filled(_) => {
                return Err(MatcherError::cancel_rejected("Order is already filled"));
            }
            _ => {}
        }
        if order.sender_public_key != *sender {
            return Err(MatcherError::cancel_rejected(
                "Order cancel should be requested by sender",
            ));
        }
        Ok(order)
    }
}

/// Fixed clock for tests.
pub struct TestClock(pub std::sync::atomic::AtomicI64);

impl TestClock {
    pub fn new(millis: i64) -> Self {
        Self(std::sync::atomic::AtomicI64::new(millis))
    }

    pub fn set(&self, millis: i64) {
        self.0.store(millis, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn millis(&self) -> i64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}
