//! Exchange transactions
//!
//! One transaction per fill, emitted to the UTX pool. The encoding is
//! consensus-critical: canonical body bytes in a fixed little-endian
//! layout (embedded order bodies are length-prefixed), SHA-256 id, and
//! the matcher's ed25519 signature over the body hash. Two nodes
//! processing the same fill must produce byte-identical transactions.

use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use types::errors::MatcherError;
use types::events;
use types::limit_order::LimitOrder;
use types::order::{verify_proof, Order, OrderId, OrderSide, PublicKey};

/// A matched fill, signed by the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTransaction {
    pub sender_public_key: PublicKey,
    pub buy_order: Order,
    pub sell_order: Order,
    /// Fill price: the resting order's price.
    pub price: u64,
    pub amount: u64,
    pub buy_matcher_fee: u64,
    pub sell_matcher_fee: u64,
    /// Flat transaction fee paid by the matcher.
    pub fee: u64,
    pub timestamp: i64,
    /// Hex-encoded ed25519 signatures over the body hash.
    pub proofs: Vec<String>,
}

impl ExchangeTransaction {
    /// Canonical body bytes; proofs excluded.
    pub fn body_bytes(&self) -> Vec<u8> {
        let buy_body = self.buy_order.body_bytes();
        let sell_body = self.sell_order.body_bytes();

        let mut buf = Vec::with_capacity(32 + 8 + buy_body.len() + sell_body.len() + 8 * 6);
        buf.extend_from_slice(self.sender_public_key.as_bytes());
        buf.extend_from_slice(&(buy_body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&buy_body);
        buf.extend_from_slice(&(sell_body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&sell_body);
        buf.extend_from_slice(&self.price.to_le_bytes());
        buf.extend_from_slice(&self.amount.to_le_bytes());
        buf.extend_from_slice(&self.buy_matcher_fee.to_le_bytes());
        buf.extend_from_slice(&self.sell_matcher_fee.to_le_bytes());
        buf.extend_from_slice(&self.fee.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf
    }

    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.body_bytes());
        hasher.finalize().into()
    }

    /// Transaction id: the body hash, reusing the order id type.
    pub fn id(&self) -> OrderId {
        OrderId::new(self.hash())
    }

    pub fn sign(mut self, key: &SigningKey) -> Self {
        let signature = key.sign(&self.hash());
        self.proofs = vec![hex::encode(signature.to_bytes())];
        self
    }

    /// Exactly one proof must verify under the matcher key.
    pub fn verify_signature(&self) -> bool {
        if self.proofs.len() != 1 {
            return false;
        }
        verify_proof(&self.sender_public_key, &self.hash(), &self.proofs[0])
    }
}

/// Build and sign the transaction for one execution step.
///
/// The fill settles at the resting (counter) order's price; each side's
/// fee is prorated on its original order quantities.
pub fn build_exchange_transaction(
    submitted: &LimitOrder,
    counter: &LimitOrder,
    order_match_tx_fee: u64,
    timestamp: i64,
    matcher_key: &SigningKey,
) -> Result<ExchangeTransaction, MatcherError> {
    let executed = events::executed_amount(submitted, counter);
    if executed == 0 {
        return Err(MatcherError::Internal(format!(
            "zero execution between {} and {}",
            submitted.id(),
            counter.id()
        )));
    }

    let (buy, sell) = match submitted.side() {
        OrderSide::Buy => (submitted, counter),
        OrderSide::Sell => (counter, submitted),
    };

    let tx = ExchangeTransaction {
        sender_public_key: PublicKey::from(matcher_key),
        buy_order: buy.order().as_ref().clone(),
        sell_order: sell.order().as_ref().clone(),
        price: counter.price(),
        amount: executed,
        buy_matcher_fee: events::executed_fee(buy.order().amount, buy.order().matcher_fee, executed),
        sell_matcher_fee: events::executed_fee(
            sell.order().amount,
            sell.order().matcher_fee,
            executed,
        ),
        fee: order_match_tx_fee,
        timestamp,
        proofs: Vec::new(),
    };
    Ok(tx.sign(matcher_key))
}

/// Why the UTX pool refused a transaction. When the pool can tell
/// which order failed its validation it names it, so the matcher
/// removes the invalid party instead of the submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxRejection {
    pub invalid_order: Option<OrderId>,
    pub reason: String,
}

impl UtxRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            invalid_order: None,
            reason: reason.into(),
        }
    }

    pub fn blaming(order_id: OrderId, reason: impl Into<String>) -> Self {
        Self {
            invalid_order: Some(order_id),
            reason: reason.into(),
        }
    }
}

/// The unconfirmed-transaction pool: the external collaborator that
/// reports spendable balances and accepts or refuses emitted
/// transactions.
pub trait UtxPool: Send + Sync {
    fn spendable_balance(&self, addr: &PublicKey, asset: &types::assets::Asset) -> u64;

    /// Admit a transaction. An `Err` means the fill must not stand.
    fn accept(&self, tx: &ExchangeTransaction) -> Result<(), UtxRejection>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::assets::{Asset, AssetId, AssetPair};
    use types::math::PRICE_CONSTANT;

    fn matcher_key() -> SigningKey {
        SigningKey::from_bytes(&[0x42; 32])
    }

    fn limit(seed: u8, side: OrderSide, price: u64, amount: u64) -> LimitOrder {
        let key = SigningKey::from_bytes(&[seed; 32]);
        LimitOrder::new(
            Order::new(
                PublicKey::from(&key),
                PublicKey::from(&matcher_key()),
                AssetPair::new(Asset::Issued(AssetId::new([0xB1; 32])), Asset::Native),
                side,
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
    fn test_build_assigns_sides_and_price() {
        let submitted = limit(1, OrderSide::Buy, 15 * PRICE_CONSTANT, 100);
        let counter = limit(2, OrderSide::Sell, 10 * PRICE_CONSTANT, 40);
        let tx =
            build_exchange_transaction(&submitted, &counter, 300_000, 1_708_123_456_900, &matcher_key())
                .unwrap();

        assert_eq!(tx.buy_order.id(), submitted.id());
        assert_eq!(tx.sell_order.id(), counter.id());
        // Fill settles at the resting order's price
        assert_eq!(tx.price, 10 * PRICE_CONSTANT);
        assert_eq!(tx.amount, 40);
        assert_eq!(tx.buy_matcher_fee, 300_000 * 40 / 100);
        assert_eq!(tx.sell_matcher_fee, 300_000);
        assert!(tx.verify_signature());
    }

    #[test]
    fn test_submitted_sell_maps_to_sell_side() {
        let submitted = limit(1, OrderSide::Sell, 10 * PRICE_CONSTANT, 40);
        let counter = limit(2, OrderSide::Buy, 12 * PRICE_CONSTANT, 100);
        let tx =
            build_exchange_transaction(&submitted, &counter, 300_000, 1_708_123_456_900, &matcher_key())
                .unwrap();

        assert_eq!(tx.sell_order.id(), submitted.id());
        assert_eq!(tx.buy_order.id(), counter.id());
        assert_eq!(tx.price, 12 * PRICE_CONSTANT);
    }

    #[test]
    fn test_transactions_are_bit_stable() {
        let submitted = limit(1, OrderSide::Buy, 15 * PRICE_CONSTANT, 100);
        let counter = limit(2, OrderSide::Sell, 10 * PRICE_CONSTANT, 40);

        let a =
            build_exchange_transaction(&submitted, &counter, 300_000, 1_708_123_456_900, &matcher_key())
                .unwrap();
        let b =
            build_exchange_transaction(&submitted, &counter, 300_000, 1_708_123_456_900, &matcher_key())
                .unwrap();

        assert_eq!(a.body_bytes(), b.body_bytes());
        assert_eq!(a.id(), b.id());
        assert_eq!(a.proofs, b.proofs);
    }

    #[test]
    fn test_tampered_body_breaks_signature() {
        let submitted = limit(1, OrderSide::Buy, 15 * PRICE_CONSTANT, 100);
        let counter = limit(2, OrderSide::Sell, 10 * PRICE_CONSTANT, 40);
        let mut tx =
            build_exchange_transaction(&submitted, &counter, 300_000, 1_708_123_456_900, &matcher_key())
                .unwrap();
        tx.amount += 1;
        assert!(!tx.verify_signature());
    }

    #[test]
    fn test_zero_execution_is_an_error() {
        // Counter remainder of 1 at price 0.5 settles nothing
        let submitted = limit(1, OrderSide::Buy, 50_000_000, 1);
        let counter = limit(2, OrderSide::Sell, 50_000_000, 1);
        assert!(build_exchange_transaction(
            &submitted,
            &counter,
            300_000,
            1_708_123_456_900,
            &matcher_key()
        )
        .is_err());
    }
}
