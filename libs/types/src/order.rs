//! Signed limit orders and key material
//!
//! An order is immutable once signed. Its id is the SHA-256 hash of the
//! canonical body bytes; the body layout is a fixed little-endian field
//! sequence so that every node hashes and verifies identical bytes.
//! Proofs are ed25519 signatures over the body hash, hex-encoded.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::assets::{Asset, AssetPair};
use crate::math::{self, MAX_AMOUNT};

/// Order versions currently accepted by the matcher.
pub const SUPPORTED_ORDER_VERSIONS: [u8; 2] = [1, 2];

/// Minimum remaining lifetime of an order at placement, in milliseconds.
pub const MIN_EXPIRATION_MARGIN_MS: i64 = 60_000;

/// An ed25519 public key identifying a trader or the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// The verifying key, if the bytes lie on the curve.
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).ok()
    }
}

impl From<&SigningKey> for PublicKey {
    fn from(key: &SigningKey) -> Self {
        Self(key.verifying_key().to_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid public key"))
    }
}

/// 32-byte order identifier: SHA-256 of the canonical body bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId([u8; 32]);

impl OrderId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for OrderId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid order id"))
    }
}

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// A signed limit order, immutable after signing.
///
/// `price` is fixed point (price-asset units per amount-asset unit,
/// scaled by `PRICE_CONSTANT`); `amount` is in amount-asset units;
/// `matcher_fee` is in native-asset units. Timestamps are unix millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub sender_public_key: PublicKey,
    pub matcher_public_key: PublicKey,
    pub asset_pair: AssetPair,
    pub side: OrderSide,
    pub price: u64,
    pub amount: u64,
    pub matcher_fee: u64,
    pub timestamp: i64,
    pub expiration: i64,
    pub version: u8,
    /// Hex-encoded ed25519 signatures over the body hash.
    pub proofs: Vec<String>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender_public_key: PublicKey,
        matcher_public_key: PublicKey,
        asset_pair: AssetPair,
        side: OrderSide,
        price: u64,
        amount: u64,
        matcher_fee: u64,
        timestamp: i64,
        expiration: i64,
    ) -> Self {
        Self {
            sender_public_key,
            matcher_public_key,
            asset_pair,
            side,
            price,
            amount,
            matcher_fee,
            timestamp,
            expiration,
            version: 1,
            proofs: Vec::new(),
        }
    }

    /// Canonical body bytes: a fixed little-endian field layout.
    ///
    /// Proofs are not part of the body; the id and every signature are
    /// computed over these bytes.
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 32 + 32 + 66 + 1 + 8 * 5);
        buf.push(self.version);
        buf.extend_from_slice(self.sender_public_key.as_bytes());
        buf.extend_from_slice(self.matcher_public_key.as_bytes());
        write_asset(&mut buf, &self.asset_pair.amount_asset);
        write_asset(&mut buf, &self.asset_pair.price_asset);
        buf.push(match self.side {
            OrderSide::Buy => 0,
            OrderSide::Sell => 1,
        });
        buf.extend_from_slice(&self.price.to_le_bytes());
        buf.extend_from_slice(&self.amount.to_le_bytes());
        buf.extend_from_slice(&self.matcher_fee.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.expiration.to_le_bytes());
        buf
    }

    /// SHA-256 of the canonical body bytes.
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.body_bytes());
        hasher.finalize().into()
    }

    /// Order id: the body hash.
    pub fn id(&self) -> OrderId {
        OrderId(self.hash())
    }

    /// Sign the body hash, replacing any existing proofs.
    pub fn sign(mut self, key: &SigningKey) -> Self {
        let signature = key.sign(&self.hash());
        self.proofs = vec![hex::encode(signature.to_bytes())];
        self
    }

    /// Verify that exactly one proof is a valid ed25519 signature of the
    /// body hash under the sender key.
    pub fn verify_signature(&self) -> bool {
        if self.proofs.len() != 1 {
            return false;
        }
        verify_proof(&self.sender_public_key, &self.hash(), &self.proofs[0])
    }

    /// Shape validity at time `now`: bounds on price, amount and version,
    /// and not yet expired.
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.price > 0
            && self.amount > 0
            && self.amount < MAX_AMOUNT
            && self.expiration > now
            && SUPPORTED_ORDER_VERSIONS.contains(&self.version)
            && math::amount_of_price_asset(self.amount, self.price).is_some()
    }

    /// Asset the sender spends.
    pub fn spend_asset(&self) -> Asset {
        match self.side {
            OrderSide::Buy => self.asset_pair.price_asset,
            OrderSide::Sell => self.asset_pair.amount_asset,
        }
    }

    /// Asset the sender receives.
    pub fn receive_asset(&self) -> Asset {
        match self.side {
            OrderSide::Buy => self.asset_pair.amount_asset,
            OrderSide::Sell => self.asset_pair.price_asset,
        }
    }

    /// Asset the matcher fee is paid in (always native).
    pub fn fee_asset(&self) -> Asset {
        Asset::Native
    }
}

fn write_asset(buf: &mut Vec<u8>, asset: &Asset) {
    match asset {
        Asset::Native => buf.push(0),
        Asset::Issued(id) => {
            buf.push(1);
            buf.extend_from_slice(id.as_bytes());
        }
    }
}

/// Verify a single hex-encoded proof against a body hash.
pub fn verify_proof(key: &PublicKey, hash: &[u8; 32], proof: &str) -> bool {
    let Some(verifying_key) = key.verifying_key() else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(proof) else {
        return false;
    };
    let Ok(sig_arr) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_arr);
    verifying_key.verify(hash, &signature).is_ok()
}
