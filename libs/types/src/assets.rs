//! Asset identifiers and trading pairs
//!
//! The native chain asset has no id and is denoted `Asset::Native`; every
//! issued asset is identified by the 32-byte hash of its issue
//! transaction. Serialized as hex strings to keep JSON representations
//! lossless.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte identifier of an issued asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId([u8; 32]);

impl AssetId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for AssetId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid asset id"))
    }
}

/// One side of a trading pair: the native asset or an issued one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// The chain's native asset (no id).
    Native,
    /// An issued asset identified by its 32-byte id.
    Issued(AssetId),
}

impl Asset {
    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    /// Issued-asset id, if any.
    pub fn id(&self) -> Option<&AssetId> {
        match self {
            Asset::Native => None,
            Asset::Issued(id) => Some(id),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "NATIVE"),
            Asset::Issued(id) => write!(f, "{}", id),
        }
    }
}

/// A trading pair: prices are quoted in `price_asset` units per
/// `amount_asset` unit, scaled by `PRICE_CONSTANT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    pub amount_asset: Asset,
    pub price_asset: Asset,
}

impl AssetPair {
    pub fn new(amount_asset: Asset, price_asset: Asset) -> Self {
        Self {
            amount_asset,
            price_asset,
        }
    }

    /// Stable textual key for routing and storage.
    pub fn key(&self) -> String {
        format!("{}-{}", self.amount_asset, self.price_asset)
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.amount_asset, self.price_asset)
    }
}
