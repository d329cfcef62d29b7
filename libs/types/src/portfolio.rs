//! Sparse per-asset delta maps
//!
//! An `OpenPortfolio` maps assets to signed deltas of reserved funds for
//! one trader. Portfolios compose by pointwise addition; the empty map is
//! the identity. Backed by a `BTreeMap` so iteration order (and thus any
//! serialized form) is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::assets::Asset;

/// Per-asset signed reservation deltas for a single trader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPortfolio(BTreeMap<Asset, i64>);

impl OpenPortfolio {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A portfolio with a single entry. Zero deltas are dropped.
    pub fn single(asset: Asset, delta: i64) -> Self {
        let mut map = BTreeMap::new();
        if delta != 0 {
            map.insert(asset, delta);
        }
        Self(map)
    }

    /// Add a delta for one asset, dropping the entry if it cancels out.
    pub fn add(&mut self, asset: Asset, delta: i64) {
        let entry = self.0.entry(asset).or_insert(0);
        *entry += delta;
        if *entry == 0 {
            self.0.remove(&asset);
        }
    }

    /// Pointwise addition with another portfolio.
    pub fn combine(mut self, other: &OpenPortfolio) -> Self {
        for (asset, delta) in &other.0 {
            self.add(*asset, *delta);
        }
        self
    }

    pub fn get(&self, asset: &Asset) -> i64 {
        self.0.get(asset).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Asset, &i64)> {
        self.0.iter()
    }

    /// Assets with a non-zero delta.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.0.keys()
    }
}
