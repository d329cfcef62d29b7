//! Matcher configuration
//!
//! Plain serde-deserializable settings with working defaults. Durations
//! are configured in milliseconds and exposed as `Duration`s.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::script::SMART_ACCOUNT_TRADING_FEATURE;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MatcherSettings {
    /// Hex verifying key of the matcher account. Orders must name it;
    /// the signing half is provided by the node wallet.
    pub account: String,
    /// Flat fee on every emitted exchange transaction.
    pub order_match_tx_fee: u64,
    /// Lower bound on the matcher fee of accepted orders.
    pub min_order_fee: u64,
    /// Period of the expiry sweep.
    pub order_cleanup_interval_ms: u64,
    /// Deadline for placement validation.
    pub validation_timeout_ms: u64,
    /// Root directory for per-pair journals.
    pub journal_dir: PathBuf,
    /// Root directory for per-pair snapshots.
    pub snapshot_dir: PathBuf,
    /// Snapshot the book every this many journaled events.
    pub snapshot_interval: u64,
    pub snapshot_compression: bool,
    /// Feature id → activation height.
    pub pre_activated_features: BTreeMap<u16, u64>,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            account: String::new(),
            order_match_tx_fee: 300_000,
            min_order_fee: 300_000,
            order_cleanup_interval_ms: 60_000,
            validation_timeout_ms: 600_000,
            journal_dir: PathBuf::from("data/journal"),
            snapshot_dir: PathBuf::from("data/snapshots"),
            snapshot_interval: 10_000,
            snapshot_compression: true,
            pre_activated_features: BTreeMap::new(),
        }
    }
}

impl MatcherSettings {
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn order_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.order_cleanup_interval_ms)
    }

    /// Activation height of smart-account trading, if configured.
    pub fn smart_account_trading_height(&self) -> Option<u64> {
        self.pre_activated_features
            .get(&SMART_ACCOUNT_TRADING_FEATURE)
            .copied()
    }
}
