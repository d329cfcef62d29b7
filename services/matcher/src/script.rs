//! Account and asset script policy
//!
//! The matcher does not evaluate scripts itself; it consumes a
//! `ScriptRunner` capability together with a read-only blockchain view.
//! An account without a script is verified by its ed25519 proof; an
//! account with one is verified by running the script over the subject.
//! An exchange transaction must additionally pass the scripts of every
//! scripted asset it moves.

use std::sync::Arc;

use types::assets::AssetId;
use types::errors::MatcherError;
use types::order::{Order, PublicKey};

use crate::tx::ExchangeTransaction;

/// Feature id gating orders from scripted accounts.
pub const SMART_ACCOUNT_TRADING_FEATURE: u16 = 10;

/// An account or asset script, opaque to the matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub text: String,
}

impl Script {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// What a script is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum ScriptSubject<'a> {
    Order(&'a Order),
    Transaction(&'a ExchangeTransaction),
}

/// Script evaluator capability. Implementations bring their own
/// language; the matcher only consumes the verdict.
pub trait ScriptRunner: Send + Sync {
    /// Evaluate `script` over `subject` at `height`. `Ok(true)` allows,
    /// `Ok(false)` denies, `Err` is an execution failure.
    fn run(&self, height: u64, subject: &ScriptSubject, script: &Script) -> Result<bool, String>;
}

/// Read-only view of chain state the verifier needs.
pub trait BlockchainView: Send + Sync {
    fn height(&self) -> u64;
    fn account_script(&self, addr: &PublicKey) -> Option<Script>;
    fn asset_script(&self, asset: &AssetId) -> Option<Script>;
    /// Activation height of a feature, if (pre-)activated.
    fn feature_activation_height(&self, feature: u16) -> Option<u64>;
}

/// Applies the script policy to orders and exchange transactions.
#[derive(Clone)]
pub struct ScriptVerifier {
    runner: Arc<dyn ScriptRunner>,
    blockchain: Arc<dyn BlockchainView>,
}

impl ScriptVerifier {
    pub fn new(runner: Arc<dyn ScriptRunner>, blockchain: Arc<dyn BlockchainView>) -> Self {
        Self { runner, blockchain }
    }

    pub fn blockchain(&self) -> &Arc<dyn BlockchainView> {
        &self.blockchain
    }

    /// Whether orders from scripted accounts may be accepted yet.
    pub fn smart_account_trading_activated(&self) -> bool {
        self.blockchain
            .feature_activation_height(SMART_ACCOUNT_TRADING_FEATURE)
            .map(|h| self.blockchain.height() >= h)
            .unwrap_or(false)
    }

    pub fn has_account_script(&self, addr: &PublicKey) -> bool {
        self.blockchain.account_script(addr).is_some()
    }

    /// Verify an order: proof check for plain accounts, script run for
    /// scripted ones.
    pub fn verify_order(&self, order: &Order) -> Result<(), MatcherError> {
        match self.blockchain.account_script(&order.sender_public_key) {
            None => {
                if order.verify_signature() {
                    Ok(())
                } else {
                    Err(MatcherError::validation("signature should be valid"))
                }
            }
            Some(script) => self.run_script(
                &ScriptSubject::Order(order),
                &script,
                format!("account {}", order.sender_public_key),
                false,
            ),
        }
    }

    /// Verify an exchange transaction: matcher, buyer and seller
    /// accounts plus every scripted asset of the pair.
    pub fn verify_transaction(&self, tx: &ExchangeTransaction) -> Result<(), MatcherError> {
        let subject = ScriptSubject::Transaction(tx);

        // Matcher account: signature unless scripted
        match self.blockchain.account_script(&tx.sender_public_key) {
            None => {
                if !tx.verify_signature() {
                    return Err(MatcherError::validation("signature should be valid"));
                }
            }
            Some(script) => self.run_script(
                &subject,
                &script,
                format!("account {}", tx.sender_public_key),
                false,
            )?,
        }

        // Buyer and seller accounts, when scripted
        for party in [
            &tx.buy_order.sender_public_key,
            &tx.sell_order.sender_public_key,
        ] {
            if let Some(script) = self.blockchain.account_script(party) {
                self.run_script(&subject, &script, format!("account {}", party), false)?;
            }
        }

        // Scripted assets on either leg
        let pair = &tx.buy_order.asset_pair;
        for asset in [&pair.amount_asset, &pair.price_asset] {
            if let Some(id) = asset.id() {
                if let Some(script) = self.blockchain.asset_script(id) {
                    self.run_script(&subject, &script, format!("asset {}", id), true)?;
                }
            }
        }

        Ok(())
    }

    fn run_script(
        &self,
        subject: &ScriptSubject,
        script: &Script,
        context: String,
        is_asset_script: bool,
    ) -> Result<(), MatcherError> {
        match self.runner.run(self.blockchain.height(), subject, script) {
            Ok(true) => Ok(()),
            Ok(false) => Err(MatcherError::ScriptRejected {
                context,
                is_asset_script,
            }),
            Err(reason) => Err(MatcherError::ScriptExecutionError {
                context,
                reason,
                is_asset_script,
            }),
        }
    }
}

/// Runner that verifies a single proof as an ed25519 signature; stands
/// in for a real evaluator in tests and defaults.
pub struct SignatureRunner;

impl ScriptRunner for SignatureRunner {
    fn run(&self, _height: u64, subject: &ScriptSubject, _script: &Script) -> Result<bool, String> {
        Ok(match subject {
            ScriptSubject::Order(order) => order.verify_signature(),
            ScriptSubject::Transaction(tx) => tx.verify_signature(),
        })
    }
}

/// Static blockchain view for tests and single-node setups.
#[derive(Default)]
pub struct StaticBlockchain {
    pub height: std::sync::atomic::AtomicU64,
    pub account_scripts: dashmap::DashMap<PublicKey, Script>,
    pub asset_scripts: dashmap::DashMap<AssetId, Script>,
    pub features: dashmap::DashMap<u16, u64>,
}

impl StaticBlockchain {
    pub fn new(height: u64) -> Self {
        Self {
            height: std::sync::atomic::AtomicU64::new(height),
            ..Default::default()
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, std::sync::atomic::Ordering::SeqCst);
    }
}

impl BlockchainView for StaticBlockchain {
    fn height(&self) -> u64 {
        self.height.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn account_script(&self, addr: &PublicKey) -> Option<Script> {
        self.account_scripts.get(addr).map(|s| s.clone())
    }

    fn asset_script(&self, asset: &AssetId) -> Option<Script> {
        self.asset_scripts.get(asset).map(|s| s.clone())
    }

    fn feature_activation_height(&self, feature: u16) -> Option<u64> {
        self.features.get(&feature).map(|h| *h)
    }
}

/// Runner with a fixed verdict, for policy tests.
pub struct FixedRunner(pub Result<bool, String>);

impl ScriptRunner for FixedRunner {
    fn run(&self, _: u64, _: &ScriptSubject, _: &Script) -> Result<bool, String> {
        self.0.clone()
    }
}
