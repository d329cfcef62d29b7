//! Matcher supervisor
//!
//! Routes every request to the pair actor owning that asset pair,
//! spawning actors on first use and respawning them (through recovery)
//! if one has died. Read-only book depth is served from a shared map
//! the actors publish into, so queries never wait behind the mailbox.

use std::sync::Arc;

use dashmap::DashMap;
use ed25519_dalek::SigningKey;
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};

use order_history::OrderHistory;
use types::assets::AssetPair;
use types::errors::MatcherError;
use types::limit_order::LimitOrder;
use types::order::{Order, OrderId, OrderSide, PublicKey};

use crate::actor::{BookDepth, MatcherContext, PairActor, PairHandle, PairRequest, PairResponse};
use crate::script::{BlockchainView, ScriptRunner, ScriptVerifier};
use crate::settings::MatcherSettings;
use crate::tx::{ExchangeTransaction, UtxPool};
use crate::validation::{Clock, OrderValidator};

/// Capacity of the accepted-transaction broadcast channel.
const TRANSACTION_CHANNEL_SIZE: usize = 4096;

/// The matcher: one actor per pair, spawned on demand.
pub struct Matcher {
    ctx: MatcherContext,
    pairs: DashMap<String, PairHandle>,
    depths: Arc<DashMap<String, BookDepth>>,
}

impl Matcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: MatcherSettings,
        matcher_key: SigningKey,
        history: Arc<OrderHistory>,
        utx: Arc<dyn UtxPool>,
        script_runner: Arc<dyn ScriptRunner>,
        blockchain: Arc<dyn BlockchainView>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let settings = Arc::new(settings);
        let scripts = ScriptVerifier::new(script_runner, blockchain);
        let matcher_public_key = PublicKey::from(&matcher_key);
        let validator = Arc::new(OrderValidator::new(
            matcher_public_key,
            settings.min_order_fee,
            Arc::clone(&history),
            Arc::clone(&utx),
            scripts.clone(),
            Arc::clone(&clock),
        ));
        let (transactions, _) = broadcast::channel(TRANSACTION_CHANNEL_SIZE);

        let ctx = MatcherContext {
            settings,
            history,
            validator,
            scripts,
            utx,
            matcher_key: Arc::new(matcher_key),
            clock,
            transactions,
        };

        Self {
            ctx,
            pairs: DashMap::new(),
            depths: Arc::new(DashMap::new()),
        }
    }

    /// Place an order on its pair's book.
    pub async fn place(&self, order: Order) -> PairResponse {
        let pair = order.asset_pair;
        let (reply, rx) = oneshot::channel();
        let request = PairRequest::Place {
            order: Box::new(order),
            reply,
        };
        self.deliver(&pair, request).await;
        rx.await
            .unwrap_or_else(|_| PairResponse::OrderRejected(actor_died()))
    }

    /// Cancel an order on one pair.
    pub async fn cancel(
        &self,
        pair: AssetPair,
        sender: PublicKey,
        order_id: OrderId,
    ) -> PairResponse {
        let (reply, rx) = oneshot::channel();
        let request = PairRequest::Cancel {
            sender,
            order_id,
            reply,
        };
        self.deliver(&pair, request).await;
        rx.await
            .unwrap_or_else(|_| PairResponse::OrderCancelRejected(actor_died()))
    }

    /// Resting orders of a pair, optionally one side only, in priority
    /// order.
    pub async fn get_orders(&self, pair: AssetPair, side: Option<OrderSide>) -> Vec<LimitOrder> {
        let (reply, rx) = oneshot::channel();
        self.deliver(&pair, PairRequest::GetOrders { side, reply }).await;
        rx.await.unwrap_or_default()
    }

    /// Run the expiry sweep on every live pair.
    pub async fn cleanup(&self) {
        let handles: Vec<PairHandle> =
            self.pairs.iter().map(|entry| entry.value().clone()).collect();
        for handle in handles {
            if handle.sender.send(PairRequest::Cleanup).await.is_err() {
                warn!(pair = %handle.pair.key(), "cleanup skipped, actor down");
            }
        }
    }

    /// Drop one pair's in-memory state and reload it from disk.
    pub async fn restart_pair(&self, pair: AssetPair) {
        self.deliver(&pair, PairRequest::Restart).await;
    }

    /// Published depth of one pair's book.
    pub fn book_depth(&self, pair: &AssetPair) -> Option<BookDepth> {
        self.depths.get(&pair.key()).map(|d| d.clone())
    }

    /// Subscribe to every transaction the matcher emits.
    pub fn subscribe_transactions(&self) -> broadcast::Receiver<ExchangeTransaction> {
        self.ctx.transactions.subscribe()
    }

    /// Spawn a periodic expiry sweep. Runs until the matcher is
    /// dropped.
    pub fn start_cleanup_task(self: &Arc<Self>) {
        let matcher = Arc::downgrade(self);
        let interval = self.ctx.settings.order_cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(matcher) = matcher.upgrade() else {
                    break;
                };
                matcher.cleanup().await;
            }
        });
    }

    // ── Routing ─────────────────────────────────────────────────────

    /// Send to the pair's actor, spawning or respawning it as needed.
    /// The request is dropped (and the caller's oneshot closed) only if
    /// respawn fails.
    async fn deliver(&self, pair: &AssetPair, request: PairRequest) {
        let handle = match self.handle_for(pair) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(pair = %pair.key(), error = %e, "failed to spawn pair actor");
                return;
            }
        };

        if let Err(send_error) = handle.sender.send(request).await {
            // Actor died since we looked it up: respawn once and retry
            self.pairs.remove(&pair.key());
            match self.handle_for(pair) {
                Ok(handle) => {
                    let _ = handle.sender.send(send_error.0).await;
                }
                Err(e) => {
                    warn!(pair = %pair.key(), error = %e, "failed to respawn pair actor");
                }
            }
        }
    }

    fn handle_for(&self, pair: &AssetPair) -> Result<PairHandle, MatcherError> {
        match self.pairs.entry(pair.key()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Ok(entry.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let handle = PairActor::spawn(*pair, self.ctx.clone(), Arc::clone(&self.depths))?;
                info!(pair = %pair.key(), "pair actor spawned");
                slot.insert(handle.clone());
                Ok(handle)
            }
        }
    }
}

fn actor_died() -> MatcherError {
    MatcherError::Internal("pair actor unavailable".to_string())
}
